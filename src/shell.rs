//! Shell process supervision.
//!
//! Each pane owns exactly one [`ShellProcess`]: a child shell running on
//! a PTY, a dedicated reader thread feeding an output channel, and a
//! watcher thread that observes exit without any caller ever blocking.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::platform;
use crate::types::{Dialect, Elevation, Liveness};

const DEFAULT_ROWS: u16 = 30;
const DEFAULT_COLS: u16 = 120;

/// PSReadLine v2.2.6+ enables predictions by default; their VT rendering
/// races with PTY output capture and corrupts the stream, so every
/// interactive PowerShell is started with them disabled.
const PSREADLINE_INIT: &str = concat!(
    "$PSStyle.OutputRendering = 'Ansi'; ",
    "try { Set-PSReadLineOption -PredictionSource None -ErrorAction Stop } catch {}; ",
    "try { Set-PSReadLineOption -PredictionViewStyle InlineView -ErrorAction Stop } catch {}",
);

pub struct ShellProcess {
    dialect: Dialect,
    elevation: Elevation,
    state: Arc<Mutex<Liveness>>,
    grace: Duration,
    io: Option<LiveIo>,
}

struct LiveIo {
    writer: Box<dyn Write + Send>,
    master: Box<dyn MasterPty>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    output: Receiver<Vec<u8>>,
    cancel: Arc<AtomicBool>,
    pid: Option<u32>,
}

impl ShellProcess {
    /// Spawn the shell program selected by `dialect` in `cwd`.
    ///
    /// The `elevation` tag records how the process was launched; spawn
    /// itself never escalates privilege. Escalation goes through the
    /// elevation broker, which is the only caller passing `Elevated`.
    pub fn spawn(
        dialect: Dialect,
        cwd: &Path,
        elevation: Elevation,
        config: &Config,
    ) -> Result<ShellProcess> {
        let cmd = interactive_command(dialect, cwd, config);
        Self::spawn_with(dialect, elevation, cmd, config)
    }

    /// Spawn from an explicit command builder. Used by the elevation
    /// broker to wrap the shell in a platform consent mechanism.
    pub fn spawn_with(
        dialect: Dialect,
        elevation: Elevation,
        cmd: CommandBuilder,
        config: &Config,
    ) -> Result<ShellProcess> {
        let pty = native_pty_system();
        let size = PtySize { rows: DEFAULT_ROWS, cols: DEFAULT_COLS, pixel_width: 0, pixel_height: 0 };
        let pair = pty
            .openpty(size)
            .map_err(|e| Error::Spawn(format!("openpty error: {e}")))?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| Error::Spawn(format!("spawn shell error: {e}")))?;
        // On Windows ConPTY the slave handle must be closed after spawning
        // so the child owns the sole reference to the console input pipe.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::Spawn(format!("clone reader error: {e}")))?;
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::Spawn(format!("take writer error: {e}")))?;

        // ConPTY sends a Device Status Report during init and blocks until
        // the host answers with a cursor-position report.
        #[cfg(windows)]
        {
            let _ = writer.write_all(b"\x1b[1;1R");
            let _ = writer.flush();
        }

        let killer = child.clone_killer();
        let pid = child.process_id();
        let state = Arc::new(Mutex::new(Liveness::Starting));
        let cancel = Arc::new(AtomicBool::new(false));

        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        spawn_reader_thread(reader, tx, cancel.clone());
        spawn_watcher_thread(child, state.clone(), dialect);

        info!(%dialect, ?pid, ?elevation, "shell process spawned");
        Ok(ShellProcess {
            dialect,
            elevation,
            state,
            grace: Duration::from_millis(config.terminate_grace_ms),
            io: Some(LiveIo { writer, master: pair.master, killer, output: rx, cancel, pid }),
        })
    }

    /// An already-dead shell standing in for one that could not be
    /// restored. Writes fail with `ChannelClosed`; reads yield nothing.
    pub fn placeholder(dialect: Dialect) -> ShellProcess {
        ShellProcess {
            dialect,
            elevation: Elevation::Normal,
            state: Arc::new(Mutex::new(Liveness::Exited(-1))),
            grace: Duration::from_millis(0),
            io: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn elevation(&self) -> Elevation {
        self.elevation
    }

    pub fn pid(&self) -> Option<u32> {
        self.io.as_ref().and_then(|io| io.pid)
    }

    pub fn liveness(&self) -> Liveness {
        self.state
            .lock()
            .map(|guard| *guard)
            .unwrap_or(Liveness::Exited(-1))
    }

    /// Write raw bytes to the process input. Fails with `ChannelClosed`
    /// once the process has been observed exited; never blocks on a dead
    /// pipe and never panics.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.liveness().is_exited() {
            return Err(Error::ChannelClosed);
        }
        let io = self.io.as_mut().ok_or(Error::ChannelClosed)?;
        io.writer
            .write_all(bytes)
            .and_then(|_| io.writer.flush())
            .map_err(|_| Error::ChannelClosed)
    }

    /// Write one command line followed by the platform line terminator.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        let mut bytes = line.as_bytes().to_vec();
        #[cfg(windows)]
        bytes.push(b'\r');
        #[cfg(not(windows))]
        bytes.push(b'\n');
        self.write(&bytes)
    }

    /// Drain whatever output the reader thread has collected so far.
    /// Non-blocking; an empty result is not an error.
    pub fn read_available(&mut self) -> Vec<Vec<u8>> {
        match self.io.as_ref() {
            Some(io) => io.output.try_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Resize the PTY. Geometry is advisory; the engine does not render.
    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        if let Some(io) = self.io.as_mut() {
            io.master
                .resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
                .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        }
        Ok(())
    }

    /// Best-effort termination. Idempotent, never blocks the caller, and
    /// always eventually transitions the process to `Exited`: a grace
    /// timer force-kills the whole process tree if the initial signal is
    /// ignored.
    pub fn terminate(&mut self) {
        {
            let Some(io) = self.io.as_mut() else { return };
            io.cancel.store(true, Ordering::Release);
        }
        if self.liveness().is_exited() {
            return;
        }
        let Some(io) = self.io.as_mut() else { return };
        let _ = io.killer.kill();
        let mut killer = io.killer.clone_killer();
        let pid = io.pid;
        let state = self.state.clone();
        let grace = self.grace;
        thread::spawn(move || {
            thread::sleep(grace);
            let exited = state.lock().map(|g| g.is_exited()).unwrap_or(true);
            if !exited {
                let _ = killer.kill();
                if let Some(pid) = pid {
                    platform::kill_process_tree(pid);
                }
            }
        });
    }
}

impl Drop for ShellProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn spawn_reader_thread(
    mut reader: Box<dyn std::io::Read + Send>,
    tx: mpsc::Sender<Vec<u8>>,
    cancel: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        let mut zero_reads: u32 = 0;
        loop {
            if cancel.load(Ordering::Acquire) {
                break;
            }
            match reader.read(&mut buf) {
                Ok(n) if n > 0 => {
                    zero_reads = 0;
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break; // receiver dropped with the pane
                    }
                }
                Ok(_) => {
                    // Repeated zero-byte reads mean the PTY pipe closed.
                    zero_reads += 1;
                    if zero_reads > 200 {
                        break;
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                Err(_) => break,
            }
        }
    });
}

fn spawn_watcher_thread(
    mut child: Box<dyn portable_pty::Child + Send + Sync>,
    state: Arc<Mutex<Liveness>>,
    dialect: Dialect,
) {
    thread::spawn(move || {
        if let Ok(mut guard) = state.lock() {
            if *guard == Liveness::Starting {
                *guard = Liveness::Running;
            }
        }
        let code = match child.wait() {
            Ok(status) => status.exit_code() as i64,
            Err(_) => -1,
        };
        if let Ok(mut guard) = state.lock() {
            *guard = Liveness::Exited(code);
        }
        debug!(%dialect, code, "shell process exited");
    });
}

/// Cached shell path resolution — `which` walks PATH, so resolve each
/// program once per process.
static RESOLVED_SHELLS: OnceLock<Mutex<std::collections::HashMap<String, Option<String>>>> =
    OnceLock::new();

fn cached_which(program: &str) -> Option<String> {
    let map = RESOLVED_SHELLS.get_or_init(|| Mutex::new(std::collections::HashMap::new()));
    let mut map = map.lock().unwrap_or_else(|e| e.into_inner());
    map.entry(program.to_string())
        .or_insert_with(|| which::which(program).ok().map(|p| p.to_string_lossy().into_owned()))
        .clone()
}

/// Resolve the program and startup flags for an interactive shell of the
/// given dialect. On hosts without the native programs the dialects
/// degrade to `pwsh`, then `sh`, so the engine runs wherever the PTY
/// layer does.
pub fn resolve_dialect(dialect: Dialect, config: &Config) -> (String, Vec<String>) {
    match dialect {
        Dialect::PowerShell => {
            if let Some(program) = &config.powershell_program {
                return (program.clone(), Vec::new());
            }
            if let Some(path) = cached_which("pwsh").or_else(|| cached_which("powershell")) {
                let args = vec![
                    "-NoLogo".to_string(),
                    "-NoExit".to_string(),
                    "-Command".to_string(),
                    PSREADLINE_INIT.to_string(),
                ];
                return (path, args);
            }
            fallback_shell()
        }
        Dialect::Cmd => {
            if let Some(program) = &config.cmd_program {
                return (program.clone(), Vec::new());
            }
            if cfg!(windows) {
                return ("cmd.exe".to_string(), Vec::new());
            }
            if let Some(path) = cached_which("cmd") {
                return (path, Vec::new());
            }
            fallback_shell()
        }
    }
}

fn fallback_shell() -> (String, Vec<String>) {
    if cfg!(windows) {
        ("powershell.exe".to_string(), vec!["-NoLogo".to_string()])
    } else {
        (cached_which("sh").unwrap_or_else(|| "/bin/sh".to_string()), Vec::new())
    }
}

/// Program and argv that run `command` once under the dialect's shell
/// and exit. The flag style follows the resolved program, not the
/// requested dialect, so fallback shells still work.
pub fn oneshot_command(dialect: Dialect, command: &str, config: &Config) -> (String, Vec<String>) {
    let (program, _) = resolve_dialect(dialect, config);
    let base = Path::new(&program)
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let args = match base.as_str() {
        "pwsh" | "powershell" => vec![
            "-NoLogo".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            command.to_string(),
        ],
        "cmd" => vec!["/C".to_string(), command.to_string()],
        _ => vec!["-c".to_string(), command.to_string()],
    };
    (program, args)
}

/// Build the interactive command for a dialect, rooted in `cwd`.
pub fn interactive_command(dialect: Dialect, cwd: &Path, config: &Config) -> CommandBuilder {
    let (program, args) = resolve_dialect(dialect, config);
    let mut builder = CommandBuilder::new(&program);
    if !args.is_empty() {
        builder.args(&args);
    }
    builder.cwd(cwd);
    builder.env("TERM", "xterm-256color");
    builder.env("COLORTERM", "truecolor");
    builder.env("CMDMUX_SESSION", "1");
    builder
}
