//! A pane: one shell process plus the per-pane state the engine tracks
//! for it (working directory, command history, exit reporting).

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;
use crate::shell::ShellProcess;
use crate::types::{Dialect, Elevation, Liveness, PaneId};

const HISTORY_CAP: usize = 500;

pub struct Pane {
    id: PaneId,
    shell: ShellProcess,
    cwd: PathBuf,
    history: Vec<String>,
    /// Set once the exit notice for this pane has been emitted, so a
    /// dead pane is reported exactly once.
    pub(crate) exit_notified: bool,
}

impl Pane {
    pub fn new(id: PaneId, dialect: Dialect, cwd: &Path, config: &Config) -> Result<Pane> {
        let shell = ShellProcess::spawn(dialect, cwd, Elevation::Normal, config)?;
        Ok(Pane {
            id,
            shell,
            cwd: cwd.to_path_buf(),
            history: Vec::new(),
            exit_notified: false,
        })
    }

    /// Wrap an already-spawned shell, e.g. one launched through the
    /// elevation broker or a restore placeholder.
    pub fn with_shell(id: PaneId, shell: ShellProcess, cwd: &Path) -> Pane {
        Pane {
            id,
            shell,
            cwd: cwd.to_path_buf(),
            history: Vec::new(),
            exit_notified: false,
        }
    }

    pub fn id(&self) -> PaneId {
        self.id
    }

    pub fn dialect(&self) -> Dialect {
        self.shell.dialect()
    }

    pub fn elevation(&self) -> Elevation {
        self.shell.elevation()
    }

    pub fn liveness(&self) -> Liveness {
        self.shell.liveness()
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Record a directory change performed by the `cd` builtin. The
    /// engine mirrors the shell's directory so saves and new splits
    /// inherit it; the shell itself remains the source of truth.
    pub fn set_cwd(&mut self, cwd: PathBuf) {
        self.cwd = cwd;
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub(crate) fn seed_history(&mut self, history: Vec<String>) {
        self.history = history;
        self.trim_history();
    }

    /// Forward one resolved command line to the shell, recording it in
    /// the pane's history.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        self.shell.send_line(line)?;
        self.record_line(line);
        Ok(())
    }

    /// Append a dispatched line to history without touching the shell.
    /// Builtin commands are recorded through this path.
    pub(crate) fn record_line(&mut self, line: &str) {
        if !line.trim().is_empty() {
            self.history.push(line.to_string());
            self.trim_history();
        }
    }

    /// Raw byte passthrough for interactive input (keystrokes, control
    /// sequences). Not recorded in history.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.shell.write(bytes)
    }

    pub fn read_available(&mut self) -> Vec<Vec<u8>> {
        self.shell.read_available()
    }

    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        self.shell.resize(rows, cols)
    }

    pub fn terminate(&mut self) {
        self.shell.terminate();
    }

    /// Swap in a different shell process, terminating the old one. Used
    /// by whole-session elevation, which replaces the pane's shell with
    /// an elevated one in place.
    pub fn replace_shell(&mut self, shell: ShellProcess) {
        self.shell.terminate();
        self.shell = shell;
        self.exit_notified = false;
    }

    pub(crate) fn shell_mut(&mut self) -> &mut ShellProcess {
        &mut self.shell
    }

    fn trim_history(&mut self) {
        if self.history.len() > HISTORY_CAP {
            let drop = self.history.len() - HISTORY_CAP;
            self.history.drain(..drop);
        }
    }
}
