//! Privilege elevation.
//!
//! Elevation is always an explicit request, never implicit. The
//! [`Elevator`] trait is the consent seam: the platform implementation
//! talks to the real consent mechanism (sudo, or an already-elevated
//! Windows host), and tests substitute doubles. A denial maps to
//! [`Error::ElevationDenied`] and leaves the pane exactly as it was.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use portable_pty::CommandBuilder;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hub::IoHub;
use crate::pane::Pane;
use crate::platform;
use crate::shell::{self, ShellProcess};
use crate::types::{Dialect, Elevation};

#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    /// Run exactly one command elevated; the pane's own shell never
    /// changes privilege.
    SingleCommand(String),
    /// Replace the pane's shell with an elevated one, same dialect and
    /// working directory.
    WholeSession,
}

/// Captured result of a single elevated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i64,
}

pub trait Elevator: Send + Sync {
    /// Execute one command at elevated privilege in `cwd`, capturing
    /// output and exit code.
    fn run_command(
        &self,
        dialect: Dialect,
        cwd: &Path,
        command: &str,
        config: &Config,
    ) -> Result<CommandOutput>;

    /// Spawn a whole interactive shell at elevated privilege.
    fn spawn_session(&self, dialect: Dialect, cwd: &Path, config: &Config)
        -> Result<ShellProcess>;
}

pub struct ElevationBroker {
    elevator: Arc<dyn Elevator>,
}

impl ElevationBroker {
    pub fn new(elevator: Arc<dyn Elevator>) -> ElevationBroker {
        ElevationBroker { elevator }
    }

    /// Apply an elevation request to `pane`. On any error the pane is
    /// untouched and still accepting input at its prior privilege.
    pub fn elevate(
        &self,
        scope: Scope,
        pane: &mut Pane,
        hub: &mut IoHub,
        config: &Config,
    ) -> Result<()> {
        match scope {
            Scope::SingleCommand(command) => {
                let out =
                    self.elevator.run_command(pane.dialect(), pane.cwd(), &command, config)?;
                info!(pane = %pane.id(), exit = out.exit_code, "elevated command finished");
                // Output lands in the pane's stream as if produced
                // locally, exit report last.
                if !out.stdout.is_empty() {
                    hub.ingest(pane.id(), out.stdout);
                }
                if !out.stderr.is_empty() {
                    hub.ingest(pane.id(), out.stderr);
                }
                hub.notice(
                    pane.id(),
                    format!("[elevated command finished with exit code {}]", out.exit_code),
                );
                Ok(())
            }
            Scope::WholeSession => {
                let replacement =
                    self.elevator.spawn_session(pane.dialect(), pane.cwd(), config)?;
                // Trailing output of the outgoing process stays in the
                // pane's stream, ahead of the swap notice.
                for data in pane.read_available() {
                    hub.ingest(pane.id(), data);
                }
                pane.replace_shell(replacement);
                hub.notice(pane.id(), "[session relaunched with elevated privilege]");
                info!(pane = %pane.id(), "whole-session elevation applied");
                Ok(())
            }
        }
    }
}

/// Elevator backed by the host platform's consent mechanism.
///
/// On Unix, consent means cached sudo credentials (`sudo -n`); there is
/// no interactive prompting from inside the engine. On Windows, UAC
/// cannot hand an elevated child back to an unelevated host's console,
/// so requests succeed only when the host itself already runs elevated.
pub struct PlatformElevator;

impl Elevator for PlatformElevator {
    fn run_command(
        &self,
        dialect: Dialect,
        cwd: &Path,
        command: &str,
        config: &Config,
    ) -> Result<CommandOutput> {
        let (program, args) = shell::oneshot_command(dialect, command, config);
        let mut cmd = if platform::is_elevated() {
            let mut c = Command::new(&program);
            c.args(&args);
            c
        } else if cfg!(windows) {
            warn!("single-command elevation refused on unelevated Windows host");
            return Err(Error::ElevationDenied(
                "host is not elevated; restart it as administrator".to_string(),
            ));
        } else {
            if !platform::consent_available() {
                return Err(Error::ElevationDenied("sudo credentials unavailable".to_string()));
            }
            let mut c = Command::new("sudo");
            c.arg("-n").arg("--").arg(&program).args(&args);
            c
        };
        let out = cmd
            .current_dir(cwd)
            .output()
            .map_err(|e| Error::ElevationDenied(format!("elevated launch failed: {e}")))?;
        Ok(CommandOutput {
            stdout: out.stdout,
            stderr: out.stderr,
            exit_code: out.status.code().map(i64::from).unwrap_or(-1),
        })
    }

    fn spawn_session(
        &self,
        dialect: Dialect,
        cwd: &Path,
        config: &Config,
    ) -> Result<ShellProcess> {
        if platform::is_elevated() {
            return ShellProcess::spawn(dialect, cwd, Elevation::Elevated, config);
        }
        if cfg!(windows) {
            warn!("whole-session elevation refused on unelevated Windows host");
            return Err(Error::ElevationDenied(
                "host is not elevated; restart it as administrator".to_string(),
            ));
        }
        if !platform::consent_available() {
            return Err(Error::ElevationDenied("sudo credentials unavailable".to_string()));
        }
        let (program, args) = shell::resolve_dialect(dialect, config);
        let mut builder = CommandBuilder::new("sudo");
        builder.arg("-n");
        builder.arg("--");
        builder.arg(&program);
        for arg in &args {
            builder.arg(arg);
        }
        builder.cwd(cwd);
        builder.env("TERM", "xterm-256color");
        ShellProcess::spawn_with(dialect, Elevation::Elevated, builder, config)
    }
}

#[cfg(test)]
pub(crate) mod doubles {
    use super::*;

    /// Declines every request.
    pub struct DenyAll;

    impl Elevator for DenyAll {
        fn run_command(
            &self,
            _dialect: Dialect,
            _cwd: &Path,
            _command: &str,
            _config: &Config,
        ) -> Result<CommandOutput> {
            Err(Error::ElevationDenied("declined by policy".to_string()))
        }

        fn spawn_session(
            &self,
            _dialect: Dialect,
            _cwd: &Path,
            _config: &Config,
        ) -> Result<ShellProcess> {
            Err(Error::ElevationDenied("declined by policy".to_string()))
        }
    }

    /// Grants every request without real privilege: single commands get
    /// a canned result, whole sessions get an ordinary shell tagged
    /// elevated.
    pub struct GrantAll;

    impl Elevator for GrantAll {
        fn run_command(
            &self,
            _dialect: Dialect,
            _cwd: &Path,
            command: &str,
            _config: &Config,
        ) -> Result<CommandOutput> {
            Ok(CommandOutput {
                stdout: format!("elevated: {command}\n").into_bytes(),
                stderr: Vec::new(),
                exit_code: 0,
            })
        }

        fn spawn_session(
            &self,
            dialect: Dialect,
            cwd: &Path,
            config: &Config,
        ) -> Result<ShellProcess> {
            ShellProcess::spawn(dialect, cwd, Elevation::Elevated, config)
        }
    }
}
