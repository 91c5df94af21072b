//! cmdmux: a shell-session multiplexing engine.
//!
//! One process hosts any number of shell sessions, organized as tabbed
//! workspaces of recursively splittable panes. Each pane owns one PTY
//! shell (CMD or PowerShell dialect); input passes through the RCMD
//! dispatcher (aliases and builtins before the shell sees anything),
//! output fans in through a non-blocking hub with per-pane backpressure.
//! Privilege elevation is brokered per command or per session, and the
//! whole topology round-trips through a JSON session file.
//!
//! The crate is the engine only: rendering is the embedding
//! application's job. A front end drives a [`Workspace`], calling
//! [`Workspace::pump`] on its tick and [`Workspace::poll_output`] per
//! pane.

pub mod config;
pub mod dispatch;
pub mod elevation;
pub mod error;
pub mod hub;
pub mod pane;
pub mod platform;
pub mod shell;
pub mod store;
pub mod tree;
pub mod types;
pub mod workspace;

pub use config::Config;
pub use dispatch::{Builtin, Dispatch, Dispatcher, Handled};
pub use elevation::{CommandOutput, ElevationBroker, Elevator, PlatformElevator, Scope};
pub use error::{Error, Result};
pub use hub::IoHub;
pub use pane::Pane;
pub use shell::ShellProcess;
pub use store::{SessionDoc, NodeDoc, TabDoc};
pub use tree::{Node, PaneTree, RemoveOutcome};
pub use types::{
    Chunk, Dialect, Elevation, Liveness, NodeId, Orientation, PaneId, TabId, VERSION,
};
pub use workspace::{Tab, Workspace};

use tracing_subscriber::EnvFilter;

/// Install the process-wide tracing subscriber. `RUST_LOG` overrides the
/// default filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cmdmux=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
