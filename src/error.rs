use thiserror::Error;

use crate::types::{NodeId, PaneId, TabId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The shell process could not be created; pane creation aborts.
    #[error("failed to spawn shell process: {0}")]
    Spawn(String),

    /// Write attempted after the process was observed exited. Never
    /// retried automatically.
    #[error("shell process channel closed")]
    ChannelClosed,

    /// The platform consent mechanism declined or is unavailable. The
    /// pane stays fully usable at its prior privilege level.
    #[error("elevation denied: {0}")]
    ElevationDenied(String),

    #[error("pane {0} not found")]
    PaneNotFound(PaneId),

    #[error("tab {0} not found")]
    TabNotFound(TabId),

    #[error("split {0} not found")]
    SplitNotFound(NodeId),

    /// Split ratio outside the open interval (0, 1). No state mutated.
    #[error("split ratio {0} out of range (0, 1)")]
    InvalidRatio(f32),

    /// Per-pane restore failure. Degrades that one pane to a
    /// placeholder; never aborts the whole workspace restore.
    #[error("session restore failed: {0}")]
    Restore(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
