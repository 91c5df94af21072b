use std::fmt;

use serde::{Deserialize, Serialize};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Stable identifier of a pane. Never reused within a workspace lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaneId(pub u64);

/// Stable identifier of a node (leaf or split) inside a pane tree.
/// Allocated from the same workspace-wide generator as pane ids, so a
/// node id is unique across all tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Stable identifier of a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(pub u64);

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Workspace-wide id generator. Counters only move forward; closing a
/// pane never frees its id for reuse.
#[derive(Debug, Clone)]
pub struct IdGen {
    next_pane: u64,
    next_node: u64,
    next_tab: u64,
}

impl IdGen {
    pub fn new() -> Self {
        IdGen { next_pane: 1, next_node: 1, next_tab: 1 }
    }

    pub fn pane(&mut self) -> PaneId {
        let id = PaneId(self.next_pane);
        self.next_pane += 1;
        id
    }

    pub fn node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn tab(&mut self) -> TabId {
        let id = TabId(self.next_tab);
        self.next_tab += 1;
        id
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Split orientation: `Horizontal` places children side by side,
/// `Vertical` stacks them top/bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Which native shell a pane emulates. The engine treats this as an
/// opaque selector for the program and startup flags to launch; the
/// textual emulation rule tables live outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Cmd,
    PowerShell,
}

impl Dialect {
    pub fn label(&self) -> &'static str {
        match self {
            Dialect::Cmd => "cmd",
            Dialect::PowerShell => "powershell",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Privilege level a shell process was launched at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    Normal,
    Elevated,
}

/// Liveness of a shell process, updated asynchronously by its watcher
/// thread. Callers observe exits through this state rather than through
/// blocking joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Starting,
    Running,
    Exited(i64),
}

impl Liveness {
    pub fn is_exited(&self) -> bool {
        matches!(self, Liveness::Exited(_))
    }
}

/// One unit of pane output as delivered to the consumer.
///
/// `Truncated` is not an error: it marks the point where older chunks
/// were dropped because the consumer fell behind the pane's output
/// queue. `Notice` carries engine-generated text (dispatch results,
/// exit reports, restore placeholders) injected into the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Data(Vec<u8>),
    Truncated,
    Notice(String),
}

impl Chunk {
    /// Lossy text view of the chunk, for display and tests.
    pub fn as_text(&self) -> String {
        match self {
            Chunk::Data(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Chunk::Truncated => "[output truncated]".to_string(),
            Chunk::Notice(text) => text.clone(),
        }
    }
}
