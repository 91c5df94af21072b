//! Session persistence.
//!
//! The on-disk document captures topology only: tab names, split shape
//! and ratios, and per leaf the dialect, working directory and command
//! history. Live process state is never stored; every leaf respawns
//! non-elevated on load. A leaf that fails to respawn degrades to a
//! dead placeholder pane instead of failing the whole restore.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::pane::Pane;
use crate::shell::ShellProcess;
use crate::tree::{Node, PaneTree};
use crate::types::{Dialect, NodeId, Orientation, PaneId, TabId};
use crate::workspace::{Tab, Workspace};

const SESSION_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionDoc {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub active_tab: Option<usize>,
    pub tabs: Vec<TabDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TabDoc {
    pub name: String,
    /// Index of the focused pane among the tab's leaves in depth-first
    /// order.
    pub focused: usize,
    pub root: NodeDoc,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeDoc {
    Split {
        orientation: Orientation,
        ratio: f32,
        first: Box<NodeDoc>,
        second: Box<NodeDoc>,
    },
    Leaf {
        dialect: Dialect,
        cwd: PathBuf,
        #[serde(default)]
        history: Vec<String>,
    },
}

/// Write the workspace to `path` as pretty JSON. The shared `&Workspace`
/// borrow is the quiesce step: no structural mutation can run while the
/// snapshot is taken. The file lands via temp file and rename.
pub fn save(ws: &Workspace, path: &Path) -> Result<()> {
    let doc = snapshot(ws);
    let json = serde_json::to_string_pretty(&doc)
        .map_err(|e| Error::Restore(format!("encode failed: {e}")))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session.json".to_string());
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    info!(path = %path.display(), tabs = doc.tabs.len(), "session saved");
    Ok(())
}

pub fn read(path: &Path) -> Result<SessionDoc> {
    let text = fs::read_to_string(path)?;
    let doc: SessionDoc = serde_json::from_str(&text)
        .map_err(|e| Error::Restore(format!("{}: {e}", path.display())))?;
    if doc.version != SESSION_VERSION {
        warn!(version = doc.version, "session document version differs, loading anyway");
    }
    Ok(doc)
}

/// Rebuild every tab of `doc` into `ws`, which is expected to be empty.
/// Individual pane failures degrade to placeholders; the restore itself
/// only fails on malformed structure.
pub(crate) fn restore(ws: &mut Workspace, doc: &SessionDoc) -> Result<()> {
    for tab in &doc.tabs {
        rebuild_tab(ws, tab, None)?;
    }
    ws.active = match doc.active_tab {
        Some(i) if i < ws.tabs.len() => Some(i),
        _ if ws.tabs.is_empty() => None,
        _ => Some(0),
    };
    info!(tabs = ws.tabs.len(), "session restored");
    Ok(())
}

pub(crate) fn snapshot(ws: &Workspace) -> SessionDoc {
    SessionDoc {
        version: SESSION_VERSION,
        saved_at: Utc::now(),
        active_tab: ws.active,
        tabs: ws.tabs.iter().map(snapshot_tab).collect(),
    }
}

pub(crate) fn snapshot_tab(tab: &Tab) -> TabDoc {
    let leaves = tab.tree.leaves();
    let focused = leaves.iter().position(|p| *p == tab.focused).unwrap_or(0);
    let root = tab
        .tree
        .root()
        .map(|r| snapshot_node(tab, r))
        .unwrap_or_else(|| NodeDoc::Leaf {
            dialect: Dialect::PowerShell,
            cwd: std::env::temp_dir(),
            history: Vec::new(),
        });
    TabDoc { name: tab.name.clone(), focused, root }
}

fn snapshot_node(tab: &Tab, node: NodeId) -> NodeDoc {
    match tab.tree.get(node) {
        Some(Node::Split { orientation, ratio, first, second }) => NodeDoc::Split {
            orientation: *orientation,
            ratio: *ratio,
            first: Box::new(snapshot_node(tab, *first)),
            second: Box::new(snapshot_node(tab, *second)),
        },
        Some(Node::Leaf { pane }) => {
            let (dialect, cwd, history) = match tab.panes.get(pane) {
                Some(p) => (p.dialect(), p.cwd().to_path_buf(), p.history().to_vec()),
                None => (Dialect::PowerShell, std::env::temp_dir(), Vec::new()),
            };
            NodeDoc::Leaf { dialect, cwd, history }
        }
        None => NodeDoc::Leaf {
            dialect: Dialect::PowerShell,
            cwd: std::env::temp_dir(),
            history: Vec::new(),
        },
    }
}

/// Build one tab from its document and append it to `ws` as the active
/// tab. Returns the new tab's id.
pub(crate) fn rebuild_tab(
    ws: &mut Workspace,
    doc: &TabDoc,
    name_override: Option<String>,
) -> Result<TabId> {
    let mut nodes = HashMap::new();
    let mut parents = HashMap::new();
    let mut panes = HashMap::new();
    let root = build_node(ws, &doc.root, &mut nodes, &mut parents, &mut panes);
    let tree = PaneTree::from_parts(nodes, parents, root);

    let leaves = tree.leaves();
    let focused = leaves
        .get(doc.focused)
        .copied()
        .or_else(|| tree.first_leaf())
        .ok_or_else(|| Error::Restore("tab document has no panes".to_string()))?;

    let tab_id = ws.ids.tab();
    let name = name_override.unwrap_or_else(|| doc.name.clone());
    ws.tabs.push(Tab { id: tab_id, name, tree, panes, focused });
    ws.active = Some(ws.tabs.len() - 1);
    Ok(tab_id)
}

fn build_node(
    ws: &mut Workspace,
    doc: &NodeDoc,
    nodes: &mut HashMap<NodeId, Node>,
    parents: &mut HashMap<NodeId, NodeId>,
    panes: &mut HashMap<PaneId, Pane>,
) -> NodeId {
    let id = ws.ids.node();
    match doc {
        NodeDoc::Leaf { dialect, cwd, history } => {
            let pane_id = ws.ids.pane();
            ws.hub.register(pane_id);
            let mut pane = match Pane::new(pane_id, *dialect, cwd, &ws.config) {
                Ok(pane) => pane,
                Err(e) => {
                    warn!(pane = %pane_id, error = %e, "pane restore failed, degrading");
                    ws.hub
                        .notice(pane_id, format!("[pane could not be restored: {e}]"));
                    let mut dead =
                        Pane::with_shell(pane_id, ShellProcess::placeholder(*dialect), cwd);
                    // The placeholder is born dead; its exit is not news.
                    dead.exit_notified = true;
                    dead
                }
            };
            pane.seed_history(history.clone());
            panes.insert(pane_id, pane);
            nodes.insert(id, Node::Leaf { pane: pane_id });
        }
        NodeDoc::Split { orientation, ratio, first, second } => {
            let ratio = if *ratio > 0.0 && *ratio < 1.0 {
                *ratio
            } else {
                warn!(ratio = *ratio as f64, "persisted ratio out of (0, 1), using 0.5");
                0.5
            };
            let f = build_node(ws, first, nodes, parents, panes);
            let s = build_node(ws, second, nodes, parents, panes);
            parents.insert(f, id);
            parents.insert(s, id);
            nodes.insert(
                id,
                Node::Split { orientation: *orientation, ratio, first: f, second: s },
            );
        }
    }
    id
}
