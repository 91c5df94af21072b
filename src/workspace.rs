//! Tabs and the workspace aggregate.
//!
//! The workspace is the root object the front end talks to: an ordered
//! list of tabs, each owning a pane tree and its panes. Every
//! structural mutation goes through a `&mut Workspace` method, so
//! concurrent structural changes are serialized by construction and the
//! tree invariants hold between calls.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::{Builtin, Dispatch, Dispatcher, Handled};
use crate::elevation::{ElevationBroker, Elevator, PlatformElevator, Scope};
use crate::error::{Error, Result};
use crate::hub::IoHub;
use crate::pane::Pane;
use crate::store;
use crate::tree::{PaneTree, RemoveOutcome};
use crate::types::{Chunk, Dialect, IdGen, NodeId, Orientation, PaneId, TabId};

const MAX_SCRIPT_DEPTH: usize = 8;

pub struct Tab {
    pub(crate) id: TabId,
    pub(crate) name: String,
    pub(crate) tree: PaneTree,
    pub(crate) panes: HashMap<PaneId, Pane>,
    pub(crate) focused: PaneId,
}

impl Tab {
    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn focused(&self) -> PaneId {
        self.focused
    }

    pub fn tree(&self) -> &PaneTree {
        &self.tree
    }

    /// Pane ids in the tree's depth-first order.
    pub fn pane_ids(&self) -> Vec<PaneId> {
        self.tree.leaves()
    }

    pub fn pane(&self, id: PaneId) -> Option<&Pane> {
        self.panes.get(&id)
    }
}

pub struct Workspace {
    pub(crate) tabs: Vec<Tab>,
    pub(crate) active: Option<usize>,
    pub(crate) hub: IoHub,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) config: Config,
    pub(crate) elevator: Arc<dyn Elevator>,
    pub(crate) ids: IdGen,
    script_depth: usize,
}

impl Workspace {
    /// An empty workspace wired to the platform consent mechanism.
    pub fn new(config: Config) -> Workspace {
        Self::with_elevator(config, Arc::new(PlatformElevator))
    }

    pub fn with_elevator(mut config: Config, elevator: Arc<dyn Elevator>) -> Workspace {
        config.clamp();
        let dispatcher = Dispatcher::new(config.aliases.clone());
        let hub = IoHub::new(&config);
        Workspace {
            tabs: Vec::new(),
            active: None,
            hub,
            dispatcher,
            config,
            elevator,
            ids: IdGen::new(),
            script_depth: 0,
        }
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    /// The active tab, or `None` in the empty terminal state.
    pub fn active_tab(&self) -> Option<&Tab> {
        self.active.and_then(|i| self.tabs.get(i))
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    // ---- tab management -------------------------------------------------

    /// Open a tab holding one pane of the configured default dialect.
    /// The new tab becomes active.
    pub fn create_tab(&mut self, name: Option<String>) -> Result<TabId> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir());
        self.create_tab_with(name, self.config.default_dialect, &cwd)
    }

    pub fn create_tab_with(
        &mut self,
        name: Option<String>,
        dialect: Dialect,
        cwd: &Path,
    ) -> Result<TabId> {
        let tab_id = self.ids.tab();
        let pane_id = self.ids.pane();
        let pane = Pane::new(pane_id, dialect, cwd, &self.config)?;
        let tree = PaneTree::new(pane_id, &mut self.ids);
        let mut panes = HashMap::new();
        panes.insert(pane_id, pane);
        self.hub.register(pane_id);

        let name = name.unwrap_or_else(|| format!("Tab {}", tab_id.0));
        info!(tab = %tab_id, pane = %pane_id, %dialect, "tab created");
        self.tabs.push(Tab { id: tab_id, name, tree, panes, focused: pane_id });
        self.active = Some(self.tabs.len() - 1);
        Ok(tab_id)
    }

    pub fn rename_tab(&mut self, tab: TabId, name: impl Into<String>) -> Result<()> {
        let tab = self.tab_mut(tab)?;
        tab.name = name.into();
        Ok(())
    }

    /// Clone a tab: same split shape, a fresh shell per pane with the
    /// original's dialect, directory and history. The copy becomes the
    /// active tab.
    pub fn duplicate_tab(&mut self, tab: TabId) -> Result<TabId> {
        let idx = self.tab_index(tab)?;
        let doc = store::snapshot_tab(&self.tabs[idx]);
        let name = format!("{} (copy)", self.tabs[idx].name);
        let new_tab = store::rebuild_tab(self, &doc, Some(name))?;
        info!(source = %tab, copy = %new_tab, "tab duplicated");
        Ok(new_tab)
    }

    pub fn close_tab(&mut self, tab: TabId) -> Result<()> {
        let idx = self.tab_index(tab)?;
        let mut closed = self.tabs.remove(idx);
        for (id, pane) in closed.panes.iter_mut() {
            pane.terminate();
            self.hub.unregister(*id);
        }
        self.active = match self.active {
            _ if self.tabs.is_empty() => None,
            Some(a) if a > idx => Some(a - 1),
            Some(a) if a >= self.tabs.len() => Some(self.tabs.len() - 1),
            other => other,
        };
        info!(%tab, "tab closed");
        Ok(())
    }

    // ---- pane management ------------------------------------------------

    /// Split the leaf holding `pane`. The existing pane keeps its
    /// process; the new pane inherits its dialect and directory and
    /// takes focus. Returns `(existing, new)`.
    pub fn split_pane(
        &mut self,
        pane: PaneId,
        orientation: Orientation,
        ratio: Option<f32>,
    ) -> Result<(PaneId, PaneId)> {
        let ratio = ratio.unwrap_or(self.config.default_split_ratio);
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(Error::InvalidRatio(ratio));
        }
        let idx = self.tab_index_of_pane(pane)?;
        let (dialect, cwd) = {
            let src = self.tabs[idx].panes.get(&pane).ok_or(Error::PaneNotFound(pane))?;
            (src.dialect(), src.cwd().to_path_buf())
        };
        let new_id = self.ids.pane();
        let new_pane = Pane::new(new_id, dialect, &cwd, &self.config)?;
        self.tabs[idx].tree.split(pane, new_id, orientation, ratio, &mut self.ids)?;
        self.tabs[idx].panes.insert(new_id, new_pane);
        self.tabs[idx].focused = new_id;
        self.hub.register(new_id);
        info!(existing = %pane, new = %new_id, ?orientation, ratio = ratio as f64, "pane split");
        Ok((pane, new_id))
    }

    /// Close a pane, terminating its shell. Collapses the parent split;
    /// closing a tab's last pane closes the tab, and closing the last
    /// tab leaves the workspace empty.
    pub fn close_pane(&mut self, pane: PaneId) -> Result<()> {
        let idx = self.tab_index_of_pane(pane)?;
        if let Some(mut closed) = self.tabs[idx].panes.remove(&pane) {
            closed.terminate();
        }
        self.hub.unregister(pane);
        match self.tabs[idx].tree.remove(pane)? {
            RemoveOutcome::LastLeaf => {
                let tab = self.tabs[idx].id;
                info!(%pane, %tab, "last pane closed, closing tab");
                self.close_tab(tab)
            }
            RemoveOutcome::Collapsed { survivor } => {
                if self.tabs[idx].focused == pane {
                    self.tabs[idx].focused = survivor;
                }
                info!(%pane, %survivor, "pane closed, split collapsed");
                Ok(())
            }
        }
    }

    /// Focus a pane; the tab holding it becomes active.
    pub fn focus_pane(&mut self, pane: PaneId) -> Result<()> {
        let idx = self.tab_index_of_pane(pane)?;
        self.tabs[idx].focused = pane;
        self.active = Some(idx);
        Ok(())
    }

    pub fn resize_split(&mut self, split: NodeId, ratio: f32) -> Result<()> {
        for tab in self.tabs.iter_mut() {
            if tab.tree.get(split).is_some() {
                return tab.tree.resize(split, ratio);
            }
        }
        Err(Error::SplitNotFound(split))
    }

    pub fn pane(&self, pane: PaneId) -> Option<&Pane> {
        self.tabs.iter().find_map(|t| t.panes.get(&pane))
    }

    /// Propagate the renderer's cell geometry to a pane's PTY.
    pub fn resize_pane(&mut self, pane: PaneId, rows: u16, cols: u16) -> Result<()> {
        self.pane_mut(pane)?.resize(rows, cols)
    }

    // ---- input / output -------------------------------------------------

    /// Route one line of input to `pane` through the dispatcher.
    pub fn send_input(&mut self, pane: PaneId, line: &str) -> Result<()> {
        self.tab_index_of_pane(pane)?;
        match self.dispatcher.dispatch(line) {
            Dispatch::Forwarded(text) => {
                if text.is_empty() {
                    return Ok(());
                }
                self.pane_mut(pane)?.send_line(&text)
            }
            Dispatch::Handled(Handled::Text(text)) => {
                self.pane_mut(pane)?.record_line(line);
                self.hub.notice(pane, text);
                Ok(())
            }
            Dispatch::Handled(Handled::Error(msg)) => {
                self.hub.notice(pane, format!("cmdmux: {msg}"));
                Ok(())
            }
            Dispatch::Handled(Handled::Builtin(builtin)) => {
                self.pane_mut(pane)?.record_line(line);
                self.apply_builtin(pane, builtin)
            }
        }
    }

    /// Raw byte passthrough to a pane's shell, bypassing dispatch.
    pub fn send_bytes(&mut self, pane: PaneId, bytes: &[u8]) -> Result<()> {
        self.pane_mut(pane)?.write(bytes)
    }

    /// One scheduling tick: drain every live shell into the hub and
    /// report exits. Never blocks on any pane.
    pub fn pump(&mut self) {
        for tab in self.tabs.iter_mut() {
            for (id, pane) in tab.panes.iter_mut() {
                for data in pane.read_available() {
                    self.hub.ingest(*id, data);
                }
                if let crate::types::Liveness::Exited(code) = pane.liveness() {
                    if !pane.exit_notified {
                        pane.exit_notified = true;
                        self.hub.notice(*id, format!("[shell exited with code {code}]"));
                    }
                }
            }
        }
    }

    /// Chunks queued for `pane` since the last poll.
    pub fn poll_output(&mut self, pane: PaneId) -> Vec<Chunk> {
        self.hub.poll(pane)
    }

    pub fn scrollback(&self, pane: PaneId) -> Vec<Chunk> {
        self.hub.scrollback(pane)
    }

    // ---- elevation ------------------------------------------------------

    /// Explicit, user-triggered privilege elevation for one pane.
    pub fn request_elevation(&mut self, pane: PaneId, scope: Scope) -> Result<()> {
        let idx = self.tab_index_of_pane(pane)?;
        let broker = ElevationBroker::new(self.elevator.clone());
        let config = self.config.clone();
        let target = self.tabs[idx].panes.get_mut(&pane).ok_or(Error::PaneNotFound(pane))?;
        broker.elevate(scope, target, &mut self.hub, &config)
    }

    // ---- persistence ----------------------------------------------------

    pub fn save_session(&self, path: &Path) -> Result<()> {
        store::save(self, path)
    }

    /// Replace this workspace's contents with a saved session. The
    /// current tabs are torn down first; config and consent wiring are
    /// kept.
    pub fn load_session(&mut self, path: &Path) -> Result<()> {
        let doc = store::read(path)?;
        self.shutdown();
        store::restore(self, &doc)
    }

    /// Terminate every shell and drop all tabs. Idempotent.
    pub fn shutdown(&mut self) {
        for tab in self.tabs.iter_mut() {
            for (id, pane) in tab.panes.iter_mut() {
                pane.terminate();
                self.hub.unregister(*id);
            }
        }
        self.tabs.clear();
        self.active = None;
    }

    // ---- internals ------------------------------------------------------

    fn apply_builtin(&mut self, pane: PaneId, builtin: Builtin) -> Result<()> {
        match builtin {
            Builtin::Split { orientation, ratio } => {
                match self.split_pane(pane, orientation, ratio) {
                    Ok(_) => Ok(()),
                    Err(Error::InvalidRatio(r)) => {
                        self.hub.notice(pane, format!("cmdmux: ratio {r} out of (0, 1)"));
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Builtin::ClosePane => self.close_pane(pane),
            Builtin::Focus { pane: target } => match self.focus_pane(target) {
                Ok(()) => Ok(()),
                Err(Error::PaneNotFound(p)) => {
                    self.hub.notice(pane, format!("cmdmux: no pane {p}"));
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Builtin::NewTab { name } => self.create_tab(name).map(|_| ()),
            Builtin::RenameTab { name } => {
                let tab = self.tabs[self.tab_index_of_pane(pane)?].id;
                self.rename_tab(tab, name)
            }
            Builtin::DuplicateTab => {
                let tab = self.tabs[self.tab_index_of_pane(pane)?].id;
                self.duplicate_tab(tab).map(|_| ())
            }
            Builtin::CloseTab => {
                let tab = self.tabs[self.tab_index_of_pane(pane)?].id;
                self.close_tab(tab)
            }
            Builtin::Resize { split, ratio } => match self.resize_split(split, ratio) {
                Ok(()) => Ok(()),
                Err(Error::InvalidRatio(r)) => {
                    self.hub.notice(pane, format!("cmdmux: ratio {r} out of (0, 1)"));
                    Ok(())
                }
                Err(Error::SplitNotFound(s)) => {
                    self.hub.notice(pane, format!("cmdmux: no split {s}"));
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Builtin::SaveSession { path } => {
                self.save_session(&path)?;
                self.hub.notice(pane, format!("[session saved to {}]", path.display()));
                Ok(())
            }
            Builtin::LoadSession { path } => self.load_session(&path),
            Builtin::Elevate { command } => {
                let scope = match command {
                    Some(line) => Scope::SingleCommand(line),
                    None => Scope::WholeSession,
                };
                match self.request_elevation(pane, scope) {
                    Ok(()) => Ok(()),
                    Err(Error::ElevationDenied(reason)) => {
                        self.hub.notice(pane, format!("[elevation denied: {reason}]"));
                        Err(Error::ElevationDenied(reason))
                    }
                    Err(e) => Err(e),
                }
            }
            Builtin::Cd { target } => self.change_dir(pane, target),
            Builtin::Clear => {
                self.hub.clear(pane);
                Ok(())
            }
            Builtin::Run { script } => self.run_script(pane, &script),
        }
    }

    /// The engine mirrors the directory change so new splits and saves
    /// see it, then forwards a real `cd` so the shell follows.
    fn change_dir(&mut self, pane: PaneId, target: Option<String>) -> Result<()> {
        let idx = self.tab_index_of_pane(pane)?;
        let p = self.tabs[idx].panes.get_mut(&pane).ok_or(Error::PaneNotFound(pane))?;
        let Some(target) = target else {
            let cwd = p.cwd().display().to_string();
            self.hub.notice(pane, cwd);
            return Ok(());
        };
        let candidate = if Path::new(&target).is_absolute() {
            PathBuf::from(&target)
        } else {
            p.cwd().join(&target)
        };
        let resolved = match candidate.canonicalize() {
            Ok(dir) if dir.is_dir() => dir,
            _ => {
                self.hub.notice(pane, format!("cmdmux: no such directory: {target}"));
                return Ok(());
            }
        };
        p.send_line(&format!("cd \"{}\"", resolved.display()))?;
        p.set_cwd(resolved);
        Ok(())
    }

    /// Replay an RCMD script: one command per line, `#` comments and
    /// blank lines skipped. Nested `run` is allowed up to a fixed depth.
    fn run_script(&mut self, pane: PaneId, script: &Path) -> Result<()> {
        if self.script_depth >= MAX_SCRIPT_DEPTH {
            warn!(script = %script.display(), "script nesting too deep, skipping");
            self.hub.notice(pane, format!("cmdmux: script nesting too deep: {}", script.display()));
            return Ok(());
        }
        let text = match fs::read_to_string(script) {
            Ok(text) => text,
            Err(e) => {
                self.hub
                    .notice(pane, format!("cmdmux: cannot read {}: {e}", script.display()));
                return Ok(());
            }
        };
        info!(script = %script.display(), "replaying script");
        self.script_depth += 1;
        let mut result = Ok(());
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Err(e) = self.send_input(pane, line) {
                self.hub.notice(pane, format!("cmdmux: script line failed: {e}"));
                result = Err(e);
                break;
            }
        }
        self.script_depth -= 1;
        result
    }

    fn tab_index(&self, tab: TabId) -> Result<usize> {
        self.tabs
            .iter()
            .position(|t| t.id == tab)
            .ok_or(Error::TabNotFound(tab))
    }

    fn tab_mut(&mut self, tab: TabId) -> Result<&mut Tab> {
        let idx = self.tab_index(tab)?;
        Ok(&mut self.tabs[idx])
    }

    fn tab_index_of_pane(&self, pane: PaneId) -> Result<usize> {
        self.tabs
            .iter()
            .position(|t| t.panes.contains_key(&pane))
            .ok_or(Error::PaneNotFound(pane))
    }

    fn pane_mut(&mut self, pane: PaneId) -> Result<&mut Pane> {
        self.tabs
            .iter_mut()
            .find_map(|t| t.panes.get_mut(&pane))
            .ok_or(Error::PaneNotFound(pane))
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::doubles::{DenyAll, GrantAll};
    use crate::types::Liveness;
    use std::time::{Duration, Instant};

    fn workspace() -> Workspace {
        Workspace::new(Config::default())
    }

    fn pump_until<F: FnMut(&mut Workspace) -> bool>(
        ws: &mut Workspace,
        mut cond: F,
        timeout: Duration,
    ) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            ws.pump();
            if cond(ws) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        false
    }

    fn text_of(chunks: &[Chunk]) -> String {
        chunks.iter().map(Chunk::as_text).collect()
    }

    #[test]
    fn starts_empty_and_create_tab_activates() {
        let mut ws = workspace();
        assert!(ws.is_empty());
        assert!(ws.active_tab().is_none());

        let tab = ws.create_tab(Some("T1".to_string())).unwrap();
        let active = ws.active_tab().expect("active tab");
        assert_eq!(active.id(), tab);
        assert_eq!(active.name(), "T1");
        assert_eq!(active.pane_ids().len(), 1);
        ws.shutdown();
    }

    #[test]
    fn echo_round_trip_and_collapse() {
        let mut ws = workspace();
        ws.create_tab(Some("T1".to_string())).unwrap();
        let p1 = ws.active_tab().unwrap().focused();

        let (keep, new) = ws.split_pane(p1, Orientation::Vertical, Some(0.5)).unwrap();
        assert_eq!(keep, p1);
        assert_ne!(keep, new);
        assert_eq!(ws.active_tab().unwrap().pane_ids(), vec![p1, new]);
        assert_eq!(ws.active_tab().unwrap().focused(), new);

        ws.send_input(p1, "echo hi").unwrap();
        let mut seen = String::new();
        let ok = pump_until(
            &mut ws,
            |ws| {
                seen.push_str(&text_of(&ws.poll_output(p1)));
                seen.contains("hi")
            },
            Duration::from_secs(10),
        );
        assert!(ok, "no echo observed, got: {seen}");

        ws.close_pane(new).unwrap();
        let tab = ws.active_tab().unwrap();
        assert_eq!(tab.pane_ids(), vec![p1]);
        assert_eq!(tab.focused(), p1);
        assert!(tab.tree().splits().is_empty());
        ws.shutdown();
    }

    #[test]
    fn closing_last_pane_closes_tab_and_workspace_can_empty() {
        let mut ws = workspace();
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();
        ws.close_pane(pane).unwrap();
        assert!(ws.is_empty());
        assert!(ws.active_tab().is_none());
        // Empty is a valid state; a new tab revives the workspace.
        ws.create_tab(None).unwrap();
        assert!(!ws.is_empty());
        ws.shutdown();
    }

    #[test]
    fn focus_validates_and_switches_tabs() {
        let mut ws = workspace();
        ws.create_tab(Some("A".to_string())).unwrap();
        let pa = ws.active_tab().unwrap().focused();
        ws.create_tab(Some("B".to_string())).unwrap();
        assert_eq!(ws.active_tab().unwrap().name(), "B");

        ws.focus_pane(pa).unwrap();
        assert_eq!(ws.active_tab().unwrap().name(), "A");
        assert_eq!(ws.active_tab().unwrap().focused(), pa);

        assert!(matches!(ws.focus_pane(PaneId(999)), Err(Error::PaneNotFound(_))));
        ws.shutdown();
    }

    #[test]
    fn builtin_split_and_close_through_dispatch() {
        let mut ws = workspace();
        ws.create_tab(None).unwrap();
        let p1 = ws.active_tab().unwrap().focused();

        ws.send_input(p1, "split-h 0.3").unwrap();
        assert_eq!(ws.active_tab().unwrap().pane_ids().len(), 2);
        let p2 = ws.active_tab().unwrap().focused();
        assert_ne!(p1, p2);

        // Builtins land in the issuing pane's history.
        assert_eq!(ws.pane(p1).unwrap().history(), &["split-h 0.3".to_string()]);

        ws.send_input(p2, "close-pane").unwrap();
        assert_eq!(ws.active_tab().unwrap().pane_ids(), vec![p1]);
        ws.shutdown();
    }

    #[test]
    fn malformed_builtin_reports_without_forwarding() {
        let mut ws = workspace();
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();
        ws.send_input(pane, "split-h banana").unwrap();
        let chunks = ws.poll_output(pane);
        assert!(text_of(&chunks).contains("cmdmux:"));
        // Nothing structural happened and nothing entered history.
        assert_eq!(ws.active_tab().unwrap().pane_ids().len(), 1);
        assert!(ws.pane(pane).unwrap().history().is_empty());
        ws.shutdown();
    }

    #[test]
    fn invalid_ratio_mutates_nothing() {
        let mut ws = workspace();
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();
        assert!(matches!(
            ws.split_pane(pane, Orientation::Horizontal, Some(1.2)),
            Err(Error::InvalidRatio(_))
        ));
        assert_eq!(ws.active_tab().unwrap().pane_ids().len(), 1);
        ws.shutdown();
    }

    #[test]
    fn resize_finds_split_across_tabs() {
        let mut ws = workspace();
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();
        ws.split_pane(pane, Orientation::Horizontal, None).unwrap();
        let split = ws.active_tab().unwrap().tree().splits()[0];

        ws.resize_split(split, 0.8).unwrap();
        assert!(matches!(ws.resize_split(split, 0.0), Err(Error::InvalidRatio(_))));
        assert!(matches!(ws.resize_split(NodeId(999), 0.5), Err(Error::SplitNotFound(_))));
        ws.shutdown();
    }

    #[test]
    fn write_after_exit_is_channel_closed_not_a_crash() {
        let mut ws = workspace();
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();
        ws.send_input(pane, "exit").unwrap();
        let exited = pump_until(
            &mut ws,
            |ws| ws.pane(pane).map(|p| p.liveness().is_exited()).unwrap_or(false),
            Duration::from_secs(10),
        );
        assert!(exited, "shell did not exit");
        match ws.send_input(pane, "echo too-late") {
            Err(Error::ChannelClosed) => {}
            other => panic!("expected ChannelClosed, got {other:?}"),
        }
        // Exit is reported exactly once in the stream.
        ws.pump();
        let all = text_of(&ws.poll_output(pane));
        assert_eq!(all.matches("[shell exited").count(), 1);
        ws.shutdown();
    }

    #[test]
    fn denied_elevation_keeps_pane_usable() {
        let mut ws = Workspace::with_elevator(Config::default(), Arc::new(DenyAll));
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();

        let err = ws.request_elevation(pane, Scope::WholeSession).unwrap_err();
        assert!(matches!(err, Error::ElevationDenied(_)));
        let p = ws.pane(pane).unwrap();
        assert_eq!(p.elevation(), crate::types::Elevation::Normal);
        assert!(!matches!(p.liveness(), Liveness::Exited(_)));
        ws.send_input(pane, "echo still-works").unwrap();
        ws.shutdown();
    }

    #[test]
    fn whole_session_elevation_keeps_id_and_scrollback() {
        let mut ws = Workspace::with_elevator(Config::default(), Arc::new(GrantAll));
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();
        ws.send_input(pane, "echo before-swap").unwrap();
        pump_until(
            &mut ws,
            |ws| text_of(&ws.scrollback(pane)).contains("before-swap"),
            Duration::from_secs(10),
        );

        ws.request_elevation(pane, Scope::WholeSession).unwrap();
        let p = ws.pane(pane).unwrap();
        assert_eq!(p.id(), pane);
        assert_eq!(p.elevation(), crate::types::Elevation::Elevated);
        // Scrollback from before the swap is still there.
        assert!(text_of(&ws.scrollback(pane)).contains("before-swap"));
        // The replacement shell accepts input.
        ws.send_input(pane, "echo after-swap").unwrap();
        ws.shutdown();
    }

    #[test]
    fn elevate_builtin_routes_single_command_output() {
        let mut ws = Workspace::with_elevator(Config::default(), Arc::new(GrantAll));
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();
        ws.send_input(pane, "elevate net start spooler").unwrap();
        let out = text_of(&ws.poll_output(pane));
        assert!(out.contains("elevated: net start spooler"));
        assert!(out.contains("exit code 0"));
        ws.shutdown();
    }

    #[test]
    fn rename_and_duplicate_tab() {
        let mut ws = workspace();
        let tab = ws.create_tab(Some("work".to_string())).unwrap();
        let pane = ws.active_tab().unwrap().focused();
        ws.send_input(pane, "rename-tab logs").unwrap();
        assert_eq!(ws.active_tab().unwrap().name(), "logs");

        ws.send_input(pane, "split-v").unwrap();
        let copy = ws.duplicate_tab(tab).unwrap();
        assert_ne!(copy, tab);
        let copy_tab = ws.active_tab().unwrap();
        assert_eq!(copy_tab.id(), copy);
        assert_eq!(copy_tab.name(), "logs (copy)");
        // Same shape, fresh pane ids.
        assert_eq!(copy_tab.pane_ids().len(), 2);
        assert_eq!(copy_tab.tree().splits().len(), 1);
        ws.shutdown();
    }

    #[test]
    fn rcmd_script_replays_and_records_history() {
        let mut ws = workspace();
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();

        let dir = std::env::temp_dir().join(format!("cmdmux-script-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let script = dir.join("setup.rcmd");
        fs::write(&script, "# layout\nsplit-h 0.4\nrename-tab scripted\n").unwrap();

        ws.send_input(pane, &format!("run {}", script.display())).unwrap();
        assert_eq!(ws.active_tab().unwrap().pane_ids().len(), 2);
        assert_eq!(ws.active_tab().unwrap().name(), "scripted");
        let history = ws.pane(pane).unwrap().history();
        assert!(history.iter().any(|l| l.starts_with("run ")));
        assert!(history.contains(&"split-h 0.4".to_string()));

        ws.shutdown();
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_script_is_reported_in_stream() {
        let mut ws = workspace();
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();
        ws.send_input(pane, "run /no/such/file.rcmd").unwrap();
        assert!(text_of(&ws.poll_output(pane)).contains("cannot read"));
        ws.shutdown();
    }

    #[test]
    fn cd_tracks_directory_for_new_splits() {
        let mut ws = workspace();
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();

        let dir = std::env::temp_dir().join(format!("cmdmux-cd-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        ws.send_input(pane, &format!("cd \"{}\"", dir.display())).unwrap();
        let tracked = ws.pane(pane).unwrap().cwd().to_path_buf();
        assert_eq!(tracked, dir.canonicalize().unwrap());

        // A split inherits the tracked directory.
        let (_, new) = ws.split_pane(pane, Orientation::Horizontal, None).unwrap();
        assert_eq!(ws.pane(new).unwrap().cwd(), tracked.as_path());

        ws.send_input(pane, "cd /definitely/not/here").unwrap();
        assert_eq!(ws.pane(pane).unwrap().cwd(), tracked.as_path());
        assert!(text_of(&ws.poll_output(pane)).contains("no such directory"));

        ws.shutdown();
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_builtin_empties_scrollback() {
        let mut ws = workspace();
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();
        ws.send_input(pane, "echo noise").unwrap();
        pump_until(
            &mut ws,
            |ws| !ws.scrollback(pane).is_empty(),
            Duration::from_secs(10),
        );
        ws.send_input(pane, "clear").unwrap();
        assert!(ws.scrollback(pane).is_empty());
        assert!(ws.poll_output(pane).is_empty());
        ws.shutdown();
    }

    #[test]
    fn config_aliases_seed_the_dispatcher() {
        let mut cfg = Config::default();
        cfg.aliases.insert("hsplit".to_string(), "split-h".to_string());
        let mut ws = Workspace::new(cfg);
        ws.create_tab(None).unwrap();
        let pane = ws.active_tab().unwrap().focused();
        ws.send_input(pane, "hsplit").unwrap();
        assert_eq!(ws.active_tab().unwrap().pane_ids().len(), 2);
        ws.shutdown();
    }

    #[test]
    fn pane_ids_are_never_reused() {
        let mut ws = workspace();
        ws.create_tab(None).unwrap();
        let p1 = ws.active_tab().unwrap().focused();
        let (_, p2) = ws.split_pane(p1, Orientation::Horizontal, None).unwrap();
        ws.close_pane(p2).unwrap();
        let (_, p3) = ws.split_pane(p1, Orientation::Horizontal, None).unwrap();
        assert_ne!(p2, p3);
        ws.shutdown();
    }
}
