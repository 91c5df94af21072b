//! Output routing between shell processes and the consumer.
//!
//! The hub keeps two buffers per pane: a scrollback ring capped in
//! chunks (oldest evicted silently) and a consumer queue capped in
//! chunks. A consumer that falls behind loses oldest chunks, never
//! newest, and finds a single coalesced [`Chunk::Truncated`] marker at
//! the drop point. Output of one pane never blocks another.

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::config::Config;
use crate::types::{Chunk, PaneId};

pub struct IoHub {
    scrollback_cap: usize,
    queue_cap: usize,
    panes: HashMap<PaneId, PaneBuffers>,
}

struct PaneBuffers {
    scrollback: VecDeque<Chunk>,
    queue: VecDeque<Chunk>,
}

impl IoHub {
    pub fn new(config: &Config) -> IoHub {
        IoHub {
            scrollback_cap: config.scrollback_chunks,
            // Room for at least one data chunk behind a marker.
            queue_cap: config.output_queue_capacity.max(2),
            panes: HashMap::new(),
        }
    }

    pub fn register(&mut self, pane: PaneId) {
        self.panes
            .entry(pane)
            .or_insert_with(|| PaneBuffers { scrollback: VecDeque::new(), queue: VecDeque::new() });
    }

    pub fn unregister(&mut self, pane: PaneId) {
        self.panes.remove(&pane);
    }

    /// Append raw shell output for `pane`. Unknown panes are ignored,
    /// covering output that races pane removal.
    pub fn ingest(&mut self, pane: PaneId, data: Vec<u8>) {
        self.push(pane, Chunk::Data(data));
    }

    /// Inject an engine-generated notice into the pane's stream, in
    /// order with surrounding output.
    pub fn notice(&mut self, pane: PaneId, text: impl Into<String>) {
        self.push(pane, Chunk::Notice(text.into()));
    }

    fn push(&mut self, pane: PaneId, chunk: Chunk) {
        let Some(buf) = self.panes.get_mut(&pane) else {
            trace!(%pane, "dropping chunk for unregistered pane");
            return;
        };
        buf.scrollback.push_back(chunk.clone());
        while buf.scrollback.len() > self.scrollback_cap {
            buf.scrollback.pop_front();
        }

        if buf.queue.len() >= self.queue_cap {
            // Make room for the marker and the new chunk, dropping
            // oldest first. A marker already at the front coalesces.
            while buf.queue.len() > self.queue_cap.saturating_sub(2) {
                buf.queue.pop_front();
            }
            if buf.queue.front() != Some(&Chunk::Truncated) {
                buf.queue.push_front(Chunk::Truncated);
            }
        }
        buf.queue.push_back(chunk);
    }

    /// Drain everything queued for `pane` since the last poll.
    pub fn poll(&mut self, pane: PaneId) -> Vec<Chunk> {
        match self.panes.get_mut(&pane) {
            Some(buf) => buf.queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Drop everything buffered for `pane`, scrollback included. Backs
    /// the `clear` builtin.
    pub fn clear(&mut self, pane: PaneId) {
        if let Some(buf) = self.panes.get_mut(&pane) {
            buf.scrollback.clear();
            buf.queue.clear();
        }
    }

    /// The retained scrollback for `pane`, oldest first.
    pub fn scrollback(&self, pane: PaneId) -> Vec<Chunk> {
        match self.panes.get(&pane) {
            Some(buf) => buf.scrollback.iter().cloned().collect(),
            None => Vec::new(),
        }
    }
}
