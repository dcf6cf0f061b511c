//! History Tracker
//!
//! Undo/redo over committed snapshots of one Origin.
//!
//! # State Machine
//!
//! The state is a cursor over the committed history `0..N`.
//!
//! - `commit` captures the Origin, discards every entry after the cursor
//!   (a new commit invalidates redo history), appends, and moves the cursor
//!   to the new tail.
//! - `undo` / `redo` move the cursor by one and restore the snapshot there.
//! - `jump_to` moves the cursor directly.
//!
//! `can_undo` is false at cursor 0; `can_redo` is false at the tail. When the
//! Origin's settings bound the history, the oldest entries are evicted
//! first.
//!
//! Like its snapshots, a tracker holds its Origin weakly. Once the Origin is
//! gone, moves return `None` and `commit` fails with `UnknownRef`.

use std::sync::Weak;

use tracing::debug;

use super::snapshot::Snapshot;
use crate::error::{PropagationReport, ReactiveError, Result};
use crate::reactive::{Origin, OriginInner};

#[derive(Debug)]
pub struct Tracker {
    origin: Weak<OriginInner>,
    ref_id: String,
    names: Vec<String>,
    history: Vec<Snapshot>,
    cursor: usize,
    capacity: Option<usize>,
}

impl Tracker {
    /// Track every atom of `origin`.
    pub fn new(origin: &Origin) -> Self {
        Self::with_names(origin, &[])
    }

    /// Track only `names` (every atom when empty).
    pub fn with_names(origin: &Origin, names: &[&str]) -> Self {
        Self {
            origin: origin.downgrade(),
            ref_id: origin.ref_id().to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
            history: Vec::new(),
            cursor: 0,
            capacity: origin.settings().history_capacity,
        }
    }

    /// The tracked Origin, if it is still alive and not disposed.
    pub fn origin(&self) -> Option<Origin> {
        self.origin
            .upgrade()
            .map(Origin::from_inner)
            .filter(|origin| !origin.is_disposed())
    }

    pub fn ref_id(&self) -> &str {
        &self.ref_id
    }

    /// Capture the current state and make it the new tail.
    ///
    /// Returns the index of the new entry.
    pub fn commit(&mut self) -> Result<usize> {
        let origin = self
            .origin()
            .ok_or_else(|| ReactiveError::UnknownRef(self.ref_id.clone()))?;
        let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        let snapshot = Snapshot::of(&origin, &names)?;

        if !self.history.is_empty() {
            self.history.truncate(self.cursor + 1);
        }
        self.history.push(snapshot);

        if let Some(capacity) = self.capacity {
            let capacity = capacity.max(1);
            if self.history.len() > capacity {
                let excess = self.history.len() - capacity;
                self.history.drain(..excess);
            }
        }
        self.cursor = self.history.len() - 1;
        debug!(origin = %self.ref_id, cursor = self.cursor, "history committed");
        Ok(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.history.len()
    }

    /// Step back one entry and restore it.
    ///
    /// Returns the restore report, or `None` when there is nothing to undo
    /// or the Origin is gone. The cursor only moves when a restore runs.
    pub fn undo(&mut self) -> Result<Option<PropagationReport>> {
        if !self.can_undo() {
            return Ok(None);
        }
        self.move_to(self.cursor - 1)
    }

    pub fn redo(&mut self) -> Result<Option<PropagationReport>> {
        if !self.can_redo() {
            return Ok(None);
        }
        self.move_to(self.cursor + 1)
    }

    pub fn jump_to(&mut self, index: usize) -> Result<Option<PropagationReport>> {
        if index >= self.history.len() {
            return Err(ReactiveError::HistoryIndex {
                index,
                len: self.history.len(),
            });
        }
        self.move_to(index)
    }

    fn move_to(&mut self, index: usize) -> Result<Option<PropagationReport>> {
        let restored = self.history[index].restore()?;
        if restored.is_some() {
            self.cursor = index;
        }
        Ok(restored)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.history.get(self.cursor)
    }

    pub fn history(&self) -> &[Snapshot] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.cursor = 0;
    }
}
