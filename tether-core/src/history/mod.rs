//! Snapshot & History
//!
//! Point-in-time capture of Origin state, diffing, and an undo/redo
//! tracker. Both sit beside the propagation core: restoring goes through
//! the ordinary write path inside a batch, so computed atoms, reactions and
//! listeners see a restore like any other change.

mod snapshot;
mod tracker;

pub use snapshot::{capture, snapshot, Change, Snapshot};
pub use tracker::Tracker;
