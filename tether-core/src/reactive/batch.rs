//! Batch Transactions
//!
//! A batch defers subscriber invocation and change notification until the
//! outermost batch on the current thread closes. Writes inside it still
//! store their values and dirty computed atoms immediately.
//!
//! # How It Works
//!
//! 1. [`Batch::begin`] bumps a thread-local depth counter.
//!
//! 2. While the depth is non-zero, every Origin written to records itself
//!    as touched instead of flushing.
//!
//! 3. When the outermost guard finishes (or is dropped on any exit path,
//!    including `?` and panics) each touched Origin is flushed once: every
//!    queued subscriber resolves at most once, then its listeners get one
//!    [`ChangeSet`](super::ChangeSet).
//!
//! [`Batch::finish`] returns the flush report. A guard closed by `Drop`
//! cannot, so its failures are kept on the thread until
//! [`Batch::take_dropped`] collects them.

use std::cell::RefCell;
use std::marker::PhantomData;

use tracing::{debug, warn};

use super::origin::Origin;
use crate::error::PropagationReport;

#[derive(Default)]
struct BatchState {
    depth: usize,
    touched: Vec<Origin>,
    dropped: PropagationReport,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Scoped batch guard.
///
/// Not `Send`: the batch belongs to the thread that opened it.
#[must_use = "dropping the guard immediately closes the batch"]
pub struct Batch {
    finished: bool,
    _not_send: PhantomData<*const ()>,
}

impl Batch {
    /// Open a (possibly nested) batch.
    pub fn begin() -> Self {
        let depth = BATCH.with(|b| {
            let mut state = b.borrow_mut();
            state.depth += 1;
            state.depth
        });
        debug!(depth, "batch opened");
        Self {
            finished: false,
            _not_send: PhantomData,
        }
    }

    /// Whether a batch is open on this thread.
    pub fn is_open() -> bool {
        Self::depth() > 0
    }

    pub fn depth() -> usize {
        BATCH.with(|b| b.borrow().depth)
    }

    /// Close this batch.
    ///
    /// Closing the outermost batch flushes every touched Origin and returns
    /// the combined report; nested batches return an empty one.
    pub fn finish(mut self) -> PropagationReport {
        self.finished = true;
        close()
    }

    /// Failures from batches on this thread that closed through `Drop`
    /// instead of [`finish`](Self::finish), since the last call.
    pub fn take_dropped() -> PropagationReport {
        BATCH.with(|b| std::mem::take(&mut b.borrow_mut().dropped))
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let report = close();
        if !report.is_ok() {
            warn!(
                failures = report.failures().len(),
                "batch closed without finish, failures kept for Batch::take_dropped"
            );
            BATCH.with(|b| b.borrow_mut().dropped.merge(report));
        }
    }
}

fn close() -> PropagationReport {
    let touched = BATCH.with(|b| {
        let mut state = b.borrow_mut();
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            Some(std::mem::take(&mut state.touched))
        } else {
            None
        }
    });

    let mut report = PropagationReport::new();
    if let Some(origins) = touched {
        debug!(origins = origins.len(), "batch flushing");
        for origin in origins {
            report.merge(origin.flush());
        }
    }
    report
}

/// Record `origin` as written during the open batch.
pub(crate) fn touch(origin: &Origin) {
    BATCH.with(|b| {
        let mut state = b.borrow_mut();
        if !state.touched.iter().any(|o| o.ptr_eq(origin)) {
            state.touched.push(origin.clone());
        }
    });
}

/// Run `f` inside a batch and return its output with the flush report.
pub fn batch<T>(f: impl FnOnce() -> T) -> (T, PropagationReport) {
    let guard = Batch::begin();
    let output = f();
    (output, guard.finish())
}
