//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when an atom is read, the
//! read is recorded into the innermost collecting frame.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames, one stack per call stack rather
//! than per Origin. Evaluating a computed atom or an effect rule pushes a
//! collecting frame; running a reaction or effect handler pushes a
//! non-collecting frame so reads made by side effects never leak into an
//! enclosing computation.
//!
//! Every frame also remembers which node it resolves. Finding that node
//! already on the stack is how re-entrant cycles are detected.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// A recorded read: origin key plus atom name.
pub type Read = (u64, String);

#[derive(Debug, Clone)]
struct ContextEntry {
    origin: u64,
    node: Option<NodeId>,
    collecting: bool,
    reads: SmallVec<[Read; 8]>,
}

/// Guard that pops its frame when dropped.
///
/// This keeps the stack balanced on early returns and panics alike.
pub struct ReactiveContext {
    origin: u64,
    node: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a collecting frame for `node` on the origin keyed `origin`.
    pub fn enter(origin: u64, node: NodeId) -> Self {
        Self::push(origin, Some(node), true)
    }

    /// Enter a frame that records nothing.
    ///
    /// With a `node`, the frame still marks that node as in progress.
    pub fn enter_untracked(origin: u64, node: Option<NodeId>) -> Self {
        Self::push(origin, node, false)
    }

    fn push(origin: u64, node: Option<NodeId>, collecting: bool) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                origin,
                node,
                collecting,
                reads: SmallVec::new(),
            });
        });
        Self { origin, node }
    }

    /// Whether reads are currently being collected.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().last().is_some_and(|entry| entry.collecting))
    }

    /// Whether `node` of `origin` is already resolving somewhere up the stack.
    pub fn is_resolving(origin: u64, node: NodeId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|entry| entry.origin == origin && entry.node == Some(node))
        })
    }

    /// Record a read into the innermost frame, if it collects.
    pub fn track_read(origin: u64, name: &str) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.collecting
                    && !entry.reads.iter().any(|(o, n)| *o == origin && n == name)
                {
                    entry.reads.push((origin, name.to_string()));
                }
            }
        });
    }

    /// Take the reads collected so far by this frame.
    pub fn take_reads(&self) -> SmallVec<[Read; 8]> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.reads))
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(entry) = popped {
                debug_assert!(
                    entry.origin == self.origin && entry.node == self.node,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    (self.origin, self.node),
                    (entry.origin, entry.node)
                );
            }
        });
    }
}

/// Run `f` without recording any reads it makes.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::enter_untracked(0, None);
    f()
}
