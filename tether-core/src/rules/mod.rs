//! Rule Predicate DSL
//!
//! Composable boolean expression trees over dotted attribute paths. Rules
//! gate effects: an effect re-evaluates its rule whenever an atom the rule
//! read changes, and fires when the result becomes true.
//!
//! The DSL has no dependency on the rest of the engine. It reads through the
//! [`PathSource`] trait, which both plain [`Value`](crate::value::Value)
//! trees and [`Origin`](crate::reactive::Origin)s implement.

mod builders;
mod node;
mod var;

pub use builders::{If, Is};
pub use node::{BinaryOp, Check, Comparator, Evaluation, Logical, Operand, Pattern, Rule};
pub use var::{resolve_path, PathSource, To, Var};
