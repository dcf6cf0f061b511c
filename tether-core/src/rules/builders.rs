//! Declarative rule constructors.
//!
//! ```rust,ignore
//! use tether_core::rules::{If, Is, To, Var};
//!
//! let can_vote = If::all([
//!     If::at_least("age", 18),
//!     Is::not_empty(Var::new("name").then(To::Strip)),
//! ]);
//! ```
//!
//! Left operands name a path (`&str` converts into a [`Var`]); right
//! operands are literals unless they are an explicit `Var`.

use super::node::{BinaryOp, Check, Comparator, Logical, Operand, Pattern, Rule};
use super::var::Var;
use crate::value::ValueKind;

/// Relational, structural and logical rules.
pub struct If;

impl If {
    fn binary(op: BinaryOp, left: impl Into<Var>, right: impl Into<Operand>) -> Rule {
        Rule::Comparator(Comparator::Binary {
            op,
            left: Operand::Var(left.into()),
            right: right.into(),
        })
    }

    pub fn equals(left: impl Into<Var>, right: impl Into<Operand>) -> Rule {
        Self::binary(BinaryOp::Equals, left, right)
    }

    pub fn not_equal(left: impl Into<Var>, right: impl Into<Operand>) -> Rule {
        Self::binary(BinaryOp::NotEqual, left, right)
    }

    pub fn greater(left: impl Into<Var>, right: impl Into<Operand>) -> Rule {
        Self::binary(BinaryOp::Greater, left, right)
    }

    pub fn greater_or_equal(left: impl Into<Var>, right: impl Into<Operand>) -> Rule {
        Self::binary(BinaryOp::GreaterOrEqual, left, right)
    }

    pub fn less(left: impl Into<Var>, right: impl Into<Operand>) -> Rule {
        Self::binary(BinaryOp::Less, left, right)
    }

    pub fn less_or_equal(left: impl Into<Var>, right: impl Into<Operand>) -> Rule {
        Self::binary(BinaryOp::LessOrEqual, left, right)
    }

    /// Alias of [`If::greater_or_equal`].
    pub fn at_least(left: impl Into<Var>, right: impl Into<Operand>) -> Rule {
        Self::greater_or_equal(left, right)
    }

    /// Alias of [`If::less_or_equal`].
    pub fn at_most(left: impl Into<Var>, right: impl Into<Operand>) -> Rule {
        Self::less_or_equal(left, right)
    }

    pub fn has(left: impl Into<Var>, item: impl Into<Operand>) -> Rule {
        Self::binary(BinaryOp::Has, left, item)
    }

    pub fn has_not(left: impl Into<Var>, item: impl Into<Operand>) -> Rule {
        Self::binary(BinaryOp::HasNot, left, item)
    }

    pub fn starts_with(left: impl Into<Var>, prefix: impl Into<Operand>) -> Rule {
        Self::binary(BinaryOp::StartsWith, left, prefix)
    }

    pub fn ends_with(left: impl Into<Var>, suffix: impl Into<Operand>) -> Rule {
        Self::binary(BinaryOp::EndsWith, left, suffix)
    }

    pub fn more_than(left: impl Into<Var>, max_items: impl Into<Operand>) -> Rule {
        Self::binary(BinaryOp::MoreThan, left, max_items)
    }

    pub fn in_range(
        value: impl Into<Var>,
        min: impl Into<Operand>,
        max: impl Into<Operand>,
    ) -> Rule {
        Rule::Comparator(Comparator::Range {
            inside: true,
            value: Operand::Var(value.into()),
            min: min.into(),
            max: max.into(),
        })
    }

    pub fn not_in_range(
        value: impl Into<Var>,
        min: impl Into<Operand>,
        max: impl Into<Operand>,
    ) -> Rule {
        Rule::Comparator(Comparator::Range {
            inside: false,
            value: Operand::Var(value.into()),
            min: min.into(),
            max: max.into(),
        })
    }

    /// Alias of [`If::in_range`].
    pub fn between(
        value: impl Into<Var>,
        min: impl Into<Operand>,
        max: impl Into<Operand>,
    ) -> Rule {
        Self::in_range(value, min, max)
    }

    /// Alias of [`If::not_in_range`].
    pub fn outside(
        value: impl Into<Var>,
        min: impl Into<Operand>,
        max: impl Into<Operand>,
    ) -> Rule {
        Self::not_in_range(value, min, max)
    }

    /// `target[key] == expected`.
    pub fn at_key(
        target: impl Into<Var>,
        key: impl Into<Operand>,
        expected: impl Into<Operand>,
    ) -> Rule {
        Rule::Comparator(Comparator::AtKey {
            target: Operand::Var(target.into()),
            key: key.into(),
            expected: expected.into(),
        })
    }

    /// Regex match anchored at the start of the text.
    pub fn matches(value: impl Into<Var>, pattern: &str) -> Rule {
        Rule::Comparator(Comparator::Match {
            value: Operand::Var(value.into()),
            pattern: Pattern::new(pattern),
        })
    }

    pub fn all(rules: impl IntoIterator<Item = Rule>) -> Rule {
        Rule::Logical(Logical::All(rules.into_iter().collect()))
    }

    pub fn any(rules: impl IntoIterator<Item = Rule>) -> Rule {
        Rule::Logical(Logical::Any(rules.into_iter().collect()))
    }

    pub fn not(rule: Rule) -> Rule {
        rule.negate()
    }

    /// Alias of [`If::all`].
    pub fn every(rules: impl IntoIterator<Item = Rule>) -> Rule {
        Self::all(rules)
    }

    /// Alias of [`If::any`].
    pub fn either(rules: impl IntoIterator<Item = Rule>) -> Rule {
        Self::any(rules)
    }
}

/// Single-operand property checks.
pub struct Is;

impl Is {
    fn check(check: Check, value: impl Into<Var>) -> Rule {
        Rule::Comparator(Comparator::Check {
            check,
            value: Operand::Var(value.into()),
        })
    }

    pub fn even(value: impl Into<Var>) -> Rule {
        Self::check(Check::Even, value)
    }

    pub fn odd(value: impl Into<Var>) -> Rule {
        Self::check(Check::Odd, value)
    }

    pub fn positive(value: impl Into<Var>) -> Rule {
        Self::check(Check::Positive, value)
    }

    pub fn zero(value: impl Into<Var>) -> Rule {
        Self::check(Check::Zero, value)
    }

    pub fn negative(value: impl Into<Var>) -> Rule {
        Self::check(Check::Negative, value)
    }

    pub fn defined(value: impl Into<Var>) -> Rule {
        Self::check(Check::Defined, value)
    }

    pub fn nil(value: impl Into<Var>) -> Rule {
        Self::check(Check::Nil, value)
    }

    pub fn truthy(value: impl Into<Var>) -> Rule {
        Self::check(Check::Truthy, value)
    }

    pub fn falsy(value: impl Into<Var>) -> Rule {
        Self::check(Check::Falsy, value)
    }

    pub fn empty(value: impl Into<Var>) -> Rule {
        Self::check(Check::Empty, value)
    }

    pub fn not_empty(value: impl Into<Var>) -> Rule {
        Self::check(Check::NotEmpty, value)
    }

    pub fn alpha(value: impl Into<Var>) -> Rule {
        Self::check(Check::Alpha, value)
    }

    pub fn numeric(value: impl Into<Var>) -> Rule {
        Self::check(Check::Numeric, value)
    }

    pub fn alnum(value: impl Into<Var>) -> Rule {
        Self::check(Check::Alnum, value)
    }

    pub fn kind(value: impl Into<Var>, kind: ValueKind) -> Rule {
        Self::check(Check::Kind(kind), value)
    }
}
