//! Rule trees.
//!
//! Evaluation is pure: it reads through a [`PathSource`] and returns the
//! boolean result together with every path the tree references.
//!
//! Logical combinators short-circuit the *result*, but the reported path
//! set is always the union over all children. Dependency discovery for
//! effects must not depend on which branch happened to decide the outcome.

use std::cmp::Ordering;

use indexmap::IndexSet;
use regex::Regex;

use super::var::{PathSource, Var};
use crate::error::{ReactiveError, Result};
use crate::value::{Value, ValueKind};

/// Either side of a comparator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Var(Var),
    Literal(Value),
}

impl Operand {
    fn resolve(&self, source: &dyn PathSource) -> Result<Value> {
        match self {
            Operand::Var(var) => var.resolve(source),
            Operand::Literal(value) => Ok(value.clone()),
        }
    }

    fn var(&self) -> Option<&Var> {
        match self {
            Operand::Var(var) => Some(var),
            Operand::Literal(_) => None,
        }
    }
}

impl From<Var> for Operand {
    fn from(var: Var) -> Self {
        Operand::Var(var)
    }
}

macro_rules! literal_operand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Literal(Value::from(value))
                }
            }
        )*
    };
}

literal_operand!(bool, i32, i64, u32, f64, &str, String);

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Literal(value)
    }
}

/// A compiled regular expression that remembers its source.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Option<Regex>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let regex = Regex::new(&source).ok();
        Self { source, regex }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Anchored at the start of the text, like a prefix match.
    fn is_match_at_start(&self, text: &str) -> Result<bool> {
        let regex = self.regex.as_ref().ok_or_else(|| {
            ReactiveError::InvalidRule(format!("invalid regex '{}'", self.source))
        })?;
        Ok(regex.find(text).is_some_and(|m| m.start() == 0))
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equals,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Has,
    HasNot,
    StartsWith,
    EndsWith,
    /// Collection length strictly above the right operand.
    MoreThan,
}

/// Unary predicates over a single operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Even,
    Odd,
    Positive,
    Zero,
    Negative,
    Defined,
    Nil,
    Truthy,
    Falsy,
    Empty,
    NotEmpty,
    Alpha,
    Numeric,
    Alnum,
    Kind(ValueKind),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Comparator {
    Binary {
        op: BinaryOp,
        left: Operand,
        right: Operand,
    },
    Range {
        inside: bool,
        value: Operand,
        min: Operand,
        max: Operand,
    },
    AtKey {
        target: Operand,
        key: Operand,
        expected: Operand,
    },
    Match {
        value: Operand,
        pattern: Pattern,
    },
    Check {
        check: Check,
        value: Operand,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Logical {
    All(Vec<Rule>),
    Any(Vec<Rule>),
    Not(Box<Rule>),
}

/// A node of the predicate DSL.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Truthiness of a variable.
    Var(Var),
    /// Truthiness of a constant.
    Literal(Value),
    Comparator(Comparator),
    Logical(Logical),
}

/// Result of evaluating a rule: the outcome and the paths it read.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub result: bool,
    pub paths: IndexSet<String>,
}

impl Rule {
    /// Evaluate against `source`.
    pub fn evaluate(&self, source: &dyn PathSource) -> Result<Evaluation> {
        let mut paths = IndexSet::new();
        let result = self.eval_into(source, &mut paths)?;
        Ok(Evaluation { result, paths })
    }

    fn eval_into(&self, source: &dyn PathSource, paths: &mut IndexSet<String>) -> Result<bool> {
        match self {
            Rule::Var(var) => {
                paths.insert(var.path().to_string());
                Ok(var.resolve(source)?.truthy())
            }
            Rule::Literal(value) => Ok(value.truthy()),
            Rule::Comparator(cmp) => {
                cmp.collect_paths(paths);
                cmp.evaluate(source)
            }
            Rule::Logical(Logical::All(children)) => {
                let mut outcome = true;
                for child in children {
                    if outcome {
                        outcome = child.eval_into(source, paths)?;
                    } else {
                        child.collect_paths(paths);
                    }
                }
                Ok(outcome)
            }
            Rule::Logical(Logical::Any(children)) => {
                let mut outcome = false;
                for child in children {
                    if outcome {
                        child.collect_paths(paths);
                    } else {
                        outcome = child.eval_into(source, paths)?;
                    }
                }
                Ok(outcome)
            }
            Rule::Logical(Logical::Not(child)) => Ok(!child.eval_into(source, paths)?),
        }
    }

    /// Every variable path referenced anywhere in the tree.
    pub fn paths(&self) -> IndexSet<String> {
        let mut paths = IndexSet::new();
        self.collect_paths(&mut paths);
        paths
    }

    /// Root segments of [`Rule::paths`], i.e. the atoms read on an Origin.
    pub fn root_atoms(&self) -> IndexSet<String> {
        self.paths()
            .iter()
            .map(|p| p.split('.').next().unwrap_or_default().to_string())
            .collect()
    }

    fn collect_paths(&self, paths: &mut IndexSet<String>) {
        match self {
            Rule::Var(var) => {
                paths.insert(var.path().to_string());
            }
            Rule::Literal(_) => {}
            Rule::Comparator(cmp) => cmp.collect_paths(paths),
            Rule::Logical(Logical::All(children) | Logical::Any(children)) => {
                for child in children {
                    child.collect_paths(paths);
                }
            }
            Rule::Logical(Logical::Not(child)) => child.collect_paths(paths),
        }
    }

    /// Structural check: paths are well-formed, every comparator reads at
    /// least one variable and every regex compiles.
    pub fn validate(&self) -> Result<()> {
        match self {
            Rule::Var(var) => var.validate(),
            Rule::Literal(_) => Ok(()),
            Rule::Comparator(cmp) => cmp.validate(),
            Rule::Logical(Logical::All(children) | Logical::Any(children)) => {
                children.iter().try_for_each(Rule::validate)
            }
            Rule::Logical(Logical::Not(child)) => child.validate(),
        }
    }

    pub fn and(self, other: Rule) -> Rule {
        match self {
            Rule::Logical(Logical::All(mut children)) => {
                children.push(other);
                Rule::Logical(Logical::All(children))
            }
            first => Rule::Logical(Logical::All(vec![first, other])),
        }
    }

    pub fn or(self, other: Rule) -> Rule {
        match self {
            Rule::Logical(Logical::Any(mut children)) => {
                children.push(other);
                Rule::Logical(Logical::Any(children))
            }
            first => Rule::Logical(Logical::Any(vec![first, other])),
        }
    }

    pub fn negate(self) -> Rule {
        Rule::Logical(Logical::Not(Box::new(self)))
    }
}

impl Comparator {
    fn operands(&self) -> Vec<&Operand> {
        match self {
            Comparator::Binary { left, right, .. } => vec![left, right],
            Comparator::Range { value, min, max, .. } => vec![value, min, max],
            Comparator::AtKey {
                target,
                key,
                expected,
            } => vec![target, key, expected],
            Comparator::Match { value, .. } | Comparator::Check { value, .. } => vec![value],
        }
    }

    fn collect_paths(&self, paths: &mut IndexSet<String>) {
        for var in self.operands().into_iter().filter_map(Operand::var) {
            paths.insert(var.path().to_string());
        }
    }

    fn validate(&self) -> Result<()> {
        let vars: Vec<&Var> = self.operands().into_iter().filter_map(Operand::var).collect();
        if vars.is_empty() {
            return Err(ReactiveError::InvalidRule(
                "comparator has no variable operand".to_string(),
            ));
        }
        vars.into_iter().try_for_each(Var::validate)?;
        if let Comparator::Match { pattern, .. } = self {
            if pattern.regex.is_none() {
                return Err(ReactiveError::InvalidRule(format!(
                    "invalid regex '{}'",
                    pattern.as_str()
                )));
            }
        }
        Ok(())
    }

    fn evaluate(&self, source: &dyn PathSource) -> Result<bool> {
        self.validate()?;
        match self {
            Comparator::Binary { op, left, right } => {
                let l = left.resolve(source)?;
                let r = right.resolve(source)?;
                Ok(binary(*op, &l, &r))
            }
            Comparator::Range {
                inside,
                value,
                min,
                max,
            } => {
                let v = value.resolve(source)?;
                let lo = min.resolve(source)?;
                let hi = max.resolve(source)?;
                let (Some(above_lo), Some(below_hi)) = (order(&v, &lo), order(&v, &hi)) else {
                    return Ok(false);
                };
                let within = above_lo != Ordering::Less && below_hi != Ordering::Greater;
                Ok(if *inside { within } else { !within })
            }
            Comparator::AtKey {
                target,
                key,
                expected,
            } => {
                let t = target.resolve(source)?;
                let k = key.resolve(source)?.to_text();
                let e = expected.resolve(source)?;
                Ok(t.get_key(&k).is_some_and(|found| found.loose_eq(&e)))
            }
            Comparator::Match { value, pattern } => match value.resolve(source)? {
                Value::Text(text) => pattern.is_match_at_start(&text),
                _ => Ok(false),
            },
            Comparator::Check { check, value } => Ok(unary(*check, &value.resolve(source)?)),
        }
    }
}

/// Ordering used by the relational comparators.
///
/// Two texts compare lexicographically; anything else must coerce to a
/// number on both sides or the comparison fails closed (`None`).
fn order(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Value::Text(l), Value::Text(r)) = (left, right) {
        return Some(l.cmp(r));
    }
    left.as_number()?.partial_cmp(&right.as_number()?)
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> bool {
    match op {
        BinaryOp::Equals => l.loose_eq(r),
        BinaryOp::NotEqual => !l.loose_eq(r),
        BinaryOp::Greater => order(l, r) == Some(Ordering::Greater),
        BinaryOp::GreaterOrEqual => matches!(order(l, r), Some(Ordering::Greater | Ordering::Equal)),
        BinaryOp::Less => order(l, r) == Some(Ordering::Less),
        BinaryOp::LessOrEqual => matches!(order(l, r), Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::Has => l.contains(r).unwrap_or(false),
        BinaryOp::HasNot => l.contains(r).is_some_and(|found| !found),
        BinaryOp::StartsWith => !l.is_null() && l.to_text().starts_with(&r.to_text()),
        BinaryOp::EndsWith => !l.is_null() && l.to_text().ends_with(&r.to_text()),
        BinaryOp::MoreThan => match (l.len(), r.as_number()) {
            (Some(len), Some(limit)) => (len as f64) > limit,
            _ => false,
        },
    }
}

fn unary(check: Check, v: &Value) -> bool {
    let number = v.as_number().filter(|_| !matches!(v, Value::Text(_) | Value::Bool(_)));
    let text_all = |pred: fn(char) -> bool| match v {
        Value::Null => false,
        other => {
            let text = other.to_text();
            !text.is_empty() && text.chars().all(pred)
        }
    };
    match check {
        Check::Even => number.is_some_and(|n| n % 2.0 == 0.0),
        Check::Odd => number.is_some_and(|n| n % 2.0 != 0.0),
        Check::Positive => number.is_some_and(|n| n > 0.0),
        Check::Zero => number.is_some_and(|n| n == 0.0),
        Check::Negative => number.is_some_and(|n| n < 0.0),
        Check::Defined => !v.is_null(),
        Check::Nil => v.is_null(),
        Check::Truthy => v.truthy(),
        Check::Falsy => !v.truthy(),
        Check::Empty => v.len() == Some(0),
        Check::NotEmpty => v.len().is_some_and(|n| n > 0),
        Check::Alpha => text_all(char::is_alphabetic),
        Check::Numeric => text_all(char::is_numeric),
        Check::Alnum => text_all(char::is_alphanumeric),
        Check::Kind(ValueKind::Any) => true,
        Check::Kind(kind) => v.kind_name() == kind.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn state() -> Value {
        let mut map = IndexMap::new();
        map.insert("age".to_string(), Value::Int(17));
        map.insert("name".to_string(), Value::from("Ana"));
        map.insert("email".to_string(), Value::from("ana@example.com"));
        map.insert("tags".to_string(), Value::from(vec!["admin", "beta"]));
        map.insert("score".to_string(), Value::from("n/a"));
        Value::Map(map)
    }

    fn cmp(op: BinaryOp, left: &str, right: impl Into<Operand>) -> Rule {
        Rule::Comparator(Comparator::Binary {
            op,
            left: Operand::Var(Var::new(left)),
            right: right.into(),
        })
    }

    #[test]
    fn relational_comparators() {
        let s = state();
        assert!(!cmp(BinaryOp::GreaterOrEqual, "age", 18).evaluate(&s).unwrap().result);
        assert!(cmp(BinaryOp::Less, "age", 18).evaluate(&s).unwrap().result);
        assert!(cmp(BinaryOp::Equals, "age", 17.0).evaluate(&s).unwrap().result);
    }

    #[test]
    fn numeric_comparators_fail_closed() {
        let s = state();
        assert!(!cmp(BinaryOp::Greater, "score", 1).evaluate(&s).unwrap().result);
        assert!(!cmp(BinaryOp::Less, "score", 1).evaluate(&s).unwrap().result);
        assert!(!cmp(BinaryOp::Greater, "missing", 1).evaluate(&s).unwrap().result);
    }

    #[test]
    fn membership_and_text() {
        let s = state();
        assert!(cmp(BinaryOp::Has, "tags", "beta").evaluate(&s).unwrap().result);
        assert!(cmp(BinaryOp::HasNot, "tags", "root").evaluate(&s).unwrap().result);
        assert!(cmp(BinaryOp::StartsWith, "email", "ana@").evaluate(&s).unwrap().result);
        assert!(cmp(BinaryOp::EndsWith, "email", ".com").evaluate(&s).unwrap().result);
        assert!(cmp(BinaryOp::MoreThan, "tags", 1).evaluate(&s).unwrap().result);
    }

    #[test]
    fn logical_reports_union_of_paths_despite_short_circuit() {
        let rule = Rule::Logical(Logical::All(vec![
            cmp(BinaryOp::GreaterOrEqual, "age", 18),
            cmp(BinaryOp::Equals, "name", "Ana"),
        ]));

        let eval = rule.evaluate(&state()).unwrap();
        assert!(!eval.result);
        assert!(eval.paths.contains("age"));
        assert!(eval.paths.contains("name"));

        let any = Rule::Logical(Logical::Any(vec![
            cmp(BinaryOp::Less, "age", 18),
            cmp(BinaryOp::Has, "tags", "x"),
        ]));
        let eval = any.evaluate(&state()).unwrap();
        assert!(eval.result);
        assert_eq!(eval.paths.len(), 2);
    }

    #[test]
    fn comparator_without_variable_is_invalid() {
        let rule = Rule::Comparator(Comparator::Binary {
            op: BinaryOp::Equals,
            left: Operand::Literal(Value::Int(1)),
            right: Operand::Literal(Value::Int(1)),
        });
        assert!(matches!(rule.validate(), Err(ReactiveError::InvalidRule(_))));
        assert!(rule.evaluate(&state()).is_err());
    }

    #[test]
    fn bad_regex_is_invalid() {
        let rule = Rule::Comparator(Comparator::Match {
            value: Operand::Var(Var::new("email")),
            pattern: Pattern::new("([a-z"),
        });
        assert!(matches!(rule.validate(), Err(ReactiveError::InvalidRule(_))));
    }

    #[test]
    fn regex_match_is_anchored_at_start() {
        let rule = |p: &str| {
            Rule::Comparator(Comparator::Match {
                value: Operand::Var(Var::new("email")),
                pattern: Pattern::new(p),
            })
        };
        assert!(rule(r"[a-z]+@").evaluate(&state()).unwrap().result);
        assert!(!rule(r"example").evaluate(&state()).unwrap().result);
    }

    #[test]
    fn range_and_at_key() {
        let in_range = Rule::Comparator(Comparator::Range {
            inside: true,
            value: Operand::Var(Var::new("age")),
            min: 13.into(),
            max: 19.into(),
        });
        assert!(in_range.evaluate(&state()).unwrap().result);

        let at_key = Rule::Comparator(Comparator::AtKey {
            target: Operand::Var(Var::new("tags")),
            key: 0.into(),
            expected: "admin".into(),
        });
        assert!(at_key.evaluate(&state()).unwrap().result);
    }

    #[test]
    fn unary_checks() {
        let check = |c: Check, path: &str| {
            Rule::Comparator(Comparator::Check {
                check: c,
                value: Operand::Var(Var::new(path)),
            })
            .evaluate(&state())
            .unwrap()
            .result
        };
        assert!(check(Check::Odd, "age"));
        assert!(!check(Check::Even, "age"));
        assert!(check(Check::Alpha, "name"));
        assert!(!check(Check::Numeric, "name"));
        assert!(check(Check::Nil, "missing"));
        assert!(check(Check::NotEmpty, "tags"));
        assert!(check(Check::Kind(ValueKind::Text), "name"));
        assert!(!check(Check::Kind(ValueKind::Int), "name"));
    }

    #[test]
    fn combinators_compose() {
        let rule = cmp(BinaryOp::Less, "age", 18)
            .and(cmp(BinaryOp::Equals, "name", "Ana"))
            .negate();
        assert!(!rule.evaluate(&state()).unwrap().result);
        assert_eq!(rule.root_atoms().len(), 2);
    }
}
