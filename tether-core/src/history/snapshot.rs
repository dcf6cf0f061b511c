//! Snapshots
//!
//! A [`Snapshot`] is an immutable capture of named values plus the time it
//! was taken. It refers to its Origin weakly: a snapshot never keeps an
//! Origin alive, and restoring one whose Origin is gone is a no-op.

use std::sync::Weak;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PropagationReport, ReactiveError, Result};
use crate::reactive::{untracked, Batch, Origin, OriginInner};
use crate::value::Value;

/// One entry of [`Snapshot::diff`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Value in the snapshot.
    pub old: Value,
    /// Current value.
    pub new: Value,
}

/// Read `names` (every atom when empty) without recording dependencies.
pub fn capture(origin: &Origin, names: &[&str]) -> Result<IndexMap<String, Value>> {
    untracked(|| {
        if names.is_empty() {
            return Ok(origin.to_mapping());
        }
        names
            .iter()
            .map(|name| origin.get(name).map(|value| (name.to_string(), value)))
            .collect()
    })
}

/// Capture every atom of `origin`.
pub fn snapshot(origin: &Origin) -> Snapshot {
    Snapshot {
        origin: origin.downgrade(),
        ref_id: origin.ref_id().to_string(),
        values: origin.to_mapping(),
        taken_at: Utc::now(),
    }
}

#[derive(Clone)]
pub struct Snapshot {
    origin: Weak<OriginInner>,
    ref_id: String,
    values: IndexMap<String, Value>,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Capture `names` of `origin` (every atom when empty).
    pub fn of(origin: &Origin, names: &[&str]) -> Result<Self> {
        Ok(Self {
            origin: origin.downgrade(),
            ref_id: origin.ref_id().to_string(),
            values: capture(origin, names)?,
            taken_at: Utc::now(),
        })
    }

    pub fn ref_id(&self) -> &str {
        &self.ref_id
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// The source Origin, if it is still alive and not disposed.
    pub fn origin(&self) -> Option<Origin> {
        self.origin
            .upgrade()
            .map(Origin::from_inner)
            .filter(|origin| !origin.is_disposed())
    }

    /// Write every captured atom back through the normal write path.
    ///
    /// All writes happen inside one batch, so dependents resolve once and
    /// listeners see a single change set. Captured computed atoms are
    /// skipped; they recompute from the restored atoms.
    ///
    /// Returns `Ok(None)` if the Origin no longer exists, and the flush
    /// report otherwise. Restoring is all or nothing: if a captured name is
    /// no longer declared, or its value no longer fits the declared kind,
    /// it fails with `RestoreMismatch` before anything is written.
    pub fn restore(&self) -> Result<Option<PropagationReport>> {
        let Some(origin) = self.origin() else {
            debug!(origin = %self.ref_id, "restore skipped, origin is gone");
            return Ok(None);
        };

        let schema = origin.schema();
        for (name, value) in &self.values {
            let fits = match schema.atom(name) {
                Some(decl) => decl.kind.accepts(value),
                None => schema.computed(name).is_some(),
            };
            if !fits {
                return Err(ReactiveError::RestoreMismatch {
                    origin: self.ref_id.clone(),
                    name: name.clone(),
                });
            }
        }

        let guard = Batch::begin();
        for (name, value) in &self.values {
            if schema.atom(name).is_some() {
                origin.set(name, value.clone())?;
            }
        }
        let report = guard.finish();
        debug!(
            origin = %self.ref_id,
            atoms = self.values.len(),
            failures = report.failures().len(),
            "snapshot restored"
        );
        Ok(Some(report))
    }

    /// Names whose current value differs from the captured one.
    ///
    /// Empty when the Origin is gone.
    pub fn diff(&self) -> Result<IndexMap<String, Change>> {
        let Some(origin) = self.origin() else {
            return Ok(IndexMap::new());
        };
        let mut changes = IndexMap::new();
        for (name, old) in &self.values {
            let new = untracked(|| origin.get(name)).map_err(|_| ReactiveError::RestoreMismatch {
                origin: self.ref_id.clone(),
                name: name.clone(),
            })?;
            if &new != old {
                changes.insert(
                    name.clone(),
                    Change {
                        old: old.clone(),
                        new,
                    },
                );
            }
        }
        Ok(changes)
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("ref", &self.ref_id)
            .field("values", &self.values)
            .field("taken_at", &self.taken_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::reactive::Schema;
    use crate::registry::Registry;
    use crate::value::ValueKind;

    fn account_schema() -> Arc<Schema> {
        Schema::builder("Account")
            .atom("balance", ValueKind::Int)
            .atom("owner", ValueKind::Text)
            .computed("rich", ValueKind::Bool, |o| {
                Ok(Value::Bool(o.get("balance")?.as_i64().unwrap_or(0) > 100))
            })
            .build()
            .unwrap()
    }

    fn account(ref_id: &str) -> Origin {
        Origin::builder(account_schema(), ref_id)
            .set("owner", "ana")
            .build()
            .unwrap()
    }

    #[test]
    fn capture_reads_named_values() {
        let origin = account("acct-capture");
        let values = capture(&origin, &["owner", "rich"]).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["owner"], Value::from("ana"));
        assert_eq!(values["rich"], Value::Bool(false));

        assert_eq!(capture(&origin, &[]).unwrap().len(), 2);
        assert!(capture(&origin, &["nope"]).is_err());
    }

    #[test]
    fn restore_writes_back_and_diff_reports_changes() {
        let origin = account("acct-restore");
        let snap = Snapshot::of(&origin, &["balance", "rich"]).unwrap();

        origin.set("balance", 500).unwrap();
        let diff = snap.diff().unwrap();
        assert_eq!(diff.len(), 2);
        assert_eq!(
            diff["balance"],
            Change {
                old: Value::Int(0),
                new: Value::Int(500)
            }
        );

        assert!(snap.restore().unwrap().unwrap().is_ok());
        assert_eq!(origin.get("balance").unwrap(), Value::Int(0));
        assert_eq!(origin.get("rich").unwrap(), Value::Bool(false));
        assert!(snap.diff().unwrap().is_empty());
    }

    #[test]
    fn snapshots_do_not_keep_origins_alive() {
        let registry = Registry::new();
        let origin = Origin::builder(account_schema(), "acct-weak")
            .build_in(&registry)
            .unwrap();
        let snap = snapshot(&origin);
        assert_eq!(snap.ref_id(), "acct-weak");
        drop(registry);
        drop(origin);
        assert!(snap.origin().is_none());
        assert!(snap.restore().unwrap().is_none());
        assert!(snap.diff().unwrap().is_empty());
    }

    #[test]
    fn restore_refuses_undeclared_atoms() {
        let origin = account("acct-undeclared");
        let snap = snapshot(&origin);
        let smaller = Schema::builder("Account")
            .atom("balance", ValueKind::Int)
            .build()
            .unwrap();
        origin.swap_schema(smaller).unwrap();
        origin.set("balance", 7).unwrap();

        assert!(matches!(
            snap.restore(),
            Err(ReactiveError::RestoreMismatch { ref name, .. }) if name == "owner"
        ));
        // Nothing was written.
        assert_eq!(origin.get("balance").unwrap(), Value::Int(7));
    }

    #[test]
    fn restore_refuses_values_that_no_longer_fit() {
        let schema = Schema::builder("Pair")
            .atom("a", ValueKind::Int)
            .atom("b", ValueKind::Text)
            .build()
            .unwrap();
        let origin = Origin::builder(schema, "pair-retyped")
            .set("a", 1)
            .set("b", "x")
            .build()
            .unwrap();
        let snap = snapshot(&origin);

        let retyped = Schema::builder("Pair")
            .atom("a", ValueKind::Int)
            .atom("b", ValueKind::Int)
            .build()
            .unwrap();
        origin.swap_schema(retyped).unwrap();
        origin.set("a", 5).unwrap();

        assert!(matches!(
            snap.restore(),
            Err(ReactiveError::RestoreMismatch { ref name, .. }) if name == "b"
        ));
        // `a` comes before `b` and still was not written.
        assert_eq!(origin.get("a").unwrap(), Value::Int(5));
    }

    #[test]
    fn restore_returns_handler_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        let schema = Schema::builder("Guarded")
            .atom("n", ValueKind::Int)
            .lazy_reaction("guard", &["n"], move |o| {
                calls_in.fetch_add(1, Ordering::SeqCst);
                if o.get("n")?.as_i64() == Some(0) {
                    return Err("zero is not allowed".into());
                }
                Ok(())
            })
            .build()
            .unwrap();
        let origin = Origin::builder(schema, "guarded-restore").build().unwrap();
        let snap = snapshot(&origin);
        origin.set("n", 3).unwrap();

        let report = snap.restore().unwrap().unwrap();
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].subscriber, "guard");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
