//! Engine settings.
//!
//! Settings are attached to each Origin through its builder. They can be
//! built in code or deserialized from JSON; missing fields take defaults.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// When an effect handler fires relative to its rule result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Fire only when the rule flips from false to true.
    #[default]
    Edge,
    /// Fire on every evaluation that yields true.
    Level,
}

/// Per-origin engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Firing policy for effects.
    pub effect_trigger: TriggerMode,

    /// Maximum number of snapshots a tracker keeps. Oldest entries are
    /// evicted first. `None` keeps everything.
    pub history_capacity: Option<usize>,

    /// Resolve non-lazy reactions and effects once when an origin is built
    /// or hot-swapped.
    pub fire_on_register: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            effect_trigger: TriggerMode::Edge,
            history_capacity: None,
            fire_on_register: true,
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_effect_trigger(mut self, mode: TriggerMode) -> Self {
        self.effect_trigger = mode;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = Some(capacity);
        self
    }

    pub fn with_fire_on_register(mut self, fire: bool) -> Self {
        self.fire_on_register = fire;
        self
    }
}
