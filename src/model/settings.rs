/**
 * Settings - layered stage-level configuration
 *
 * DESIGN DECISION: Two persisted scopes (global, per-project) falling back to compile-time
 * defaults, collapsed from a four-tier config loader down to the three tiers this crate names
 * WHY: stage-level settings are layered: per-project overrides fall back to global defaults,
 * which fall back to compile-time defaults
 */

use serde::{Deserialize, Serialize};

use super::stage::StageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsScope {
    Global,
    Project(i64),
}

impl SettingsScope {
    /// The scope key stored in `settings(scope, key, value)`.
    pub fn key(&self) -> String {
        match self {
            SettingsScope::Global => "global".to_string(),
            SettingsScope::Project(id) => format!("project:{}", id),
        }
    }
}

/// One stage's overridable knobs. `None` fields fall through to the next tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageOverride {
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub auto_approve_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationHook {
    pub name: String,
    pub command: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub stage_overrides: std::collections::BTreeMap<StageKind, StageOverride>,
    pub validation_hooks: Vec<ValidationHook>,
}

/// Resolve a setting by walking project -> global -> compile-time default, last-one-wins
/// at each tier being: prefer the more specific tier when it has a value.
pub fn resolve_max_turns(
    project: Option<&Settings>,
    global: Option<&Settings>,
    stage: StageKind,
    compile_time_default: u32,
) -> u32 {
    project
        .and_then(|s| s.stage_overrides.get(&stage))
        .and_then(|o| o.max_turns)
        .or_else(|| global.and_then(|s| s.stage_overrides.get(&stage)).and_then(|o| o.max_turns))
        .unwrap_or(compile_time_default)
}
