/**
 * Configuration Loader
 *
 * DESIGN DECISION: Two TOML tiers (global, per-project) loaded on top of the compile-time
 * `StageConfig` tables, collapsed from a four-tier (system/team/project/user) hierarchy down
 * to three: per-project overrides fall back to global defaults, which fall back to
 * compile-time defaults
 * WHY: there is no notion of a team tier here; carrying one would be inventing scope nothing
 * asked for, so only the two persisted tiers actually named are implemented
 *
 * PATTERN: grounded on a `ConfigLoader` (XDG-style directory resolution, TOML parse-on-read,
 * missing file = no-op rather than an error), adapted to resolve individual `StageOverride`
 * fields through `model::settings::resolve_max_turns`'s generalised layering instead of
 * whole-struct merge
 */

use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::model::settings::{Settings, StageOverride};
use crate::model::stage::{stage_config, StageConfig, StageKind, Tier};

const GLOBAL_CONFIG_FILENAME: &str = "config.toml";
const PROJECT_CONFIG_RELATIVE: &str = ".pipeline/config.toml";

/// Cross-platform global config directory, resolved via the `dirs` crate instead of
/// hand-rolled env var matching.
fn global_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pipeline"))
}

fn load_toml_settings(path: &PathBuf) -> Result<Option<Settings>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&content)?;
    Ok(Some(settings))
}

/// Loads and resolves stage settings across the global/project tiers.
pub struct ConfigLoader {
    global_path: Option<PathBuf>,
    project_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { global_path: global_config_dir().map(|d| d.join(GLOBAL_CONFIG_FILENAME)), project_path: None }
    }

    pub fn with_project_dir(mut self, project_dir: impl Into<PathBuf>) -> Self {
        self.project_path = Some(project_dir.into().join(PROJECT_CONFIG_RELATIVE));
        self
    }

    /// Load the global tier. A missing file is not an error; a malformed file is, since an explicit config the user wrote should not
    /// silently vanish.
    pub fn load_global(&self) -> Result<Option<Settings>> {
        match &self.global_path {
            Some(path) => load_toml_settings(path),
            None => Ok(None),
        }
    }

    pub fn load_project(&self) -> Result<Option<Settings>> {
        match &self.project_path {
            Some(path) => load_toml_settings(path),
            None => Ok(None),
        }
    }

    /// Build a `ConfigResolver` by loading both tiers up front.
    pub fn resolve(&self) -> Result<ConfigResolver> {
        Ok(ConfigResolver { global: self.load_global()?, project: self.load_project()? })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved view over the three tiers for a given stage.
pub struct ConfigResolver {
    global: Option<Settings>,
    project: Option<Settings>,
}

impl ConfigResolver {
    /// A resolver with no persisted tiers: every stage resolves straight to its compile-time
    /// default. Useful as a starting point before `ConfigLoader::resolve()` has run, or in
    /// tests that don't exercise the TOML layers.
    pub fn empty() -> Self {
        Self { global: None, project: None }
    }

    fn override_for(&self, stage: StageKind) -> (Option<&StageOverride>, Option<&StageOverride>) {
        let project = self.project.as_ref().and_then(|s| s.stage_overrides.get(&stage));
        let global = self.global.as_ref().and_then(|s| s.stage_overrides.get(&stage));
        (project, global)
    }

    fn compile_default(&self, tier: Tier, stage: StageKind) -> &'static StageConfig {
        stage_config(tier, stage).expect("stage must exist in its tier's sequence")
    }

    pub fn resolve_model(&self, tier: Tier, stage: StageKind) -> String {
        let (project, global) = self.override_for(stage);
        project
            .and_then(|o| o.model.clone())
            .or_else(|| global.and_then(|o| o.model.clone()))
            .unwrap_or_else(|| self.compile_default(tier, stage).default_model.to_string())
    }

    pub fn resolve_max_turns(&self, tier: Tier, stage: StageKind) -> u32 {
        crate::model::settings::resolve_max_turns(self.project.as_ref(), self.global.as_ref(), stage, self.compile_default(tier, stage).max_turns)
    }

    pub fn resolve_timeout_ms(&self, tier: Tier, stage: StageKind) -> u64 {
        let (project, global) = self.override_for(stage);
        project
            .and_then(|o| o.timeout_ms)
            .or_else(|| global.and_then(|o| o.timeout_ms))
            .unwrap_or_else(|| self.compile_default(tier, stage).timeout_ms)
    }

    pub fn resolve_auto_approve_threshold(&self, tier: Tier, stage: StageKind) -> Option<f64> {
        let (project, global) = self.override_for(stage);
        project
            .and_then(|o| o.auto_approve_threshold)
            .or_else(|| global.and_then(|o| o.auto_approve_threshold))
            .or(self.compile_default(tier, stage).auto_approve_threshold)
    }

    /// Validation hooks are project-scoped only, with no global or compile-time equivalent.
    pub fn validation_hooks(&self) -> &[crate::model::settings::ValidationHook] {
        self.project.as_ref().map(|s| s.validation_hooks.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_fall_back_to_compile_time_defaults() {
        let loader = ConfigLoader { global_path: None, project_path: None };
        let resolver = loader.resolve().unwrap();
        assert_eq!(resolver.resolve_max_turns(Tier::L1, StageKind::Plan), 8);
        assert_eq!(resolver.resolve_model(Tier::L1, StageKind::Plan), "default");
        assert_eq!(resolver.resolve_auto_approve_threshold(Tier::L1, StageKind::Plan), Some(4.0));
    }

    #[test]
    fn test_project_overrides_global_which_overrides_compile_time() {
        let mut global = Settings::default();
        global.stage_overrides.insert(StageKind::Plan, StageOverride { max_turns: Some(10), model: Some("claude".into()), ..Default::default() });

        let mut project = Settings::default();
        project.stage_overrides.insert(StageKind::Plan, StageOverride { max_turns: Some(20), ..Default::default() });

        let resolver = ConfigResolver { global: Some(global), project: Some(project) };

        assert_eq!(resolver.resolve_max_turns(Tier::L1, StageKind::Plan), 20);
        assert_eq!(resolver.resolve_model(Tier::L1, StageKind::Plan), "claude");
        assert_eq!(resolver.resolve_timeout_ms(Tier::L1, StageKind::Plan), 15 * 60 * 1000);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(GLOBAL_CONFIG_FILENAME);
        fs::write(&path, "not = [valid toml").unwrap();

        let loader = ConfigLoader { global_path: Some(path), project_path: None };
        assert!(matches!(loader.load_global(), Err(Error::Configuration(_))));
    }
}
