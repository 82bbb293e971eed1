use crate::error::{DeckError, Result};
use crate::paths;
use crate::registry::{default_registry, ActionSpec, Registry};
use crate::tracker::PipelineTracker;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// DeckConfig
// ---------------------------------------------------------------------------

/// Startup configuration: the slots and the actions with their declared
/// dependencies. Immutable after registration; the tracker and registry
/// are both built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckConfig {
    pub slots: Vec<String>,
    pub actions: Vec<ActionSpec>,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            slots: vec!["underlyings".to_string(), "raptor".to_string()],
            actions: default_registry().iter().cloned().collect(),
        }
    }
}

impl DeckConfig {
    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(DeckError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let config: DeckConfig = serde_yaml::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(DeckError::NotInitialized) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation and installation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Result<()> {
        let mut seen_slots = BTreeSet::new();
        for slot in &self.slots {
            paths::validate_name(slot)?;
            if !seen_slots.insert(slot.as_str()) {
                return Err(DeckError::DuplicateSlot(slot.clone()));
            }
        }
        let mut seen_keys = BTreeSet::new();
        for action in &self.actions {
            paths::validate_name(&action.key)?;
            if !seen_keys.insert(action.key.as_str()) {
                return Err(DeckError::DuplicateAction(action.key.clone()));
            }
            for dep in &action.depends_on {
                if !seen_slots.contains(dep.as_str()) {
                    return Err(DeckError::UnknownSlot(dep.clone()));
                }
            }
        }
        Ok(())
    }

    /// Build the action registry this configuration declares.
    pub fn registry(&self) -> Result<Registry> {
        let mut registry = Registry::new();
        for spec in &self.actions {
            registry.register(spec.clone())?;
        }
        Ok(registry)
    }

    /// Register every slot and action with a tracker. This is the single
    /// startup hand-off; after it the tracker owns all pipeline state.
    pub fn install(&self, tracker: &mut PipelineTracker) -> Result<()> {
        self.validate()?;
        for slot in &self.slots {
            tracker.register_slot(slot)?;
        }
        for action in &self.actions {
            tracker.register_action(&action.key, action.depends_on.clone())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid_and_installs() {
        let config = DeckConfig::default();
        config.validate().unwrap();
        assert_eq!(config.slots, vec!["underlyings", "raptor"]);
        assert_eq!(config.actions.len(), 8);

        let mut tracker = PipelineTracker::new();
        config.install(&mut tracker).unwrap();
        assert!(tracker.is_present("raptor").is_ok());
        assert!(!tracker.is_ready("missingness").unwrap());
    }

    #[test]
    fn config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let config = DeckConfig::default();
        config.save(dir.path()).unwrap();

        let loaded = DeckConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.slots, config.slots);
        assert_eq!(loaded.actions.len(), config.actions.len());
        assert_eq!(loaded.actions[0].key, config.actions[0].key);
    }

    #[test]
    fn load_without_file_fails_but_or_default_succeeds() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            DeckConfig::load(dir.path()),
            Err(DeckError::NotInitialized)
        ));
        let config = DeckConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.slots.len(), 2);
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut config = DeckConfig::default();
        config.slots = vec!["underlyings".to_string()];
        assert!(matches!(
            config.validate(),
            Err(DeckError::UnknownSlot(_))
        ));
    }

    #[test]
    fn duplicate_action_keys_are_rejected() {
        let mut config = DeckConfig::default();
        let dup = config.actions[0].clone();
        config.actions.push(dup);
        assert!(matches!(
            config.validate(),
            Err(DeckError::DuplicateAction(_))
        ));
    }

    #[test]
    fn duplicate_slots_are_rejected() {
        let mut config = DeckConfig::default();
        config.slots.push("raptor".to_string());
        assert!(matches!(
            config.validate(),
            Err(DeckError::DuplicateSlot(_))
        ));
    }

    #[test]
    fn config_yaml_shape() {
        let yaml = serde_yaml::to_string(&DeckConfig::default()).unwrap();
        assert!(yaml.contains("slots:"));
        assert!(yaml.contains("- raptor"));
        assert!(yaml.contains("kind: missingness_report"));
        assert!(yaml.contains("view: spread_matrix"));
    }
}
