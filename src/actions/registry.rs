use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::{Action, Platform};
use crate::error::ControlError;
use crate::store::OverrideStore;

/// Maps action keys to command templates: persisted overrides layered over
/// the platform's built-in defaults.
#[derive(Clone)]
pub struct CommandRegistry {
    overrides: Arc<dyn OverrideStore>,
    platform: Platform,
}

impl CommandRegistry {
    pub fn new(overrides: Arc<dyn OverrideStore>, platform: Platform) -> Self {
        Self {
            overrides,
            platform,
        }
    }

    fn defaults(&self) -> Result<&'static [(&'static str, &'static str)], ControlError> {
        self.platform
            .default_commands()
            .ok_or_else(|| ControlError::UnsupportedPlatform(self.platform.name().to_string()))
    }

    fn default_map(&self) -> Result<BTreeMap<String, String>, ControlError> {
        Ok(self
            .defaults()?
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect())
    }

    /// Template for `key`: the override if one is stored, else the default.
    pub fn resolve(&self, key: &str) -> Result<String, ControlError> {
        let defaults = self.defaults()?;
        if let Some(template) = self.overrides.get_override(key)? {
            return Ok(template);
        }
        defaults
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
            .ok_or_else(|| ControlError::Unconfigured(key.to_string()))
    }

    /// Defaults overlaid with stored overrides.
    pub fn list_effective(&self) -> Result<BTreeMap<String, String>, ControlError> {
        let mut effective = self.default_map()?;
        effective.extend(self.overrides.list_overrides()?);
        Ok(effective)
    }

    /// Upsert the key/template pairs of a JSON object.
    pub fn set_overrides(&self, input: &Value) -> Result<(), ControlError> {
        self.defaults()?;
        let map = input
            .as_object()
            .ok_or_else(|| ControlError::InvalidFormat("expected an object of commands".into()))?;

        let mut updates = BTreeMap::new();
        for (key, value) in map {
            if Action::from_key(key).is_none() {
                return Err(ControlError::InvalidFormat(format!(
                    "unknown action key '{key}'"
                )));
            }
            let template = value.as_str().ok_or_else(|| {
                ControlError::InvalidFormat(format!("command for '{key}' must be a string"))
            })?;
            updates.insert(key.clone(), template.to_string());
        }

        self.overrides.upsert_overrides(&updates)?;
        info!(count = updates.len(), "command overrides updated");
        Ok(())
    }

    /// Drop all overrides and persist exactly the platform defaults.
    pub fn reset_to_defaults(&self) -> Result<(), ControlError> {
        let defaults = self.default_map()?;
        self.overrides.replace_overrides(&defaults)?;
        info!(platform = self.platform.name(), "commands reset to defaults");
        Ok(())
    }

    /// Persist the defaults if nothing is stored yet. Returns whether it seeded.
    pub fn seed_defaults_if_empty(&self) -> Result<bool, ControlError> {
        if self.platform.default_commands().is_none() {
            return Ok(false);
        }
        if !self.overrides.list_overrides()?.is_empty() {
            return Ok(false);
        }
        self.reset_to_defaults()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn registry(platform: Platform) -> (TempDir, Arc<SqliteStore>, CommandRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("cmd.db")).unwrap());
        let registry = CommandRegistry::new(store.clone(), platform);
        (dir, store, registry)
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let (_dir, _store, reg) = registry(Platform::Linux);
        assert_eq!(reg.resolve("play_pause").unwrap(), "playerctl play-pause");
    }

    #[test]
    fn test_override_wins() {
        let (_dir, _store, reg) = registry(Platform::Linux);
        reg.set_overrides(&json!({"play_pause": "mpc toggle"}))
            .unwrap();
        assert_eq!(reg.resolve("play_pause").unwrap(), "mpc toggle");
        let effective = reg.list_effective().unwrap();
        assert_eq!(effective["play_pause"], "mpc toggle");
        assert_eq!(effective["media_next"], "playerctl next");
        assert_eq!(effective.len(), Action::ALL.len());
    }

    #[test]
    fn test_unknown_key_is_unconfigured() {
        let (_dir, _store, reg) = registry(Platform::Linux);
        assert!(matches!(
            reg.resolve("launch_rockets"),
            Err(ControlError::Unconfigured(_))
        ));
    }

    #[test]
    fn test_set_overrides_rejects_bad_input() {
        let (_dir, _store, reg) = registry(Platform::Linux);
        assert!(matches!(
            reg.set_overrides(&json!(["shutdown"])),
            Err(ControlError::InvalidFormat(_))
        ));
        assert!(matches!(
            reg.set_overrides(&json!({"shutdown": 5})),
            Err(ControlError::InvalidFormat(_))
        ));
        assert!(matches!(
            reg.set_overrides(&json!({"not_an_action": "ls"})),
            Err(ControlError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let (_dir, store, reg) = registry(Platform::Linux);
        reg.set_overrides(&json!({"shutdown": "echo nope"})).unwrap();
        reg.reset_to_defaults().unwrap();
        assert_eq!(reg.resolve("shutdown").unwrap(), "sudo systemctl poweroff");
        assert_eq!(store.list_overrides().unwrap().len(), Action::ALL.len());
    }

    #[test]
    fn test_seed_only_when_empty() {
        let (_dir, store, reg) = registry(Platform::Linux);
        assert!(reg.seed_defaults_if_empty().unwrap());
        reg.set_overrides(&json!({"lock": "xdg-screensaver lock"}))
            .unwrap();
        assert!(!reg.seed_defaults_if_empty().unwrap());
        assert_eq!(
            store.get_override("lock").unwrap().as_deref(),
            Some("xdg-screensaver lock")
        );
    }

    #[test]
    fn test_unsupported_platform_fails_everything() {
        let (_dir, _store, reg) = registry(Platform::Windows);
        assert!(matches!(
            reg.resolve("shutdown"),
            Err(ControlError::UnsupportedPlatform(_))
        ));
        assert!(matches!(
            reg.list_effective(),
            Err(ControlError::UnsupportedPlatform(_))
        ));
        assert!(matches!(
            reg.reset_to_defaults(),
            Err(ControlError::UnsupportedPlatform(_))
        ));
        assert!(!reg.seed_defaults_if_empty().unwrap());
    }
}
