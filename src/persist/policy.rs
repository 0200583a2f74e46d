use crate::core::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What the runner does after a migration unit faults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MigrationFaultPolicy {
    /// Stop the chain; the envelope stays at the last successfully applied version.
    #[default]
    Halt,
    /// Keep the state the faulty unit was given, move past its version and continue.
    ///
    /// The envelope's version then names the skipped unit too, so it no longer
    /// means every unit up to it was applied; the report's `faults` lists the
    /// skipped versions.
    SkipUnit,
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Marker recording that a state tree existed for this installation.
    pub existence_marker_key: String,

    /// Marker set to `"true"` once the user accepted overwriting corrupted state.
    pub recovery_opt_in_key: String,

    /// Runner behavior on a faulty migration unit.
    pub fault_policy: MigrationFaultPolicy,

    /// Persist the migrated envelope right after bootstrap when its version moved.
    pub write_back_after_migration: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            existence_marker_key: "state_existed".to_string(),
            recovery_opt_in_key: "user_opted_in_to_restore".to_string(),
            fault_policy: MigrationFaultPolicy::Halt,
            write_back_after_migration: true,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the existence marker key
    pub fn existence_marker_key(mut self, key: &str) -> Self {
        self.existence_marker_key = key.to_string();
        self
    }

    /// Set the recovery opt-in marker key
    pub fn recovery_opt_in_key(mut self, key: &str) -> Self {
        self.recovery_opt_in_key = key.to_string();
        self
    }

    pub fn fault_policy(mut self, policy: MigrationFaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn write_back_after_migration(mut self, enabled: bool) -> Self {
        self.write_back_after_migration = enabled;
        self
    }

    /// Load a configuration from a JSON file; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            StoreError::IoError(format!(
                "Failed to read config '{}': {}",
                path.display(),
                err
            ))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.existence_marker_key.trim().is_empty() || self.recovery_opt_in_key.trim().is_empty()
        {
            return Err(StoreError::Serialization(
                "Marker keys must not be empty".to_string(),
            ));
        }
        if self.existence_marker_key == self.recovery_opt_in_key {
            return Err(StoreError::Serialization(
                "Existence and recovery markers must use different keys".to_string(),
            ));
        }
        Ok(())
    }
}
