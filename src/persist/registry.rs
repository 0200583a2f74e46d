use crate::core::{Envelope, Result, StateMap, StoreError};
use std::sync::Arc;

/// What a transform made of the state it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// Replacement controller state.
    Migrated(StateMap),
    /// Shape recognized, nothing to change.
    Unchanged,
    /// Shape not recognized; the state must be kept as is. Carries what was malformed.
    Malformed(String),
}

/// A function transforming persisted state into the shape of the next schema version.
///
/// Transforms read the envelope and return a new `data` map; they never mutate
/// their input, so a transform that bails out halfway cannot leave partial edits.
pub type TransformFn = Arc<dyn Fn(&Envelope) -> Result<TransformOutcome> + Send + Sync>;

/// A single version-to-version migration, identified by the version it upgrades to.
#[derive(Clone)]
pub struct MigrationUnit {
    target_version: u32,
    description: String,
    transform: TransformFn,
}

impl MigrationUnit {
    pub fn new<F>(target_version: u32, transform: F) -> Self
    where
        F: Fn(&Envelope) -> Result<TransformOutcome> + Send + Sync + 'static,
    {
        Self {
            target_version,
            description: String::new(),
            transform: Arc::new(transform),
        }
    }

    /// Adds a human readable summary of the change.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn target_version(&self) -> u32 {
        self.target_version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn apply(&self, envelope: &Envelope) -> Result<TransformOutcome> {
        (self.transform)(envelope)
    }
}

impl std::fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("target_version", &self.target_version)
            .field("description", &self.description)
            .finish()
    }
}

/// Ordered catalogue of migration units.
///
/// Units must be registered in strictly ascending target-version order; the
/// registration order is the application order.
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    units: Vec<MigrationUnit>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit after every unit registered so far.
    pub fn register(&mut self, unit: MigrationUnit) -> Result<()> {
        let version = unit.target_version;
        if self.units.iter().any(|u| u.target_version == version) {
            return Err(StoreError::DuplicateVersion(version));
        }
        match self.latest_version() {
            Some(latest) if version <= latest => {
                return Err(StoreError::OutOfOrder { version, latest });
            }
            _ => {}
        }

        self.units.push(unit);
        Ok(())
    }

    /// Fluent builder method to register a unit.
    pub fn with_unit(mut self, unit: MigrationUnit) -> Result<Self> {
        self.register(unit)?;
        Ok(self)
    }

    /// Every unit with `target_version > version`, ascending.
    pub fn units_after(&self, version: u32) -> impl Iterator<Item = &MigrationUnit> {
        // `units` is sorted by construction, so the tail after the first match is the answer.
        let start = self.units.partition_point(|u| u.target_version <= version);
        self.units[start..].iter()
    }

    /// Highest registered target version, `None` when the registry is empty.
    pub fn latest_version(&self) -> Option<u32> {
        self.units.last().map(|u| u.target_version)
    }

    /// The schema version fresh state is created at.
    pub fn current_version(&self) -> u32 {
        self.latest_version().unwrap_or(0)
    }

    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
