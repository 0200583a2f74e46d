//! Schema migrations of the persisted application state, one module per target version.

use crate::core::Result;
use crate::persist::{MigrationRegistry, MigrationUnit};

pub mod m113;

/// Every shipped migration, in application order.
pub fn all() -> Vec<MigrationUnit> {
    vec![m113::unit()]
}

/// A registry holding every shipped migration.
pub fn default_registry() -> Result<MigrationRegistry> {
    let mut registry = MigrationRegistry::new();
    for unit in all() {
        registry.register(unit)?;
    }
    Ok(registry)
}
