//! Versioned persistence of the application state.
//!
//! [`PersistenceGateway`] reads and writes the `{data, meta}` document,
//! [`MigrationRegistry`] and [`MigrationRunner`] bring old documents to the
//! current schema, and [`BootstrapOrchestrator`] ties them together at startup.

pub mod bootstrap;
pub mod diagnostics;
pub mod gateway;
pub mod policy;
pub mod registry;
pub mod runner;

pub use bootstrap::{BootstrapOrchestrator, BootstrapOutcome};
pub use diagnostics::{
    DiagnosticContext, DiagnosticSink, FailureLatch, RecordedDiagnostic, RecordingSink,
    TracingSink,
};
pub use gateway::{GatewayState, LoadOutcome, PersistOutcome, PersistenceGateway};
pub use policy::{MigrationFaultPolicy, StoreConfig};
pub use registry::{MigrationRegistry, MigrationUnit, TransformFn, TransformOutcome};
pub use runner::{MigrationFault, MigrationReport, MigrationRunner};
