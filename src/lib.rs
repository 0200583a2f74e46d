// ============================================================================
// statekeep Library
// ============================================================================

pub mod core;
pub mod migrations;
pub mod persist;
pub mod storage;

// Re-export main types for convenience
pub use crate::core::{Envelope, Result, StateMap, StateMeta, StoreError};
pub use persist::{
    BootstrapOrchestrator, BootstrapOutcome, DiagnosticContext, DiagnosticSink, FailureLatch,
    GatewayState, LoadOutcome, MigrationFault, MigrationFaultPolicy, MigrationRegistry,
    MigrationReport, MigrationRunner, MigrationUnit, PersistOutcome, PersistenceGateway,
    RecordedDiagnostic, RecordingSink, StoreConfig, TracingSink, TransformOutcome,
};
pub use storage::{
    FileMarkerStore, FileStorageAdapter, MarkerStore, MemoryMarkerStore, MemoryStorageAdapter,
    ReadOnlyMarkerStore, StorageAdapter,
};

// ============================================================================
// High-level opening API
// ============================================================================

use std::sync::Arc;

/// Wires a gateway, a runner and an orchestrator from their parts.
///
/// This is the recommended way to embed the store in an application.
///
/// # Examples
///
/// ```
/// use statekeep::{
///     BootstrapOutcome, MemoryMarkerStore, MemoryStorageAdapter, StateMap, StoreConfig,
///     TracingSink, migrations, open_store,
/// };
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> statekeep::Result<()> {
/// let mut store = open_store(
///     Arc::new(MemoryStorageAdapter::new()),
///     Arc::new(MemoryMarkerStore::new()),
///     Arc::new(TracingSink),
///     migrations::default_registry()?,
///     StoreConfig::default(),
///     StateMap::new(),
/// )
/// .await;
///
/// let outcome = store.bootstrap().await?;
/// assert!(matches!(outcome, BootstrapOutcome::Fresh { version: 113, .. }));
/// # Ok(())
/// # }
/// ```
pub async fn open_store(
    adapter: Arc<dyn StorageAdapter>,
    markers: Arc<dyn MarkerStore>,
    sink: Arc<dyn DiagnosticSink>,
    registry: MigrationRegistry,
    config: StoreConfig,
    default_state: StateMap,
) -> BootstrapOrchestrator {
    let runner = MigrationRunner::new(Arc::new(registry), sink.clone())
        .with_fault_policy(config.fault_policy);
    let gateway = PersistenceGateway::open(adapter, markers, sink, config).await;
    BootstrapOrchestrator::new(gateway, runner, default_state)
}
