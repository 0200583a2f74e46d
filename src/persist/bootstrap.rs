use super::gateway::{LoadOutcome, PersistOutcome, PersistenceGateway};
use super::runner::{MigrationReport, MigrationRunner};
use crate::core::{Result, StateMap, StateMeta, StoreError};
use serde_json::Value;
use tracing::{Instrument, Level, event, info_span};

/// What the application starts from.
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome {
    /// First run: default state at the current schema version.
    Fresh { state: StateMap, version: u32 },
    /// Persisted state brought up to date by the migration chain.
    Loaded {
        report: MigrationReport,
        /// Outcome of writing the migrated envelope back, when its version moved.
        write_back: Option<PersistOutcome>,
    },
    /// Persisted state existed but could not be read. No state is fabricated;
    /// nothing is written until [`BootstrapOrchestrator::recover`] is called.
    Corrupted,
}

impl BootstrapOutcome {
    /// The state to hand to the application, if any.
    pub fn state(&self) -> Option<&StateMap> {
        match self {
            Self::Fresh { state, .. } => Some(state),
            Self::Loaded { report, .. } => Some(&report.envelope.data),
            Self::Corrupted => None,
        }
    }

    pub fn version(&self) -> Option<u32> {
        match self {
            Self::Fresh { version, .. } => Some(*version),
            Self::Loaded { report, .. } => Some(report.envelope.version()),
            Self::Corrupted => None,
        }
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted)
    }
}

/// Composes load, migrate and write-back, and serializes every later write.
///
/// All persistence goes through `&mut self`, so two writes can never be in
/// flight at the same time.
pub struct BootstrapOrchestrator {
    gateway: PersistenceGateway,
    runner: MigrationRunner,
    default_state: StateMap,
    bootstrapped: bool,
}

impl BootstrapOrchestrator {
    pub fn new(gateway: PersistenceGateway, runner: MigrationRunner, default_state: StateMap) -> Self {
        Self {
            gateway,
            runner,
            default_state,
            bootstrapped: false,
        }
    }

    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    pub fn runner(&self) -> &MigrationRunner {
        &self.runner
    }

    /// Loads the persisted state once per process and prepares it for the application.
    pub async fn bootstrap(&mut self) -> Result<BootstrapOutcome> {
        if self.bootstrapped {
            return Err(StoreError::AlreadyBootstrapped);
        }
        self.bootstrapped = true;

        let current_version = self.runner.registry().current_version();
        let span = info_span!("state.bootstrap", current_version);
        self.load_and_migrate(current_version).instrument(span).await
    }

    async fn load_and_migrate(&mut self, current_version: u32) -> Result<BootstrapOutcome> {
        match self.gateway.load().await {
            LoadOutcome::FreshInstall => {
                self.gateway.set_metadata(StateMeta::new(current_version))?;
                event!(Level::INFO, "fresh install, using default state");
                Ok(BootstrapOutcome::Fresh {
                    state: self.default_state.clone(),
                    version: current_version,
                })
            }
            LoadOutcome::Corrupted => {
                self.gateway.set_metadata(StateMeta::new(current_version))?;
                event!(Level::WARN, "persisted state is corrupted, awaiting recovery");
                Ok(BootstrapOutcome::Corrupted)
            }
            LoadOutcome::Loaded(envelope) => {
                if envelope.version() > current_version {
                    event!(
                        Level::WARN,
                        stored_version = envelope.version(),
                        "persisted state is newer than the known schema"
                    );
                }

                let report = self.runner.run_with_report(envelope);
                self.gateway.set_metadata(report.envelope.meta)?;

                let write_back = if report.version_changed()
                    && self.gateway.config().write_back_after_migration
                {
                    let data = Value::Object(report.envelope.data.clone());
                    Some(self.gateway.persist(&data).await?)
                } else {
                    None
                };

                event!(
                    Level::INFO,
                    from_version = report.from_version,
                    version = report.envelope.version(),
                    applied = report.applied.len(),
                    "persisted state loaded"
                );
                Ok(BootstrapOutcome::Loaded { report, write_back })
            }
        }
    }

    /// Persists the application's current state.
    pub async fn persist(&mut self, state: &Value) -> Result<PersistOutcome> {
        self.gateway.persist(state).await
    }

    /// Records the user's decision to overwrite unreadable state, then persists `state`.
    pub async fn recover(&mut self, state: &Value) -> Result<PersistOutcome> {
        self.gateway.opt_into_recovery().await?;
        event!(Level::INFO, "user opted into state recovery");
        self.gateway.persist(state).await
    }
}
