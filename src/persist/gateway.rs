use super::diagnostics::{DiagnosticContext, DiagnosticSink, FailureLatch};
use super::policy::StoreConfig;
use crate::core::{DATA_KEY, Envelope, META_KEY, Result, StateMap, StateMeta, StoreError, json_type_name};
use crate::storage::{MarkerStore, StorageAdapter};
use chrono::Utc;
use log::{error, info, warn};
use serde_json::Value;
use std::sync::Arc;

/// Lifecycle of a gateway within one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Ready,
    /// The storage medium is missing. Terminal: loads yield a fresh install and
    /// persists fail fast.
    Unsupported,
}

/// Result of reading the persisted state.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(Envelope),
    /// Nothing stored and nothing ever was: a legitimate first run.
    FreshInstall,
    /// State existed but cannot be read back; needs user-driven recovery.
    Corrupted,
}

/// Result of a persist call that passed configuration checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    /// Corruption was detected earlier and the user has not opted into recovery.
    SkippedCorruption,
    /// The adapter rejected the write; reported and swallowed.
    Failed,
}

/// Owns the storage adapter and everything needed to use it safely: corruption
/// detection, the existence marker, the `{data, meta}` document format and
/// rate-limited failure reporting.
pub struct PersistenceGateway {
    adapter: Arc<dyn StorageAdapter>,
    markers: Arc<dyn MarkerStore>,
    sink: Arc<dyn DiagnosticSink>,
    config: StoreConfig,
    state: GatewayState,
    corruption_detected: bool,
    persistence_failures: FailureLatch,
    metadata: Option<StateMeta>,
    most_recent_retrieved: Option<Envelope>,
}

impl PersistenceGateway {
    /// Creates a gateway, probing whether the adapter's medium is available.
    pub async fn open(
        adapter: Arc<dyn StorageAdapter>,
        markers: Arc<dyn MarkerStore>,
        sink: Arc<dyn DiagnosticSink>,
        config: StoreConfig,
    ) -> Self {
        let state = if adapter.is_available().await {
            GatewayState::Ready
        } else {
            error!("Storage adapter not available, state will not be persisted");
            sink.report(
                &StoreError::AdapterUnavailable,
                &DiagnosticContext::new("open"),
            );
            GatewayState::Unsupported
        };

        Self {
            adapter,
            markers,
            sink,
            config,
            state,
            corruption_detected: false,
            persistence_failures: FailureLatch::new(),
            metadata: None,
            most_recent_retrieved: None,
        }
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    pub fn is_supported(&self) -> bool {
        self.state == GatewayState::Ready
    }

    pub fn is_corrupted(&self) -> bool {
        self.corruption_detected
    }

    pub fn is_persistence_failing(&self) -> bool {
        self.persistence_failures.is_latched()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn metadata(&self) -> Option<StateMeta> {
        self.metadata
    }

    /// Last envelope successfully read from storage, cleared by an empty read.
    pub fn most_recent_retrieved(&self) -> Option<&Envelope> {
        self.most_recent_retrieved.as_ref()
    }

    /// Sets the metadata written next to every persisted state. Allowed once.
    pub fn set_metadata(&mut self, meta: StateMeta) -> Result<()> {
        if self.metadata.is_some() {
            return Err(StoreError::MetadataAlreadyConfigured);
        }
        self.metadata = Some(meta);
        Ok(())
    }

    /// Reads the persisted envelope and classifies what was found.
    pub async fn load(&mut self) -> LoadOutcome {
        if !self.is_supported() {
            warn!("Storage adapter unsupported, starting from default state");
            return LoadOutcome::FreshInstall;
        }

        let stored = match self.adapter.get(None).await {
            Ok(stored) => stored,
            Err(err) => {
                self.corruption_detected = true;
                error!("error getting state from storage: {}", err);
                self.sink.report(&read_failure(err), &DiagnosticContext::new("load"));
                return LoadOutcome::Corrupted;
            }
        };

        if stored.is_empty() {
            self.most_recent_retrieved = None;
            return self.classify_empty_read().await;
        }

        self.record_existence().await;

        match Envelope::from_storage_map(stored) {
            Ok(envelope) => {
                self.most_recent_retrieved = Some(envelope.clone());
                LoadOutcome::Loaded(envelope)
            }
            Err(err) => {
                self.corruption_detected = true;
                error!("stored state could not be decoded: {}", err);
                self.sink.report(&err, &DiagnosticContext::new("load"));
                LoadOutcome::Corrupted
            }
        }
    }

    /// Writes `{data: state, meta}` to storage.
    ///
    /// Only configuration errors are returned as `Err`; adapter failures are
    /// reported (once per failing streak) and come back as [`PersistOutcome::Failed`].
    pub async fn persist(&mut self, state: &Value) -> Result<PersistOutcome> {
        if !self.is_supported() {
            return Err(StoreError::AdapterUnavailable);
        }
        let data = match state {
            Value::Null => return Err(StoreError::MissingState),
            Value::Object(data) => data,
            other => return Err(StoreError::InvalidState(json_type_name(Some(other)).to_string())),
        };
        let meta = self.metadata.ok_or(StoreError::MetadataNotConfigured)?;

        if self.corruption_detected && !self.is_recovery_opted_in().await {
            info!(
                "State corruption was detected and user has not opted into recovery, skipping state update"
            );
            return Ok(PersistOutcome::SkippedCorruption);
        }

        let mut document = StateMap::new();
        document.insert(DATA_KEY.to_string(), Value::Object(data.clone()));
        document.insert(META_KEY.to_string(), serde_json::to_value(meta)?);

        match self.adapter.set(document).await {
            Ok(()) => {
                self.persistence_failures.reset();
                Ok(PersistOutcome::Written)
            }
            Err(err) => {
                if self.persistence_failures.trip() {
                    self.sink.report(
                        &write_failure(err.clone()),
                        &DiagnosticContext::new("persist").with_version(meta.version),
                    );
                }
                error!("error setting state in storage: {}", err);
                Ok(PersistOutcome::Failed)
            }
        }
    }

    /// Records that the user accepted overwriting the unreadable state.
    pub async fn opt_into_recovery(&self) -> Result<()> {
        self.markers
            .set(&self.config.recovery_opt_in_key, "true")
            .await
    }

    pub async fn is_recovery_opted_in(&self) -> bool {
        match self.markers.get(&self.config.recovery_opt_in_key).await {
            Ok(value) => value.as_deref() == Some("true"),
            Err(err) => {
                warn!("could not read recovery opt-in marker: {}", err);
                false
            }
        }
    }

    async fn classify_empty_read(&mut self) -> LoadOutcome {
        match self.markers.get(&self.config.existence_marker_key).await {
            Ok(None) => LoadOutcome::FreshInstall,
            Ok(Some(first_seen)) => {
                self.corruption_detected = true;
                let err = StoreError::CorruptionDetected(format!(
                    "storage is empty but state was first observed at {}",
                    first_seen
                ));
                error!("{}", err);
                self.sink.report(&err, &DiagnosticContext::new("load"));
                LoadOutcome::Corrupted
            }
            Err(err) => {
                // Without the marker a loss cannot be ruled out, so never assume a fresh install.
                self.corruption_detected = true;
                error!("could not read existence marker: {}", err);
                self.sink.report(&err, &DiagnosticContext::new("load"));
                LoadOutcome::Corrupted
            }
        }
    }

    async fn record_existence(&self) {
        let key = &self.config.existence_marker_key;
        if let Ok(Some(_)) = self.markers.get(key).await {
            return;
        }
        let now = Utc::now().timestamp_millis().to_string();
        if let Err(err) = self.markers.set(key, &now).await {
            warn!("could not record existence marker: {}", err);
        }
    }
}

fn read_failure(err: StoreError) -> StoreError {
    match err {
        StoreError::StorageRead(_) => err,
        other => StoreError::StorageRead(other.to_string()),
    }
}

fn write_failure(err: StoreError) -> StoreError {
    match err {
        StoreError::StorageWrite(_) => err,
        other => StoreError::StorageWrite(other.to_string()),
    }
}
