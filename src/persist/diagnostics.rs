use crate::core::StoreError;
use std::sync::Mutex;
use tracing::{Level, event};

/// Where a diagnostic was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticContext {
    pub operation: &'static str,
    pub version: Option<u32>,
}

impl DiagnosticContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            version: None,
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }
}

/// Receiver of diagnostic events (error reporting, telemetry).
///
/// `report` is fire-and-forget: implementations must not block and must not
/// panic back into the store.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, error: &StoreError, context: &DiagnosticContext);
}

/// Forwards every diagnostic to `tracing` at ERROR level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, error: &StoreError, context: &DiagnosticContext) {
        event!(
            Level::ERROR,
            kind = error.kind(),
            operation = context.operation,
            version = ?context.version,
            "{}",
            error
        );
    }
}

/// A diagnostic kept by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDiagnostic {
    pub error: StoreError,
    pub context: DiagnosticContext,
}

impl RecordedDiagnostic {
    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

/// Keeps every report in memory, e.g. to surface them in a support bundle.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<RecordedDiagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<RecordedDiagnostic> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.reports.lock().map(|reports| reports.len()).unwrap_or(0)
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.reports
            .lock()
            .map(|reports| reports.iter().filter(|r| r.error.kind() == kind).count())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.clear();
        }
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, error: &StoreError, context: &DiagnosticContext) {
        // A poisoned lock drops the report rather than panicking the caller.
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(RecordedDiagnostic {
                error: error.clone(),
                context: context.clone(),
            });
        }
    }
}

/// "Already reported" latch for one failure class.
///
/// The first failure of a run trips the latch and should be reported; the
/// following ones are silent until a success resets it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FailureLatch {
    latched: bool,
}

impl FailureLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure. Returns `true` when this failure should be reported.
    pub fn trip(&mut self) -> bool {
        let first = !self.latched;
        self.latched = true;
        first
    }

    pub fn reset(&mut self) {
        self.latched = false;
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }
}
