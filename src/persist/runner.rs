use super::diagnostics::{DiagnosticContext, DiagnosticSink};
use super::policy::MigrationFaultPolicy;
use super::registry::{MigrationRegistry, MigrationUnit, TransformOutcome};
use crate::core::{Envelope, StoreError};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{Level, event, info_span};

/// A unit that did not complete, with the reason reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFault {
    pub version: u32,
    pub reason: String,
}

/// Result of one pass over the migration chain.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    pub envelope: Envelope,
    pub from_version: u32,
    /// Target versions whose unit completed, in application order.
    pub applied: Vec<u32>,
    pub faults: Vec<MigrationFault>,
    /// `true` when a fault stopped the chain before its end.
    pub halted: bool,
}

impl MigrationReport {
    pub fn version_changed(&self) -> bool {
        self.envelope.version() != self.from_version
    }
}

/// Walks the registry forward from an envelope's version.
///
/// Running never fails: a unit that reports malformed input, returns an error or
/// panics is contained at its boundary, reported once, and handled according to
/// the configured [`MigrationFaultPolicy`].
pub struct MigrationRunner {
    registry: Arc<MigrationRegistry>,
    sink: Arc<dyn DiagnosticSink>,
    fault_policy: MigrationFaultPolicy,
}

impl MigrationRunner {
    pub fn new(registry: Arc<MigrationRegistry>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            registry,
            sink,
            fault_policy: MigrationFaultPolicy::default(),
        }
    }

    pub fn with_fault_policy(mut self, policy: MigrationFaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Migrates the envelope as far as the chain allows.
    pub fn run(&self, envelope: Envelope) -> Envelope {
        self.run_with_report(envelope).envelope
    }

    pub fn run_with_report(&self, envelope: Envelope) -> MigrationReport {
        let from_version = envelope.version();
        let span = info_span!(
            "state.migrate",
            from_version,
            latest = ?self.registry.latest_version()
        );
        let _enter = span.enter();

        let mut report = MigrationReport {
            envelope,
            from_version,
            applied: Vec::new(),
            faults: Vec::new(),
            halted: false,
        };

        for unit in self.registry.units_after(from_version) {
            let version = unit.target_version();
            match self.apply_unit(unit, &report.envelope) {
                Ok(outcome) => {
                    if let TransformOutcome::Migrated(data) = outcome {
                        report.envelope.data = data;
                    }
                    report.envelope.meta.version = version;
                    report.applied.push(version);
                    event!(Level::DEBUG, version, "migration applied");
                }
                Err(reason) => {
                    let fault = StoreError::MigrationTransformFault {
                        version,
                        reason: reason.clone(),
                    };
                    self.sink.report(
                        &fault,
                        &DiagnosticContext::new("migrate").with_version(version),
                    );
                    report.faults.push(MigrationFault { version, reason });

                    match self.fault_policy {
                        MigrationFaultPolicy::Halt => {
                            event!(
                                Level::WARN,
                                version,
                                reached = report.envelope.version(),
                                "migration chain halted"
                            );
                            report.halted = true;
                            break;
                        }
                        MigrationFaultPolicy::SkipUnit => {
                            event!(Level::WARN, version, "migration skipped");
                            report.envelope.meta.version = version;
                        }
                    }
                }
            }
        }

        report
    }

    /// Runs one transform, folding malformed input, errors and panics into `Err(reason)`.
    fn apply_unit(
        &self,
        unit: &MigrationUnit,
        envelope: &Envelope,
    ) -> std::result::Result<TransformOutcome, String> {
        match catch_unwind(AssertUnwindSafe(|| unit.apply(envelope))) {
            Ok(Ok(TransformOutcome::Malformed(reason))) => Err(reason),
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => Err(err.to_string()),
            Err(payload) => Err(format!("transform panicked: {}", panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StateMap;
    use crate::persist::diagnostics::RecordingSink;
    use serde_json::json;

    fn set_flag(version: u32, flag: &'static str) -> MigrationUnit {
        MigrationUnit::new(version, move |envelope| {
            let mut data = envelope.data.clone();
            data.insert(flag.to_string(), json!(true));
            Ok(TransformOutcome::Migrated(data))
        })
    }

    fn runner_with(units: Vec<MigrationUnit>) -> (MigrationRunner, Arc<RecordingSink>) {
        let mut registry = MigrationRegistry::new();
        for unit in units {
            registry.register(unit).unwrap();
        }
        let sink = Arc::new(RecordingSink::new());
        (MigrationRunner::new(Arc::new(registry), sink.clone()), sink)
    }

    #[test]
    fn test_chain_applies_in_order() {
        let order_check = MigrationUnit::new(3, |envelope| {
            // must observe the output of unit 2
            if envelope.data.get("two") != Some(&json!(true)) {
                return Ok(TransformOutcome::Malformed("unit 2 not applied".to_string()));
            }
            Ok(TransformOutcome::Unchanged)
        });
        let (runner, sink) = runner_with(vec![set_flag(1, "one"), set_flag(2, "two"), order_check]);

        let report = runner.run_with_report(Envelope::new(0, StateMap::new()));
        assert_eq!(report.applied, vec![1, 2, 3]);
        assert_eq!(report.envelope.version(), 3);
        assert!(!report.halted);
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_only_newer_units_run() {
        let (runner, _) = runner_with(vec![set_flag(1, "one"), set_flag(2, "two")]);
        let out = runner.run(Envelope::new(1, StateMap::new()));
        assert_eq!(out.version(), 2);
        assert!(!out.data.contains_key("one"));
        assert!(out.data.contains_key("two"));
    }

    #[test]
    fn test_fully_migrated_is_noop() {
        let (runner, _) = runner_with(vec![set_flag(1, "one")]);
        let once = runner.run(Envelope::new(0, StateMap::new()));
        let twice = runner.run_with_report(once.clone());
        assert_eq!(twice.envelope, once);
        assert!(twice.applied.is_empty());
        assert!(!twice.version_changed());
    }

    #[test]
    fn test_malformed_halts_at_last_good_version() {
        let bad = MigrationUnit::new(2, |_| Ok(TransformOutcome::Malformed("broken".to_string())));
        let (runner, sink) = runner_with(vec![set_flag(1, "one"), bad, set_flag(3, "three")]);

        let report = runner.run_with_report(Envelope::new(0, StateMap::new()));
        assert_eq!(report.envelope.version(), 1);
        assert!(report.halted);
        assert!(!report.envelope.data.contains_key("three"));
        assert_eq!(
            report.faults,
            vec![MigrationFault {
                version: 2,
                reason: "broken".to_string()
            }]
        );
        assert_eq!(sink.count_kind("MigrationTransformFault"), 1);
    }

    #[test]
    fn test_skip_policy_continues_past_fault() {
        let bad = MigrationUnit::new(2, |_| Err(StoreError::Serialization("nope".to_string())));
        let (runner, sink) = runner_with(vec![set_flag(1, "one"), bad, set_flag(3, "three")]);
        let runner = runner.with_fault_policy(MigrationFaultPolicy::SkipUnit);

        let report = runner.run_with_report(Envelope::new(0, StateMap::new()));
        assert_eq!(report.envelope.version(), 3);
        assert_eq!(report.applied, vec![1, 3]);
        assert!(report.envelope.data.contains_key("three"));
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_panicking_transform_is_contained() {
        let panics = MigrationUnit::new(1, |_| panic!("bug in migration"));
        let (runner, sink) = runner_with(vec![panics]);

        let mut data = StateMap::new();
        data.insert("kept".to_string(), json!(1));
        let report = runner.run_with_report(Envelope::new(0, data.clone()));

        assert_eq!(report.envelope, Envelope::new(0, data));
        assert!(report.faults[0].reason.contains("bug in migration"));
        assert_eq!(sink.count(), 1);
    }
}
