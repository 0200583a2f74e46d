use serde_json::{Value, json};
use statekeep::migrations::{default_registry, m113};
use statekeep::{Envelope, MigrationRunner, RecordingSink, StateMap};
use std::sync::Arc;

fn runner() -> (MigrationRunner, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let runner = MigrationRunner::new(Arc::new(default_registry().unwrap()), sink.clone());
    (runner, sink)
}

fn envelope(version: u32, data: Value) -> Envelope {
    match data {
        Value::Object(map) => Envelope::new(version, map),
        _ => panic!("fixture must be an object"),
    }
}

fn eth_accounts(origin: &str, id: &str, date: u64, account: &str) -> Value {
    json!({
        "caveats": [{"type": "restrictReturnedAccounts", "value": [account]}],
        "date": date,
        "id": id,
        "invoker": origin,
        "parentCapability": "eth_accounts"
    })
}

#[test]
fn adds_is_first_visit_to_every_permission() {
    let (runner, sink) = runner();
    let old = envelope(
        112,
        json!({
            "PermissionController": {
                "subjects": {
                    "pancakeswap.finance": {
                        "origin": "https://pancakeswap.finance",
                        "permissions": {
                            "eth_accounts": eth_accounts("https://pancakeswap.finance", "id", 1709824222665, "pancakevalue")
                        }
                    },
                    "chainlist.org": {
                        "origin": "https://chainlist.org",
                        "permissions": {
                            "eth_accounts": eth_accounts("https://chainlist.org", "chainlistid", 1709175588114, "chainlistvalue")
                        }
                    }
                }
            }
        }),
    );

    let mut expected_pancake = eth_accounts("https://pancakeswap.finance", "id", 1709824222665, "pancakevalue");
    expected_pancake["isFirstVisit"] = json!(false);
    let mut expected_chainlist = eth_accounts("https://chainlist.org", "chainlistid", 1709175588114, "chainlistvalue");
    expected_chainlist["isFirstVisit"] = json!(false);

    let migrated = runner.run(old);
    assert_eq!(
        migrated,
        envelope(
            m113::VERSION,
            json!({
                "PermissionController": {
                    "subjects": {
                        "pancakeswap.finance": {
                            "origin": "https://pancakeswap.finance",
                            "permissions": {"eth_accounts": expected_pancake}
                        },
                        "chainlist.org": {
                            "origin": "https://chainlist.org",
                            "permissions": {"eth_accounts": expected_chainlist}
                        }
                    }
                }
            })
        )
    );
    assert_eq!(sink.count(), 0);
}

#[test]
fn non_object_controller_is_left_untouched_and_reported_once() {
    let (runner, sink) = runner();
    let old = envelope(
        112,
        json!({"PermissionController": false, "testProperty": "testValue"}),
    );
    let before = serde_json::to_vec(&old.data).unwrap();

    let migrated = runner.run(old.clone());

    assert_eq!(serde_json::to_vec(&migrated.data).unwrap(), before);
    assert_eq!(migrated.version(), 112);
    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].message().contains("boolean"));
    assert_eq!(reports[0].context.version, Some(m113::VERSION));
}

#[test]
fn missing_controller_is_reported_as_undefined() {
    let (runner, sink) = runner();
    let old = envelope(112, json!({"testProperty": "testValue"}));

    let migrated = runner.run(old.clone());

    assert_eq!(migrated, old);
    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert!(
        reports[0]
            .message()
            .contains("typeof state.PermissionController is undefined")
    );
}

#[test]
fn subjects_without_permissions_migrate_silently() {
    let (runner, sink) = runner();
    let data = json!({
        "PermissionController": {
            "testPermissionControllerProperty": "testPermissionControllerValue",
            "subjects": {"testSubjectKey": "testSubjectKey"}
        },
        "testProperty": "testValue"
    });

    let migrated = runner.run(envelope(112, data.clone()));

    assert_eq!(migrated, envelope(m113::VERSION, data));
    assert_eq!(sink.count(), 0);
}

#[test]
fn already_migrated_state_is_a_noop() {
    let (runner, sink) = runner();
    let current = envelope(m113::VERSION, json!({"PermissionController": false}));
    assert_eq!(runner.run(current.clone()), current);
    assert_eq!(sink.count(), 0);

    let empty = Envelope::new(m113::VERSION, StateMap::new());
    assert_eq!(runner.run(empty.clone()), empty);
}
