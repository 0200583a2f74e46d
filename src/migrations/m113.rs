//! Version 113: every dapp permission records whether the site is being visited
//! for the first time. Existing permissions are marked `isFirstVisit: false`.

use crate::core::{StateMap, json_type_name};
use crate::persist::{MigrationUnit, TransformOutcome};
use serde_json::Value;

pub const VERSION: u32 = 113;

const PERMISSION_CONTROLLER: &str = "PermissionController";

pub fn unit() -> MigrationUnit {
    MigrationUnit::new(VERSION, |envelope| Ok(transform_state(&envelope.data)))
        .with_description("add isFirstVisit=false to every subject permission")
}

/// Returns the state unchanged (and why, when it is malformed) rather than
/// editing a shape it does not recognize.
pub fn transform_state(state: &StateMap) -> TransformOutcome {
    let controller = match state.get(PERMISSION_CONTROLLER) {
        Some(Value::Object(controller)) => controller,
        other => {
            return TransformOutcome::Malformed(format!(
                "typeof state.PermissionController is {}",
                json_type_name(other)
            ));
        }
    };

    let subjects = match controller.get("subjects") {
        Some(Value::Object(subjects)) => subjects,
        other => {
            return TransformOutcome::Malformed(format!(
                "typeof PermissionController.subjects is {}",
                json_type_name(other)
            ));
        }
    };

    if subjects.is_empty() {
        return TransformOutcome::Unchanged;
    }

    let mut updated_subjects = subjects.clone();
    for subject in updated_subjects.values_mut() {
        let Some(permissions) = subject
            .as_object_mut()
            .and_then(|subject| subject.get_mut("permissions"))
            .and_then(Value::as_object_mut)
        else {
            return TransformOutcome::Unchanged;
        };

        for permission in permissions.values_mut() {
            let Some(permission) = permission.as_object_mut() else {
                return TransformOutcome::Unchanged;
            };
            permission.insert("isFirstVisit".to_string(), Value::Bool(false));
        }
    }

    let mut updated_controller = controller.clone();
    updated_controller.insert("subjects".to_string(), Value::Object(updated_subjects));

    let mut updated = state.clone();
    updated.insert(
        PERMISSION_CONTROLLER.to_string(),
        Value::Object(updated_controller),
    );
    TransformOutcome::Migrated(updated)
}
