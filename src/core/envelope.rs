use super::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Application state partitioned by controller name.
pub type StateMap = Map<String, Value>;

/// Storage key holding the controller state inside the persisted document.
pub const DATA_KEY: &str = "data";
/// Storage key holding the [`StateMeta`] inside the persisted document.
pub const META_KEY: &str = "meta";

/// Metadata persisted next to the state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateMeta {
    /// Schema version of `data`.
    pub version: u32,
}

impl StateMeta {
    pub fn new(version: u32) -> Self {
        Self { version }
    }
}

/// The versioned `{meta, data}` wrapper persisted as one unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub meta: StateMeta,
    pub data: StateMap,
}

impl Envelope {
    pub fn new(version: u32, data: StateMap) -> Self {
        Self {
            meta: StateMeta::new(version),
            data,
        }
    }

    pub fn version(&self) -> u32 {
        self.meta.version
    }

    /// Looks up one controller partition.
    pub fn controller(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Rebuilds an envelope from the raw key-value map returned by a storage adapter.
    pub fn from_storage_map(map: StateMap) -> Result<Self> {
        serde_json::from_value(Value::Object(map)).map_err(|err| {
            StoreError::CorruptionDetected(format!("stored document is not an envelope: {}", err))
        })
    }

    /// Flattens the envelope into the key-value map handed to a storage adapter.
    pub fn to_storage_map(&self) -> Result<StateMap> {
        let mut map = StateMap::new();
        map.insert(DATA_KEY.to_string(), Value::Object(self.data.clone()));
        map.insert(META_KEY.to_string(), serde_json::to_value(self.meta)?);
        Ok(map)
    }
}

/// Name of the JSON type of an optional value, `undefined` when absent.
///
/// Used to build diagnostics that say what a malformed partition actually held.
pub fn json_type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}
