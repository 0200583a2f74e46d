pub mod envelope;
pub mod error;

pub use envelope::{DATA_KEY, Envelope, META_KEY, StateMap, StateMeta, json_type_name};
pub use error::{Result, StoreError};
