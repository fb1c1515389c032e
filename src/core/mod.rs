pub mod error;
pub mod value;

pub use error::{Result, TtmError};
pub use value::{DATE_FORMAT, DataType, TIMESTAMP_FORMAT, Value};

/// Wire record exchanged with callers: field name to JSON value.
pub type WireRecord = serde_json::Map<String, serde_json::Value>;
