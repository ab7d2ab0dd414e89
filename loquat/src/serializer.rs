// Argument serialization boundary

use crate::errors::SerializerError;
use serde_json::Value;

/// Encodes routine arguments for storage and reconstructs them at
/// dispatch time. `decode(encode(v))` must reproduce `v` for every
/// value the hosting application schedules with.
///
/// The default implementation is JSON, which covers primitives,
/// sequences, and mappings safely. Custom implementations may support
/// richer object graphs; decoding formats that can execute arbitrary
/// code during deserialization is the integration's own risk.
pub trait ArgSerializer: Send + Sync {
    fn encode(&self, value: &Value) -> Result<String, SerializerError>;
    fn decode(&self, raw: &str) -> Result<Value, SerializerError>;
}

/// Default serializer: arguments as a JSON text column.
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer;

impl ArgSerializer for JsonSerializer {
    fn encode(&self, value: &Value) -> Result<String, SerializerError> {
        serde_json::to_string(value).map_err(|e| SerializerError::Encode(e.to_string()))
    }

    fn decode(&self, raw: &str) -> Result<Value, SerializerError> {
        serde_json::from_str(raw).map_err(|e| SerializerError::Decode(e.to_string()))
    }
}
