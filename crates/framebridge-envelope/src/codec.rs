use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// Key of the protocol tag. Its value must be exactly `true`.
pub const PROTOCOL_TAG: &str = "isMobifyFrameBridge";

const EVENT_NAME_KEY: &str = "eventName";
const DATA_KEY: &str = "data";

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Semantic event identifier.
    pub event_name: String,
    /// Payload. `Value::Null` when the sender attached none.
    pub data: Value,
}

impl Envelope {
    /// Create an envelope.
    pub fn new(event_name: impl Into<String>, data: Value) -> Self {
        Self {
            event_name: event_name.into(),
            data,
        }
    }

    /// Encode this envelope into its wire string.
    pub fn encode(&self) -> String {
        encode(&self.event_name, &self.data)
    }
}

/// Encode an event into the wire format.
///
/// Wire format:
/// ```text
/// {"data":<any>,"eventName":"<name>","isMobifyFrameBridge":true}
/// ```
///
/// A `Value::Null` payload is left out, matching a sender with no data.
pub fn encode(event_name: &str, data: &Value) -> String {
    let mut object = Map::with_capacity(3);
    object.insert(
        EVENT_NAME_KEY.to_string(),
        Value::String(event_name.to_string()),
    );
    if !data.is_null() {
        object.insert(DATA_KEY.to_string(), data.clone());
    }
    object.insert(PROTOCOL_TAG.to_string(), Value::Bool(true));
    Value::Object(object).to_string()
}

/// Encode an event whose payload is any serializable value.
pub fn encode_serialized<T: Serialize>(event_name: &str, data: &T) -> Result<String> {
    let data = serde_json::to_value(data)?;
    Ok(encode(event_name, &data))
}

/// Decode a raw message event payload.
///
/// Returns `None` when `raw` is not a string, is not a JSON object with a
/// string `eventName`, or lacks the protocol tag.
pub fn decode(raw: &Value) -> Option<Envelope> {
    match raw {
        Value::String(text) => decode_str(text),
        _ => {
            tracing::trace!("ignoring non-string message payload");
            None
        }
    }
}

/// Decode a wire string.
pub fn decode_str(raw: &str) -> Option<Envelope> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::trace!(error = %err, "ignoring unparsable message payload");
            return None;
        }
    };

    let Value::Object(mut object) = value else {
        return None;
    };

    if object.get(PROTOCOL_TAG) != Some(&Value::Bool(true)) {
        tracing::trace!("ignoring untagged message payload");
        return None;
    }

    let event_name = match object.remove(EVENT_NAME_KEY) {
        Some(Value::String(name)) => name,
        _ => return None,
    };
    let data = object.remove(DATA_KEY).unwrap_or(Value::Null);

    Some(Envelope { event_name, data })
}
