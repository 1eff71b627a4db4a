//! Frame encoding and decoding.
//!
//! Turns `Command`s into text frames and text frames into `ServerMessage`s.
//! The codec is stateless; the session owns one and calls it for every frame.
//!
//! # Examples
//!
//! ```ignore
//! let codec = JsonCodec;
//!
//! let frame = codec.encode(&Command::StartSensorStream)?;
//! assert_eq!(frame, r#"{"StartSensorStream":null}"#);
//!
//! let msg = codec.decode(r#"{"success":true,"message":"ok"}"#)?;
//! assert!(msg.success);
//! ```

use serde_json::{Map, Value};

use super::{
    error::SessionError,
    message::{Command, SENSOR_MAX, ServerMessage},
};

/// Trait for turning commands into frames and frames into messages.
pub trait FrameCodec: Send + Sync {
    /// Encodes one outbound command.
    fn encode(&self, command: &Command) -> Result<String, SessionError>;

    /// Decodes one inbound frame.
    ///
    /// Fails with `SessionError::Decode` for anything that is not a valid
    /// server message, including out-of-range sensor readings.
    fn decode(&self, frame: &str) -> Result<ServerMessage, SessionError>;
}

/// JSON codec using serde_json.
#[derive(Debug, Copy, Clone, Default)]
pub struct JsonCodec;

impl FrameCodec for JsonCodec {
    fn encode(&self, command: &Command) -> Result<String, SessionError> {
        let value =
            serde_json::to_value(command).map_err(|e| SessionError::Encode(e.to_string()))?;

        // serde writes unit variants as a bare string; the server wants {"Tag":null}
        let value = match value {
            Value::String(tag) => {
                let mut object = Map::with_capacity(1);
                object.insert(tag, Value::Null);
                Value::Object(object)
            }
            other => other,
        };

        serde_json::to_string(&value).map_err(|e| SessionError::Encode(e.to_string()))
    }

    fn decode(&self, frame: &str) -> Result<ServerMessage, SessionError> {
        let message: ServerMessage = serde_json::from_str(frame)?;

        if let Some(raw) = message.sensor_values {
            if let Some(bad) = raw.iter().find(|v| !(0..=SENSOR_MAX).contains(*v)) {
                return Err(SessionError::Decode(format!(
                    "sensor reading {bad} outside 0..={SENSOR_MAX}"
                )));
            }
        }

        Ok(message)
    }
}
