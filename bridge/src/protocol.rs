// Bridge protocol - shared message shapes for every cross-context exchange
// Uses newline-framed JSON so no context ever shares memory with another

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Maximum size of a request frame (1MB)
pub const MAX_REQUEST_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum size of a response frame (10MB)
pub const MAX_RESPONSE_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Message vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    OpenModal,
    CloseModal,
    SaveFile,
    LoadFile,
    PickDirectory,
    /// Emitted by the privileged context once it is initialized
    PrivilegedReady,
    /// Coordinator -> privileged: resolve (or re-pick) the target directory
    EnsureDirectory,
    /// Coordinator -> privileged: write one file under the target directory
    WriteFile,
    Ping,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::OpenModal,
        Action::CloseModal,
        Action::SaveFile,
        Action::LoadFile,
        Action::PickDirectory,
        Action::PrivilegedReady,
        Action::EnsureDirectory,
        Action::WriteFile,
        Action::Ping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::OpenModal => "OPEN_MODAL",
            Action::CloseModal => "CLOSE_MODAL",
            Action::SaveFile => "SAVE_FILE",
            Action::LoadFile => "LOAD_FILE",
            Action::PickDirectory => "PICK_DIRECTORY",
            Action::PrivilegedReady => "PRIVILEGED_READY",
            Action::EnsureDirectory => "ENSURE_DIRECTORY",
            Action::WriteFile => "WRITE_FILE",
            Action::Ping => "PING",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("Unknown action: {}", s))
    }
}

/// A request crossing a context boundary
///
/// The action stays a plain string on the wire so one channel can carry every
/// request shape; handlers decode the payload they expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMessage {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    /// Unix milliseconds at dispatch
    pub timestamp: i64,
}

impl ActionMessage {
    pub fn new(action: Action, payload: impl Serialize) -> Self {
        Self {
            action: action.as_str().to_string(),
            // Payload structs are plain data; a failure here means a non-string map key
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Message with an empty object payload
    pub fn bare(action: Action) -> Self {
        Self::new(action, serde_json::json!({}))
    }

    /// Known action, or `None` for vocabulary this build does not speak
    pub fn kind(&self) -> Option<Action> {
        self.action.parse().ok()
    }

    /// Decode the payload into the shape the handler expects
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        // Null payloads decode as `{}` so all-optional payload structs still work
        match &self.payload {
            Value::Null => serde_json::from_value(Value::Object(Default::default())),
            other => T::deserialize(other),
        }
    }
}

/// Payload of `SAVE_FILE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFilePayload {
    pub content: String,
}

/// Payload of `LOAD_FILE`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadFilePayload {
    #[serde(default)]
    pub selected_text: Option<String>,
}

/// Payload of `ENSURE_DIRECTORY`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsureDirectoryPayload {
    /// Prompt even when a valid cached directory exists
    #[serde(default)]
    pub repick: bool,
}

/// Payload of `WRITE_FILE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFilePayload {
    pub filepath: String,
    pub body: String,
}

/// The reply matching one `ActionMessage`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn directory(dir_name: impl Into<String>) -> Self {
        Self {
            success: true,
            dir_name: Some(dir_name.into()),
            ..Self::default()
        }
    }

    pub fn saved(filepath: impl Into<String>) -> Self {
        Self {
            success: true,
            filepath: Some(filepath.into()),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            success: false,
            cancelled: Some(true),
            ..Self::default()
        }
    }

    pub fn unknown_action() -> Self {
        Self::failure("unknown action")
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled == Some(true)
    }
}

// ============================================================================
// Helpers for message framing
// ============================================================================

/// Serialize a message to JSON bytes with newline delimiter
pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Deserialize a message from JSON bytes (strips trailing newline)
pub fn deserialize_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    let trimmed = if bytes.last() == Some(&b'\n') {
        &bytes[..bytes.len() - 1]
    } else {
        bytes
    };
    serde_json::from_slice(trimmed)
}

/// Serialize and enforce a frame limit
pub fn encode_frame<T: Serialize>(msg: &T, max: usize) -> Result<Vec<u8>, TransportError> {
    let bytes = serialize_message(msg)?;
    if bytes.len() > max {
        return Err(TransportError::FrameTooLarge {
            size: bytes.len(),
            max,
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_roundtrip() {
        for action in Action::ALL {
            let s = action.to_string();
            let parsed: Action = s.parse().unwrap();
            assert_eq!(action, parsed);
            assert_eq!(
                serde_json::to_value(action).unwrap(),
                Value::String(s.clone())
            );
        }
    }

    #[test]
    fn test_unknown_action_kind_is_none() {
        let msg = ActionMessage {
            action: "FORMAT_DISK".to_string(),
            payload: Value::Null,
            timestamp: 0,
        };
        assert_eq!(msg.kind(), None);
    }

    #[test]
    fn test_message_serialization() {
        let msg = ActionMessage::new(
            Action::SaveFile,
            SaveFilePayload {
                content: "// a.txt\nhi".to_string(),
            },
        );

        let bytes = serialize_message(&msg).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        let parsed: ActionMessage = deserialize_message(&bytes).unwrap();

        assert_eq!(parsed.kind(), Some(Action::SaveFile));
        let payload: SaveFilePayload = parsed.payload().unwrap();
        assert_eq!(payload.content, "// a.txt\nhi");
        assert!(parsed.timestamp > 0);
    }

    #[test]
    fn test_null_payload_decodes_defaults() {
        let msg = ActionMessage {
            action: "ENSURE_DIRECTORY".to_string(),
            payload: Value::Null,
            timestamp: 1,
        };
        let payload: EnsureDirectoryPayload = msg.payload().unwrap();
        assert!(!payload.repick);
    }

    #[test]
    fn test_response_wire_shape() {
        let json = serde_json::to_value(ActionResponse::directory("notes")).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "dirName": "notes"}));

        let json = serde_json::to_value(ActionResponse::cancelled()).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "cancelled": true}));

        let json = serde_json::to_value(ActionResponse::unknown_action()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": false, "error": "unknown action"})
        );
    }

    #[test]
    fn test_load_payload_uses_camel_case() {
        let payload = LoadFilePayload {
            selected_text: Some("a/b.txt".to_string()),
        };
        let json = serde_json::to_value(payload).unwrap();
        assert_eq!(json, serde_json::json!({"selectedText": "a/b.txt"}));
    }

    #[test]
    fn test_encode_frame_rejects_oversized() {
        let msg = ActionMessage::new(
            Action::SaveFile,
            SaveFilePayload {
                content: "x".repeat(64),
            },
        );
        let err = encode_frame(&msg, 16).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { max: 16, .. }));
    }
}
