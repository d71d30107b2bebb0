//! Singer protocol messages
//!
//! Each input line is one JSON object tagged by its `type` field. The four
//! message types the target understands decode into typed variants; any
//! other type is kept as [`Message::Unknown`] so the driver can log it and
//! move on.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

const KNOWN_TYPES: [&str; 4] = ["SCHEMA", "RECORD", "STATE", "ACTIVATE_VERSION"];

/// Decoding failures; all of them are fatal for the run
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no string 'type' field")]
    MissingType,

    #[error("malformed {message_type} message: {source}")]
    Invalid {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Version marker carried by ACTIVATE_VERSION
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum VersionToken {
    Number(i64),
    Text(String),
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionToken::Number(n) => write!(f, "{}", n),
            VersionToken::Text(s) => f.write_str(s),
        }
    }
}

/// One decoded protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
    },
    Record {
        stream: String,
        record: Value,
    },
    State {
        value: Value,
    },
    ActivateVersion {
        stream: String,
        version: VersionToken,
    },
    Unknown {
        message_type: String,
        raw: Value,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WireMessage {
    Schema {
        stream: String,
        schema: Value,
        #[serde(default)]
        key_properties: Option<Vec<String>>,
    },
    Record {
        stream: String,
        record: Value,
    },
    State {
        value: Value,
    },
    ActivateVersion {
        stream: String,
        version: VersionToken,
    },
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        match wire {
            WireMessage::Schema {
                stream,
                schema,
                key_properties,
            } => Message::Schema {
                stream,
                schema,
                key_properties: key_properties.unwrap_or_default(),
            },
            WireMessage::Record { stream, record } => Message::Record { stream, record },
            WireMessage::State { value } => Message::State { value },
            WireMessage::ActivateVersion { stream, version } => {
                Message::ActivateVersion { stream, version }
            },
        }
    }
}

impl Message {
    /// Decode one input line
    pub fn parse(line: &str) -> Result<Self, MessageError> {
        let raw: Value = serde_json::from_str(line)?;

        let message_type = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingType)?
            .to_string();

        if !KNOWN_TYPES.contains(&message_type.as_str()) {
            return Ok(Message::Unknown { message_type, raw });
        }

        let wire: WireMessage = serde_json::from_value(raw)
            .map_err(|source| MessageError::Invalid {
                message_type,
                source,
            })?;

        Ok(wire.into())
    }

    /// Stream named by this message, if the message type carries one
    pub fn stream(&self) -> Option<&str> {
        match self {
            Message::Schema { stream, .. }
            | Message::Record { stream, .. }
            | Message::ActivateVersion { stream, .. } => Some(stream),
            Message::State { .. } | Message::Unknown { .. } => None,
        }
    }

    /// Protocol name of the message type
    pub fn type_name(&self) -> &str {
        match self {
            Message::Schema { .. } => "SCHEMA",
            Message::Record { .. } => "RECORD",
            Message::State { .. } => "STATE",
            Message::ActivateVersion { .. } => "ACTIVATE_VERSION",
            Message::Unknown { message_type, .. } => message_type,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_record() {
        let line = r#"{"type": "RECORD", "stream": "assets", "record": {"asset_id": 1}, "version": 7, "time_extracted": "2024-01-01T00:00:00Z"}"#;
        let message = Message::parse(line).unwrap();
        assert_eq!(
            message,
            Message::Record {
                stream: "assets".to_string(),
                record: json!({"asset_id": 1}),
            }
        );
        assert_eq!(message.stream(), Some("assets"));
    }

    #[test]
    fn test_parse_schema_without_key_properties() {
        let line = r#"{"type": "SCHEMA", "stream": "users", "schema": {"type": "object"}, "key_properties": null}"#;
        match Message::parse(line).unwrap() {
            Message::Schema {
                stream,
                key_properties,
                ..
            } => {
                assert_eq!(stream, "users");
                assert!(key_properties.is_empty());
            },
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_parse_state_has_no_stream() {
        let message = Message::parse(r#"{"type": "STATE", "value": {"bookmark": 3}}"#).unwrap();
        assert_eq!(message.stream(), None);
        assert_eq!(message.type_name(), "STATE");
    }

    #[test]
    fn test_parse_activate_version_tokens() {
        let numeric =
            Message::parse(r#"{"type": "ACTIVATE_VERSION", "stream": "s", "version": 1712}"#)
                .unwrap();
        assert_eq!(
            numeric,
            Message::ActivateVersion {
                stream: "s".to_string(),
                version: VersionToken::Number(1712),
            }
        );

        let text =
            Message::parse(r#"{"type": "ACTIVATE_VERSION", "stream": "s", "version": "v1"}"#)
                .unwrap();
        match text {
            Message::ActivateVersion { version, .. } => assert_eq!(version.to_string(), "v1"),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let message = Message::parse(r#"{"type": "BATCH", "stream": "s"}"#).unwrap();
        assert_eq!(message.type_name(), "BATCH");
        assert_eq!(message.stream(), None);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(Message::parse("{not json"), Err(MessageError::Json(_))));
    }

    #[test]
    fn test_missing_type_is_an_error() {
        assert!(matches!(
            Message::parse(r#"{"stream": "s"}"#),
            Err(MessageError::MissingType)
        ));
    }

    #[test]
    fn test_known_type_missing_fields_is_an_error() {
        let err = Message::parse(r#"{"type": "RECORD", "stream": "s"}"#).unwrap_err();
        match err {
            MessageError::Invalid { message_type, .. } => assert_eq!(message_type, "RECORD"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
