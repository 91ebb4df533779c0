//! Inbound server events.
//!
//! Each text frame on the channel is one JSON object tagged by `type`.
//! Types this client does not know decode to [`ServerEvent::Unknown`] so the
//! stream keeps flowing when the server adds new events.

use serde::Deserialize;
use thiserror::Error;

use crate::turn::Millis;

// ---------------------------------------------------------------------------
// MalformedEvent
// ---------------------------------------------------------------------------

/// An inbound message that could not be turned into a [`ServerEvent`].
/// Logged and dropped; never fatal.
#[derive(Debug, Error)]
pub enum MalformedEvent {
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected binary message ({len} bytes)")]
    Binary { len: usize },
}

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Partial transcription fragment.
    SttChunk { timestamp: Millis, text: String },
    /// Authoritative transcription for the utterance.
    SttOutput { timestamp: Millis, text: String },
    /// Streamed agent text.
    AgentChunk { timestamp: Millis, text: String },
    /// Authoritative agent response.
    AgentEnd { timestamp: Millis, text: String },
    ToolCall {
        timestamp: Millis,
        tool_name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    ToolReturn {
        timestamp: Millis,
        tool_name: String,
        #[serde(default)]
        result: serde_json::Value,
        #[serde(default)]
        args: serde_json::Value,
    },
    /// Synthesized speech, base64-encoded.
    TtsChunk { timestamp: Millis, audio: String },
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// The wire `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::SttChunk { .. } => "stt_chunk",
            ServerEvent::SttOutput { .. } => "stt_output",
            ServerEvent::AgentChunk { .. } => "agent_chunk",
            ServerEvent::AgentEnd { .. } => "agent_end",
            ServerEvent::ToolCall { .. } => "tool_call",
            ServerEvent::ToolReturn { .. } => "tool_return",
            ServerEvent::TtsChunk { .. } => "tts_chunk",
            ServerEvent::Unknown => "unknown",
        }
    }
}

/// Decode one text frame.
///
/// ```
/// use voice_agent_client::router::{decode, ServerEvent};
///
/// let ev = decode(r#"{"type":"stt_chunk","timestamp":0,"text":"hel"}"#).unwrap();
/// assert_eq!(ev, ServerEvent::SttChunk { timestamp: 0.0, text: "hel".into() });
///
/// assert_eq!(decode(r#"{"type":"interrupt"}"#).unwrap(), ServerEvent::Unknown);
/// assert!(decode("not json").is_err());
/// ```
pub fn decode(text: &str) -> Result<ServerEvent, MalformedEvent> {
    Ok(serde_json::from_str(text)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_every_known_type() {
        let cases = [
            (json!({"type":"stt_chunk","timestamp":1,"text":"a"}), "stt_chunk"),
            (json!({"type":"stt_output","timestamp":1,"text":"a"}), "stt_output"),
            (json!({"type":"agent_chunk","timestamp":1,"text":"a"}), "agent_chunk"),
            (json!({"type":"agent_end","timestamp":1,"text":"a"}), "agent_end"),
            (
                json!({"type":"tool_call","timestamp":1,"tool_name":"t","args":{"x":1}}),
                "tool_call",
            ),
            (
                json!({"type":"tool_return","timestamp":1,"tool_name":"t","result":"ok","args":{}}),
                "tool_return",
            ),
            (json!({"type":"tts_chunk","timestamp":1,"audio":"AQID"}), "tts_chunk"),
        ];
        for (value, kind) in cases {
            let ev = decode(&value.to_string()).unwrap();
            assert_eq!(ev.kind(), kind);
        }
    }

    #[test]
    fn fractional_timestamps_are_kept() {
        let ev = decode(r#"{"type":"agent_end","timestamp":1712.5,"text":"x"}"#).unwrap();
        assert_eq!(
            ev,
            ServerEvent::AgentEnd {
                timestamp: 1712.5,
                text: "x".into()
            }
        );
    }

    #[test]
    fn tool_call_without_args_defaults_to_null() {
        let ev = decode(r#"{"type":"tool_call","timestamp":3,"tool_name":"lookup"}"#).unwrap();
        match ev {
            ServerEvent::ToolCall { tool_name, args, .. } => {
                assert_eq!(tool_name, "lookup");
                assert!(args.is_null());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let ev = decode(r#"{"type":"interrupt","timestamp":5}"#).unwrap();
        assert_eq!(ev, ServerEvent::Unknown);
    }

    #[test]
    fn missing_fields_are_malformed() {
        assert!(matches!(
            decode(r#"{"type":"stt_chunk","text":"a"}"#),
            Err(MalformedEvent::Json(_))
        ));
        assert!(decode(r#"{"text":"no type"}"#).is_err());
        assert!(decode("[1,2,3]").is_err());
    }
}
