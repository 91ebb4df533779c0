//! Pure event dispatch: `(Turn, ServerEvent) → (Turn, [Effect])`.
//!
//! [`dispatch`] applies exactly one turn transition per event and describes
//! everything else that must happen as [`Effect`]s.  It performs no I/O;
//! the session core executes the effects in order.

use serde_json::json;

use super::events::ServerEvent;
use crate::turn::{ActivityKind, SpeechAudio, SpeechFragment, Turn, TurnSnapshot};

/// Side effect requested by a dispatched event.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append to the activity feed.
    Activity {
        kind: ActivityKind,
        label: String,
        text: String,
        args: Option<serde_json::Value>,
    },
    /// Append a console line.
    Log(String),
    /// Show a turn in the waterfall without recording its latency.
    Waterfall(TurnSnapshot),
    /// The live turn changed; observers should refresh.
    TurnChanged,
    /// Push a base64 audio chunk to playback immediately.
    Play(String),
    /// (Re)arm the finalize debounce timer.
    ArmFinalize,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub turn: Turn,
    pub effects: Vec<Effect>,
}

/// Apply `event` to `turn`.
///
/// ```
/// use voice_agent_client::router::{dispatch, Effect, ServerEvent};
/// use voice_agent_client::turn::Turn;
///
/// let routed = dispatch(
///     Turn::new(),
///     ServerEvent::SttChunk { timestamp: 0.0, text: "hel".into() },
/// );
/// assert!(routed.turn.is_active());
/// assert_eq!(routed.effects, vec![Effect::TurnChanged]);
/// ```
pub fn dispatch(mut turn: Turn, event: ServerEvent) -> Routed {
    log::debug!("router: {} ({})", event.kind(), turn.phase().label());
    let mut effects = Vec::new();

    match event {
        ServerEvent::SttChunk { timestamp, text } => {
            if let SpeechFragment::Started {
                previous: Some(previous),
            } = turn.speech_fragment(timestamp, &text)
            {
                effects.push(Effect::Waterfall(previous));
            }
            effects.push(Effect::TurnChanged);
        }

        ServerEvent::SttOutput { timestamp, text } => {
            if turn.transcription_final(timestamp, &text) {
                effects.push(Effect::TurnChanged);
            } else {
                log::warn!("router: stt_output with no active turn");
            }
            effects.push(activity(ActivityKind::Stt, "Transcription", text, None));
        }

        ServerEvent::AgentChunk { timestamp, text } => {
            if turn.agent_fragment(timestamp, &text) {
                effects.push(Effect::TurnChanged);
            } else {
                log::warn!("router: agent_chunk before final transcript, dropped");
            }
        }

        ServerEvent::AgentEnd { timestamp, text } => {
            if turn.agent_final(timestamp, &text) {
                effects.push(Effect::TurnChanged);
            } else {
                log::warn!("router: agent_end before final transcript");
            }
            effects.push(activity(ActivityKind::Agent, "Agent Response", text, None));
        }

        ServerEvent::ToolCall {
            tool_name, args, ..
        } => {
            effects.push(activity(
                ActivityKind::Tool,
                format!("Tool called: {tool_name}"),
                "Called with arguments:",
                Some(args),
            ));
            effects.push(Effect::Log(format!("Tool call: {tool_name}")));
        }

        ServerEvent::ToolReturn {
            tool_name,
            result,
            args,
            ..
        } => {
            effects.push(activity(
                ActivityKind::Tool,
                format!("Tool: {tool_name}"),
                "Called with arguments:",
                Some(with_result(args, result)),
            ));
            effects.push(Effect::Log(format!("Tool call: {tool_name}")));
        }

        ServerEvent::TtsChunk { timestamp, audio } => {
            match turn.speech_audio(timestamp) {
                SpeechAudio::Started { response } => {
                    if let Some(response) = response {
                        effects.push(activity(
                            ActivityKind::Agent,
                            "Agent Response",
                            response,
                            None,
                        ));
                    }
                    effects.push(Effect::TurnChanged);
                }
                SpeechAudio::Refreshed => effects.push(Effect::TurnChanged),
                SpeechAudio::Ignored => {
                    log::debug!("router: tts_chunk outside a responding turn");
                }
            }
            effects.push(Effect::Play(audio));
            effects.push(Effect::ArmFinalize);
        }

        ServerEvent::Unknown => {
            log::debug!("router: ignoring unknown event type");
        }
    }

    Routed { turn, effects }
}

fn activity(
    kind: ActivityKind,
    label: impl Into<String>,
    text: impl Into<String>,
    args: Option<serde_json::Value>,
) -> Effect {
    Effect::Activity {
        kind,
        label: label.into(),
        text: text.into(),
        args,
    }
}

/// Attach a tool result to its call arguments.
fn with_result(args: serde_json::Value, result: serde_json::Value) -> serde_json::Value {
    match args {
        serde_json::Value::Object(mut map) => {
            map.insert("result".into(), result);
            serde_json::Value::Object(map)
        }
        serde_json::Value::Null => json!({ "result": result }),
        other => json!({ "args": other, "result": result }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::TurnPhase;

    fn run(events: Vec<ServerEvent>) -> (Turn, Vec<Effect>) {
        let mut turn = Turn::new();
        let mut all = Vec::new();
        for ev in events {
            let routed = dispatch(turn, ev);
            turn = routed.turn;
            all.extend(routed.effects);
        }
        (turn, all)
    }

    fn stt_chunk(ts: f64, text: &str) -> ServerEvent {
        ServerEvent::SttChunk {
            timestamp: ts,
            text: text.into(),
        }
    }

    fn activities(effects: &[Effect]) -> Vec<(ActivityKind, String)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Activity { kind, label, .. } => Some((*kind, label.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn chunks_concatenate_then_output_overwrites() {
        let (turn, _) = run(vec![stt_chunk(0.0, "hel"), stt_chunk(50.0, "lo")]);
        assert_eq!(turn.transcript(), "hello");

        let (turn, effects) = run(vec![
            stt_chunk(0.0, "hel"),
            stt_chunk(50.0, "hello"),
            ServerEvent::SttOutput {
                timestamp: 100.0,
                text: "hello".into(),
            },
        ]);
        assert_eq!(turn.transcript(), "hello");
        assert_eq!(
            activities(&effects),
            vec![(ActivityKind::Stt, "Transcription".to_string())]
        );
    }

    #[test]
    fn tool_call_does_not_touch_turn() {
        let (before, _) = run(vec![stt_chunk(0.0, "hel")]);
        let routed = dispatch(
            before.clone(),
            ServerEvent::ToolCall {
                timestamp: 10.0,
                tool_name: "search".into(),
                args: json!({"q": "rust"}),
            },
        );
        assert_eq!(routed.turn, before);
        assert_eq!(routed.effects.len(), 2);
        assert_eq!(
            routed.effects[0],
            Effect::Activity {
                kind: ActivityKind::Tool,
                label: "Tool called: search".into(),
                text: "Called with arguments:".into(),
                args: Some(json!({"q": "rust"})),
            }
        );
        assert_eq!(routed.effects[1], Effect::Log("Tool call: search".into()));
    }

    #[test]
    fn tool_return_carries_result() {
        let routed = dispatch(
            Turn::new(),
            ServerEvent::ToolReturn {
                timestamp: 0.0,
                tool_name: "search".into(),
                result: json!("found"),
                args: json!({"q": "rust"}),
            },
        );
        match &routed.effects[0] {
            Effect::Activity { label, args, .. } => {
                assert_eq!(label, "Tool: search");
                assert_eq!(args, &Some(json!({"q": "rust", "result": "found"})));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(routed.effects[1], Effect::Log("Tool call: search".into()));
        assert!(!routed.turn.is_active());
    }

    #[test]
    fn tts_chunk_always_plays_and_arms() {
        let routed = dispatch(
            Turn::new(),
            ServerEvent::TtsChunk {
                timestamp: 0.0,
                audio: "AQID".into(),
            },
        );
        assert_eq!(
            routed.effects,
            vec![Effect::Play("AQID".into()), Effect::ArmFinalize]
        );
    }

    #[test]
    fn first_tts_chunk_announces_response() {
        let (turn, effects) = run(vec![
            stt_chunk(0.0, "hello"),
            ServerEvent::SttOutput {
                timestamp: 100.0,
                text: "hello".into(),
            },
            ServerEvent::AgentChunk {
                timestamp: 150.0,
                text: "Hi".into(),
            },
            ServerEvent::TtsChunk {
                timestamp: 250.0,
                audio: "A".into(),
            },
            ServerEvent::TtsChunk {
                timestamp: 260.0,
                audio: "B".into(),
            },
        ]);
        assert!(matches!(turn.phase(), TurnPhase::Speaking(_)));
        assert_eq!(
            activities(&effects),
            vec![
                (ActivityKind::Stt, "Transcription".to_string()),
                (ActivityKind::Agent, "Agent Response".to_string()),
            ]
        );
        let plays: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Play(a) => Some(a.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(plays, vec!["A", "B"]);
    }

    #[test]
    fn new_speech_while_speaking_emits_waterfall() {
        let (_, effects) = run(vec![
            stt_chunk(0.0, "hello"),
            ServerEvent::SttOutput {
                timestamp: 100.0,
                text: "hello".into(),
            },
            ServerEvent::AgentEnd {
                timestamp: 200.0,
                text: "Hi".into(),
            },
            ServerEvent::TtsChunk {
                timestamp: 250.0,
                audio: "A".into(),
            },
            stt_chunk(400.0, "again"),
        ]);
        let waterfalls: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Waterfall(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(waterfalls.len(), 1);
        assert_eq!(waterfalls[0].transcript, "hello");
    }

    #[test]
    fn unknown_event_has_no_effects() {
        let routed = dispatch(Turn::new(), ServerEvent::Unknown);
        assert!(routed.effects.is_empty());
        assert!(!routed.turn.is_active());
    }

    #[test]
    fn with_result_handles_non_object_args() {
        assert_eq!(with_result(json!(null), json!(1)), json!({"result": 1}));
        assert_eq!(
            with_result(json!([1]), json!(2)),
            json!({"args": [1], "result": 2})
        );
    }
}
