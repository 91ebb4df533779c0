//! Turn lifecycle as an explicit tagged state.
//!
//! Each phase carries only the fields that are valid in it, and embeds the
//! record of the phase before it:
//!
//! ```text
//! Idle ──speech fragment──▶ Listening { turn_start, stt_start, transcript }
//!      ──final transcript─▶ Transcribed { Listening, stt_end }
//!      ──agent text───────▶ Responding { Transcribed, agent_start, agent_end?, response }
//!      ──speech audio─────▶ Speaking { Responding, tts_start, tts_end }
//!      ──finalize─────────▶ Idle
//! ```
//!
//! A turn that reaches `Speaking` necessarily has both `stt_end` and
//! `tts_end`, so "ready to finalize" is simply "is `Speaking`".
//!
//! Every stamp is clamped so it is never earlier than the stamp of the phase
//! before it; end stamps are never earlier than their start.

use serde::Serialize;

/// Server timestamp in milliseconds.
pub type Millis = f64;

// ---------------------------------------------------------------------------
// Phase records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Listening {
    pub turn_start: Millis,
    pub stt_start: Millis,
    pub transcript: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcribed {
    pub listening: Listening,
    pub stt_end: Millis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Responding {
    pub transcribed: Transcribed,
    pub agent_start: Millis,
    pub agent_end: Option<Millis>,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Speaking {
    pub responding: Responding,
    pub tts_start: Millis,
    pub tts_end: Millis,
}

/// Where the current turn is.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Listening(Listening),
    Transcribed(Transcribed),
    Responding(Responding),
    Speaking(Speaking),
}

impl TurnPhase {
    pub fn label(&self) -> &'static str {
        match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Listening(_) => "listening",
            TurnPhase::Transcribed(_) => "transcribed",
            TurnPhase::Responding(_) => "responding",
            TurnPhase::Speaking(_) => "speaking",
        }
    }
}

// ---------------------------------------------------------------------------
// TurnSnapshot
// ---------------------------------------------------------------------------

/// Flat, read-only view of a turn used for the waterfall display and
/// latency recording.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TurnSnapshot {
    pub active: bool,
    pub turn_start: Option<Millis>,
    pub stt_start: Option<Millis>,
    pub stt_end: Option<Millis>,
    pub agent_start: Option<Millis>,
    pub agent_end: Option<Millis>,
    pub tts_start: Option<Millis>,
    pub tts_end: Option<Millis>,
    pub transcript: String,
    pub response: String,
}

// ---------------------------------------------------------------------------
// Transition outcomes
// ---------------------------------------------------------------------------

/// Result of a recognized-speech fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechFragment {
    /// A new turn was started.  `previous` holds the turn that was still
    /// pending finalization, if any.
    Started { previous: Option<TurnSnapshot> },
    /// The fragment was appended to the live transcript.
    Appended,
}

/// Result of a synthesized-speech chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechAudio {
    /// First chunk of the turn.  Carries the response text when non-empty.
    Started { response: Option<String> },
    /// `tts_end` refreshed.
    Refreshed,
    /// No agent response yet; the turn was not touched.
    Ignored,
}

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// The single live turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Turn {
    phase: TurnPhase,
}

impl Turn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    /// `true` from the first speech fragment until finalize.
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, TurnPhase::Idle)
    }

    /// Both `stt_end` and `tts_end` are set.
    pub fn is_ready_to_finalize(&self) -> bool {
        matches!(self.phase, TurnPhase::Speaking(_))
    }

    pub fn reset(&mut self) {
        self.phase = TurnPhase::Idle;
    }

    // ---- Transitions -------------------------------------------------------

    /// Apply a partial transcription fragment.
    ///
    /// * `Idle` starts a new turn stamped at `ts`.
    /// * `Speaking` means the previous turn is still waiting for its
    ///   finalize timer: it is handed back for display and a new turn starts.
    /// * Any other active phase appends `text` to the transcript.
    pub fn speech_fragment(&mut self, ts: Millis, text: &str) -> SpeechFragment {
        let previous = match self.phase {
            TurnPhase::Idle => None,
            TurnPhase::Speaking(_) => Some(self.snapshot()),
            _ => {
                if let Some(listening) = listening_mut(&mut self.phase) {
                    listening.transcript.push_str(text);
                }
                return SpeechFragment::Appended;
            }
        };

        self.phase = TurnPhase::Listening(Listening {
            turn_start: ts,
            stt_start: ts,
            transcript: text.to_owned(),
        });
        SpeechFragment::Started { previous }
    }

    /// Apply the authoritative transcription.  The transcript is replaced,
    /// not appended.  Returns `false` when no turn is active.
    pub fn transcription_final(&mut self, ts: Millis, text: &str) -> bool {
        let phase = std::mem::take(&mut self.phase);
        let (next, applied) = match phase {
            TurnPhase::Idle => (TurnPhase::Idle, false),
            TurnPhase::Listening(mut listening) => {
                listening.transcript = text.to_owned();
                let stt_end = ts.max(listening.stt_start);
                (
                    TurnPhase::Transcribed(Transcribed { listening, stt_end }),
                    true,
                )
            }
            TurnPhase::Transcribed(mut t) => {
                t.listening.transcript = text.to_owned();
                t.stt_end = ts.max(t.stt_end);
                (TurnPhase::Transcribed(t), true)
            }
            // The agent has already started: keep stt_end so phase order holds.
            mut later => {
                if let Some(listening) = listening_mut(&mut later) {
                    listening.transcript = text.to_owned();
                }
                (later, true)
            }
        };
        self.phase = next;
        applied
    }

    /// Apply a streamed agent text fragment.  The first fragment of a turn
    /// stamps `agent_start`.  Returns `false` before the final transcript.
    pub fn agent_fragment(&mut self, ts: Millis, text: &str) -> bool {
        let phase = std::mem::take(&mut self.phase);
        let (next, applied) = match phase {
            TurnPhase::Transcribed(transcribed) => {
                let agent_start = ts.max(transcribed.stt_end);
                (
                    TurnPhase::Responding(Responding {
                        transcribed,
                        agent_start,
                        agent_end: None,
                        response: text.to_owned(),
                    }),
                    true,
                )
            }
            TurnPhase::Responding(mut r) => {
                r.response.push_str(text);
                (TurnPhase::Responding(r), true)
            }
            TurnPhase::Speaking(mut s) => {
                s.responding.response.push_str(text);
                (TurnPhase::Speaking(s), true)
            }
            other => (other, false),
        };
        self.phase = next;
        applied
    }

    /// Apply the authoritative agent response.  The response is replaced.
    /// Returns `false` before the final transcript.
    pub fn agent_final(&mut self, ts: Millis, text: &str) -> bool {
        let phase = std::mem::take(&mut self.phase);
        let (next, applied) = match phase {
            TurnPhase::Transcribed(transcribed) => {
                let at = ts.max(transcribed.stt_end);
                (
                    TurnPhase::Responding(Responding {
                        transcribed,
                        agent_start: at,
                        agent_end: Some(at),
                        response: text.to_owned(),
                    }),
                    true,
                )
            }
            TurnPhase::Responding(mut r) => {
                r.agent_end = Some(ts.max(r.agent_start));
                r.response = text.to_owned();
                (TurnPhase::Responding(r), true)
            }
            TurnPhase::Speaking(mut s) => {
                let r = &mut s.responding;
                r.agent_end = Some(ts.max(r.agent_start));
                r.response = text.to_owned();
                (TurnPhase::Speaking(s), true)
            }
            other => (other, false),
        };
        self.phase = next;
        applied
    }

    /// Apply a synthesized-speech chunk: the first one stamps `tts_start`,
    /// every one refreshes `tts_end`.
    pub fn speech_audio(&mut self, ts: Millis) -> SpeechAudio {
        let phase = std::mem::take(&mut self.phase);
        let (next, outcome) = match phase {
            TurnPhase::Responding(responding) => {
                let at = ts.max(responding.agent_start);
                let response =
                    (!responding.response.is_empty()).then(|| responding.response.clone());
                (
                    TurnPhase::Speaking(Speaking {
                        responding,
                        tts_start: at,
                        tts_end: at,
                    }),
                    SpeechAudio::Started { response },
                )
            }
            TurnPhase::Speaking(mut s) => {
                s.tts_end = ts.max(s.tts_end);
                (TurnPhase::Speaking(s), SpeechAudio::Refreshed)
            }
            other => (other, SpeechAudio::Ignored),
        };
        self.phase = next;
        outcome
    }

    /// Close out the turn if both `stt_end` and `tts_end` are set.
    ///
    /// Returns the final snapshot and resets to `Idle`; returns `None` and
    /// leaves the turn untouched otherwise.
    pub fn finalize(&mut self) -> Option<TurnSnapshot> {
        if !self.is_ready_to_finalize() {
            return None;
        }
        let snapshot = self.snapshot();
        self.phase = TurnPhase::Idle;
        Some(snapshot)
    }

    // ---- Views -------------------------------------------------------------

    pub fn transcript(&self) -> &str {
        match &self.phase {
            TurnPhase::Idle => "",
            TurnPhase::Listening(l) => &l.transcript,
            TurnPhase::Transcribed(t) => &t.listening.transcript,
            TurnPhase::Responding(r) => &r.transcribed.listening.transcript,
            TurnPhase::Speaking(s) => &s.responding.transcribed.listening.transcript,
        }
    }

    pub fn response(&self) -> &str {
        match &self.phase {
            TurnPhase::Responding(r) => &r.response,
            TurnPhase::Speaking(s) => &s.responding.response,
            _ => "",
        }
    }

    /// Flatten the current phase into a [`TurnSnapshot`].
    pub fn snapshot(&self) -> TurnSnapshot {
        let mut snap = TurnSnapshot {
            active: self.is_active(),
            transcript: self.transcript().to_owned(),
            response: self.response().to_owned(),
            ..TurnSnapshot::default()
        };

        let (listening, transcribed, responding, speaking) = match &self.phase {
            TurnPhase::Idle => return snap,
            TurnPhase::Listening(l) => (l, None, None, None),
            TurnPhase::Transcribed(t) => (&t.listening, Some(t), None, None),
            TurnPhase::Responding(r) => {
                (&r.transcribed.listening, Some(&r.transcribed), Some(r), None)
            }
            TurnPhase::Speaking(s) => {
                let r = &s.responding;
                (&r.transcribed.listening, Some(&r.transcribed), Some(r), Some(s))
            }
        };

        snap.turn_start = Some(listening.turn_start);
        snap.stt_start = Some(listening.stt_start);
        snap.stt_end = transcribed.map(|t| t.stt_end);
        snap.agent_start = responding.map(|r| r.agent_start);
        snap.agent_end = responding.and_then(|r| r.agent_end);
        snap.tts_start = speaking.map(|s| s.tts_start);
        snap.tts_end = speaking.map(|s| s.tts_end);
        snap
    }
}

fn listening_mut(phase: &mut TurnPhase) -> Option<&mut Listening> {
    match phase {
        TurnPhase::Idle => None,
        TurnPhase::Listening(l) => Some(l),
        TurnPhase::Transcribed(t) => Some(&mut t.listening),
        TurnPhase::Responding(r) => Some(&mut r.transcribed.listening),
        TurnPhase::Speaking(s) => Some(&mut s.responding.transcribed.listening),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
