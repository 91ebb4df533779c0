//! Session-owned state and effect execution.
//!
//! [`SessionCore`] holds everything the event path mutates: the live turn,
//! the latency history, the waterfall snapshot, the activity feed, the
//! console log and the session status.  It runs routed [`Effect`]s in order
//! and publishes a [`SessionUpdate`] for each change so display code can
//! subscribe instead of reading shared globals.
//!
//! The core is synchronous and never touches the network or the audio
//! device; the controller drives it.

use tokio::sync::broadcast;

use crate::audio::Playback;
use crate::router::{decode, dispatch, Effect, ServerEvent};
use crate::turn::{
    ActivityItem, ActivityLog, LatencyStats, LogEntry, LogStream, Turn, TurnSnapshot,
};

use super::state::{SessionState, SessionStatus};

// ---------------------------------------------------------------------------
// SessionUpdate
// ---------------------------------------------------------------------------

/// Change notification published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Session(SessionState),
    Turn(TurnSnapshot),
    /// `None` clears the waterfall.
    Waterfall(Option<TurnSnapshot>),
    Activity(ActivityItem),
    Log(LogEntry),
    Latency(LatencyStats),
}

// ---------------------------------------------------------------------------
// SessionCore
// ---------------------------------------------------------------------------

pub struct SessionCore {
    session: SessionState,
    turn: Turn,
    latency: LatencyStats,
    waterfall: Option<TurnSnapshot>,
    activities: ActivityLog,
    logs: LogStream,
    playback: Box<dyn Playback>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionCore {
    pub fn new(playback: Box<dyn Playback>, updates: broadcast::Sender<SessionUpdate>) -> Self {
        Self {
            session: SessionState::default(),
            turn: Turn::new(),
            latency: LatencyStats::new(),
            waterfall: None,
            activities: ActivityLog::new(),
            logs: LogStream::new(),
            playback,
            updates,
        }
    }

    // ---- Views -------------------------------------------------------------

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn turn(&self) -> &Turn {
        &self.turn
    }

    pub fn latency(&self) -> &LatencyStats {
        &self.latency
    }

    pub fn waterfall(&self) -> Option<&TurnSnapshot> {
        self.waterfall.as_ref()
    }

    pub fn activities(&self) -> &ActivityLog {
        &self.activities
    }

    pub fn logs(&self) -> &LogStream {
        &self.logs
    }

    // ---- Session state -----------------------------------------------------

    /// Clear every aggregate for a fresh session.
    pub fn reset(&mut self) {
        self.session = SessionState::default();
        self.turn.reset();
        self.latency.reset();
        self.waterfall = None;
        self.activities.clear();
        self.logs.clear();

        self.publish_session();
        self.publish(SessionUpdate::Turn(self.turn.snapshot()));
        self.publish(SessionUpdate::Latency(self.latency.clone()));
        self.publish(SessionUpdate::Waterfall(None));
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.session.status = status;
        self.publish_session();
    }

    /// Channel open.
    pub fn mark_connected(&mut self) {
        self.session.connected = true;
        self.publish_session();
    }

    /// Capture streaming.
    pub fn mark_recording(&mut self) {
        self.session.recording = true;
        self.session.status = SessionStatus::Listening;
        self.session.start_time = Some(chrono::Utc::now());
        self.publish_session();
    }

    /// Channel closed by the peer.
    pub fn mark_disconnected(&mut self) {
        self.session = SessionState {
            status: SessionStatus::Disconnected,
            ..SessionState::default()
        };
        self.publish_session();
    }

    /// Back to initial values.  An `error` status survives so the failure
    /// stays visible until the next start.
    pub fn reset_session(&mut self) {
        let keep_error = self.session.status == SessionStatus::Error;
        self.session = SessionState::default();
        if keep_error {
            self.session.status = SessionStatus::Error;
        }
        self.publish_session();
    }

    pub fn log(&mut self, message: impl Into<String>) {
        let entry = self.logs.log(message);
        log::info!("session: {}", entry.message);
        self.publish(SessionUpdate::Log(entry));
    }

    pub fn stop_playback(&mut self) {
        self.playback.stop();
    }

    // ---- Event path --------------------------------------------------------

    /// Decode and apply one inbound text frame.  Malformed frames are logged
    /// and dropped.  Returns `true` when the finalize timer must be re-armed.
    pub fn handle_message(&mut self, text: &str) -> bool {
        match decode(text) {
            Ok(event) => self.handle_event(event),
            Err(e) => {
                log::warn!("session: dropping malformed event: {e}");
                false
            }
        }
    }

    /// Apply one decoded event.  Returns `true` when the finalize timer must
    /// be re-armed.
    pub fn handle_event(&mut self, event: ServerEvent) -> bool {
        let routed = dispatch(std::mem::take(&mut self.turn), event);
        self.turn = routed.turn;

        let mut arm = false;
        for effect in routed.effects {
            match effect {
                Effect::Activity {
                    kind,
                    label,
                    text,
                    args,
                } => {
                    let item = self.activities.add(kind, label, text, args);
                    self.publish(SessionUpdate::Activity(item));
                }
                Effect::Log(message) => self.log(message),
                Effect::Waterfall(snapshot) => self.set_waterfall(snapshot),
                Effect::TurnChanged => self.publish(SessionUpdate::Turn(self.turn.snapshot())),
                Effect::Play(audio) => self.playback.push(&audio),
                Effect::ArmFinalize => arm = true,
            }
        }
        arm
    }

    /// Close out the turn when it is active and both `stt_end` and
    /// `tts_end` are set: record latency, show it in the waterfall, reset.
    pub fn finalize_if_ready(&mut self) -> Option<TurnSnapshot> {
        let snapshot = self.turn.finalize()?;

        self.set_waterfall(snapshot.clone());
        self.latency.record_turn(&snapshot);
        self.publish(SessionUpdate::Latency(self.latency.clone()));
        self.publish(SessionUpdate::Turn(self.turn.snapshot()));

        log::info!(
            "session: turn finalized (stt {:?} ms, total {:?} ms)",
            self.latency.stt.last(),
            self.latency.total.last()
        );
        Some(snapshot)
    }

    // ---- Helpers -----------------------------------------------------------

    fn set_waterfall(&mut self, snapshot: TurnSnapshot) {
        self.waterfall = Some(snapshot.clone());
        self.publish(SessionUpdate::Waterfall(Some(snapshot)));
    }

    fn publish_session(&mut self) {
        self.session.tick(chrono::Utc::now());
        self.publish(SessionUpdate::Session(self.session.clone()));
    }

    fn publish(&self, update: SessionUpdate) {
        // No subscribers is fine.
        let _ = self.updates.send(update);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
