//! Conversational turn state and the aggregates derived from it.
//!
//! * [`Turn`] / [`TurnPhase`]: the single live turn as an explicit state.
//! * [`TurnSnapshot`]: flat read-only view (waterfall + latency input).
//! * [`LatencyStats`]: append-only per-turn durations.
//! * [`ActivityLog`] / [`LogStream`]: user-visible feeds.
//!
//! None of these types perform I/O; they are owned and mutated by the
//! session core on the network-event path only.

pub mod activity;
pub mod state;
pub mod stats;

pub use activity::{ActivityItem, ActivityKind, ActivityLog, LogEntry, LogStream};
pub use state::{
    Listening, Millis, Responding, Speaking, SpeechAudio, SpeechFragment, Transcribed, Turn,
    TurnPhase, TurnSnapshot,
};
pub use stats::{LatencyMetric, LatencyStats, LatencySummary};
