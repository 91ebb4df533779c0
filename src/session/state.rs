//! Coarse connection/recording state, mutated only by the session
//! controller.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Connection status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Ready,
    Connecting,
    Listening,
    Error,
    Disconnected,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Ready => "ready",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Listening => "listening",
            SessionStatus::Error => "error",
            SessionStatus::Disconnected => "disconnected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionState {
    pub connected: bool,
    pub recording: bool,
    pub status: SessionStatus,
    /// Set when capture starts streaming.
    pub start_time: Option<DateTime<Utc>>,
    /// Seconds since `start_time`, refreshed whenever the state is published.
    pub elapsed: f64,
}

impl SessionState {
    /// Recompute `elapsed` against `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.elapsed = self
            .start_time
            .map(|start| (now - start).num_milliseconds().max(0) as f64 / 1_000.0)
            .unwrap_or(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn default_is_ready_and_disconnected() {
        let st = SessionState::default();
        assert_eq!(st.status, SessionStatus::Ready);
        assert!(!st.connected);
        assert!(!st.recording);
        assert!(st.start_time.is_none());
    }

    #[test]
    fn tick_measures_from_start() {
        let start = Utc::now();
        let mut st = SessionState {
            start_time: Some(start),
            ..SessionState::default()
        };
        st.tick(start + Duration::milliseconds(2_500));
        assert!((st.elapsed - 2.5).abs() < 1e-9);
    }

    #[test]
    fn status_serializes_lowercase() {
        let v = serde_json::to_value(SessionStatus::Disconnected).unwrap();
        assert_eq!(v, "disconnected");
        assert_eq!(SessionStatus::Listening.label(), "listening");
    }
}
