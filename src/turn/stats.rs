//! Per-turn latency history.
//!
//! [`LatencyStats`] is append-only: every finalized turn pushes its phase
//! durations onto the raw arrays.  Aggregation for display is left to the
//! consumer; [`LatencyStats::summary`] is a convenience for logging.

use serde::Serialize;

use super::state::TurnSnapshot;

/// Which duration array to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyMetric {
    /// `stt_end - stt_start`
    Stt,
    /// `agent_end - agent_start`
    Agent,
    /// `tts_end - tts_start`
    Tts,
    /// `tts_end - turn_start`
    Total,
}

/// Aggregate over one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Raw duration arrays in milliseconds, one entry per recorded turn
/// (a turn missing an endpoint contributes nothing to that array).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LatencyStats {
    pub turns: usize,
    pub stt: Vec<f64>,
    pub agent: Vec<f64>,
    pub tts: Vec<f64>,
    pub total: Vec<f64>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the durations of a finalized turn.
    ///
    /// ```
    /// use voice_agent_client::turn::{LatencyStats, TurnSnapshot};
    ///
    /// let mut stats = LatencyStats::new();
    /// stats.record_turn(&TurnSnapshot {
    ///     turn_start: Some(0.0),
    ///     stt_start: Some(0.0),
    ///     stt_end: Some(100.0),
    ///     tts_start: Some(250.0),
    ///     tts_end: Some(260.0),
    ///     ..TurnSnapshot::default()
    /// });
    /// assert_eq!(stats.turns, 1);
    /// assert_eq!(stats.stt, vec![100.0]);
    /// assert_eq!(stats.total, vec![260.0]);
    /// assert!(stats.agent.is_empty());
    /// ```
    pub fn record_turn(&mut self, turn: &TurnSnapshot) {
        self.turns += 1;
        push_span(&mut self.stt, turn.stt_start, turn.stt_end);
        push_span(&mut self.agent, turn.agent_start, turn.agent_end);
        push_span(&mut self.tts, turn.tts_start, turn.tts_end);
        push_span(&mut self.total, turn.turn_start, turn.tts_end);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn values(&self, metric: LatencyMetric) -> &[f64] {
        match metric {
            LatencyMetric::Stt => &self.stt,
            LatencyMetric::Agent => &self.agent,
            LatencyMetric::Tts => &self.tts,
            LatencyMetric::Total => &self.total,
        }
    }

    /// Count / mean / min / max for `metric`, or `None` when empty.
    pub fn summary(&self, metric: LatencyMetric) -> Option<LatencySummary> {
        let values = self.values(metric);
        if values.is_empty() {
            return None;
        }
        let sum: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(LatencySummary {
            count: values.len(),
            mean: sum / values.len() as f64,
            min,
            max,
        })
    }
}

fn push_span(into: &mut Vec<f64>, start: Option<f64>, end: Option<f64>) {
    if let (Some(start), Some(end)) = (start, end) {
        into.push(end - start);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
