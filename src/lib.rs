//! Real-time voice-agent client.
//!
//! Streams 16 kHz PCM16 microphone frames to a voice-agent server over a
//! WebSocket and turns the server's event stream (transcription, agent text,
//! tool calls, synthesized speech) into per-turn state, latency statistics
//! and an activity feed.
//!
//! * [`audio`]: capture, resampling/chunking, playback hand-off.
//! * [`turn`]: the live turn state machine and derived aggregates.
//! * [`router`]: inbound event decoding and dispatch.
//! * [`session`]: start/stop lifecycle, channel and finalize timer.
//! * [`config`]: `settings.toml` persistence.

pub mod audio;
pub mod config;
pub mod router;
pub mod session;
pub mod turn;
