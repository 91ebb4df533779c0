//! Hand-off of synthesized speech to the playback collaborator.
//!
//! The session never buffers or schedules audio itself: each `tts_chunk`
//! payload is pushed as soon as it is routed.  [`ChannelPlayback`] decodes
//! the base64 payload and forwards raw PCM bytes to whatever owns the
//! output device.

use base64::Engine as _;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Playback trait
// ---------------------------------------------------------------------------

/// Consumer of synthesized speech.
pub trait Playback: Send {
    /// Queue one base64-encoded audio chunk.
    fn push(&mut self, audio_b64: &str);
    /// Drop anything queued and stop output.
    fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// ChannelPlayback
// ---------------------------------------------------------------------------

/// Message delivered to the output side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCommand {
    /// Decoded audio bytes, in server order.
    Audio(Vec<u8>),
    /// Flush and silence the output.
    Stop,
}

/// [`Playback`] that decodes chunks and sends them over an unbounded channel.
pub struct ChannelPlayback {
    tx: mpsc::UnboundedSender<PlaybackCommand>,
}

impl ChannelPlayback {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PlaybackCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Playback for ChannelPlayback {
    fn push(&mut self, audio_b64: &str) {
        match base64::engine::general_purpose::STANDARD.decode(audio_b64) {
            Ok(bytes) => {
                if self.tx.send(PlaybackCommand::Audio(bytes)).is_err() {
                    log::debug!("playback: output side gone, chunk dropped");
                }
            }
            Err(e) => log::warn!("playback: undecodable audio chunk dropped: {e}"),
        }
    }

    fn stop(&mut self) {
        let _ = self.tx.send(PlaybackCommand::Stop);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_decodes_base64() {
        let (mut playback, mut rx) = ChannelPlayback::new();
        playback.push("AQID");
        assert_eq!(rx.try_recv().unwrap(), PlaybackCommand::Audio(vec![1, 2, 3]));
    }

    #[test]
    fn invalid_base64_is_dropped() {
        let (mut playback, mut rx) = ChannelPlayback::new();
        playback.push("not base64!!");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stop_sends_stop_command() {
        let (mut playback, mut rx) = ChannelPlayback::new();
        playback.stop();
        assert_eq!(rx.try_recv().unwrap(), PlaybackCommand::Stop);
    }

    #[test]
    fn push_after_receiver_dropped_does_not_panic() {
        let (mut playback, rx) = ChannelPlayback::new();
        drop(rx);
        playback.push("AQID");
        playback.stop();
    }
}
