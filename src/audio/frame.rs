//! Fixed-size 16 kHz PCM frames handed from the capture callback to the
//! network sender.
//!
//! An [`AudioFrame`] owns its samples.  It is moved through the pipeline
//! (callback → frame queue → channel) and consumed exactly once by
//! [`AudioFrame::into_le_bytes`], so no frame is ever observed in two places.

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Sample rate expected by the speech-to-text backend (Hz).
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Samples per frame: 100 ms at 16 kHz.
pub const FRAME_SAMPLES: usize = 1_600;

/// Size of one frame on the wire: 1600 × little-endian `i16`.
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// An immutable buffer of signed 16-bit samples at [`TARGET_SAMPLE_RATE`].
#[derive(Debug, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Box<[i16]>,
}

impl AudioFrame {
    /// Wrap an owned sample buffer.
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    /// Read-only view of the samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples in the frame.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` when the frame holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Consume the frame and return its wire representation
    /// (little-endian `i16`, two bytes per sample).
    ///
    /// ```
    /// use voice_agent_client::audio::AudioFrame;
    ///
    /// let frame = AudioFrame::new(vec![1, -2]);
    /// assert_eq!(frame.into_le_bytes(), vec![0x01, 0x00, 0xFE, 0xFF]);
    /// ```
    pub fn into_le_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for sample in self.samples.iter() {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_frame_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioFrame>();
    }

    #[test]
    fn full_frame_is_3200_bytes() {
        let frame = AudioFrame::new(vec![0; FRAME_SAMPLES]);
        assert_eq!(frame.len(), FRAME_SAMPLES);
        assert_eq!(frame.into_le_bytes().len(), FRAME_BYTES);
    }

    #[test]
    fn extremes_encode_little_endian() {
        let frame = AudioFrame::new(vec![i16::MAX, i16::MIN]);
        assert_eq!(frame.into_le_bytes(), vec![0xFF, 0x7F, 0x00, 0x80]);
    }
}
