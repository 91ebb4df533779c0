//! Real-time downsampler and frame chunker.
//!
//! [`FrameChunker`] runs inside the audio callback.  It converts native-rate
//! `f32` samples into 16 kHz signed 16-bit PCM and emits fixed-size
//! [`AudioFrame`]s.
//!
//! ## Algorithm
//!
//! Nearest-neighbour decimation with a fractional accumulator: with
//! `R = native_rate / target_rate`, every input sample advances the index by
//! one; once the index reaches `R` it is decremented by `R` and the current
//! sample is kept.  There is no interpolation and no anti-aliasing filter.
//!
//! Kept samples are clamped to `[-1.0, 1.0]` and scaled asymmetrically
//! (`× 32768` below zero, `× 32767` otherwise) so `+1.0` cannot overflow.
//!
//! State (accumulator and partially-filled frame) persists between callback
//! invocations.  The pending buffer never grows past one frame.

use super::frame::{AudioFrame, FRAME_SAMPLES, TARGET_SAMPLE_RATE};

// ---------------------------------------------------------------------------
// Sample conversion
// ---------------------------------------------------------------------------

/// Convert one float sample to 16-bit PCM with clamping.
///
/// ```
/// use voice_agent_client::audio::resample::to_pcm16;
///
/// assert_eq!(to_pcm16(1.0), 32_767);
/// assert_eq!(to_pcm16(-1.0), -32_768);
/// assert_eq!(to_pcm16(7.5), 32_767);
/// assert_eq!(to_pcm16(0.0), 0);
/// ```
#[inline]
pub fn to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32_768.0) as i16
    } else {
        (s * 32_767.0) as i16
    }
}

// ---------------------------------------------------------------------------
// FrameChunker
// ---------------------------------------------------------------------------

/// Stateful native-rate → 16 kHz converter that emits [`AudioFrame`]s.
///
/// # Example
///
/// ```rust
/// use voice_agent_client::audio::FrameChunker;
///
/// let mut chunker = FrameChunker::new(48_000);
/// let mut frames = Vec::new();
///
/// // 100 ms at 48 kHz → exactly one 1600-sample frame.
/// chunker.process(&vec![0.25_f32; 4_800], |f| frames.push(f));
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].len(), 1_600);
/// ```
#[derive(Debug)]
pub struct FrameChunker {
    ratio: f64,
    index: f64,
    frame_samples: usize,
    pending: Vec<i16>,
}

impl FrameChunker {
    /// Chunker for `native_rate` → 16 kHz with 1600-sample frames.
    pub fn new(native_rate: u32) -> Self {
        Self::with_target(native_rate, TARGET_SAMPLE_RATE, FRAME_SAMPLES)
    }

    /// Chunker with an explicit target rate and frame size.
    ///
    /// `frame_samples` is raised to at least 1.  A `native_rate` below the
    /// target keeps every sample (decimation never upsamples).
    pub fn with_target(native_rate: u32, target_rate: u32, frame_samples: usize) -> Self {
        let frame_samples = frame_samples.max(1);
        let ratio = if target_rate == 0 {
            1.0
        } else {
            f64::from(native_rate) / f64::from(target_rate)
        };
        Self {
            ratio,
            index: 0.0,
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
        }
    }

    /// Resample ratio `R = native / target`.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Samples accepted but not yet emitted as a frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed a block of mono samples; `emit` is called once per completed frame.
    ///
    /// An empty block is a no-op.
    pub fn process<F>(&mut self, samples: &[f32], emit: F)
    where
        F: FnMut(AudioFrame),
    {
        self.process_iter(samples.iter().copied(), emit);
    }

    /// Feed an interleaved block, keeping only the first channel.
    ///
    /// `channels == 0` is treated as silence: nothing is accepted and no
    /// frame is emitted.
    pub fn process_interleaved<F>(&mut self, data: &[f32], channels: u16, emit: F)
    where
        F: FnMut(AudioFrame),
    {
        match channels {
            0 => {}
            1 => self.process(data, emit),
            n => self.process_iter(data.iter().step_by(usize::from(n)).copied(), emit),
        }
    }

    /// Drop the accumulator and any partial frame.
    pub fn reset(&mut self) {
        self.index = 0.0;
        self.pending.clear();
    }

    fn process_iter<I, F>(&mut self, samples: I, mut emit: F)
    where
        I: Iterator<Item = f32>,
        F: FnMut(AudioFrame),
    {
        for sample in samples {
            self.index += 1.0;
            if self.index < self.ratio {
                continue;
            }
            self.index -= self.ratio;
            self.pending.push(to_pcm16(sample));

            if self.pending.len() >= self.frame_samples {
                let full = std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.frame_samples),
                );
                emit(AudioFrame::new(full));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
