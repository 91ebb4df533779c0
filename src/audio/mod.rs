//! Audio path: microphone capture → 16 kHz PCM frames, and speech playback
//! hand-off.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → AudioDevice callback (f32, native rate)
//!           → FrameChunker (nearest-neighbour decimation, i16, 1600 samples)
//!           → FrameSink(AudioFrame) → session frame queue → network channel
//! ```
//!
//! Nothing in this module touches session or turn state; frames flow one way
//! out of the audio thread.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voice_agent_client::audio::{CaptureController, CpalDevice, InputConstraints};
//!
//! let mut capture = CaptureController::new(CpalDevice::new(None), InputConstraints::default());
//! capture
//!     .start(Box::new(|frame| {
//!         let bytes = frame.into_le_bytes(); // 3200 bytes
//!         let _ = bytes;
//!     }))
//!     .unwrap();
//! capture.stop();
//! ```

pub mod capture;
pub mod cpal_device;
pub mod frame;
pub mod playback;
pub mod resample;

pub use capture::{
    AudioDevice, BlockCallback, CaptureController, CaptureError, DeviceFormat, FrameSink,
    InputConstraints,
};
pub use cpal_device::CpalDevice;
pub use frame::{AudioFrame, FRAME_BYTES, FRAME_SAMPLES, TARGET_SAMPLE_RATE};
pub use playback::{ChannelPlayback, Playback, PlaybackCommand};
pub use resample::FrameChunker;
