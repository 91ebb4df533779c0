//! Microphone lifecycle and frame delivery.
//!
//! [`CaptureController`] drives an [`AudioDevice`] (the audio engine plus the
//! microphone stream) and hosts the [`FrameChunker`] that turns device blocks
//! into [`AudioFrame`]s.  Every emitted frame is moved into the caller's
//! [`FrameSink`].
//!
//! ```text
//! device callback ──▶ Graph { FrameChunker, sink } ──▶ FrameSink(AudioFrame)
//! ```
//!
//! The sink lives behind the same mutex the device callback takes, and
//! [`CaptureController::stop`] clears it under that lock.  Once `stop`
//! returns no further frame can reach the sink.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::frame::{AudioFrame, FRAME_SAMPLES, TARGET_SAMPLE_RATE};
use super::resample::FrameChunker;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Device-level failures.  Any of these is fatal to the session.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device available")]
    NoDevice,

    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to spawn audio engine thread: {0}")]
    EngineSpawn(#[from] std::io::Error),

    #[error("audio engine is not running")]
    EngineClosed,
}

// ---------------------------------------------------------------------------
// Device seam
// ---------------------------------------------------------------------------

/// Processing requested from the platform when opening the microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for InputConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Native stream format reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Callback invoked on the audio thread with each interleaved `f32` block.
pub type BlockCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Receives every frame emitted by the chunker.
pub type FrameSink = Box<dyn FnMut(AudioFrame) + Send + 'static>;

/// Audio engine + microphone stream.
///
/// * `open_engine` builds the engine and reports the native format.
/// * `resume` un-suspends an engine that was opened earlier.
/// * `open_input` acquires a fresh microphone stream feeding `on_block`.
/// * `close_input` stops and releases the microphone stream.
/// * `close_engine` fully releases the engine (hardware included).
///
/// `close_input` and `close_engine` must be safe to call when nothing is open.
pub trait AudioDevice: Send {
    fn open_engine(&mut self) -> Result<DeviceFormat, CaptureError>;
    fn resume(&mut self) -> Result<(), CaptureError>;
    fn open_input(
        &mut self,
        constraints: &InputConstraints,
        on_block: BlockCallback,
    ) -> Result<(), CaptureError>;
    fn close_input(&mut self);
    fn close_engine(&mut self);
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// State shared with the audio callback.
struct Graph {
    chunker: FrameChunker,
    channels: u16,
    sink: Option<FrameSink>,
}

impl Graph {
    fn on_block(&mut self, data: &[f32]) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        self.chunker.process_interleaved(data, self.channels, |frame| sink(frame));
    }
}

// ---------------------------------------------------------------------------
// CaptureController
// ---------------------------------------------------------------------------

/// Owns the device lifecycle and the resample graph.
///
/// # Example
///
/// ```rust,no_run
/// use voice_agent_client::audio::{CaptureController, CpalDevice, InputConstraints};
///
/// let mut capture = CaptureController::new(CpalDevice::new(None), InputConstraints::default());
/// capture
///     .start(Box::new(|frame| println!("{} samples", frame.len())))
///     .unwrap();
/// // ...
/// capture.stop();
/// ```
pub struct CaptureController<D: AudioDevice> {
    device: D,
    constraints: InputConstraints,
    target_rate: u32,
    frame_samples: usize,
    graph: Option<Arc<Mutex<Graph>>>,
    input_open: bool,
}

impl<D: AudioDevice> CaptureController<D> {
    /// Controller producing 1600-sample frames at 16 kHz.
    pub fn new(device: D, constraints: InputConstraints) -> Self {
        Self::with_frame_format(device, constraints, TARGET_SAMPLE_RATE, FRAME_SAMPLES)
    }

    /// Controller with an explicit target rate and frame size.
    pub fn with_frame_format(
        device: D,
        constraints: InputConstraints,
        target_rate: u32,
        frame_samples: usize,
    ) -> Self {
        Self {
            device,
            constraints,
            target_rate,
            frame_samples,
            graph: None,
            input_open: false,
        }
    }

    /// Start capturing and deliver every frame to `on_frame`.
    ///
    /// The engine and resample graph are built on the first call and reused
    /// until [`stop`](Self::stop).  A fresh microphone stream is acquired on
    /// every call.
    ///
    /// # Errors
    ///
    /// Any [`CaptureError`] from the device.  On failure nothing is left
    /// open; the caller should abort the session.
    pub fn start(&mut self, on_frame: FrameSink) -> Result<(), CaptureError> {
        let result = self.try_start(on_frame);
        if let Err(e) = &result {
            log::error!("capture: start failed: {e}");
            self.stop();
        }
        result
    }

    fn try_start(&mut self, on_frame: FrameSink) -> Result<(), CaptureError> {
        let graph = match &self.graph {
            Some(graph) => Arc::clone(graph),
            None => {
                let format = self.device.open_engine()?;
                log::debug!(
                    "capture: engine open at {} Hz, {} channel(s)",
                    format.sample_rate,
                    format.channels
                );
                let graph = Arc::new(Mutex::new(Graph {
                    chunker: FrameChunker::with_target(
                        format.sample_rate,
                        self.target_rate,
                        self.frame_samples,
                    ),
                    channels: format.channels,
                    sink: None,
                }));
                self.graph = Some(Arc::clone(&graph));
                graph
            }
        };

        self.device.resume()?;

        if self.input_open {
            self.device.close_input();
            self.input_open = false;
        }

        if let Ok(mut g) = graph.lock() {
            g.chunker.reset();
            g.sink = Some(on_frame);
        }

        let callback_graph = Arc::clone(&graph);
        self.device.open_input(
            &self.constraints,
            Box::new(move |data: &[f32]| {
                // A poisoned lock drops the block; the audio thread never panics.
                if let Ok(mut g) = callback_graph.lock() {
                    g.on_block(data);
                }
            }),
        )?;
        self.input_open = true;

        log::info!("capture: microphone stream started");
        Ok(())
    }

    /// Disconnect the sink, release the microphone and close the engine.
    ///
    /// Safe to call repeatedly and before any `start`.
    pub fn stop(&mut self) {
        if let Some(graph) = self.graph.take() {
            let mut g = match graph.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            g.sink = None;
        }

        if self.input_open {
            self.device.close_input();
            self.input_open = false;
        }

        self.device.close_engine();
        log::debug!("capture: stopped");
    }

    /// Returns `true` while a microphone stream is open.
    pub fn is_running(&self) -> bool {
        self.input_open
    }

    /// Access to the underlying device (used by tests and diagnostics).
    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: AudioDevice> Drop for CaptureController<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Counts lifecycle calls and keeps the block callback so tests can play
    /// the role of the audio thread.
    #[derive(Default)]
    pub(crate) struct FakeDeviceState {
        pub engine_opens: usize,
        pub engine_closes: usize,
        pub resumes: usize,
        pub input_opens: usize,
        pub input_closes: usize,
        pub engine_open: bool,
        pub callback: Option<BlockCallback>,
        pub last_constraints: Option<InputConstraints>,
        /// Thread of every engine open/close call.
        pub engine_threads: Vec<std::thread::ThreadId>,
    }

    #[derive(Clone)]
    pub(crate) struct FakeDevice {
        pub state: Arc<Mutex<FakeDeviceState>>,
        pub format: DeviceFormat,
        pub deny: bool,
    }

    impl FakeDevice {
        pub fn new(sample_rate: u32, channels: u16) -> Self {
            Self {
                state: Arc::new(Mutex::new(FakeDeviceState::default())),
                format: DeviceFormat {
                    sample_rate,
                    channels,
                },
                deny: false,
            }
        }

        pub fn denied() -> Self {
            Self {
                deny: true,
                ..Self::new(48_000, 1)
            }
        }

        /// Simulate one driver callback.  Returns `false` when no stream is open.
        pub fn feed(&self, block: &[f32]) -> bool {
            let mut st = self.state.lock().unwrap();
            match st.callback.as_mut() {
                Some(cb) => {
                    cb(block);
                    true
                }
                None => false,
            }
        }
    }

    impl AudioDevice for FakeDevice {
        fn open_engine(&mut self) -> Result<DeviceFormat, CaptureError> {
            let mut st = self.state.lock().unwrap();
            st.engine_opens += 1;
            st.engine_open = true;
            st.engine_threads.push(std::thread::current().id());
            Ok(self.format)
        }

        fn resume(&mut self) -> Result<(), CaptureError> {
            let mut st = self.state.lock().unwrap();
            if !st.engine_open {
                return Err(CaptureError::EngineClosed);
            }
            st.resumes += 1;
            Ok(())
        }

        fn open_input(
            &mut self,
            constraints: &InputConstraints,
            on_block: BlockCallback,
        ) -> Result<(), CaptureError> {
            if self.deny {
                return Err(CaptureError::PermissionDenied("denied by user".into()));
            }
            let mut st = self.state.lock().unwrap();
            st.input_opens += 1;
            st.last_constraints = Some(*constraints);
            st.callback = Some(on_block);
            Ok(())
        }

        fn close_input(&mut self) {
            let mut st = self.state.lock().unwrap();
            if st.callback.take().is_some() {
                st.input_closes += 1;
            }
        }

        fn close_engine(&mut self) {
            let mut st = self.state.lock().unwrap();
            st.engine_threads.push(std::thread::current().id());
            if st.engine_open {
                st.engine_open = false;
                st.engine_closes += 1;
            }
        }
    }

    fn collecting_sink() -> (FrameSink, Arc<Mutex<Vec<AudioFrame>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink_frames = Arc::clone(&frames);
        let sink: FrameSink = Box::new(move |f| sink_frames.lock().unwrap().push(f));
        (sink, frames)
    }

    #[test]
    fn start_delivers_frames_to_sink() {
        let device = FakeDevice::new(48_000, 1);
        let mut capture = CaptureController::new(device.clone(), InputConstraints::default());
        let (sink, frames) = collecting_sink();

        capture.start(sink).unwrap();
        assert!(capture.is_running());
        assert!(device.feed(&vec![0.2_f32; 4_800]));

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), FRAME_SAMPLES);
    }

    #[test]
    fn constraints_are_passed_to_device() {
        let device = FakeDevice::new(16_000, 1);
        let mut capture = CaptureController::new(device.clone(), InputConstraints::default());
        let (sink, _) = collecting_sink();
        capture.start(sink).unwrap();

        let st = device.state.lock().unwrap();
        assert_eq!(st.last_constraints, Some(InputConstraints::default()));
    }

    #[test]
    fn stereo_device_uses_first_channel() {
        let device = FakeDevice::new(16_000, 2);
        let mut capture =
            CaptureController::with_frame_format(device.clone(), InputConstraints::default(), 16_000, 2);
        let (sink, frames) = collecting_sink();
        capture.start(sink).unwrap();

        device.feed(&[1.0, -1.0, 1.0, -1.0]);
        let frames = frames.lock().unwrap();
        assert_eq!(frames[0].samples(), &[i16::MAX, i16::MAX]);
    }

    #[test]
    fn no_frames_after_stop() {
        let device = FakeDevice::new(16_000, 1);
        let mut capture = CaptureController::new(device.clone(), InputConstraints::default());
        let (sink, frames) = collecting_sink();
        capture.start(sink).unwrap();

        // Keep a handle on the callback to simulate a late driver block.
        let late = device.state.lock().unwrap().callback.take();
        capture.stop();

        let mut late = late.expect("callback registered");
        late(&vec![0.5_f32; FRAME_SAMPLES * 2]);
        assert!(frames.lock().unwrap().is_empty());
        assert!(!device.feed(&[0.5; 16]));
    }

    #[test]
    fn stop_is_idempotent_and_safe_before_start() {
        let device = FakeDevice::new(48_000, 1);
        let mut capture = CaptureController::new(device.clone(), InputConstraints::default());
        capture.stop();
        capture.stop();

        let st = device.state.lock().unwrap();
        assert_eq!(st.engine_closes, 0);
        assert_eq!(st.input_closes, 0);
    }

    #[test]
    fn stop_releases_engine_and_input() {
        let device = FakeDevice::new(48_000, 1);
        let mut capture = CaptureController::new(device.clone(), InputConstraints::default());
        let (sink, _) = collecting_sink();
        capture.start(sink).unwrap();
        capture.stop();
        capture.stop();

        let st = device.state.lock().unwrap();
        assert_eq!(st.engine_opens, 1);
        assert_eq!(st.engine_closes, 1);
        assert_eq!(st.input_opens, 1);
        assert_eq!(st.input_closes, 1);
        assert!(!st.engine_open);
        assert!(!capture.is_running());
    }

    #[test]
    fn repeated_start_reuses_engine_but_opens_fresh_input() {
        let device = FakeDevice::new(48_000, 1);
        let mut capture = CaptureController::new(device.clone(), InputConstraints::default());
        let (first, _) = collecting_sink();
        let (second, frames) = collecting_sink();

        capture.start(first).unwrap();
        capture.start(second).unwrap();
        device.feed(&vec![0.0_f32; 4_800]);

        let st = device.state.lock().unwrap();
        assert_eq!(st.engine_opens, 1);
        assert_eq!(st.resumes, 2);
        assert_eq!(st.input_opens, 2);
        assert_eq!(st.input_closes, 1);
        drop(st);
        assert_eq!(frames.lock().unwrap().len(), 1);
    }

    #[test]
    fn start_stop_cycles_leave_nothing_open() {
        let device = FakeDevice::new(44_100, 1);
        let mut capture = CaptureController::new(device.clone(), InputConstraints::default());
        for _ in 0..2 {
            let (sink, _) = collecting_sink();
            capture.start(sink).unwrap();
            capture.stop();
        }

        let st = device.state.lock().unwrap();
        assert_eq!(st.engine_opens, st.engine_closes);
        assert_eq!(st.input_opens, st.input_closes);
        assert!(st.callback.is_none());
    }

    #[test]
    fn permission_denied_surfaces_and_releases_engine() {
        let device = FakeDevice::denied();
        let mut capture = CaptureController::new(device.clone(), InputConstraints::default());
        let (sink, _) = collecting_sink();

        let err = capture.start(sink).unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied(_)));
        assert!(!capture.is_running());

        let st = device.state.lock().unwrap();
        assert_eq!(st.engine_closes, 1);
    }
}
