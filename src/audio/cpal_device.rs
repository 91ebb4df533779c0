//! Production [`AudioDevice`] built on `cpal`.
//!
//! `cpal::Stream` is not `Send` on every platform, so the engine lives on a
//! dedicated thread that owns the host, the device and the current input
//! stream.  [`CpalDevice`] talks to it over a command channel and waits for
//! an acknowledgement on every call; when `close_input` returns the stream
//! has been dropped and the callback will not run again.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::capture::{AudioDevice, BlockCallback, CaptureError, DeviceFormat, InputConstraints};

// ---------------------------------------------------------------------------
// Engine thread protocol
// ---------------------------------------------------------------------------

type Reply<T> = mpsc::SyncSender<T>;

enum EngineCommand {
    Resume(Reply<Result<(), CaptureError>>),
    OpenInput(BlockCallback, Reply<Result<(), CaptureError>>),
    CloseInput(Reply<()>),
    Shutdown,
}

struct Engine {
    tx: mpsc::Sender<EngineCommand>,
    thread: Option<JoinHandle<()>>,
    format: DeviceFormat,
}

// ---------------------------------------------------------------------------
// CpalDevice
// ---------------------------------------------------------------------------

/// Microphone on the default cpal host.
pub struct CpalDevice {
    /// Input device name; `None` selects the system default.
    device_name: Option<String>,
    engine: Option<Engine>,
}

impl CpalDevice {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            engine: None,
        }
    }

    fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> EngineCommand,
    ) -> Result<T, CaptureError> {
        let engine = self.engine.as_ref().ok_or(CaptureError::EngineClosed)?;
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        engine
            .tx
            .send(make(reply_tx))
            .map_err(|_| CaptureError::EngineClosed)?;
        reply_rx.recv().map_err(|_| CaptureError::EngineClosed)
    }
}

impl AudioDevice for CpalDevice {
    fn open_engine(&mut self) -> Result<DeviceFormat, CaptureError> {
        if let Some(engine) = &self.engine {
            return Ok(engine.format);
        }

        let (tx, rx) = mpsc::channel::<EngineCommand>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<DeviceFormat, CaptureError>>(1);
        let device_name = self.device_name.clone();

        let thread = std::thread::Builder::new()
            .name("audio-engine".into())
            .spawn(move || engine_main(device_name, rx, ready_tx))?;

        let format = match ready_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CaptureError::EngineClosed);
            }
        };

        self.engine = Some(Engine {
            tx,
            thread: Some(thread),
            format,
        });
        Ok(format)
    }

    fn resume(&mut self) -> Result<(), CaptureError> {
        self.request(EngineCommand::Resume)?
    }

    fn open_input(
        &mut self,
        constraints: &InputConstraints,
        on_block: BlockCallback,
    ) -> Result<(), CaptureError> {
        // cpal exposes no voice-processing switches; the host stack decides.
        log::debug!(
            "capture: requested echo_cancellation={} noise_suppression={} auto_gain_control={}",
            constraints.echo_cancellation,
            constraints.noise_suppression,
            constraints.auto_gain_control
        );
        self.request(|reply| EngineCommand::OpenInput(on_block, reply))?
    }

    fn close_input(&mut self) {
        if self.engine.is_some() {
            let _ = self.request(EngineCommand::CloseInput);
        }
    }

    fn close_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            let _ = engine.tx.send(EngineCommand::Shutdown);
            if let Some(thread) = engine.thread.take() {
                let _ = thread.join();
            }
            log::debug!("capture: audio engine closed");
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.close_engine();
    }
}

// ---------------------------------------------------------------------------
// Engine thread
// ---------------------------------------------------------------------------

fn engine_main(
    device_name: Option<String>,
    rx: mpsc::Receiver<EngineCommand>,
    ready: Reply<Result<DeviceFormat, CaptureError>>,
) {
    let (device, supported) = match resolve_device(device_name.as_deref()) {
        Ok(found) => found,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let format = DeviceFormat {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    if ready.send(Ok(format)).is_err() {
        return;
    }

    let mut stream: Option<cpal::Stream> = None;

    while let Ok(cmd) = rx.recv() {
        match cmd {
            EngineCommand::Resume(reply) => {
                let result = match &stream {
                    Some(s) => s.play().map_err(CaptureError::from),
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
            EngineCommand::OpenInput(on_block, reply) => {
                stream = None;
                let result = build_stream(&device, &config, sample_format, on_block).and_then(|s| {
                    s.play()?;
                    stream = Some(s);
                    Ok(())
                });
                let _ = reply.send(result);
            }
            EngineCommand::CloseInput(reply) => {
                stream = None;
                let _ = reply.send(());
            }
            EngineCommand::Shutdown => break,
        }
    }
    // Dropping `stream`, `device` and the host releases the hardware.
}

fn resolve_device(
    name: Option<&str>,
) -> Result<(cpal::Device, cpal::SupportedStreamConfig), CaptureError> {
    let host = cpal::default_host();

    let device = match name {
        Some(wanted) => host
            .input_devices()
            .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or(CaptureError::NoDevice)?,
        None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
    };

    let supported = device.default_input_config()?;
    log::debug!(
        "capture: using '{}' ({} Hz, {} ch, {:?})",
        device.name().unwrap_or_default(),
        supported.sample_rate().0,
        supported.channels(),
        supported.sample_format()
    );
    Ok((device, supported))
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mut on_block: BlockCallback,
) -> Result<cpal::Stream, CaptureError> {
    let on_error = |err: cpal::StreamError| {
        log::error!("cpal stream error: {err}");
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| on_block(data),
            on_error,
            None,
        )?,
        cpal::SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_input_stream(
                config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| f32::from(s) / 32_768.0));
                    on_block(&scratch);
                },
                on_error,
                None,
            )?
        }
        other => {
            log::error!("capture: unsupported input sample format {other:?}");
            return Err(CaptureError::BuildStream(
                cpal::BuildStreamError::StreamConfigNotSupported,
            ));
        }
    };
    Ok(stream)
}
