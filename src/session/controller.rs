//! Session controller: owns capture, the channel and the finalize timer.
//!
//! # Architecture
//!
//! ```text
//!  SessionHandle ──(SessionCommand)──▶ ┌──────────────────────────────┐
//!                                      │      SessionController       │
//!  CaptureController ──(AudioFrame)──▶ │  select! { commands,          │ ──▶ Channel (binary)
//!  Channel (text) ──────(Inbound)────▶ │            inbound,           │
//!                                      │            frames,            │
//!                                      │            finalize timer }   │
//!                                      └──────────────┬───────────────┘
//!                                                     │ SessionCore
//!                                                     ▼
//!                                   broadcast::Sender<SessionUpdate>
//! ```
//!
//! Everything runs on one task, so network events are applied strictly in
//! arrival order and the finalize timer can never race a chunk handler.
//! Stopping drops the timer, the frame queue and the channel together, so no
//! callback can touch session state afterwards.
//!
//! Device calls block until the audio engine acknowledges them, so capture
//! start/stop run on the blocking pool and the loop awaits their result.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};

use crate::audio::{AudioDevice, AudioFrame, CaptureController, FrameSink, Playback};
use crate::config::AppConfig;

use super::channel::{Channel, ChannelError, Connector, Inbound};
use super::core::{SessionCore, SessionUpdate};
use super::state::SessionStatus;
use super::SessionError;

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum SessionCommand {
    Start,
    /// Stop and acknowledge once everything is released.
    Stop(Option<oneshot::Sender<()>>),
}

/// Cloneable front-end to a running [`SessionController`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionHandle {
    /// Ask the controller to start a session.  Returns once queued.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::Start)
            .await
            .map_err(|_| SessionError::ControllerGone)
    }

    /// Stop the session and wait until capture, timer and channel are gone.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Stop(Some(tx)))
            .await
            .map_err(|_| SessionError::ControllerGone)?;
        rx.await.map_err(|_| SessionError::ControllerGone)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Settings the controller reads at construction.
#[derive(Debug, Clone)]
struct ControllerSettings {
    url: String,
    finalize_debounce: Duration,
    frame_queue: usize,
}

enum Step {
    Command(Option<SessionCommand>),
    Inbound(Option<Result<Inbound, ChannelError>>),
    Frame(Option<AudioFrame>),
    Finalize,
}

enum Connected {
    Open(Box<dyn Channel>),
    Failed(ChannelError),
    Interrupted(Option<oneshot::Sender<()>>),
}

pub struct SessionController<D: AudioDevice> {
    settings: ControllerSettings,
    connector: Box<dyn Connector>,
    capture: Arc<Mutex<CaptureController<D>>>,
    core: SessionCore,
    commands: mpsc::Receiver<SessionCommand>,
    channel: Option<Box<dyn Channel>>,
    frames: Option<mpsc::Receiver<AudioFrame>>,
    finalize_timer: Option<Pin<Box<Sleep>>>,
}

impl<D: AudioDevice + 'static> SessionController<D> {
    pub fn new(
        config: &AppConfig,
        connector: Box<dyn Connector>,
        capture: CaptureController<D>,
        playback: Box<dyn Playback>,
    ) -> (Self, SessionHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (updates, _) = broadcast::channel(config.session.update_capacity.max(1));

        let controller = Self {
            settings: ControllerSettings {
                url: config.server.url.clone(),
                finalize_debounce: Duration::from_millis(config.session.finalize_debounce_ms),
                frame_queue: config.audio.frame_queue.max(1),
            },
            connector,
            capture: Arc::new(Mutex::new(capture)),
            core: SessionCore::new(playback, updates.clone()),
            commands: cmd_rx,
            channel: None,
            frames: None,
            finalize_timer: None,
        };
        let handle = SessionHandle {
            commands: cmd_tx,
            updates,
        };
        (controller, handle)
    }

    pub fn core(&self) -> &SessionCore {
        &self.core
    }

    /// Returns `true` while the microphone stream is open.
    pub fn capture_running(&self) -> bool {
        match self.capture.lock() {
            Ok(capture) => capture.is_running(),
            Err(poisoned) => poisoned.into_inner().is_running(),
        }
    }

    /// Returns `true` while a finalize deadline is armed.
    pub fn finalize_pending(&self) -> bool {
        self.finalize_timer.is_some()
    }

    /// Returns `true` while a channel is open.
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Run until every [`SessionHandle`] is dropped.  Any live session is
    /// stopped on the way out.  Returns the controller for inspection.
    pub async fn run(mut self) -> Self {
        log::info!("session: controller running");
        loop {
            let step = tokio::select! {
                biased;
                cmd = self.commands.recv() => Step::Command(cmd),
                msg = next_inbound(self.channel.as_mut()) => Step::Inbound(msg),
                frame = next_frame(self.frames.as_mut()) => Step::Frame(frame),
                () = finalize_deadline(self.finalize_timer.as_mut()) => Step::Finalize,
            };

            match step {
                Step::Command(None) => {
                    self.stop().await;
                    break;
                }
                Step::Command(Some(SessionCommand::Start)) => self.start().await,
                Step::Command(Some(SessionCommand::Stop(ack))) => {
                    self.stop().await;
                    acknowledge(ack);
                }
                Step::Inbound(msg) => self.on_inbound(msg).await,
                Step::Frame(Some(frame)) => self.send_frame(frame).await,
                Step::Frame(None) => self.frames = None,
                Step::Finalize => {
                    self.finalize_timer = None;
                    self.core.finalize_if_ready();
                }
            }
        }
        log::info!("session: controller exiting");
        self
    }

    // ---- Start / stop ------------------------------------------------------

    async fn start(&mut self) {
        if self.is_active() {
            log::warn!("session: start ignored, session already running");
            return;
        }

        self.core.reset();
        self.core.set_status(SessionStatus::Connecting);

        match self.connect().await {
            Connected::Open(channel) => {
                self.channel = Some(channel);
                self.core.mark_connected();
                self.core.log("Session started.");
                self.start_capture().await;
            }
            Connected::Failed(e) => {
                self.core.log("WebSocket error");
                self.fail(e.into()).await;
            }
            Connected::Interrupted(ack) => {
                log::info!("session: stop requested while connecting");
                self.stop().await;
                acknowledge(ack);
            }
        }
    }

    /// Connect while still listening for a stop request.
    async fn connect(&mut self) -> Connected {
        let connect = self.connector.connect(&self.settings.url);
        tokio::pin!(connect);
        loop {
            tokio::select! {
                biased;
                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Start) => {
                        log::warn!("session: start ignored, already connecting");
                    }
                    Some(SessionCommand::Stop(ack)) => return Connected::Interrupted(ack),
                    None => return Connected::Interrupted(None),
                },
                result = &mut connect => {
                    return match result {
                        Ok(channel) => Connected::Open(channel),
                        Err(e) => Connected::Failed(e),
                    };
                }
            }
        }
    }

    async fn start_capture(&mut self) {
        let (tx, rx) = mpsc::channel(self.settings.frame_queue);
        let sink: FrameSink = Box::new(move |frame| {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(frame) {
                log::warn!("session: frame queue full, dropping frame");
            }
        });

        let started = self
            .with_capture(move |capture| capture.start(sink))
            .await
            .map_err(SessionError::from)
            .and_then(|result| result.map_err(SessionError::from));

        match started {
            Ok(()) => {
                self.frames = Some(rx);
                self.core.mark_recording();
                self.core.log("Audio capture started.");
            }
            Err(e) => self.fail(e).await,
        }
    }

    /// Tear down whatever is still running and return the session to its
    /// initial state.
    async fn stop(&mut self) {
        self.core.log("Session ended");
        if self.is_active() {
            self.teardown().await;
        }
        self.core.reset_session();
    }

    /// Release the timer, capture, playback and channel.
    async fn teardown(&mut self) {
        self.finalize_timer = None;
        if let Err(e) = self.with_capture(|capture| capture.stop()).await {
            log::error!("session: capture stop failed: {e}");
        }
        self.frames = None;
        self.core.stop_playback();
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
    }

    async fn fail(&mut self, err: SessionError) {
        log::error!("session: {err}");
        self.core.log(format!("Error: {err}"));
        self.core.set_status(SessionStatus::Error);
        self.stop().await;
    }

    fn is_active(&self) -> bool {
        self.channel.is_some()
            || self.capture_running()
            || matches!(
                self.core.session().status,
                SessionStatus::Connecting | SessionStatus::Listening
            )
    }

    /// Run `f` against the capture controller on the blocking pool.
    fn with_capture<T, F>(&self, f: F) -> JoinHandle<T>
    where
        F: FnOnce(&mut CaptureController<D>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let capture = Arc::clone(&self.capture);
        tokio::task::spawn_blocking(move || {
            let mut capture = match capture.lock() {
                Ok(capture) => capture,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut capture)
        })
    }

    // ---- Channel traffic ---------------------------------------------------

    async fn on_inbound(&mut self, msg: Option<Result<Inbound, ChannelError>>) {
        match msg {
            Some(Ok(Inbound::Text(text))) => {
                if self.core.handle_message(&text) {
                    self.arm_finalize();
                }
            }
            Some(Ok(Inbound::Binary(len))) => {
                log::debug!("session: ignoring {len}-byte binary message");
            }
            Some(Err(e)) => {
                self.core.log("WebSocket error");
                self.fail(e.into()).await;
            }
            None => {
                self.core.log("WebSocket disconnected");
                self.teardown().await;
                self.core.mark_disconnected();
            }
        }
    }

    async fn send_frame(&mut self, frame: AudioFrame) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if let Err(e) = channel.send_frame(frame).await {
            self.core.log("WebSocket error");
            self.fail(e.into()).await;
        }
    }

    /// Push the finalize deadline out by the debounce interval.
    fn arm_finalize(&mut self) {
        let deadline = Instant::now() + self.settings.finalize_debounce;
        match self.finalize_timer.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.finalize_timer = Some(Box::pin(tokio::time::sleep_until(deadline))),
        }
    }
}

// ---------------------------------------------------------------------------
// select! helpers
// ---------------------------------------------------------------------------

async fn next_inbound(
    channel: Option<&mut Box<dyn Channel>>,
) -> Option<Result<Inbound, ChannelError>> {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_frame(frames: Option<&mut mpsc::Receiver<AudioFrame>>) -> Option<AudioFrame> {
    match frames {
        Some(frames) => frames.recv().await,
        None => std::future::pending().await,
    }
}

async fn finalize_deadline(timer: Option<&mut Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

fn acknowledge(ack: Option<oneshot::Sender<()>>) {
    if let Some(ack) = ack {
        let _ = ack.send(());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
