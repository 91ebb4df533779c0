//! Session lifecycle: start/stop, the network channel and event handling.
//!
//! * [`SessionController`]: single task owning capture, channel and the
//!   finalize timer.
//! * [`SessionHandle`]: cloneable command/subscribe front-end.
//! * [`SessionCore`]: turn, latency, waterfall, activity and log state.
//! * [`Connector`] / [`Channel`]: transport seam; [`WsConnector`] for real
//!   servers.

pub mod channel;
pub mod controller;
pub mod core;
pub mod state;

use thiserror::Error;

use crate::audio::CaptureError;

pub use self::core::{SessionCore, SessionUpdate};
pub use channel::{Channel, ChannelError, Connector, Inbound, WsConnector};
pub use controller::{SessionCommand, SessionController, SessionHandle};
pub use state::{SessionState, SessionStatus};

/// Session-fatal failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Device(#[from] CaptureError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("capture task failed: {0}")]
    CaptureTask(#[from] tokio::task::JoinError),

    #[error("session controller has shut down")]
    ControllerGone,
}
