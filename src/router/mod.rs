//! Event router: decodes server messages and maps them onto turn
//! transitions.
//!
//! ```text
//! text frame ──decode()──▶ ServerEvent ──dispatch(Turn, _)──▶ (Turn, [Effect])
//! ```
//!
//! Events are applied strictly in arrival order; there is no reordering.
//! Undecodable messages surface as [`MalformedEvent`] and are dropped by the
//! caller without interrupting the stream.

pub mod dispatch;
pub mod events;

pub use dispatch::{dispatch, Effect, Routed};
pub use events::{decode, MalformedEvent, ServerEvent};
