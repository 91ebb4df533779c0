//! Bidirectional message channel to the voice-agent server.
//!
//! Outbound: one binary message per [`AudioFrame`] (3200 bytes of PCM16 LE).
//! Inbound: JSON text messages, handed to the router as-is.  The
//! [`Connector`] / [`Channel`] seam lets the controller run against an
//! in-memory server in tests.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::audio::AudioFrame;

// ---------------------------------------------------------------------------
// ChannelError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("failed to send audio frame: {0}")]
    Send(String),

    #[error("failed to receive message: {0}")]
    Receive(String),

    #[error("channel is closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// One inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// Binary payloads are not part of the protocol; only the size is kept
    /// for logging.
    Binary(usize),
}

/// An open channel.
#[async_trait]
pub trait Channel: Send {
    /// Send one frame as a binary message.
    async fn send_frame(&mut self, frame: AudioFrame) -> Result<(), ChannelError>;

    /// Next inbound message.  `None` once the peer has closed the channel.
    async fn recv(&mut self) -> Option<Result<Inbound, ChannelError>>;

    /// Close from this side.  Never fails; errors are logged.
    async fn close(&mut self);
}

/// Opens channels.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Channel>, ChannelError>;
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

/// Connects over WebSocket (`ws://` or `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Channel>, ChannelError> {
        log::info!("channel: connecting to {url}");
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Connect {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        log::debug!("channel: handshake complete ({})", response.status());
        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Channel for WsChannel {
    async fn send_frame(&mut self, frame: AudioFrame) -> Result<(), ChannelError> {
        self.stream
            .send(Message::Binary(frame.into_le_bytes()))
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Inbound, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Inbound::Text(text))),
                Ok(Message::Binary(data)) => return Some(Ok(Inbound::Binary(data.len()))),
                Ok(Message::Close(frame)) => {
                    log::debug!("channel: close frame received: {frame:?}");
                    return None;
                }
                // Ping/pong are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(ChannelError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            log::debug!("channel: close: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;

    use super::*;

    /// What the in-memory server has seen, plus the handle used to push
    /// messages to the client.
    #[derive(Default)]
    pub(crate) struct FakeServerState {
        pub connects: usize,
        pub closes: usize,
        pub sent: Vec<Vec<u8>>,
        pub outbound: Option<mpsc::UnboundedSender<Result<Inbound, ChannelError>>>,
        pub fail_connect: bool,
        pub hang_connect: bool,
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakeServer {
        pub state: Arc<Mutex<FakeServerState>>,
    }

    impl FakeServer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Push a text message to the connected client.  Returns `false`
        /// when no client is connected.
        pub fn send_text(&self, text: &str) -> bool {
            self.push(Ok(Inbound::Text(text.to_owned())))
        }

        pub fn push(&self, msg: Result<Inbound, ChannelError>) -> bool {
            let st = self.state.lock().unwrap();
            match &st.outbound {
                Some(tx) => tx.send(msg).is_ok(),
                None => false,
            }
        }

        /// Close from the server side.
        pub fn hang_up(&self) {
            self.state.lock().unwrap().outbound = None;
        }
    }

    #[async_trait]
    impl Connector for FakeServer {
        async fn connect(&self, _url: &str) -> Result<Box<dyn Channel>, ChannelError> {
            let (fail, hang) = {
                let st = self.state.lock().unwrap();
                (st.fail_connect, st.hang_connect)
            };
            if hang {
                std::future::pending::<()>().await;
            }
            if fail {
                return Err(ChannelError::Connect {
                    url: "fake".into(),
                    reason: "refused".into(),
                });
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let mut st = self.state.lock().unwrap();
            st.connects += 1;
            st.outbound = Some(tx);
            Ok(Box::new(FakeChannel {
                server: self.clone(),
                inbound: rx,
            }))
        }
    }

    struct FakeChannel {
        server: FakeServer,
        inbound: mpsc::UnboundedReceiver<Result<Inbound, ChannelError>>,
    }

    #[async_trait]
    impl Channel for FakeChannel {
        async fn send_frame(&mut self, frame: AudioFrame) -> Result<(), ChannelError> {
            self.server
                .state
                .lock()
                .unwrap()
                .sent
                .push(frame.into_le_bytes());
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<Inbound, ChannelError>> {
            self.inbound.recv().await
        }

        async fn close(&mut self) {
            self.inbound.close();
            self.server.state.lock().unwrap().closes += 1;
        }
    }

    #[tokio::test]
    async fn fake_channel_round_trip() {
        let server = FakeServer::new();
        let mut channel = server.connect("ws://test").await.unwrap();

        assert!(server.send_text("{}"));
        assert_eq!(
            channel.recv().await.unwrap().unwrap(),
            Inbound::Text("{}".into())
        );

        channel
            .send_frame(AudioFrame::new(vec![0; 1600]))
            .await
            .unwrap();
        assert_eq!(server.state.lock().unwrap().sent[0].len(), 3200);

        server.hang_up();
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test]
    async fn ws_connect_failure_is_reported() {
        // Port 9 (discard) is not expected to speak WebSocket.
        let err = match WsConnector.connect("ws://127.0.0.1:9/ws").await {
            Err(e) => e,
            Ok(_) => return,
        };
        assert!(matches!(err, ChannelError::Connect { .. }));
    }

    #[test]
    fn error_messages_name_the_failure() {
        let err = ChannelError::Connect {
            url: "ws://localhost:8000/ws".into(),
            reason: "refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to connect to ws://localhost:8000/ws: refused"
        );
    }
}
