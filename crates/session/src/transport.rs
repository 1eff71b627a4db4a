//! Channel transports.
//!
//! A `Transport` opens one bidirectional text channel per call. The driver
//! calls it once per epoch and owns the returned halves until the channel
//! ends. `WebSocketTransport` is the production implementation;
//! `MemoryTransport` is an in-process pair used by tests and demos.
//!
//! # Architecture
//!
//! ```text
//! SessionDriver
//!     ↓  open() per epoch
//! Transport  ──>  ChannelParts { sink: frames out, stream: frames in }
//!     ↓
//! tokio-tungstenite / in-memory mpsc
//! ```

use std::{
    pin::Pin,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt, future, sink, stream};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use super::error::SessionError;

/// Outbound half of a channel.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = SessionError> + Send>>;

/// Inbound half of a channel. Ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, SessionError>> + Send>>;

/// Both halves of one open channel.
pub struct ChannelParts {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens text channels to the server.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a new channel. Errors count as a failed attempt.
    async fn open(&self) -> Result<ChannelParts, SessionError>;
}

/// WebSocket transport using tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self) -> Result<ChannelParts, SessionError> {
        debug!("Opening WebSocket to {}", self.url);
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SessionError::Transport(root_cause(&e)))?;
        let (writer, reader) = socket.split();

        let sink = writer
            .sink_map_err(SessionError::from)
            .with(|frame: String| future::ready(Ok::<_, SessionError>(Message::Text(frame.into()))));

        // control frames are answered by tungstenite itself
        let stream = reader.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(_) => None,
                Err(e) => Some(Err(SessionError::from(e))),
            })
        });

        Ok(ChannelParts {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

/// Walks an error's source chain and returns the innermost message.
pub(crate) fn root_cause(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}

/// The server end of one `MemoryTransport` channel.
#[derive(Debug)]
pub struct MemoryPeer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: Option<mpsc::UnboundedSender<Result<String, SessionError>>>,
}

impl MemoryPeer {
    /// Next frame the client wrote. `None` once the client closed its side.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Pushes a frame to the client. Returns false if the client is gone.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.to_client
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame.into())).is_ok())
    }

    /// Breaks the channel with an error.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if let Some(tx) = self.to_client.take() {
            let _ = tx.send(Err(SessionError::Transport(reason.into())));
        }
    }

    /// Closes the channel cleanly from the server side.
    pub fn close(&mut self) {
        self.to_client = None;
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    refusals: u32,
    opens: u32,
}

/// In-process transport. Every successful open hands a `MemoryPeer` to the
/// receiver returned by `MemoryTransport::new`.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, accepted) = mpsc::unbounded_channel();
        let transport = Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            peers,
        };
        (transport, accepted)
    }

    /// Makes the next `count` opens fail.
    pub fn refuse_next(&self, count: u32) {
        self.lock().refusals += count;
    }

    /// Number of `open()` calls so far, refused ones included.
    pub fn opens(&self) -> u32 {
        self.lock().opens
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self) -> Result<ChannelParts, SessionError> {
        {
            let mut state = self.lock();
            state.opens += 1;
            if state.refusals > 0 {
                state.refusals -= 1;
                return Err(SessionError::Transport("connection refused".into()));
            }
        }

        let (client_tx, from_client) = mpsc::unbounded_channel::<String>();
        let (to_client, client_rx) = mpsc::unbounded_channel();

        self.peers
            .send(MemoryPeer {
                from_client,
                to_client: Some(to_client),
            })
            .map_err(|_| SessionError::Transport("no listener".into()))?;

        let sink = sink::unfold(client_tx, |tx, frame: String| async move {
            tx.send(frame)
                .map_err(|_| SessionError::Transport("peer went away".into()))?;
            Ok::<_, SessionError>(tx)
        });
        let stream = stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(ChannelParts {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_round_trip() {
        let (transport, mut accepted) = MemoryTransport::new();
        let ChannelParts {
            mut sink,
            mut stream,
        } = transport.open().await.unwrap();
        let mut peer = accepted.recv().await.unwrap();

        sink.send("hello".to_string()).await.unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("hello"));

        assert!(peer.send("world"));
        assert_eq!(stream.next().await.unwrap().unwrap(), "world");

        peer.close();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_memory_transport_refusals() {
        let (transport, _accepted) = MemoryTransport::new();
        transport.refuse_next(2);

        assert!(transport.open().await.is_err());
        assert!(transport.open().await.is_err());
        assert!(transport.open().await.is_ok());
        assert_eq!(transport.opens(), 3);
    }

    #[tokio::test]
    async fn test_memory_peer_fail_reports_error() {
        let (transport, mut accepted) = MemoryTransport::new();
        let mut parts = transport.open().await.unwrap();
        let mut peer = accepted.recv().await.unwrap();

        peer.fail("reset by peer");
        let item = parts.stream.next().await.unwrap();
        assert!(matches!(item, Err(SessionError::Transport(_))));
        assert!(parts.stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_websocket_open_to_closed_port_fails() {
        let transport = WebSocketTransport::new("ws://127.0.0.1:9/ws");
        let result = transport.open().await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
    }

    #[test]
    fn test_root_cause_walks_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "\"deep\"");
        assert_eq!(root_cause(&io), "deep");
    }
}
