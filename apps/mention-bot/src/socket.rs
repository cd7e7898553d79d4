//! Realtime (RTM) WebSocket connection.
//!
//! [`RtmConnector`] opens a session with `rtm.connect` and attaches a
//! background reader to the WebSocket. The reader decodes frames into
//! [`RtmEvent`]s and queues them; [`RtmStream::read`] drains whatever has
//! arrived since the previous poll without waiting.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use crate::error::BotError;
use crate::events::RtmEvent;
use crate::slack_client::{Params, SlackApi, is_ok};

/// Type alias for the WebSocket stream with optional TLS.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A polled source of realtime events.
pub trait EventStream: Send {
    /// Returns every event received since the previous read, in arrival
    /// order, without waiting. An empty batch means nothing arrived.
    ///
    /// # Errors
    ///
    /// Returns `BotError::WebSocket` once the underlying connection is gone.
    fn read(&mut self) -> Result<Vec<RtmEvent>, BotError>;
}

/// Opens realtime sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes a new session.
    ///
    /// # Errors
    ///
    /// Returns `BotError` if the session cannot be opened.
    async fn connect(&self) -> Result<Box<dyn EventStream>, BotError>;
}

/// Opens RTM sessions with the bot token.
pub struct RtmConnector {
    slack: Arc<dyn SlackApi>,
}

impl std::fmt::Debug for RtmConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtmConnector").finish_non_exhaustive()
    }
}

impl RtmConnector {
    /// Creates a connector that calls `rtm.connect` through `slack`.
    pub fn new(slack: Arc<dyn SlackApi>) -> Self {
        Self { slack }
    }
}

#[async_trait]
impl Connector for RtmConnector {
    async fn connect(&self) -> Result<Box<dyn EventStream>, BotError> {
        let resp = self.slack.api_call("rtm.connect", Params::new()).await?;
        if !is_ok(&resp) {
            return Err(BotError::Connection(format!(
                "rtm.connect error: {}",
                resp.get("error").and_then(|e| e.as_str()).unwrap_or("unknown")
            )));
        }
        let url = resp
            .get("url")
            .and_then(|u| u.as_str())
            .ok_or_else(|| BotError::Connection("rtm.connect response missing 'url'".into()))?;

        let (ws_stream, _response): (WsStream, _) = connect_async(url)
            .await
            .map_err(|e| BotError::WebSocket(format!("WebSocket connect failed: {e}")))?;
        info!("WebSocket connected to Slack RTM");

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_frames(ws_stream, tx));
        Ok(Box::new(RtmStream::new(rx, Some(reader))))
    }
}

/// What the reader task hands to the poller.
#[derive(Debug)]
enum Frame {
    Event(RtmEvent),
    Closed(String),
}

/// Event stream fed by a background WebSocket reader.
#[derive(Debug)]
pub struct RtmStream {
    rx: mpsc::UnboundedReceiver<Frame>,
    reader: Option<JoinHandle<()>>,
    closed: Option<String>,
}

impl RtmStream {
    fn new(rx: mpsc::UnboundedReceiver<Frame>, reader: Option<JoinHandle<()>>) -> Self {
        Self {
            rx,
            reader,
            closed: None,
        }
    }
}

impl EventStream for RtmStream {
    fn read(&mut self) -> Result<Vec<RtmEvent>, BotError> {
        if let Some(reason) = self.closed.take() {
            return Err(BotError::WebSocket(reason));
        }

        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(Frame::Event(event)) => events.push(event),
                Ok(Frame::Closed(reason)) => {
                    if events.is_empty() {
                        return Err(BotError::WebSocket(reason));
                    }
                    // Deliver what arrived before the close first.
                    self.closed = Some(reason);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if events.is_empty() {
                        return Err(BotError::WebSocket("reader task stopped".into()));
                    }
                    break;
                }
            }
        }
        Ok(events)
    }
}

impl Drop for RtmStream {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Decodes one text frame. Frames that are not events (acks, malformed
/// messages) yield `None`.
fn parse_frame(text: &str) -> Option<RtmEvent> {
    match serde_json::from_str::<RtmEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "Ignoring non-event frame");
            None
        }
    }
}

/// Reads frames until the connection ends, answering pings on the way.
async fn read_frames(mut ws: WsStream, tx: mpsc::UnboundedSender<Frame>) {
    let reason = loop {
        let Some(msg) = ws.next().await else {
            break "WebSocket stream ended".to_string();
        };

        match msg {
            Err(e) => break format!("WebSocket read error: {e}"),
            Ok(WsMessage::Text(text)) => {
                let text: &str = &text;
                if let Some(event) = parse_frame(text) {
                    if tx.send(Frame::Event(event)).is_err() {
                        return;
                    }
                }
            }
            Ok(WsMessage::Ping(data)) => {
                if let Err(e) = ws.send(WsMessage::Pong(data)).await {
                    break format!("Pong send failed: {e}");
                }
            }
            Ok(WsMessage::Close(_)) => break "Received WebSocket close frame".to_string(),
            Ok(_) => {} // binary and pong frames are not used
        }
    };

    info!(reason, "Realtime connection closed");
    let _ = tx.send(Frame::Closed(reason));
}
