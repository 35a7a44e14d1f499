// WebSocket transport to the relay.
//
// A `Connection` owns one reader task (frames -> `TransportEvent`s) and one
// writer task (outbound queue -> frames). Every event carries the generation
// of the connection that produced it so the orchestrator can drop anything a
// superseded connection emits.

use anyhow::Context;
use async_trait::async_trait;
use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use tictactoe_core::{ClientMessage, ServerMessage};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    /// A well-formed relay event.
    Message(ServerMessage),
    /// The relay closed the socket or the link failed.
    Closed,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Handle to an open relay connection.
#[derive(Debug)]
pub struct Connection {
    generation: u64,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Assemble a connection from an outbound queue and the tasks serving it.
    pub fn from_parts(
        generation: u64,
        outbound: mpsc::UnboundedSender<ClientMessage>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Connection {
            generation,
            outbound,
            tasks,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a message for the writer. Fire-and-forget: a dead writer only
    /// produces a log line.
    pub fn send(&self, message: ClientMessage) {
        if self.outbound.send(message).is_err() {
            warn!(generation = self.generation, "outbound queue closed, message dropped");
        }
    }

    pub fn join_request(&self) {
        self.send(ClientMessage::JoinGame {});
    }

    pub fn make_move(&self, cell: usize, session_id: &str) {
        self.send(ClientMessage::MakeMove {
            position: cell,
            game_id: session_id.to_string(),
        });
    }

    /// Tear the connection down: abort both tasks and wait until they are
    /// gone, so nothing from this generation is emitted afterwards.
    pub async fn close(self) {
        let Connection {
            generation,
            outbound,
            tasks,
        } = self;
        drop(outbound);
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        debug!(generation, "connection closed");
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Opens relay connections. Events from the new connection are delivered to
/// `events`, tagged with `generation`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        generation: u64,
        events: mpsc::Sender<TransportEvent>,
    ) -> anyhow::Result<Connection>;
}

/// Production connector over tokio-tungstenite. Sends the `session` cookie
/// in the handshake so the relay can identify the player.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    url: String,
    session_token: Option<String>,
}

impl TungsteniteConnector {
    pub fn new(url: impl Into<String>, session_token: Option<String>) -> Self {
        TungsteniteConnector {
            url: url.into(),
            session_token,
        }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(
        &self,
        generation: u64,
        events: mpsc::Sender<TransportEvent>,
    ) -> anyhow::Result<Connection> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .with_context(|| format!("invalid relay URL {}", self.url))?;
        if let Some(token) = &self.session_token {
            let cookie = HeaderValue::from_str(&format!("session={token}"))
                .context("session token is not a valid header value")?;
            request.headers_mut().insert(header::COOKIE, cookie);
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .with_context(|| format!("failed to connect to relay at {}", self.url))?;
        info!(generation, url = %self.url, "connected to relay");

        let (mut write, read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();

        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to encode outbound message: {e}");
                        continue;
                    }
                };
                debug!(generation, "sending {text}");
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    warn!(generation, "WebSocket write failed: {e}");
                    break;
                }
            }
            let _ = write.close().await;
        });

        let reader = tokio::spawn(async move {
            if process_message_stream(read, &events, generation)
                .await
                .is_ok()
            {
                let _ = events
                    .send(TransportEvent {
                        generation,
                        kind: TransportEventKind::Closed,
                    })
                    .await;
            }
        });

        Ok(Connection::from_parts(generation, out_tx, vec![reader, writer]))
    }
}

// ---------------------------------------------------------------------------
// Inbound processing
// ---------------------------------------------------------------------------

/// Parse inbound frames from any message stream into `TransportEvent`s.
///
/// Text frames that are not a known relay event are logged and dropped.
/// Stops on a close frame or a socket error. Returns `Err(())` when the
/// receiver is gone, which means nobody cares about this connection anymore.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<TransportEvent>,
    generation: u64,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match ServerMessage::from_json(text.as_str()) {
                Ok(message) => {
                    debug!(generation, event = message.event_name(), "relay event");
                    let event = TransportEvent {
                        generation,
                        kind: TransportEventKind::Message(message),
                    };
                    if tx.send(event).await.is_err() {
                        return Err(());
                    }
                }
                Err(e) => {
                    warn!(generation, "dropping malformed relay frame: {e}");
                }
            },
            Ok(Message::Close(_)) => {
                info!(generation, "relay sent close frame");
                break;
            }
            Err(e) => {
                warn!(generation, "WebSocket error: {e}");
                break;
            }
            _ => {
                // Binary, Ping, Pong, Frame.
            }
        }
    }
    Ok(())
}
