// WebSocket server: accepts client connections and bridges each one to the
// hub.

use futures_util::stream::Stream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use tictactoe_core::ClientMessage;

use crate::http::session_token_from_cookie;
use crate::hub::{ConnId, HubEvent, Outbound};

/// Accept connections on `listener` forever, one task per connection.
pub async fn run(listener: TcpListener, hub_tx: mpsc::Sender<HubEvent>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    let mut next_conn_id: ConnId = 1;
    loop {
        let (stream, addr) = listener.accept().await?;
        let conn_id = next_conn_id;
        next_conn_id += 1;
        debug!("Accepted TCP connection {conn_id} from {addr}");

        let hub_tx = hub_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, conn_id, hub_tx).await {
                warn!("Connection {conn_id} from {addr} failed: {e}");
            }
        });
    }
}

/// Run one client connection: handshake, register with the hub, then pump
/// frames both ways until either side closes.
pub async fn handle_connection<S>(
    stream: S,
    conn_id: ConnId,
    hub_tx: mpsc::Sender<HubEvent>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut session_token = None;
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        session_token = req
            .headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(session_token_from_cookie);
        Ok::<Response, ErrorResponse>(resp)
    })
    .await?;

    let (write, read) = ws_stream.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    if hub_tx
        .send(HubEvent::Connected {
            conn_id,
            session_token,
            outbound: outbound_tx,
        })
        .await
        .is_err()
    {
        return Ok(());
    }

    let writer = tokio::spawn(write_outbound(write, outbound_rx, conn_id));

    if process_message_stream(read, &hub_tx, conn_id).await.is_ok() {
        let _ = hub_tx.send(HubEvent::Disconnected { conn_id }).await;
    }

    // The hub drops the outbound sender once it has processed the
    // disconnect, which ends the writer.
    let _ = writer.await;
    debug!("Connection {conn_id} finished");
    Ok(())
}

/// Forward hub output to the socket. `Outbound::Close` (or the hub dropping
/// the channel) sends a close frame and ends the task.
pub async fn write_outbound<Si>(
    mut sink: Si,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    conn_id: ConnId,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: std::fmt::Display,
{
    while let Some(outbound) = outbound_rx.recv().await {
        match outbound {
            Outbound::Message(message) => {
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode {} for {conn_id}: {e}", message.event_name());
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!("Write to connection {conn_id} failed: {e}");
                    return;
                }
            }
            Outbound::Close => break,
        }
    }
    let _ = sink.close().await;
}

/// Parse text frames from any [`Stream`] into hub events. Returns `Err(())`
/// if the hub channel is closed.
///
/// Generic over the stream type so it can be tested with in-memory streams.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<HubEvent>,
    conn_id: ConnId,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        let event = match msg_result {
            Ok(Message::Text(text)) => match ClientMessage::from_json(text.as_str()) {
                Ok(message) => HubEvent::Message { conn_id, message },
                Err(e) => HubEvent::Invalid {
                    conn_id,
                    error: e.to_string(),
                },
            },
            Ok(Message::Close(_)) => {
                info!("Connection {conn_id} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error on connection {conn_id}: {e}");
                break;
            }
            _ => continue,
        };
        if tx.send(event).await.is_err() {
            return Err(());
        }
    }
    Ok(())
}
