//! One websocket connection: handshake, inbound frames, outbound writer.

use crate::connection::{Connection, ConnectionId};
use crate::hub::{Hub, HubError, ALREADY_JOINED};
use crate::protocol::{ClientFrame, ServerFrame};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

/// What the reader loop does with an inbound message.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Continue,
    Close,
}

pub async fn serve_connection(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sink, mut stream) = socket.split();

    let deadline = hub.settings().join_timeout;
    let identity = match tokio::time::timeout(deadline, read_join(&mut stream)).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            tracing::debug!("handshake failed, closing connection");
            let _ = sink.close().await;
            return;
        }
        Err(_) => {
            tracing::debug!(timeout_ms = deadline.as_millis() as u64, "no join frame in time");
            let _ = sink.close().await;
            return;
        }
    };

    let Connection { id, frames } = match hub.join(&identity) {
        Ok(connection) => connection,
        Err(err) => {
            tracing::debug!(identity = %identity, error = %err, "join rejected");
            let _ = sink.close().await;
            return;
        }
    };
    tracing::info!(connection_id = %id, identity = %identity, "connection joined");

    let mut writer = tokio::spawn(write_frames(id, frames, sink));
    let mut writer_done = false;

    loop {
        tokio::select! {
            inbound = stream.next() => {
                let action = match inbound {
                    Some(Ok(message)) => handle_message(&hub, id, message),
                    Some(Err(err)) => {
                        tracing::debug!(connection_id = %id, error = %err, "read failed");
                        Inbound::Close
                    }
                    None => Inbound::Close,
                };
                if action == Inbound::Close {
                    break;
                }
            }
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    match hub.disconnect(id) {
        Ok(Some(session_id)) => {
            tracing::debug!(connection_id = %id, session_id = %session_id, "forfeited on close");
        }
        Ok(None) => {}
        Err(err) => {
            tracing::error!(connection_id = %id, error = %err, "disconnect failed");
            writer.abort();
        }
    }

    // Dropping the registry entry closed the outbox; let the writer flush.
    if !writer_done {
        let _ = writer.await;
    }
    tracing::info!(connection_id = %id, "connection closed");
}

/// Wait for the `join` frame. Anything else ends the handshake.
async fn read_join(stream: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(message) = stream.next().await {
        let message = message.ok()?;
        if message.is_ping() || message.is_pong() {
            continue;
        }
        let text = message.to_str().ok()?;
        return match ClientFrame::parse(text) {
            Ok(ClientFrame::Join { username }) => Some(username),
            Ok(other) => {
                tracing::debug!(frame = ?other, "expected join frame");
                None
            }
            Err(err) => {
                tracing::debug!(error = %err, "malformed join frame");
                None
            }
        };
    }
    None
}

fn handle_message(hub: &Arc<Hub>, id: ConnectionId, message: Message) -> Inbound {
    if message.is_close() {
        return Inbound::Close;
    }
    if message.is_ping() || message.is_pong() {
        return Inbound::Continue;
    }
    let Ok(text) = message.to_str() else {
        tracing::debug!(connection_id = %id, "non-text frame");
        return Inbound::Close;
    };

    match ClientFrame::parse(text) {
        Ok(ClientFrame::Drop { column }) => {
            match hub.submit_move(id, column) {
                Ok(_) => {}
                Err(HubError::StoragePoisoned) => return Inbound::Close,
                Err(err) => {
                    tracing::trace!(connection_id = %id, error = %err, "move not applied");
                }
            }
            Inbound::Continue
        }
        Ok(ClientFrame::Join { .. }) => {
            hub.notify(id, ALREADY_JOINED);
            Inbound::Continue
        }
        Err(err) => {
            tracing::debug!(connection_id = %id, error = %err, "protocol error, closing");
            Inbound::Close
        }
    }
}

async fn write_frames(
    id: ConnectionId,
    mut frames: mpsc::Receiver<ServerFrame>,
    mut sink: SplitSink<WebSocket, Message>,
) {
    while let Some(frame) = frames.recv().await {
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(connection_id = %id, error = %err, "failed to encode frame");
                continue;
            }
        };
        if let Err(err) = sink.send(Message::text(text)).await {
            tracing::debug!(connection_id = %id, error = %err, "write failed");
            break;
        }
    }
    let _ = sink.close().await;
}
