use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::models::{AckMessage, ClientMessage, ErrorMessage, OpsMessage, ServerMessage};
use crate::session::{SessionHandle, SessionSettings};
use crate::ws::{negotiate, CodecError, ConnectionState, FrameCodec};

impl SessionHandle {
    /// Run the bidirectional stream for one upgraded connection until the
    /// peer disconnects, the session is closed or the transport fails.
    pub async fn serve_connection(self: Arc<Self>, socket: WebSocket, settings: SessionSettings) {
        let conn_id = Uuid::new_v4();
        let span = info_span!(parent: self.span(), "conn", %conn_id);
        self.stream(socket, settings).instrument(span).await;
    }

    async fn stream(&self, mut socket: WebSocket, settings: SessionSettings) {
        let mut codec = FrameCodec::new(
            negotiate::socket_uses_compression(socket.protocol()),
            settings.max_message_size,
        );
        let _open = self.track_connection();
        info!(
            state = %ConnectionState::Streaming,
            compressed = codec.is_compressed(),
            "Connection streaming ({} open)",
            self.connection_count()
        );

        let mut changes = self.watch_changes();
        let mut shutdown = self.watch_shutdown();
        // Next version to push; set once the client subscribes.
        let mut cursor: Option<u64> = None;

        while !*shutdown.borrow_and_update() {
            let idle = idle_timer(settings.idle_timeout);

            let replies = tokio::select! {
                incoming = socket.recv() => {
                    let msg = match incoming {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            warn!("Transport error: {}", e);
                            break;
                        }
                        None => break,
                    };
                    let decoded = match msg {
                        Message::Text(text) => codec.decode_text(&text),
                        Message::Binary(data) => codec.decode_binary(&data),
                        Message::Close(_) => break,
                        Message::Ping(_) | Message::Pong(_) => continue,
                    };
                    match decoded {
                        Ok(request) => self.handle_request(request, &mut cursor, settings.batch_limit).await,
                        Err(e @ (CodecError::Decompress(_) | CodecError::TooLarge(_))) => {
                            // The inflate stream cannot recover from a bad frame.
                            warn!("Dropping connection after unusable compressed frame: {}", e);
                            break;
                        }
                        Err(e) => {
                            debug!("Rejected frame: {}", e);
                            vec![error_message(e)]
                        }
                    }
                }
                changed = changes.changed(), if cursor.is_some() => {
                    if changed.is_err() {
                        break;
                    }
                    self.pending_ops(&mut cursor, settings.batch_limit).await
                }
                _ = shutdown.changed() => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                _ = idle => {
                    info!("Closing idle connection");
                    break;
                }
            };

            if send_all(&mut socket, &mut codec, replies).await.is_err() {
                debug!("Peer went away while sending");
                break;
            }
        }

        debug!(state = %ConnectionState::Closed, "Connection closed");
    }

    async fn handle_request(
        &self,
        request: ClientMessage,
        cursor: &mut Option<u64>,
        limit: usize,
    ) -> Vec<ServerMessage> {
        match request {
            ClientMessage::Append(req) => {
                let ids = req.ops.iter().map(|op| op.id.clone()).collect();
                match self.append(req.ops).await {
                    Ok(_) => vec![ServerMessage::Ack(AckMessage { ids })],
                    Err(e) => vec![error_message(e)],
                }
            }
            ClientMessage::GetSince(req) => {
                let limit = req.limit.unwrap_or(limit).min(limit);
                match self.get_since(req.version, limit).await {
                    Ok(ops) => vec![ServerMessage::Ops(OpsMessage { ops })],
                    Err(e) => vec![error_message(e)],
                }
            }
            ClientMessage::Subscribe(req) => {
                debug!("Subscribed from version {}", req.version);
                *cursor = Some(req.version);
                self.pending_ops(cursor, limit).await
            }
        }
    }

    /// Read everything at or after the cursor and advance it.
    async fn pending_ops(&self, cursor: &mut Option<u64>, limit: usize) -> Vec<ServerMessage> {
        let Some(mut next) = *cursor else {
            return Vec::new();
        };

        let mut batches = Vec::new();
        loop {
            let ops = match self.get_since(next, limit).await {
                Ok(ops) => ops,
                Err(e) => {
                    batches.push(error_message(e));
                    break;
                }
            };
            let count = ops.len();
            next = ops
                .last()
                .and_then(|op| op.version)
                .map(|v| v + 1)
                .unwrap_or(next + count as u64);
            if count > 0 {
                batches.push(ServerMessage::Ops(OpsMessage { ops }));
            }
            if count < limit {
                break;
            }
        }

        *cursor = Some(next);
        batches
    }
}

async fn send_all(
    socket: &mut WebSocket,
    codec: &mut FrameCodec,
    replies: Vec<ServerMessage>,
) -> Result<(), axum::Error> {
    for reply in replies {
        match codec.encode(&reply) {
            Ok(frame) => socket.send(frame).await?,
            Err(e) => warn!("Failed to encode reply: {}", e),
        }
    }
    Ok(())
}

async fn idle_timer(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

fn error_message(e: impl std::fmt::Display) -> ServerMessage {
    ServerMessage::Error(ErrorMessage {
        message: e.to_string(),
    })
}
