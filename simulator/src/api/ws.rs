use axum::{
    extract::{ws::Message, ws::WebSocket, ConnectInfo, State as AxumState, WebSocketUpgrade},
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use parlor_types::ClientMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use crate::{OutboundFrame, Simulator, OUTBOUND_CAPACITY};

const SEND_TIMEOUT: Duration = Duration::from_secs(2);

pub(super) async fn game_ws(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_game_ws(socket, simulator, addr))
}

async fn handle_game_ws(socket: WebSocket, simulator: Arc<Simulator>, addr: SocketAddr) {
    let connection_id = simulator.connection_opened();
    info!(connection_id, %addr, "WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_CAPACITY);

    // Writer task: one slow client must not stall the match handlers.
    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let ws_message = match frame {
                OutboundFrame::Message(message) => match serde_json::to_string(&message) {
                    Ok(text) => Message::Text(text),
                    Err(err) => {
                        warn!(error = %err, "failed to encode outbound message");
                        continue;
                    }
                },
                OutboundFrame::Pong(data) => Message::Pong(data),
                OutboundFrame::Close => break,
            };
            match timeout(SEND_TIMEOUT, sender.send(ws_message)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(connection_id, error = %err, "client disconnected");
                    break;
                }
                Err(_) => {
                    warn!(connection_id, "send timed out");
                    break;
                }
            }
        }
        let _ = sender.close().await;
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(request) => simulator.handle_message(connection_id, &out_tx, request),
                Err(err) => {
                    warn!(connection_id, error = %err, "malformed client message");
                    simulator.send_error(&out_tx, format!("malformed message: {err}"));
                }
            },
            Ok(Message::Close(_)) => {
                info!(connection_id, "client sent close frame");
                break;
            }
            Ok(Message::Ping(data)) => {
                let _ = out_tx.try_send(OutboundFrame::Pong(data));
            }
            Ok(_) => {}
            Err(err) => {
                warn!(connection_id, error = %err, "WebSocket receive error");
                break;
            }
        }
    }

    simulator.connection_closed(connection_id);
    info!(connection_id, "WebSocket client disconnected");
    drop(out_tx);
    let _ = writer_handle.await;
}
