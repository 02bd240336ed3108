//! Actor-per-connection loop for authenticated sockets.
//!
//! Each connection gets a writer task that owns the sink half and drains
//! an unbounded channel. The room registry holds a clone of that
//! channel's sender, so a broadcast from any handler lands here without
//! touching the socket directly.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::protocol;
use crate::ws::{ConnectionId, ConnectionSender};

/// Server ping cadence. Keeps half-open connections from lingering in
/// room membership after an abrupt network drop.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long a pong may lag its ping before the connection is closed.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one authenticated connection until it closes, then sweep its
/// room memberships. Identity comes from the validated access token;
/// nothing here consults the database.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String, username: String) {
    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();

    let conn_id = state.rooms.next_connection_id();
    tracing::info!(conn_id, user_id = %user_id, "Connection actor started");

    let writer = tokio::spawn(write_loop(sink, rx));
    let keepalive = tokio::spawn(keepalive_loop(tx.clone(), pong_rx));

    read_loop(stream, conn_id, &tx, &pong_tx, &state, &user_id, &username).await;

    writer.abort();
    keepalive.abort();

    // Peers get no leave notification; the next broadcast simply skips
    // this connection.
    state.rooms.remove_connection(conn_id);
    tracing::info!(conn_id, user_id = %user_id, "Connection actor stopped");
}

/// Consume inbound frames until the stream ends. Text frames carry the
/// event protocol; everything else is transport housekeeping.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    conn_id: ConnectionId,
    tx: &ConnectionSender,
    pong_tx: &mpsc::UnboundedSender<()>,
    state: &AppState,
    user_id: &str,
    username: &str,
) {
    while let Some(result) = stream.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(conn_id, user_id, error = %e, "Socket receive error");
                return;
            }
        };

        match msg {
            Message::Text(text) => {
                protocol::handle_text_message(&text, conn_id, tx, state, user_id, username).await;
            }
            Message::Binary(_) => {
                tracing::debug!(conn_id, user_id, "Dropping binary frame on a text protocol");
            }
            Message::Ping(payload) => {
                let _ = tx.send(Message::Pong(payload));
            }
            Message::Pong(_) => {
                let _ = pong_tx.send(());
            }
            Message::Close(frame) => {
                tracing::info!(conn_id, user_id, frame = ?frame, "Client closed connection");
                return;
            }
        }
    }

    tracing::info!(conn_id, user_id, "Socket stream ended");
}

/// Writer task: the only owner of the sink half. Exits when the channel
/// closes or a send fails.
async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if sink.send(msg).await.is_err() {
            return;
        }
    }
}

/// Ping on an interval and require a pong within PONG_TIMEOUT. A missed
/// pong closes the connection; the read loop then observes the close.
async fn keepalive_loop(tx: ConnectionSender, mut pong_rx: mpsc::UnboundedReceiver<()>) {
    let mut ticker = interval(PING_INTERVAL);
    // interval fires immediately; the first real ping waits a full period
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if tx.send(Message::Ping(Vec::new().into())).is_err() {
            return;
        }

        if timeout(PONG_TIMEOUT, pong_rx.recv()).await.is_err() {
            tracing::warn!("Pong overdue, closing connection");
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: 1001,
                reason: "Keepalive timeout".into(),
            })));
            return;
        }
    }
}
