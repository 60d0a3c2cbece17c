//! services/api/src/web/ws_handler.rs
//!
//! WebSocket listeners for generation sessions. A socket only listens: it is
//! attached to the session's registry entry, receives the replayed history and
//! every later event as JSON text frames, and is closed after the session ends.

use crate::error::ApiError;
use crate::web::{
    protocol::Event,
    registry::ChannelSink,
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, session_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, session_id: String) {
    let (mut ws_sender, receiver) = socket.split();

    // --- 1. Attach to the session ---
    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let listener = match app_state
        .registry
        .attach(&session_id, Arc::new(ChannelSink::new(tx)))
        .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!("Rejecting socket for session {}: {}", session_id, e);
            let failure = json!({ "success": false, "error": e.to_string() }).to_string();
            let _ = ws_sender.send(Message::Text(failure.into())).await;
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
    };
    info!("Socket listener {} attached to session {}.", listener, session_id);

    // --- 2. Forward events until the session or the client goes away ---
    if let Err(e) = forward_events(&session_id, rx, ws_sender, receiver).await {
        warn!("Listener {} on session {} failed: {}", listener, session_id, e);
    }

    // --- 3. Cleanup ---
    app_state.registry.detach(&session_id, listener).await;
    info!("WebSocket connection for session {} closed.", session_id);
}

/// Writes every event from `events` to `sender` as a JSON text frame.
///
/// Ends with a close frame once the registry drops the session's sink, or
/// early when the client closes or the socket fails.
async fn forward_events<W, R>(
    session_id: &str,
    mut events: mpsc::UnboundedReceiver<Event>,
    mut sender: W,
    mut incoming: R,
) -> Result<(), ApiError>
where
    W: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    // The registry dropped the sink: the session is over.
                    let _ = sender.send(Message::Close(None)).await;
                    return Ok(());
                };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize event {}: {}", event.sequence, e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    info!("Socket for session {} stopped accepting events.", session_id);
                    return Ok(());
                }
            }
            message = incoming.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client closed the socket for session {}.", session_id);
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(ApiError::Websocket(e)),
                    // Listeners have nothing to say; ignore anything else.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
