//! Live notification feed.
//!
//! - GET /v1/events/ws (WebSocket)
//!
//! Each committed change is pushed as one text frame holding an
//! [`EventEnvelope`](yard_events::EventEnvelope). Subscribers only see events
//! committed after they connect, and a subscriber that falls behind the
//! broadcast buffer skips what it missed.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::request_context::RequestContext;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(subscribe))
}

async fn subscribe(
    State(state): State<AppState>,
    ctx: RequestContext,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // Subscribe before the upgrade completes so nothing committed after the
    // handshake is missed.
    let events = state.notifier().subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, events, ctx.request_id))
}

async fn forward_events(
    socket: WebSocket,
    mut events: tokio::sync::broadcast::Receiver<yard_events::EventEnvelope>,
    request_id: String,
) {
    info!(request_id = %request_id, "Event subscriber connected");

    let (mut sender, mut receiver) = socket.split();

    let to_client = tokio::spawn({
        let request_id = request_id.clone();
        async move {
            loop {
                let envelope = match events.recv().await {
                    Ok(envelope) => envelope,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(request_id = %request_id, skipped, "Event subscriber lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let frame = match serde_json::to_string(&envelope) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, event = %envelope.event, "Failed to encode event frame");
                        continue;
                    }
                };

                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            let _ = sender.close().await;
        }
    });

    // Inbound frames are ignored; reading them notices the client leaving.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = ?e, request_id = %request_id, "WebSocket error");
                break;
            }
        }
    }

    to_client.abort();
    info!(request_id = %request_id, "Event subscriber disconnected");
}
