use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::common::state::AppState;
use crate::ingest::IngestService;

/// Controller telemetry stream
///
/// Controllers push `NotifyStatus` notifications as JSON text frames.
#[utoipa::path(
    get,
    path = "/ws",
    tag = "ingest",
    responses(
        (status = 101, description = "Switching to the WebSocket protocol"),
    )
)]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let ingest = state.ingest.clone();
    ws.on_upgrade(move |socket: WebSocket| handle_connection(socket, ingest, connection_id))
}

/// Feed one controller connection into the ingestion service.
///
/// Frames are handled one at a time so a channel's messages keep their
/// arrival order. When the socket closes, every pending stop deadline of the
/// devices seen on it is cancelled.
pub async fn handle_connection(
    socket: WebSocket,
    ingest: Arc<IngestService>,
    connection_id: String,
) {
    info!(connection_id = %connection_id, "Controller connected");

    let (_, mut receiver) = socket.split();
    let mut devices: HashSet<String> = HashSet::new();

    while let Some(frame) = receiver.next().await {
        let message = match frame {
            Ok(m) => m,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                if let Some(device_id) = ingest.handle_text(text.as_str(), Utc::now()).await
                    && devices.insert(device_id.clone())
                {
                    info!(connection_id = %connection_id, device_id = %device_id, "Device identified");
                }
            }
            Message::Close(_) => {
                debug!(connection_id = %connection_id, "Controller closed connection");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) => {
                debug!(connection_id = %connection_id, "Ignoring binary frame");
            }
        }
    }

    let cancelled = ingest.disconnect(&devices);
    info!(
        connection_id = %connection_id,
        devices = devices.len(),
        cancelled_timers = cancelled,
        "Controller disconnected"
    );
}
