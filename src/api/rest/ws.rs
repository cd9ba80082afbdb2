use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::tracking::Interest;
use crate::relay::directory::SubscriptionHandle;
use crate::relay::watch_order;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ObserverQuery {
    pub observer: Option<String>,
}

impl ObserverQuery {
    fn observer_id(self) -> String {
        self.observer
            .filter(|observer| !observer.trim().is_empty())
            .unwrap_or_else(|| "anonymous".to_string())
    }
}

pub async fn order_ws_handler(
    ws: WebSocketUpgrade,
    Path(order_id): Path<Uuid>,
    Query(query): Query<ObserverQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.orders.get(order_id)?;
    let observer_id = query.observer_id();

    Ok(ws.on_upgrade(move |socket| async move {
        match watch_order(&state, &observer_id, order_id) {
            Ok(handle) => handle_socket(socket, state, handle, observer_id).await,
            Err(err) => warn!(order_id = %order_id, error = %err, "order watch failed"),
        }
    }))
}

pub async fn fleet_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ObserverQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let observer_id = query.observer_id();

    ws.on_upgrade(move |socket| async move {
        let handle = state.directory.subscribe(&observer_id, Interest::FleetWide);
        handle_socket(socket, state, handle, observer_id).await;
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    handle: SubscriptionHandle,
    observer_id: String,
) {
    let (mut sender, mut receiver) = socket.split();
    let subscription_id = handle.id;
    let mut events = handle.receiver;

    info!(
        %subscription_id,
        observer_id = %observer_id,
        interest = ?handle.interest,
        "websocket observer connected"
    );

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize tracking event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.directory.unsubscribe(subscription_id);
    info!(%subscription_id, observer_id = %observer_id, "websocket observer disconnected");
}
