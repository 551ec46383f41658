use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::driver::VehicleClass;
use crate::models::event::TransportEvent;
use crate::models::request::RequestStatus;
use crate::state::AppState;

/// Optional filters; a session sees everything when both are absent.
///
/// A driver session also sees pending requests for its vehicle class so new
/// work shows up without polling.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub rider_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    #[serde(skip)]
    pub driver_class: Option<VehicleClass>,
}

impl Subscription {
    fn wants(&self, event: &TransportEvent) -> bool {
        let rider_ok = self.rider_id.is_none_or(|id| id == event.rider_id);
        let driver_ok = self.driver_id.is_none_or(|id| {
            Some(id) == event.driver_id
                || (event.status == RequestStatus::Pending
                    && self.driver_class == Some(event.vehicle_class))
        });
        rider_ok && driver_ok
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(mut subscription): Query<Subscription>,
) -> impl IntoResponse {
    if let Some(driver_id) = subscription.driver_id {
        subscription.driver_class = state
            .service
            .get_driver(driver_id)
            .ok()
            .map(|driver| driver.vehicle_class);
    }
    ws.on_upgrade(|socket| handle_socket(socket, state, subscription))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, subscription: Subscription) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.service.subscribe());

    info!(
        rider_id = ?subscription.rider_id,
        driver_id = ?subscription.driver_id,
        "websocket client connected"
    );

    let send_task = tokio::spawn(async move {
        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagging; events dropped");
                    continue;
                }
            };

            if !subscription.wants(&event) {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize transport event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
