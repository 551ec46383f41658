use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::VehicleClass;
use crate::models::request::{Actor, RequestStatus, TransportRequest};

/// Broadcast to rider/driver sessions on every lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportEvent {
    pub request_id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub vehicle_class: VehicleClass,
    pub status: RequestStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

impl TransportEvent {
    /// Built from the request's latest timeline entry.
    pub fn from_request(request: &TransportRequest) -> Self {
        let (actor, at) = request
            .timeline
            .last()
            .map(|entry| (entry.actor, entry.at))
            .unwrap_or((Actor::System, request.updated_at));

        Self {
            request_id: request.id,
            rider_id: request.rider_id,
            driver_id: request.assigned_driver_id,
            vehicle_class: request.vehicle_class,
            status: request.status,
            actor,
            at,
        }
    }
}
