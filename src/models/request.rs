use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::driver::VehicleClass;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    DriverEnroute,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 7] = [
        RequestStatus::Pending,
        RequestStatus::Accepted,
        RequestStatus::DriverEnroute,
        RequestStatus::Arrived,
        RequestStatus::InProgress,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;

        if next == Cancelled {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Pending, Accepted)
                | (Accepted, DriverEnroute)
                | (DriverEnroute, Arrived)
                | (Arrived, InProgress)
                | (InProgress, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::DriverEnroute => "driver_enroute",
            RequestStatus::Arrived => "arrived",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Rider,
    Driver,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pickup {
    pub location: GeoPoint,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub location: GeoPoint,
    #[serde(default)]
    pub place_id: Option<Uuid>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub place_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fare {
    pub estimated: f64,
    pub r#final: Option<f64>,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDuration {
    pub estimated_minutes: u32,
    pub actual_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub status: RequestStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub reason: String,
    pub cancelled_by: Actor,
}

/// Where matching stands for a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DispatchState {
    Searching {
        attempts: u32,
        last_radius_km: Option<f64>,
    },
    Assigned {
        radius_km: Option<f64>,
    },
    Exhausted {
        attempts: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverTracking {
    pub location: GeoPoint,
    pub eta_minutes: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRating {
    pub score: u8,
    pub comment: Option<String>,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRequest {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub pickup: Pickup,
    pub destination: Destination,
    pub vehicle_class: VehicleClass,
    pub passengers: u8,
    pub notes: Option<String>,
    pub status: RequestStatus,
    pub assigned_driver_id: Option<Uuid>,
    pub fare: Fare,
    pub distance_km: f64,
    pub duration: TripDuration,
    pub timeline: Vec<TimelineEntry>,
    pub cancellation: Option<Cancellation>,
    pub dispatch: DispatchState,
    pub driver_tracking: Option<DriverTracking>,
    pub rating: Option<TripRating>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransportRequest {
    /// When the request entered `status`, if it ever did.
    pub fn entered_at(&self, status: RequestStatus) -> Option<DateTime<Utc>> {
        self.timeline
            .iter()
            .find(|entry| entry.status == status)
            .map(|entry| entry.at)
    }
}
