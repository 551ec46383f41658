use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Tricycle,
    Motorcycle,
    Van,
    PrivateCar,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 4] = [
        VehicleClass::Tricycle,
        VehicleClass::Motorcycle,
        VehicleClass::Van,
        VehicleClass::PrivateCar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VehicleClass::Tricycle => "tricycle",
            VehicleClass::Motorcycle => "motorcycle",
            VehicleClass::Van => "van",
            VehicleClass::PrivateCar => "private_car",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offline request made while the driver still had an active assignment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfflineIntent {
    #[default]
    None,
    Deferred,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverStatistics {
    pub total_trips: u64,
    pub completed_trips: u64,
    pub cancelled_trips: u64,
    pub total_earnings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverAvailability {
    pub driver_id: Uuid,
    pub is_online: bool,
    pub last_known_location: Option<GeoPoint>,
    pub vehicle_class: VehicleClass,
    pub capacity: u8,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub current_assignment: Option<Uuid>,
    pub offline_intent: OfflineIntent,
    pub retired: bool,
    pub statistics: DriverStatistics,
    pub updated_at: DateTime<Utc>,
}

impl DriverAvailability {
    pub fn new(driver_id: Uuid, vehicle_class: VehicleClass, capacity: u8, now: DateTime<Utc>) -> Self {
        Self {
            driver_id,
            is_online: false,
            last_known_location: None,
            vehicle_class,
            capacity,
            last_heartbeat: None,
            current_assignment: None,
            offline_intent: OfflineIntent::None,
            retired: false,
            statistics: DriverStatistics::default(),
            updated_at: now,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        match self.last_heartbeat {
            Some(at) => now - at > window,
            None => true,
        }
    }
}
