use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::driver::{DriverAvailability, OfflineIntent, VehicleClass};

#[derive(Debug, Clone, Copy)]
pub struct CandidateQuery {
    pub vehicle_class: VehicleClass,
    pub near: GeoPoint,
    pub max_radius_km: f64,
    pub min_capacity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub driver_id: Uuid,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ineligibility {
    Unknown,
    Retired,
    Offline,
    Busy,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// Another driver already holds the claim on this request.
    RequestTaken,
    DriverIneligible(Ineligibility),
}

impl ClaimOutcome {
    pub fn is_claimed(self) -> bool {
        self == ClaimOutcome::Claimed
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReleaseReason {
    Completed { earnings: f64 },
    Cancelled,
    /// The claim never turned into an accepted trip.
    Rollback,
}

/// Presence store for drivers plus the per-request claim index.
///
/// Claims lock the request's slot in `claims` first and the driver's slot in
/// `drivers` second. Nothing takes them in the opposite order.
pub struct DriverAvailabilityRegistry {
    drivers: DashMap<Uuid, DriverAvailability>,
    claims: DashMap<Uuid, Uuid>,
    clock: Arc<dyn Clock>,
    staleness_window: chrono::Duration,
}

impl DriverAvailabilityRegistry {
    pub fn new(clock: Arc<dyn Clock>, staleness_window: Duration) -> Self {
        let staleness_window =
            chrono::Duration::from_std(staleness_window).unwrap_or_else(|_| chrono::Duration::days(365));

        Self {
            drivers: DashMap::new(),
            claims: DashMap::new(),
            clock,
            staleness_window,
        }
    }

    pub fn register(
        &self,
        driver_id: Uuid,
        vehicle_class: VehicleClass,
        capacity: u8,
    ) -> Result<DriverAvailability, AppError> {
        if capacity == 0 {
            return Err(AppError::BadRequest("capacity must be > 0".to_string()));
        }

        let now = self.clock.now();
        match self.drivers.entry(driver_id) {
            Entry::Occupied(mut existing) => {
                let driver = existing.get_mut();
                if driver.retired {
                    return Err(AppError::Conflict(format!("driver {driver_id} is retired")));
                }
                driver.vehicle_class = vehicle_class;
                driver.capacity = capacity;
                driver.updated_at = now;
                Ok(driver.clone())
            }
            Entry::Vacant(slot) => {
                let driver = DriverAvailability::new(driver_id, vehicle_class, capacity, now);
                slot.insert(driver.clone());
                info!(driver_id = %driver_id, vehicle_class = %vehicle_class, "driver registered");
                Ok(driver)
            }
        }
    }

    pub fn set_online(&self, driver_id: Uuid, location: GeoPoint) -> Result<DriverAvailability, AppError> {
        location.validate()?;

        let now = self.clock.now();
        let mut driver = self.driver_mut(driver_id)?;
        if driver.retired {
            return Err(AppError::Conflict(format!("driver {driver_id} is retired")));
        }

        driver.is_online = true;
        driver.offline_intent = OfflineIntent::None;
        driver.last_known_location = Some(location);
        driver.last_heartbeat = Some(now);
        driver.updated_at = now;

        Ok(driver.clone())
    }

    /// Goes offline now, or records a deferred intent and fails with
    /// `DriverBusy` while an assignment is active.
    pub fn set_offline(&self, driver_id: Uuid) -> Result<DriverAvailability, AppError> {
        let now = self.clock.now();
        let mut driver = self.driver_mut(driver_id)?;

        if driver.current_assignment.is_some() {
            driver.offline_intent = OfflineIntent::Deferred;
            driver.updated_at = now;
            info!(driver_id = %driver_id, "offline deferred until assignment ends");
            return Err(AppError::DriverBusy(driver_id));
        }

        driver.is_online = false;
        driver.offline_intent = OfflineIntent::None;
        driver.updated_at = now;

        Ok(driver.clone())
    }

    pub fn heartbeat(&self, driver_id: Uuid, location: GeoPoint) -> Result<DriverAvailability, AppError> {
        location.validate()?;

        let now = self.clock.now();
        let mut driver = self.driver_mut(driver_id)?;
        if driver.retired {
            return Err(AppError::Conflict(format!("driver {driver_id} is retired")));
        }

        driver.last_known_location = Some(location);
        driver.last_heartbeat = Some(now);
        driver.updated_at = now;
        debug!(driver_id = %driver_id, lat = location.lat, lng = location.lng, "heartbeat");

        Ok(driver.clone())
    }

    /// Marks the driver permanently offline. Records are never removed.
    pub fn retire(&self, driver_id: Uuid) -> Result<DriverAvailability, AppError> {
        let now = self.clock.now();
        let mut driver = self.driver_mut(driver_id)?;

        if driver.current_assignment.is_some() {
            return Err(AppError::DriverBusy(driver_id));
        }

        driver.retired = true;
        driver.is_online = false;
        driver.offline_intent = OfflineIntent::None;
        driver.updated_at = now;

        Ok(driver.clone())
    }

    pub fn get(&self, driver_id: Uuid) -> Option<DriverAvailability> {
        self.drivers.get(&driver_id).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<DriverAvailability> {
        self.drivers.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Online drivers with a fresh heartbeat.
    pub fn online_count(&self) -> usize {
        let now = self.clock.now();
        self.drivers
            .iter()
            .filter(|entry| {
                let driver = entry.value();
                driver.is_online && !driver.is_stale(now, self.staleness_window)
            })
            .count()
    }

    /// Drivers that could take a trip near `query.near`, closest first.
    ///
    /// Built from a snapshot; a candidate may be gone by the time it is
    /// claimed, which `try_claim` re-checks.
    pub fn candidates_for(&self, query: &CandidateQuery) -> impl Iterator<Item = Candidate> {
        let now = self.clock.now();

        let mut candidates: Vec<Candidate> = self
            .drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                if driver.vehicle_class != query.vehicle_class
                    || driver.capacity < query.min_capacity
                    || self.ineligibility(driver, now).is_some()
                {
                    return None;
                }

                let location = driver.last_known_location?;
                let distance_km = haversine_km(&location, &query.near);
                (distance_km <= query.max_radius_km).then_some(Candidate {
                    driver_id: driver.driver_id,
                    distance_km,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });

        candidates.into_iter()
    }

    /// Reserves `driver_id` for `request_id`.
    ///
    /// Succeeds only if nobody holds a claim on the request yet and the
    /// driver is online, fresh and unassigned.
    pub fn try_claim(&self, driver_id: Uuid, request_id: Uuid) -> ClaimOutcome {
        let now = self.clock.now();

        match self.claims.entry(request_id) {
            Entry::Occupied(_) => ClaimOutcome::RequestTaken,
            Entry::Vacant(slot) => {
                let Some(mut driver) = self.drivers.get_mut(&driver_id) else {
                    return ClaimOutcome::DriverIneligible(Ineligibility::Unknown);
                };

                if let Some(reason) = self.ineligibility(&driver, now) {
                    return ClaimOutcome::DriverIneligible(reason);
                }

                driver.current_assignment = Some(request_id);
                driver.updated_at = now;
                slot.insert(driver_id);

                ClaimOutcome::Claimed
            }
        }
    }

    /// Driver currently holding the claim on `request_id`.
    pub fn claim_holder(&self, request_id: Uuid) -> Option<Uuid> {
        self.claims.get(&request_id).map(|entry| *entry.value())
    }

    /// Frees the driver from `request_id` and applies a deferred offline
    /// intent. A driver assigned elsewhere is left untouched.
    pub fn release(
        &self,
        driver_id: Uuid,
        request_id: Uuid,
        reason: ReleaseReason,
    ) -> Option<DriverAvailability> {
        let now = self.clock.now();

        let released = match self.drivers.get_mut(&driver_id) {
            Some(mut driver) if driver.current_assignment == Some(request_id) => {
                driver.current_assignment = None;

                match reason {
                    ReleaseReason::Completed { earnings } => {
                        driver.statistics.total_trips += 1;
                        driver.statistics.completed_trips += 1;
                        driver.statistics.total_earnings += earnings;
                    }
                    ReleaseReason::Cancelled => {
                        driver.statistics.total_trips += 1;
                        driver.statistics.cancelled_trips += 1;
                    }
                    ReleaseReason::Rollback => {}
                }

                if driver.offline_intent == OfflineIntent::Deferred {
                    driver.is_online = false;
                    driver.offline_intent = OfflineIntent::None;
                    info!(driver_id = %driver_id, "deferred offline applied");
                }

                driver.updated_at = now;
                Some(driver.clone())
            }
            _ => None,
        };

        self.claims
            .remove_if(&request_id, |_, holder| *holder == driver_id);

        released
    }

    fn ineligibility(
        &self,
        driver: &DriverAvailability,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<Ineligibility> {
        if driver.retired {
            Some(Ineligibility::Retired)
        } else if !driver.is_online || driver.offline_intent == OfflineIntent::Deferred {
            Some(Ineligibility::Offline)
        } else if driver.current_assignment.is_some() {
            Some(Ineligibility::Busy)
        } else if driver.is_stale(now, self.staleness_window) {
            Some(Ineligibility::Stale)
        } else {
            None
        }
    }

    fn driver_mut(
        &self,
        driver_id: Uuid,
    ) -> Result<dashmap::mapref::one::RefMut<'_, Uuid, DriverAvailability>, AppError> {
        self.drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {} not found", driver_id)))
    }
}
