use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::engine::fare::FareEstimate;
use crate::engine::registry::{DriverAvailabilityRegistry, ReleaseReason};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::VehicleClass;
use crate::models::request::{
    Actor, Cancellation, Destination, DispatchState, DriverTracking, Fare, Pickup, RequestStatus,
    TimelineEntry, TransportRequest, TripDuration, TripRating,
};

/// Everything the rider supplies when asking for a ride.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub rider_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub pickup: Pickup,
    pub destination: Destination,
    pub vehicle_class: VehicleClass,
    pub passengers: u8,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Accept {
        driver_id: Uuid,
        radius_km: Option<f64>,
    },
    /// driver_enroute, arrived and in_progress.
    Advance(RequestStatus),
    Complete {
        fare_override: Option<f64>,
    },
    Cancel {
        reason: String,
        cancelled_by: Actor,
    },
}

impl Transition {
    pub fn target(&self) -> RequestStatus {
        match self {
            Transition::Accept { .. } => RequestStatus::Accepted,
            Transition::Advance(status) => *status,
            Transition::Complete { .. } => RequestStatus::Completed,
            Transition::Cancel { .. } => RequestStatus::Cancelled,
        }
    }
}

pub struct RequestLifecycle {
    requests: DashMap<Uuid, TransportRequest>,
    registry: Arc<DriverAvailabilityRegistry>,
    clock: Arc<dyn Clock>,
}

impl RequestLifecycle {
    pub fn new(registry: Arc<DriverAvailabilityRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            requests: DashMap::new(),
            registry,
            clock,
        }
    }

    pub fn create(&self, new: NewRequest, estimate: &FareEstimate, currency: &str) -> TransportRequest {
        let now = self.clock.now();

        let request = TransportRequest {
            id: Uuid::new_v4(),
            rider_id: new.rider_id,
            booking_id: new.booking_id,
            pickup: new.pickup,
            destination: new.destination,
            vehicle_class: new.vehicle_class,
            passengers: new.passengers,
            notes: new.notes,
            status: RequestStatus::Pending,
            assigned_driver_id: None,
            fare: Fare {
                estimated: estimate.fare,
                r#final: None,
                currency: currency.to_string(),
            },
            distance_km: estimate.distance_km,
            duration: TripDuration {
                estimated_minutes: estimate.duration_minutes,
                actual_minutes: None,
            },
            timeline: vec![TimelineEntry {
                status: RequestStatus::Pending,
                actor: Actor::Rider,
                at: now,
            }],
            cancellation: None,
            dispatch: DispatchState::Searching {
                attempts: 0,
                last_radius_km: None,
            },
            driver_tracking: None,
            rating: None,
            created_at: now,
            updated_at: now,
        };

        self.requests.insert(request.id, request.clone());
        request
    }

    pub fn get(&self, id: Uuid) -> Result<TransportRequest, AppError> {
        self.requests
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found(id))
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn list_for_rider(&self, rider_id: Uuid) -> Vec<TransportRequest> {
        self.collect_newest_first(|request| request.rider_id == rider_id)
    }

    /// Requests assigned to the driver plus open requests they could pick up.
    pub fn list_for_driver(&self, driver_id: Uuid, vehicle_class: VehicleClass) -> Vec<TransportRequest> {
        self.collect_newest_first(|request| {
            request.assigned_driver_id == Some(driver_id)
                || (request.status == RequestStatus::Pending && request.vehicle_class == vehicle_class)
        })
    }

    pub fn list_pending(&self) -> Vec<TransportRequest> {
        self.collect_newest_first(|request| request.status == RequestStatus::Pending)
    }

    pub fn pending_count(&self) -> usize {
        self.requests
            .iter()
            .filter(|entry| entry.value().status == RequestStatus::Pending)
            .count()
    }

    /// Applies one state-machine transition under the request's entry lock.
    ///
    /// Entering a terminal state releases the assigned driver afterwards.
    pub fn transition(
        &self,
        id: Uuid,
        actor: Actor,
        change: Transition,
    ) -> Result<TransportRequest, AppError> {
        let now = self.clock.now();

        let (updated, release) = {
            let mut request = self.requests.get_mut(&id).ok_or_else(|| not_found(id))?;
            let from = request.status;
            let to = change.target();

            if !from.can_transition_to(to) {
                return Err(AppError::InvalidTransition { from, to });
            }

            let at = request
                .timeline
                .last()
                .map_or(now, |last| last.at.max(now));

            match change {
                Transition::Accept { driver_id, radius_km } => {
                    request.assigned_driver_id = Some(driver_id);
                    request.dispatch = DispatchState::Assigned { radius_km };
                }
                Transition::Advance(status) => {
                    if matches!(
                        status,
                        RequestStatus::Accepted | RequestStatus::Completed | RequestStatus::Cancelled
                    ) {
                        return Err(AppError::BadRequest(format!(
                            "{status} needs its own accept/complete/cancel call"
                        )));
                    }
                }
                Transition::Complete { fare_override } => {
                    let fare = match fare_override {
                        Some(amount) if !amount.is_finite() || amount < 0.0 => {
                            return Err(AppError::BadRequest(
                                "final fare must be finite and non-negative".to_string(),
                            ));
                        }
                        Some(amount) => amount.ceil(),
                        None => request.fare.estimated,
                    };
                    request.fare.r#final = Some(fare);
                    request.duration.actual_minutes = request
                        .entered_at(RequestStatus::InProgress)
                        .map(|started| minutes_between(started, at));
                }
                Transition::Cancel { reason, cancelled_by } => {
                    let reason = reason.trim();
                    if reason.is_empty() {
                        return Err(AppError::BadRequest(
                            "cancellation reason is required".to_string(),
                        ));
                    }
                    request.cancellation = Some(Cancellation {
                        reason: reason.to_string(),
                        cancelled_by,
                    });
                }
            }

            request.timeline.push(TimelineEntry {
                status: to,
                actor,
                at,
            });
            request.status = to;
            request.updated_at = at;

            let release = match to {
                RequestStatus::Completed => request.assigned_driver_id.map(|driver| {
                    let earnings = request.fare.r#final.unwrap_or(request.fare.estimated);
                    (driver, ReleaseReason::Completed { earnings })
                }),
                RequestStatus::Cancelled => request
                    .assigned_driver_id
                    .map(|driver| (driver, ReleaseReason::Cancelled)),
                _ => None,
            };

            (request.clone(), release)
        };

        if let Some((driver_id, reason)) = release {
            self.registry.release(driver_id, id, reason);
        }

        info!(
            request_id = %id,
            status = %updated.status,
            actor = ?actor,
            "request transitioned"
        );

        Ok(updated)
    }

    pub fn assign(
        &self,
        id: Uuid,
        driver_id: Uuid,
        radius_km: Option<f64>,
        actor: Actor,
    ) -> Result<TransportRequest, AppError> {
        self.transition(id, actor, Transition::Accept { driver_id, radius_km })
    }

    pub fn advance(&self, id: Uuid, to: RequestStatus, actor: Actor) -> Result<TransportRequest, AppError> {
        self.transition(id, actor, Transition::Advance(to))
    }

    pub fn complete(
        &self,
        id: Uuid,
        fare_override: Option<f64>,
        actor: Actor,
    ) -> Result<TransportRequest, AppError> {
        self.transition(id, actor, Transition::Complete { fare_override })
    }

    pub fn cancel(&self, id: Uuid, reason: &str, cancelled_by: Actor) -> Result<TransportRequest, AppError> {
        self.transition(
            id,
            cancelled_by,
            Transition::Cancel {
                reason: reason.to_string(),
                cancelled_by,
            },
        )
    }

    /// Records matching progress. Ignored once the request has left `pending`.
    pub fn record_dispatch(&self, id: Uuid, dispatch: DispatchState) -> Result<TransportRequest, AppError> {
        let mut request = self.requests.get_mut(&id).ok_or_else(|| not_found(id))?;
        if request.status == RequestStatus::Pending {
            request.dispatch = dispatch;
            request.updated_at = self.clock.now();
        }
        Ok(request.clone())
    }

    /// Stores the assigned driver's position and ETA on their active request.
    pub fn track_driver(
        &self,
        id: Uuid,
        driver_id: Uuid,
        location: GeoPoint,
        eta_minutes: u32,
    ) -> Option<TransportRequest> {
        let mut request = self.requests.get_mut(&id)?;
        if request.assigned_driver_id != Some(driver_id) || request.status.is_terminal() {
            return None;
        }

        let now = self.clock.now();
        request.driver_tracking = Some(DriverTracking {
            location,
            eta_minutes,
            updated_at: now,
        });
        request.updated_at = now;
        Some(request.clone())
    }

    pub fn rate(&self, id: Uuid, score: u8, comment: Option<String>) -> Result<TransportRequest, AppError> {
        if !(1..=5).contains(&score) {
            return Err(AppError::BadRequest("rating score must be 1-5".to_string()));
        }

        let mut request = self.requests.get_mut(&id).ok_or_else(|| not_found(id))?;
        if request.status != RequestStatus::Completed {
            return Err(AppError::Conflict(format!(
                "request {id} is {} and cannot be rated",
                request.status
            )));
        }
        if request.rating.is_some() {
            return Err(AppError::Conflict(format!("request {id} is already rated")));
        }

        let now = self.clock.now();
        request.rating = Some(TripRating {
            score,
            comment: comment.filter(|text| !text.trim().is_empty()),
            rated_at: now,
        });
        request.updated_at = now;
        Ok(request.clone())
    }

    fn collect_newest_first<F>(&self, keep: F) -> Vec<TransportRequest>
    where
        F: Fn(&TransportRequest) -> bool,
    {
        let mut requests: Vec<TransportRequest> = self
            .requests
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("transport request {} not found", id))
}

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let seconds = (end - start).num_seconds().max(0);
    u32::try_from((seconds + 59) / 60).unwrap_or(u32::MAX)
}
