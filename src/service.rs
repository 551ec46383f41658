use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::DispatchConfig;
use crate::engine::fare::{self, FareEstimate};
use crate::engine::lifecycle::{NewRequest, RequestLifecycle, Transition};
use crate::engine::matcher::{DispatchMatcher, Matched};
use crate::engine::queue::{schedule_rematch, RematchJob};
use crate::engine::registry::{
    ClaimOutcome, DriverAvailabilityRegistry, Ineligibility, ReleaseReason,
};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{DriverAvailability, DriverStatistics, VehicleClass};
use crate::models::event::TransportEvent;
use crate::models::request::{
    Actor, Destination, DispatchState, Pickup, RequestStatus, TransportRequest,
};
use crate::models::tariff::TariffTable;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub rider_id: Uuid,
    #[serde(default)]
    pub booking_id: Option<Uuid>,
    pub pickup: Pickup,
    pub destination: Destination,
    pub vehicle_class: VehicleClass,
    #[serde(default = "default_passengers")]
    pub passengers: u8,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_passengers() -> u8 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStatus {
    Assigned,
    InProgress,
    Exhausted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRequest {
    #[serde(flatten)]
    pub request: TransportRequest,
    pub matching: MatchingStatus,
}

/// Entry point for riders, drivers and operators. Combines the registry,
/// lifecycle, matcher and fare estimator.
pub struct TransportService {
    registry: Arc<DriverAvailabilityRegistry>,
    lifecycle: Arc<RequestLifecycle>,
    matcher: DispatchMatcher,
    tariffs: TariffTable,
    dispatch: DispatchConfig,
    clock: Arc<dyn Clock>,
    events_tx: broadcast::Sender<TransportEvent>,
    rematch_tx: mpsc::Sender<RematchJob>,
    metrics: Metrics,
}

impl TransportService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<DriverAvailabilityRegistry>,
        lifecycle: Arc<RequestLifecycle>,
        matcher: DispatchMatcher,
        tariffs: TariffTable,
        dispatch: DispatchConfig,
        clock: Arc<dyn Clock>,
        events_tx: broadcast::Sender<TransportEvent>,
        rematch_tx: mpsc::Sender<RematchJob>,
        metrics: Metrics,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            matcher,
            tariffs,
            dispatch,
            clock,
            events_tx,
            rematch_tx,
            metrics,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }

    pub fn rematch_sender(&self) -> mpsc::Sender<RematchJob> {
        self.rematch_tx.clone()
    }

    pub fn estimate(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
        vehicle_class: VehicleClass,
    ) -> Result<FareEstimate, AppError> {
        fare::estimate(origin, destination, self.tariffs.for_class(vehicle_class))
    }

    /// Prices and stores a new request, then tries to match it right away.
    ///
    /// Without a driver the request stays pending and is queued for retries.
    pub async fn create_request(&self, input: CreateRequest) -> Result<CreatedRequest, AppError> {
        if input.passengers == 0 {
            return Err(AppError::BadRequest("passengers must be >= 1".to_string()));
        }

        let estimate = self.estimate(
            &input.pickup.location,
            &input.destination.location,
            input.vehicle_class,
        )?;

        let request = self.lifecycle.create(
            NewRequest {
                rider_id: input.rider_id,
                booking_id: input.booking_id,
                pickup: input.pickup,
                destination: input.destination,
                vehicle_class: input.vehicle_class,
                passengers: input.passengers,
                notes: input.notes.filter(|notes| !notes.trim().is_empty()),
            },
            &estimate,
            &self.tariffs.currency,
        );

        info!(
            request_id = %request.id,
            rider_id = %request.rider_id,
            vehicle_class = %request.vehicle_class,
            fare = request.fare.estimated,
            "transport request created"
        );
        self.metrics
            .transitions_total
            .with_label_values(&[RequestStatus::Pending.as_str()])
            .inc();
        self.publish(&request);

        let created = match self.attempt_match(request.id, 1) {
            Ok(matched) => CreatedRequest {
                request: matched,
                matching: MatchingStatus::Assigned,
            },
            Err(AppError::NoDriverAvailable) => {
                let matching = if self.dispatch.max_match_attempts > 1 {
                    schedule_rematch(
                        self.rematch_tx.clone(),
                        self.metrics.clone(),
                        RematchJob {
                            request_id: request.id,
                            attempt: 2,
                        },
                        self.dispatch.retry_delay,
                    );
                    MatchingStatus::InProgress
                } else {
                    self.mark_exhausted(request.id, 1)?;
                    MatchingStatus::Exhausted
                };

                CreatedRequest {
                    request: self.lifecycle.get(request.id)?,
                    matching,
                }
            }
            Err(err) => {
                // Lost a race with a driver accept or a rider cancel.
                warn!(request_id = %request.id, error = %err, "initial match did not complete");
                let current = self.lifecycle.get(request.id)?;
                let matching = match current.status {
                    RequestStatus::Pending => MatchingStatus::InProgress,
                    _ => MatchingStatus::Assigned,
                };
                CreatedRequest {
                    request: current,
                    matching,
                }
            }
        };

        self.refresh_gauges();
        Ok(created)
    }

    /// Runs one matching pass over every radius step.
    pub fn attempt_match(&self, request_id: Uuid, attempt: u32) -> Result<TransportRequest, AppError> {
        let request = self.lifecycle.get(request_id)?;

        let start = Instant::now();
        let result = self.matcher.match_request(&request);
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(Matched { request, .. }) => {
                self.metrics.observe_match("assigned", elapsed);
                self.record_transition(&request);
                Ok(request)
            }
            Err(AppError::NoDriverAvailable) => {
                self.metrics.observe_match("no_driver", elapsed);
                self.lifecycle.record_dispatch(
                    request_id,
                    DispatchState::Searching {
                        attempts: attempt,
                        last_radius_km: Some(self.dispatch.max_radius_km()),
                    },
                )?;
                Err(AppError::NoDriverAvailable)
            }
            Err(err) => {
                self.metrics.observe_match("error", elapsed);
                Err(err)
            }
        }
    }

    /// Operator-triggered matching pass for a pending request.
    pub fn rematch(&self, request_id: Uuid) -> Result<TransportRequest, AppError> {
        let attempts = match self.lifecycle.get(request_id)?.dispatch {
            DispatchState::Searching { attempts, .. } | DispatchState::Exhausted { attempts } => attempts,
            DispatchState::Assigned { .. } => 0,
        };
        self.attempt_match(request_id, attempts.saturating_add(1))
    }

    pub fn mark_exhausted(&self, request_id: Uuid, attempts: u32) -> Result<TransportRequest, AppError> {
        self.lifecycle
            .record_dispatch(request_id, DispatchState::Exhausted { attempts })
    }

    pub fn get_request(&self, request_id: Uuid) -> Result<TransportRequest, AppError> {
        self.lifecycle.get(request_id)
    }

    pub fn requests_for_rider(&self, rider_id: Uuid) -> Vec<TransportRequest> {
        self.lifecycle.list_for_rider(rider_id)
    }

    pub fn requests_for_driver(&self, driver_id: Uuid) -> Result<Vec<TransportRequest>, AppError> {
        let driver = self.get_driver(driver_id)?;
        Ok(self.lifecycle.list_for_driver(driver_id, driver.vehicle_class))
    }

    pub fn pending_requests(&self) -> Vec<TransportRequest> {
        self.lifecycle.list_pending()
    }

    pub fn request_count(&self) -> usize {
        self.lifecycle.len()
    }

    pub fn cancel(&self, request_id: Uuid, reason: &str, cancelled_by: Actor) -> Result<TransportRequest, AppError> {
        let request = self.lifecycle.cancel(request_id, reason, cancelled_by)?;
        self.record_transition(&request);
        Ok(request)
    }

    /// Driver-initiated status change. Only the assigned driver may move the
    /// request along.
    pub fn update_status(
        &self,
        request_id: Uuid,
        driver_id: Uuid,
        new_status: RequestStatus,
        reason: Option<String>,
    ) -> Result<TransportRequest, AppError> {
        let current = self.lifecycle.get(request_id)?;
        if current.assigned_driver_id != Some(driver_id) {
            return Err(AppError::Forbidden(format!(
                "driver {driver_id} is not assigned to transport request {request_id}"
            )));
        }

        let change = match new_status {
            RequestStatus::Accepted => Transition::Accept {
                driver_id,
                radius_km: None,
            },
            RequestStatus::Completed => Transition::Complete { fare_override: None },
            RequestStatus::Cancelled => Transition::Cancel {
                reason: reason.unwrap_or_default(),
                cancelled_by: Actor::Driver,
            },
            other => Transition::Advance(other),
        };

        let request = self.lifecycle.transition(request_id, Actor::Driver, change)?;
        self.record_transition(&request);
        Ok(request)
    }

    /// Completion with an optional operator fare override.
    pub fn complete(
        &self,
        request_id: Uuid,
        fare_override: Option<f64>,
        actor: Actor,
    ) -> Result<TransportRequest, AppError> {
        let request = self.lifecycle.complete(request_id, fare_override, actor)?;
        self.record_transition(&request);
        Ok(request)
    }

    /// A driver picks a pending request off the open list.
    pub fn accept(&self, request_id: Uuid, driver_id: Uuid) -> Result<TransportRequest, AppError> {
        let request = self.lifecycle.get(request_id)?;
        if request.status != RequestStatus::Pending {
            return Err(AppError::InvalidTransition {
                from: request.status,
                to: RequestStatus::Accepted,
            });
        }

        let driver = self.get_driver(driver_id)?;
        if driver.vehicle_class != request.vehicle_class {
            return Err(AppError::Conflict(format!(
                "request needs a {}, driver {driver_id} drives a {}",
                request.vehicle_class, driver.vehicle_class
            )));
        }
        if driver.capacity < request.passengers {
            return Err(AppError::Conflict(format!(
                "driver {driver_id} seats {} but the request has {} passengers",
                driver.capacity, request.passengers
            )));
        }

        match self.registry.try_claim(driver_id, request_id) {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::RequestTaken => {
                return Err(AppError::Conflict(format!(
                    "transport request {request_id} was already accepted"
                )));
            }
            ClaimOutcome::DriverIneligible(Ineligibility::Busy) => {
                return Err(AppError::DriverBusy(driver_id));
            }
            ClaimOutcome::DriverIneligible(Ineligibility::Unknown) => {
                return Err(AppError::NotFound(format!("driver {} not found", driver_id)));
            }
            ClaimOutcome::DriverIneligible(reason) => {
                return Err(AppError::Conflict(format!(
                    "driver {driver_id} cannot accept requests: {reason:?}"
                )));
            }
        }

        match self.lifecycle.assign(request_id, driver_id, None, Actor::Driver) {
            Ok(request) => {
                self.record_transition(&request);
                Ok(request)
            }
            Err(err) => {
                self.registry
                    .release(driver_id, request_id, ReleaseReason::Rollback);
                Err(err)
            }
        }
    }

    pub fn rate(&self, request_id: Uuid, score: u8, comment: Option<String>) -> Result<TransportRequest, AppError> {
        self.lifecycle.rate(request_id, score, comment)
    }

    /// Cancels pending requests older than the pending timeout.
    pub fn expire_stale_pending(&self) -> usize {
        let timeout = chrono::Duration::from_std(self.dispatch.pending_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = self.clock.now() - timeout;

        let mut expired = 0;
        for request in self.lifecycle.list_pending() {
            if request.created_at > cutoff {
                continue;
            }
            match self.cancel(request.id, "no driver found in time", Actor::System) {
                Ok(_) => expired += 1,
                Err(err) => warn!(request_id = %request.id, error = %err, "could not expire request"),
            }
        }

        self.refresh_gauges();
        expired
    }

    pub fn register_driver(
        &self,
        driver_id: Uuid,
        vehicle_class: VehicleClass,
        capacity: u8,
    ) -> Result<DriverAvailability, AppError> {
        self.registry.register(driver_id, vehicle_class, capacity)
    }

    pub fn retire_driver(&self, driver_id: Uuid) -> Result<DriverAvailability, AppError> {
        let driver = self.registry.retire(driver_id)?;
        self.refresh_gauges();
        Ok(driver)
    }

    /// Goes online at `location` (or the last known one) or offline.
    pub fn set_availability(
        &self,
        driver_id: Uuid,
        is_online: bool,
        location: Option<GeoPoint>,
    ) -> Result<DriverAvailability, AppError> {
        let result = if is_online {
            let location = match location {
                Some(location) => location,
                None => self
                    .get_driver(driver_id)?
                    .last_known_location
                    .ok_or_else(|| {
                        AppError::BadRequest("location is required to go online".to_string())
                    })?,
            };
            self.registry.set_online(driver_id, location)
        } else {
            self.registry.set_offline(driver_id)
        };

        self.refresh_gauges();
        result
    }

    /// Updates presence and, for a driver on a trip, the ETA shown to the rider.
    pub fn heartbeat(&self, driver_id: Uuid, location: GeoPoint) -> Result<DriverAvailability, AppError> {
        let driver = self.registry.heartbeat(driver_id, location)?;

        if let Some(request_id) = driver.current_assignment {
            if let Ok(request) = self.lifecycle.get(request_id) {
                let target = match request.status {
                    RequestStatus::Accepted | RequestStatus::DriverEnroute => {
                        request.pickup.location
                    }
                    _ => request.destination.location,
                };
                let tariff = self.tariffs.for_class(request.vehicle_class);
                let eta = fare::eta_minutes(&location, &target, tariff)?;
                self.lifecycle.track_driver(request_id, driver_id, location, eta);
            }
        }

        Ok(driver)
    }

    pub fn get_driver(&self, driver_id: Uuid) -> Result<DriverAvailability, AppError> {
        self.registry
            .get(driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {} not found", driver_id)))
    }

    pub fn list_drivers(&self) -> Vec<DriverAvailability> {
        self.registry.list()
    }

    pub fn driver_count(&self) -> usize {
        self.registry.len()
    }

    pub fn driver_statistics(&self, driver_id: Uuid) -> Result<DriverStatistics, AppError> {
        Ok(self.get_driver(driver_id)?.statistics)
    }

    fn record_transition(&self, request: &TransportRequest) {
        self.metrics
            .transitions_total
            .with_label_values(&[request.status.as_str()])
            .inc();
        self.publish(request);
        self.refresh_gauges();
    }

    /// Fire-and-forget; having no subscribers is not an error.
    fn publish(&self, request: &TransportRequest) {
        let _ = self.events_tx.send(TransportEvent::from_request(request));
    }

    fn refresh_gauges(&self) {
        self.metrics
            .pending_requests
            .set(self.lifecycle.pending_count() as i64);
        self.metrics
            .online_drivers
            .set(self.registry.online_count() as i64);
    }
}
