use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::RequestLifecycle;
use crate::engine::registry::{
    CandidateQuery, ClaimOutcome, DriverAvailabilityRegistry, ReleaseReason,
};
use crate::error::AppError;
use crate::models::request::{Actor, RequestStatus, TransportRequest};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub driver_id: Uuid,
    pub radius_km: f64,
    pub distance_km: f64,
}

#[derive(Debug, Clone)]
pub struct Matched {
    pub request: TransportRequest,
    pub result: MatchResult,
}

/// Assigns pending requests to the closest willing driver, widening the
/// search radius step by step.
pub struct DispatchMatcher {
    registry: Arc<DriverAvailabilityRegistry>,
    lifecycle: Arc<RequestLifecycle>,
    radius_steps_km: Vec<f64>,
}

impl DispatchMatcher {
    pub fn new(
        registry: Arc<DriverAvailabilityRegistry>,
        lifecycle: Arc<RequestLifecycle>,
        radius_steps_km: Vec<f64>,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            radius_steps_km,
        }
    }

    /// Claims the first eligible driver for `request`, nearest first.
    ///
    /// Stops at the first successful claim. Returns `NoDriverAvailable` once
    /// every radius step is exhausted; nothing is left claimed in that case.
    pub fn find_and_claim(&self, request: &TransportRequest) -> Result<MatchResult, AppError> {
        if request.status != RequestStatus::Pending {
            return Err(AppError::InvalidTransition {
                from: request.status,
                to: RequestStatus::Accepted,
            });
        }

        let mut tried = HashSet::new();

        for &radius_km in &self.radius_steps_km {
            let query = CandidateQuery {
                vehicle_class: request.vehicle_class,
                near: request.pickup.location,
                max_radius_km: radius_km,
                min_capacity: request.passengers,
            };

            for candidate in self.registry.candidates_for(&query) {
                if !tried.insert(candidate.driver_id) {
                    continue;
                }

                match self.registry.try_claim(candidate.driver_id, request.id) {
                    ClaimOutcome::Claimed => {
                        return Ok(MatchResult {
                            driver_id: candidate.driver_id,
                            radius_km,
                            distance_km: candidate.distance_km,
                        });
                    }
                    ClaimOutcome::RequestTaken => {
                        return Err(AppError::Conflict(format!(
                            "transport request {} is already being accepted",
                            request.id
                        )));
                    }
                    ClaimOutcome::DriverIneligible(reason) => {
                        debug!(
                            request_id = %request.id,
                            driver_id = %candidate.driver_id,
                            reason = ?reason,
                            "candidate lost before claim"
                        );
                    }
                }
            }

            debug!(request_id = %request.id, radius_km, "no driver claimed at radius");
        }

        warn!(
            request_id = %request.id,
            vehicle_class = %request.vehicle_class,
            "no driver available within max radius"
        );
        Err(AppError::NoDriverAvailable)
    }

    /// Claims a driver and moves the request to `accepted`.
    ///
    /// If the request left `pending` in the meantime the claim is rolled back
    /// and the lifecycle error is returned.
    pub fn match_request(&self, request: &TransportRequest) -> Result<Matched, AppError> {
        let result = self.find_and_claim(request)?;

        match self
            .lifecycle
            .assign(request.id, result.driver_id, Some(result.radius_km), Actor::System)
        {
            Ok(updated) => {
                info!(
                    request_id = %request.id,
                    driver_id = %result.driver_id,
                    radius_km = result.radius_km,
                    distance_km = result.distance_km,
                    "request assigned"
                );
                Ok(Matched {
                    request: updated,
                    result,
                })
            }
            Err(err) => {
                self.registry
                    .release(result.driver_id, request.id, ReleaseReason::Rollback);
                Err(err)
            }
        }
    }
}
