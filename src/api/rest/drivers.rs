use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{DriverAvailability, DriverStatistics, VehicleClass};
use crate::models::request::TransportRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/:id", get(get_driver).delete(retire_driver))
        .route("/drivers/:id/availability", put(update_availability))
        .route("/drivers/:id/heartbeat", post(heartbeat))
        .route("/drivers/:id/transport-requests", get(driver_requests))
        .route("/drivers/:id/statistics", get(driver_statistics))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDriverBody {
    pub driver_id: Uuid,
    pub vehicle_class: VehicleClass,
    pub capacity: u8,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityBody {
    pub is_online: bool,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct HeartbeatBody {
    pub location: GeoPoint,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverBody>,
) -> Result<Json<DriverAvailability>, AppError> {
    let driver = state.service.register_driver(
        payload.driver_id,
        payload.vehicle_class,
        payload.capacity,
    )?;
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<DriverAvailability>> {
    Json(state.service.list_drivers())
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverAvailability>, AppError> {
    Ok(Json(state.service.get_driver(id)?))
}

async fn retire_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverAvailability>, AppError> {
    Ok(Json(state.service.retire_driver(id)?))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AvailabilityBody>,
) -> Result<Json<DriverAvailability>, AppError> {
    let driver = state
        .service
        .set_availability(id, payload.is_online, payload.location)?;
    Ok(Json(driver))
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HeartbeatBody>,
) -> Result<Json<DriverAvailability>, AppError> {
    Ok(Json(state.service.heartbeat(id, payload.location)?))
}

async fn driver_requests(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TransportRequest>>, AppError> {
    Ok(Json(state.service.requests_for_driver(id)?))
}

async fn driver_statistics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverStatistics>, AppError> {
    Ok(Json(state.service.driver_statistics(id)?))
}
