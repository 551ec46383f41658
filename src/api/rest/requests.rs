use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::request::{Actor, RequestStatus, TransportRequest};
use crate::service::{CreateRequest, CreatedRequest, MatchingStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/transport-requests",
            post(create_request).get(list_requests),
        )
        .route("/transport-requests/:id", get(get_request))
        .route("/transport-requests/:id/cancel", post(cancel_request))
        .route("/transport-requests/:id/status", patch(update_status))
        .route("/transport-requests/:id/accept", post(accept_request))
        .route("/transport-requests/:id/complete", post(complete_request))
        .route("/transport-requests/:id/match", post(rematch_request))
        .route("/transport-requests/:id/rating", post(rate_request))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub rider_id: Option<Uuid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBody {
    pub reason: String,
    #[serde(default = "rider")]
    pub cancelled_by: Actor,
}

fn rider() -> Actor {
    Actor::Rider
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub new_status: RequestStatus,
    pub driver_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBody {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBody {
    #[serde(default)]
    pub final_fare: Option<f64>,
    #[serde(default = "operator")]
    pub actor: Actor,
}

fn operator() -> Actor {
    Actor::System
}

#[derive(Deserialize)]
pub struct RatingBody {
    pub score: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRequest>,
) -> Result<(StatusCode, Json<CreatedRequest>), AppError> {
    let created = state.service.create_request(payload).await?;

    let status = match created.matching {
        MatchingStatus::Assigned => StatusCode::CREATED,
        MatchingStatus::InProgress | MatchingStatus::Exhausted => StatusCode::ACCEPTED,
    };

    Ok((status, Json(created)))
}

/// A rider's history, or every open request when no rider is given.
async fn list_requests(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<TransportRequest>> {
    let requests = match query.rider_id {
        Some(rider_id) => state.service.requests_for_rider(rider_id),
        None => state.service.pending_requests(),
    };
    Json(requests)
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransportRequest>, AppError> {
    Ok(Json(state.service.get_request(id)?))
}

async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelBody>,
) -> Result<Json<TransportRequest>, AppError> {
    let request = state
        .service
        .cancel(id, &payload.reason, payload.cancelled_by)?;
    Ok(Json(request))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusBody>,
) -> Result<Json<TransportRequest>, AppError> {
    let request =
        state
            .service
            .update_status(id, payload.driver_id, payload.new_status, payload.reason)?;
    Ok(Json(request))
}

async fn accept_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptBody>,
) -> Result<Json<TransportRequest>, AppError> {
    Ok(Json(state.service.accept(id, payload.driver_id)?))
}

async fn complete_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteBody>,
) -> Result<Json<TransportRequest>, AppError> {
    let request = state
        .service
        .complete(id, payload.final_fare, payload.actor)?;
    Ok(Json(request))
}

/// `200` once assigned. With nobody nearby the request keeps searching and
/// comes back as `202`.
async fn rematch_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<TransportRequest>), AppError> {
    match state.service.rematch(id) {
        Ok(request) => Ok((StatusCode::OK, Json(request))),
        Err(AppError::NoDriverAvailable) => {
            Ok((StatusCode::ACCEPTED, Json(state.service.get_request(id)?)))
        }
        Err(err) => Err(err),
    }
}

async fn rate_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatingBody>,
) -> Result<Json<TransportRequest>, AppError> {
    let comment = payload.comment.filter(|comment| !comment.trim().is_empty());
    Ok(Json(state.service.rate(id, payload.score, comment)?))
}
