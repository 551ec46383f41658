use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use transport_dispatch::api::rest::router;
use transport_dispatch::config::Config;
use transport_dispatch::engine::queue::RematchJob;
use transport_dispatch::state::AppState;
use uuid::Uuid;

fn setup() -> (axum::Router, mpsc::Receiver<RematchJob>) {
    let (state, rx) = AppState::new(Config::default());
    (router(Arc::new(state)), rx)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn ride_body(rider_id: Uuid) -> Value {
    json!({
        "riderId": rider_id,
        "pickup": {
            "location": { "lat": 9.45, "lng": 125.57 },
            "address": "Luneta Park"
        },
        "destination": {
            "location": { "lat": 9.46, "lng": 125.565 },
            "address": "Surigao Boulevard",
            "placeName": "Boulevard"
        },
        "vehicleClass": "tricycle",
        "passengers": 2,
        "notes": "near the gate"
    })
}

/// Registers a tricycle driver and brings them online next to the pickup.
async fn online_driver(app: &axum::Router) -> String {
    let driver_id = Uuid::new_v4().to_string();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "driverId": driver_id, "vehicleClass": "tricycle", "capacity": 4 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/drivers/{driver_id}/availability"),
            json!({ "isOnline": true, "location": { "lat": 9.451, "lng": 125.57 } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    driver_id
}

async fn set_status(app: &axum::Router, request_id: &str, driver_id: &str, status: &str) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/transport-requests/{request_id}/status"),
            json!({ "newStatus": status, "driverId": driver_id }),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["requests"], 0);
    assert_eq!(body["pendingRequests"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _rx) = setup();
    online_driver(&app).await;

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("online_drivers 1"));
    assert!(body.contains("pending_requests"));
}

#[tokio::test]
async fn register_driver_starts_offline() {
    let (app, _rx) = setup();
    let driver_id = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "driverId": driver_id, "vehicleClass": "van", "capacity": 8 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["driverId"], driver_id.to_string());
    assert_eq!(body["vehicleClass"], "van");
    assert_eq!(body["isOnline"], false);
    assert!(body["currentAssignment"].is_null());

    let response = app.oneshot(get_request("/drivers")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn register_driver_zero_capacity_returns_400() {
    let (app, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "driverId": Uuid::new_v4(), "vehicleClass": "tricycle", "capacity": 0 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn going_online_without_any_location_returns_400() {
    let (app, _rx) = setup();
    let driver_id = Uuid::new_v4();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "driverId": driver_id, "vehicleClass": "motorcycle", "capacity": 1 }),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/drivers/{driver_id}/availability"),
            json!({ "isOnline": true }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_nonexistent_request_returns_404() {
    let (app, _rx) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/transport-requests/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn create_request_without_drivers_returns_202() {
    let (app, _rx) = setup();
    let rider_id = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(rider_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["matching"], "in_progress");
    assert!(body["assignedDriverId"].is_null());
    assert_eq!(body["fare"]["estimated"], 37.0);
    assert_eq!(body["fare"]["currency"], "PHP");
    assert_eq!(body["duration"]["estimatedMinutes"], 4);
    assert_eq!(body["timeline"].as_array().unwrap().len(), 1);

    let response = app
        .oneshot(get_request(&format!("/transport-requests?riderId={rider_id}")))
        .await
        .unwrap();
    let list = body_json(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_request_with_nearby_driver_returns_201() {
    let (app, _rx) = setup();
    let driver_id = online_driver(&app).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["matching"], "assigned");
    assert_eq!(body["assignedDriverId"], driver_id);

    let response = app
        .oneshot(get_request(&format!("/drivers/{driver_id}")))
        .await
        .unwrap();
    let driver = body_json(response).await;
    assert_eq!(driver["currentAssignment"], body["id"]);
}

#[tokio::test]
async fn invalid_coordinate_returns_400() {
    let (app, _rx) = setup();
    let mut body = ride_body(Uuid::new_v4());
    body["pickup"]["location"]["lat"] = json!(91.0);

    let response = app
        .oneshot(json_request("POST", "/transport-requests", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_coordinate");
}

#[tokio::test]
async fn busy_driver_cannot_go_offline() {
    let (app, _rx) = setup();
    let driver_id = online_driver(&app).await;

    app.clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/drivers/{driver_id}/availability"),
            json!({ "isOnline": false }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "driver_busy");
}

#[tokio::test]
async fn full_trip_flow_sets_final_fare_and_statistics() {
    let (app, _rx) = setup();
    let driver_id = online_driver(&app).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();
    let created = body_json(response).await;
    let request_id = created["id"].as_str().unwrap().to_string();

    for status in ["driver_enroute", "arrived", "in_progress", "completed"] {
        let response = set_status(&app, &request_id, &driver_id, status).await;
        assert_eq!(response.status(), StatusCode::OK, "moving to {status}");
    }

    let response = app
        .clone()
        .oneshot(get_request(&format!("/transport-requests/{request_id}")))
        .await
        .unwrap();
    let request = body_json(response).await;
    assert_eq!(request["status"], "completed");
    assert_eq!(request["fare"]["final"], 37.0);
    assert_eq!(request["timeline"].as_array().unwrap().len(), 6);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/drivers/{driver_id}/statistics")))
        .await
        .unwrap();
    let stats = body_json(response).await;
    assert_eq!(stats["completedTrips"], 1);
    assert_eq!(stats["totalEarnings"], 37.0);

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/transport-requests/{request_id}/rating"),
            json!({ "score": 5, "comment": "smooth ride" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rated = body_json(response).await;
    assert_eq!(rated["rating"]["score"], 5);
}

#[tokio::test]
async fn skipping_a_status_returns_409() {
    let (app, _rx) = setup();
    let driver_id = online_driver(&app).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();
    let request_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = set_status(&app, &request_id, &driver_id, "completed").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn unassigned_driver_cannot_update_status() {
    let (app, _rx) = setup();
    online_driver(&app).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();
    let request_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let stranger = Uuid::new_v4().to_string();
    let response = set_status(&app, &request_id, &stranger, "driver_enroute").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cancel_twice_returns_409() {
    let (app, _rx) = setup();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();
    let request_id = body_json(response).await["id"].as_str().unwrap().to_string();
    let uri = format!("/transport-requests/{request_id}/cancel");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &uri,
            json!({ "reason": "found another ride", "cancelledBy": "rider" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["cancellation"]["reason"], "found another ride");
    assert_eq!(body["cancellation"]["cancelledBy"], "rider");

    let response = app
        .oneshot(json_request(
            "POST",
            &uri,
            json!({ "reason": "again", "cancelledBy": "rider" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancel_with_only_a_reason_is_attributed_to_the_rider() {
    let (app, _rx) = setup();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();
    let request_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/transport-requests/{request_id}/cancel"),
            json!({ "reason": "changed plans" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["cancellation"]["reason"], "changed plans");
    assert_eq!(body["cancellation"]["cancelledBy"], "rider");
}

#[tokio::test]
async fn cancel_without_reason_returns_400() {
    let (app, _rx) = setup();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();
    let request_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/transport-requests/{request_id}/cancel"),
            json!({ "reason": "   ", "cancelledBy": "rider" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn second_driver_accept_returns_409() {
    let (app, _rx) = setup();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();
    let request_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let first = online_driver(&app).await;
    let second = online_driver(&app).await;
    let uri = format!("/transport-requests/{request_id}/accept");

    let response = app
        .clone()
        .oneshot(json_request("POST", &uri, json!({ "driverId": first })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["assignedDriverId"], first);

    let response = app
        .clone()
        .oneshot(json_request("POST", &uri, json!({ "driverId": second })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(get_request(&format!("/drivers/{second}")))
        .await
        .unwrap();
    let driver = body_json(response).await;
    assert!(driver["currentAssignment"].is_null());
}

#[tokio::test]
async fn operator_rematch_without_drivers_keeps_searching() {
    let (app, _rx) = setup();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();
    let request_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(empty_request(
            "POST",
            &format!("/transport-requests/{request_id}/match"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["dispatch"]["state"], "searching");
    assert!(body["assignedDriverId"].is_null());
}

#[tokio::test]
async fn operator_rematch_assigns_a_driver_who_came_online() {
    let (app, _rx) = setup();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();
    let request_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let driver_id = online_driver(&app).await;

    let response = app
        .oneshot(empty_request(
            "POST",
            &format!("/transport-requests/{request_id}/match"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["assignedDriverId"], driver_id);
}

#[tokio::test]
async fn operator_completion_applies_fare_override() {
    let (app, _rx) = setup();
    let driver_id = online_driver(&app).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();
    let request_id = body_json(response).await["id"].as_str().unwrap().to_string();

    for status in ["driver_enroute", "arrived", "in_progress"] {
        set_status(&app, &request_id, &driver_id, status).await;
    }

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/transport-requests/{request_id}/complete"),
            json!({ "finalFare": 44.2, "actor": "system" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["fare"]["final"], 45.0);
}

#[tokio::test]
async fn retired_driver_cannot_come_back_online() {
    let (app, _rx) = setup();
    let driver_id = online_driver(&app).await;

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/drivers/{driver_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["retired"], true);
    assert_eq!(body["isOnline"], false);

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/drivers/{driver_id}/availability"),
            json!({ "isOnline": true, "location": { "lat": 9.45, "lng": 125.57 } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn driver_sees_open_requests_for_their_class() {
    let (app, _rx) = setup();
    let driver_id = Uuid::new_v4().to_string();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "driverId": driver_id, "vehicleClass": "tricycle", "capacity": 4 }),
        ))
        .await
        .unwrap();

    app.clone()
        .oneshot(json_request("POST", "/transport-requests", ride_body(Uuid::new_v4())))
        .await
        .unwrap();

    let response = app
        .oneshot(get_request(&format!("/drivers/{driver_id}/transport-requests")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["status"], "pending");
}
