use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use dispatch_tracker::api::rest::router;
use dispatch_tracker::config::Config;
use dispatch_tracker::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> axum::Router {
    let (state, _rx) = AppState::new(Config::default());
    router(Arc::new(state))
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

async fn create_order(app: &axum::Router, patient: &str) -> Value {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/orders",
            json!({
                "prescription_ref": format!("rx-{patient}"),
                "patient_ref": patient,
                "pharmacy_ref": "ph-ikeja",
                "delivery_address": "7 Awolowo Rd, Ikoyi",
                "delivery_phone": "+2348030000000",
                "pickup": { "lat": 6.4541, "lng": 3.3947 }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

async fn create_online_driver(app: &axum::Router, name: &str) -> String {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "display_name": name, "vehicle_plate": "lnd-101" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let driver = body_json(res).await;
    let id = driver["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/drivers/{id}/presence"),
            json!({ "online": true }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    id
}

async fn post(app: &axum::Router, uri: &str, body: Value) -> axum::response::Response {
    app.clone().oneshot(json_request("POST", uri, body)).await.unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["orders"], 0);
    assert_eq!(body["subscriptions"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
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
    assert!(body.contains("location_queue_depth"));
}

#[tokio::test]
async fn create_order_returns_pending_with_default_fee() {
    let app = setup();
    let order = create_order(&app, "p-100").await;

    assert_eq!(order["status"], "pending");
    assert!(order["driver_id"].is_null());
    assert_eq!(order["fee"], 1500);

    let res = app
        .oneshot(get_request("/prescriptions/rx-p-100"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let prescription = body_json(res).await;
    assert_eq!(prescription["status"], "pending");
}

#[tokio::test]
async fn create_order_with_blank_address_returns_400() {
    let app = setup();
    let res = post(
        &app,
        "/orders",
        json!({
            "prescription_ref": "rx-1",
            "patient_ref": "p-1",
            "delivery_address": "   ",
            "delivery_phone": "+2348030000000"
        }),
    )
    .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(get_request("/prescriptions/rx-1"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_nonexistent_order_returns_404() {
    let app = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/orders/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn picking_up_pending_order_is_conflict() {
    let app = setup();
    let order = create_order(&app, "p-1").await;
    let id = order["id"].as_str().unwrap();

    let res = post(
        &app,
        &format!("/orders/{id}/status"),
        json!({ "status": "picked_up" }),
    )
    .await;

    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = body_json(res).await;
    assert_eq!(body["kind"], "illegal_transition");
    assert_eq!(
        body["error"],
        "this order cannot be updated to that status from its current state"
    );
}

#[tokio::test]
async fn assigning_busy_driver_is_conflict() {
    let app = setup();
    let first = create_order(&app, "p-1").await;
    let second = create_order(&app, "p-2").await;
    let driver_id = create_online_driver(&app, "Kemi").await;

    let res = post(
        &app,
        &format!("/orders/{}/assign", first["id"].as_str().unwrap()),
        json!({ "driver_id": driver_id }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = post(
        &app,
        &format!("/orders/{}/assign", second["id"].as_str().unwrap()),
        json!({ "driver_id": driver_id }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = body_json(res).await;
    assert_eq!(body["kind"], "driver_unavailable");
    assert_eq!(body["error"], "driver no longer available, choose another");
}

#[tokio::test]
async fn full_delivery_flow() {
    let app = setup();
    let order = create_order(&app, "p-7").await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let driver_id = create_online_driver(&app, "Dispatch Dayo").await;

    let res = app
        .clone()
        .oneshot(get_request(&format!("/orders/{order_id}/candidates")))
        .await
        .unwrap();
    let candidates = body_json(res).await;
    assert_eq!(candidates[0]["driver_id"], driver_id);

    let res = post(
        &app,
        &format!("/orders/{order_id}/assign"),
        json!({ "driver_id": driver_id }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let assigned = body_json(res).await;
    assert_eq!(assigned["status"], "assigned");
    assert_eq!(assigned["driver_id"], driver_id);
    assert!(assigned["assigned_at"].is_string());

    for status in ["picked_up", "in_transit", "delivered"] {
        let res = post(
            &app,
            &format!("/orders/{order_id}/status"),
            json!({ "status": status }),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK, "advancing to {status}");
        let body = body_json(res).await;
        assert_eq!(body["status"], status);
    }

    let res = app
        .clone()
        .oneshot(get_request(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    let delivered = body_json(res).await;
    assert!(delivered["picked_up_at"].is_string());
    assert!(delivered["delivered_at"].is_string());
    assert_eq!(delivered["driver_id"], driver_id);

    let res = app
        .clone()
        .oneshot(get_request("/prescriptions/rx-p-7"))
        .await
        .unwrap();
    let prescription = body_json(res).await;
    assert_eq!(prescription["status"], "fulfilled");
    assert_eq!(prescription["fulfilled_by"], order_id);

    let res = app
        .clone()
        .oneshot(get_request(&format!("/drivers/{driver_id}")))
        .await
        .unwrap();
    let driver = body_json(res).await;
    assert!(driver["active_order"].is_null());

    let res = app
        .clone()
        .oneshot(get_request(&format!("/drivers/{driver_id}/orders")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await.as_array().unwrap().len(), 1);

    let res = app
        .oneshot(get_request("/patients/p-7/orders"))
        .await
        .unwrap();
    assert_eq!(body_json(res).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn cancel_in_transit_is_conflict_and_pending_succeeds() {
    let app = setup();
    let moving = create_order(&app, "p-1").await;
    let moving_id = moving["id"].as_str().unwrap().to_string();
    let driver_id = create_online_driver(&app, "Bisi").await;

    post(
        &app,
        &format!("/orders/{moving_id}/assign"),
        json!({ "driver_id": driver_id }),
    )
    .await;
    for status in ["picked_up", "in_transit"] {
        post(
            &app,
            &format!("/orders/{moving_id}/status"),
            json!({ "status": status }),
        )
        .await;
    }

    let res = post(
        &app,
        &format!("/orders/{moving_id}/cancel"),
        json!({ "reason": "patient changed mind" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let pending = create_order(&app, "p-2").await;
    let res = post(
        &app,
        &format!("/orders/{}/cancel", pending["id"].as_str().unwrap()),
        json!({ "reason": "duplicate" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let cancelled = body_json(res).await;
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["cancel_reason"], "duplicate");
    assert!(cancelled["driver_id"].is_null());
}

#[tokio::test]
async fn list_orders_filters_by_status() {
    let app = setup();
    let first = create_order(&app, "p-1").await;
    create_order(&app, "p-2").await;

    post(
        &app,
        &format!("/orders/{}/cancel", first["id"].as_str().unwrap()),
        json!({}),
    )
    .await;

    let res = app
        .clone()
        .oneshot(get_request("/orders?status=pending"))
        .await
        .unwrap();
    let pending = body_json(res).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["patient_ref"], "p-2");

    let res = app.oneshot(get_request("/orders")).await.unwrap();
    assert_eq!(body_json(res).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn stale_location_is_acknowledged_not_applied() {
    let app = setup();
    let driver_id = create_online_driver(&app, "Femi").await;

    let res = post(
        &app,
        &format!("/drivers/{driver_id}/location"),
        json!({ "lat": 6.50, "lng": 3.38, "recorded_at": "1970-01-01T00:01:40Z" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["accepted"], true);

    let res = post(
        &app,
        &format!("/drivers/{driver_id}/location"),
        json!({ "lat": 6.51, "lng": 3.39, "recorded_at": "1970-01-01T00:00:50Z" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["accepted"], false);
    assert_eq!(body["outcome"], "stale");

    let res = app
        .oneshot(get_request(&format!("/drivers/{driver_id}")))
        .await
        .unwrap();
    let driver = body_json(res).await;
    assert_eq!(driver["location"]["lat"], 6.50);
    assert_eq!(driver["location"]["lng"], 3.38);
}

#[tokio::test]
async fn location_out_of_range_returns_400() {
    let app = setup();
    let driver_id = create_online_driver(&app, "Segun").await;

    let res = post(
        &app,
        &format!("/drivers/{driver_id}/location"),
        json!({ "lat": 96.0, "lng": 3.38 }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn online_drivers_excludes_offline() {
    let app = setup();
    create_online_driver(&app, "Online Olu").await;
    let res = post(
        &app,
        "/drivers",
        json!({ "display_name": "Offline Obi", "vehicle_plate": "abc-9" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(get_request("/drivers/online"))
        .await
        .unwrap();
    let online = body_json(res).await;
    assert_eq!(online.as_array().unwrap().len(), 1);
    assert_eq!(online[0]["display_name"], "Online Olu");

    let res = app.oneshot(get_request("/drivers")).await.unwrap();
    assert_eq!(body_json(res).await.as_array().unwrap().len(), 2);
}
