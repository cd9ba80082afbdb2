use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::dispatch;
use crate::engine::scoring::{rank_candidates, Candidate};
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::order::{DeliveryOrder, Money, OrderStatus};
use crate::models::prescription::PrescriptionRecord;
use crate::state::AppState;
use crate::store::orders::NewOrder;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/assign", post(assign_driver))
        .route("/orders/:id/status", post(advance_status))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/candidates", get(list_candidates))
        .route("/patients/:patient_ref/orders", get(list_patient_orders))
        .route("/prescriptions/:reference", get(get_prescription))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub prescription_ref: String,
    pub patient_ref: String,
    pub pharmacy_ref: Option<String>,
    pub delivery_address: String,
    pub delivery_phone: String,
    pub notes: Option<String>,
    pub pickup: Option<GeoPoint>,
    pub fee_minor: Option<i64>,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<DeliveryOrder>, AppError> {
    let fee = Money(payload.fee_minor.unwrap_or(state.config.default_fee_minor));
    let order = dispatch::create_order(
        &state,
        NewOrder {
            prescription_ref: payload.prescription_ref,
            patient_ref: payload.patient_ref,
            pharmacy_ref: payload.pharmacy_ref,
            delivery_address: payload.delivery_address,
            delivery_phone: payload.delivery_phone,
            notes: payload.notes,
            pickup: payload.pickup,
            fee,
        },
    )?;
    Ok(Json(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Json<Vec<DeliveryOrder>> {
    let orders = match query.status {
        Some(status) => state.orders.list_by_status(status),
        None => state.orders.list(),
    };
    Json(orders)
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(state.orders.get(id)?))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(dispatch::assign_driver(&state, id, payload.driver_id)?))
}

async fn advance_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(dispatch::advance_status(&state, id, payload.status)?))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelRequest>>,
) -> Result<Json<DeliveryOrder>, AppError> {
    let reason = payload.and_then(|Json(body)| body.reason);
    Ok(Json(dispatch::cancel(&state, id, reason)?))
}

async fn list_candidates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Candidate>>, AppError> {
    Ok(Json(rank_candidates(&state, id)?))
}

async fn list_patient_orders(
    State(state): State<Arc<AppState>>,
    Path(patient_ref): Path<String>,
) -> Json<Vec<DeliveryOrder>> {
    Json(state.orders.list_for_patient(&patient_ref))
}

async fn get_prescription(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<PrescriptionRecord>, AppError> {
    state
        .prescriptions
        .get(&reference)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("prescription {reference} not found")))
}
