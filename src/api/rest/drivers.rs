use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::presence::set_presence;
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::order::DeliveryOrder;
use crate::relay::{report_location, LocationOutcome};
use crate::state::AppState;
use crate::store::drivers::NewDriver;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/online", get(list_online_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/orders", get(list_driver_orders))
        .route("/drivers/:id/presence", patch(update_presence))
        .route("/drivers/:id/location", post(update_location))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub display_name: String,
    pub vehicle_plate: String,
}

#[derive(Deserialize)]
pub struct UpdatePresenceRequest {
    pub online: bool,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct LocationResponse {
    pub accepted: bool,
    pub outcome: LocationOutcome,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state.drivers.register(NewDriver {
        display_name: payload.display_name,
        vehicle_plate: payload.vehicle_plate,
    })?;
    tracing::info!(driver_id = %driver.id, "driver registered");
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(state.drivers.list())
}

async fn list_online_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(state.drivers.online_drivers())
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(state.drivers.get(id)?))
}

async fn list_driver_orders(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DeliveryOrder>>, AppError> {
    state.drivers.get(id)?;
    Ok(Json(state.orders.list_for_driver(id)))
}

async fn update_presence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePresenceRequest>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(set_presence(&state, id, payload.online)?))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<LocationResponse>, AppError> {
    let recorded_at = payload.recorded_at.unwrap_or_else(Utc::now);
    let outcome = report_location(&state, id, payload.lat, payload.lng, recorded_at)?;
    Ok(Json(LocationResponse {
        accepted: outcome.is_accepted(),
        outcome,
    }))
}
