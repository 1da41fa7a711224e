use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::auth::RiderAuth;
use crate::api::rest::orders::UpdateStatusRequest;
use crate::engine::lifecycle::Actor;
use crate::engine::relay::RelayOutcome;
use crate::error::AppError;
use crate::models::order::{Order, RiderOrderView};
use crate::models::rider::{Rider, VehicleType};
use crate::models::{GeoPoint, TrackedPosition};
use crate::state::AppState;

const DEFAULT_RATING: f64 = 5.0;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/riders", post(onboard_rider))
        .route("/riders/active", get(list_active_riders))
        .route("/riders/location", put(report_location))
        .route("/riders/orders/:id/status", put(update_order_status))
        .route("/riders/:id/status", patch(update_rider_status))
        .route("/riders/:id/orders", get(list_rider_orders))
}

#[derive(Deserialize)]
pub struct OnboardRiderRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub vehicle_number: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Serialize)]
pub struct OnboardRiderResponse {
    pub rider: Rider,
    pub token: String,
}

#[derive(Deserialize)]
pub struct RiderStatusRequest {
    pub active: bool,
}

#[derive(Deserialize)]
pub struct LocationReport {
    #[serde(alias = "riderId")]
    pub rider_id: Uuid,
    #[serde(default, alias = "orderId")]
    pub order_id: Option<Uuid>,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub longitude: f64,
}

#[derive(Serialize)]
pub struct LocationResponse {
    pub location: TrackedPosition,
    pub published: bool,
}

async fn onboard_rider(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OnboardRiderRequest>,
) -> Result<(StatusCode, Json<OnboardRiderResponse>), AppError> {
    let name = payload.name.trim();
    let email = payload.email.trim();
    let phone = payload.phone.trim();
    if name.is_empty() || email.is_empty() || phone.is_empty() {
        return Err(AppError::Validation(
            "name, email and phone are required".to_string(),
        ));
    }

    let now = Utc::now();
    let location = payload
        .location
        .map(GeoPoint::validate)
        .transpose()?
        .map(|point| TrackedPosition::at(point, now));

    let rider = Rider {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        vehicle_type: payload.vehicle_type,
        vehicle_number: payload.vehicle_number,
        is_active: payload.is_active,
        location,
        current_order: None,
        rating: payload
            .rating
            .filter(|rating| rating.is_finite())
            .unwrap_or(DEFAULT_RATING)
            .clamp(0.0, 5.0),
        total_deliveries: 0,
        created_at: now,
    };

    let token = state.store.insert_rider(rider.clone());
    info!(rider_id = %rider.id, active = rider.is_active, "rider onboarded");

    Ok((StatusCode::CREATED, Json(OnboardRiderResponse { rider, token })))
}

async fn list_active_riders(State(state): State<Arc<AppState>>) -> Json<Vec<Rider>> {
    let riders = state
        .store
        .riders
        .iter()
        .filter(|entry| entry.is_active)
        .map(|entry| entry.value().clone())
        .collect();
    Json(riders)
}

async fn update_rider_status(
    State(state): State<Arc<AppState>>,
    auth: RiderAuth,
    Path(id): Path<Uuid>,
    Json(payload): Json<RiderStatusRequest>,
) -> Result<Json<Rider>, AppError> {
    auth.ensure(id)?;

    let mut rider = state
        .store
        .riders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))?;
    rider.is_active = payload.active;

    info!(rider_id = %id, active = payload.active, "rider availability changed");
    Ok(Json(rider.clone()))
}

async fn list_rider_orders(
    State(state): State<Arc<AppState>>,
    auth: RiderAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RiderOrderView>>, AppError> {
    auth.ensure(id)?;

    let orders = state
        .lifecycle
        .active_for_rider(id)
        .iter()
        .map(Order::rider_view)
        .collect();
    Ok(Json(orders))
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    auth: RiderAuth,
    Json(payload): Json<LocationReport>,
) -> Result<Json<LocationResponse>, AppError> {
    auth.ensure(payload.rider_id)?;

    let Some(order_id) = payload.order_id else {
        let location =
            state
                .relay
                .update_position(payload.rider_id, payload.latitude, payload.longitude)?;
        return Ok(Json(LocationResponse {
            location,
            published: false,
        }));
    };

    let outcome = state.relay.report_location(
        payload.rider_id,
        order_id,
        payload.latitude,
        payload.longitude,
    )?;
    let location = state
        .store
        .riders
        .get(&payload.rider_id)
        .and_then(|rider| rider.location)
        .ok_or_else(|| AppError::NotFound(format!("rider {} not found", payload.rider_id)))?;

    Ok(Json(LocationResponse {
        location,
        published: matches!(outcome, RelayOutcome::Published { .. }),
    }))
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    RiderAuth(rider_id): RiderAuth,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .lifecycle
        .transition(id, payload.status, &Actor::Rider(rider_id))?;
    Ok(Json(order))
}
