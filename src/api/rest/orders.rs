use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::auth::CustomerId;
use crate::engine::lifecycle::{Actor, CheckoutDetails, NewOrder};
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/checkout", post(checkout))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(update_status))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    CustomerId(user_id): CustomerId,
    Json(payload): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state.lifecycle.create(&user_id, payload)?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn checkout(
    State(state): State<Arc<AppState>>,
    CustomerId(user_id): CustomerId,
    Json(payload): Json<CheckoutDetails>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state.lifecycle.checkout(&user_id, payload)?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    CustomerId(user_id): CustomerId,
) -> Json<Vec<Order>> {
    Json(state.lifecycle.list_for_customer(&user_id))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    CustomerId(user_id): CustomerId,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.lifecycle.get(id, &Actor::Customer(user_id))?;
    Ok(Json(order))
}

/// Customers can only cancel; anything else is rejected by the lifecycle.
async fn update_status(
    State(state): State<Arc<AppState>>,
    CustomerId(user_id): CustomerId,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .lifecycle
        .transition(id, payload.status, &Actor::Customer(user_id))?;
    Ok(Json(order))
}
