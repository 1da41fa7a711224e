use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::api::rest::auth::AdminAuth;
use crate::api::rest::orders::UpdateStatusRequest;
use crate::engine::lifecycle::Actor;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/orders/:id/assign", post(assign_order))
        .route("/admin/orders/:id/status", put(update_status))
        .route("/admin/assignments", get(list_assignments))
}

async fn assign_order(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<Assignment>, AppError> {
    let assignment = state.assignment.assign(id)?;
    Ok(Json(assignment))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.lifecycle.transition(id, payload.status, &Actor::System)?;
    Ok(Json(order))
}

async fn list_assignments(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Json<Vec<Assignment>> {
    let mut assignments: Vec<Assignment> = state
        .store
        .assignments
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    assignments.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at));

    Json(assignments)
}
