use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::auth::CustomerId;
use crate::error::AppError;
use crate::models::cart::Cart;
use crate::models::order::OrderItem;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/items", post(add_item))
        .route(
            "/cart/items/:food_id",
            patch(update_quantity).delete(remove_item),
        )
}

#[derive(Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

async fn get_cart(State(state): State<Arc<AppState>>, CustomerId(user_id): CustomerId) -> Json<Cart> {
    let cart = state
        .store
        .carts
        .get(&user_id)
        .map(|cart| cart.value().clone())
        .unwrap_or_default();
    Json(cart)
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    CustomerId(user_id): CustomerId,
    Json(item): Json<OrderItem>,
) -> Result<Json<Cart>, AppError> {
    item.validate()?;

    let mut cart = state.store.carts.entry(user_id).or_default();
    cart.add(item)?;
    Ok(Json(cart.clone()))
}

async fn update_quantity(
    State(state): State<Arc<AppState>>,
    CustomerId(user_id): CustomerId,
    Path(food_id): Path<String>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<Json<Cart>, AppError> {
    if payload.quantity == 0 {
        return Err(AppError::Validation("quantity must be at least 1".to_string()));
    }

    let mut cart = state
        .store
        .carts
        .get_mut(&user_id)
        .ok_or_else(|| item_not_found(&food_id))?;
    if !cart.set_quantity(&food_id, payload.quantity)? {
        return Err(item_not_found(&food_id));
    }
    Ok(Json(cart.clone()))
}

async fn remove_item(
    State(state): State<Arc<AppState>>,
    CustomerId(user_id): CustomerId,
    Path(food_id): Path<String>,
) -> Result<Json<Cart>, AppError> {
    let mut cart = state
        .store
        .carts
        .get_mut(&user_id)
        .ok_or_else(|| item_not_found(&food_id))?;
    if !cart.remove(&food_id)? {
        return Err(item_not_found(&food_id));
    }
    Ok(Json(cart.clone()))
}

async fn clear_cart(State(state): State<Arc<AppState>>, CustomerId(user_id): CustomerId) -> Json<Cart> {
    state.store.carts.remove(&user_id);
    Json(Cart::default())
}

fn item_not_found(food_id: &str) -> AppError {
    AppError::NotFound(format!("item {food_id} is not in the cart"))
}
