//! Request identity extractors.
//!
//! Credentials live outside this service: customers arrive with an `x-user-id`
//! header set by the gateway, riders with the bearer token handed out at
//! onboarding, operators with the shared `x-admin-token`.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

pub struct CustomerId(pub String);

pub struct RiderAuth(pub Uuid);

pub struct AdminAuth;

impl RiderAuth {
    /// Rejects requests that act on behalf of another rider.
    pub fn ensure(&self, rider_id: Uuid) -> Result<(), AppError> {
        if self.0 == rider_id {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "token does not belong to rider {rider_id}"
            )))
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CustomerId {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        header(parts, USER_ID_HEADER)
            .map(|user_id| CustomerId(user_id.to_string()))
            .ok_or_else(|| AppError::Unauthorized(format!("missing {USER_ID_HEADER} header")))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RiderAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = header(parts, AUTHORIZATION.as_str())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| AppError::Unauthorized("missing rider bearer token".to_string()))?;

        state
            .store
            .rider_for_token(token)
            .map(RiderAuth)
            .ok_or_else(|| AppError::Unauthorized("unknown rider token".to_string()))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_token.as_deref() else {
            return Err(AppError::Unauthorized("admin routes are disabled".to_string()));
        };

        match header(parts, ADMIN_TOKEN_HEADER) {
            Some(token) if token == expected => Ok(AdminAuth),
            _ => Err(AppError::Unauthorized("invalid admin token".to_string())),
        }
    }
}
