pub mod alerts;
pub mod orders;
pub mod prices;
pub mod webhook;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::domain::MetalType;
use crate::error::AppError;
use crate::health::check_health;
use crate::AppState;

/// Header set by the upstream authentication layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing X-User-Id header".to_string()))?;

        Ok(UserId(user.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

pub(crate) fn parse_metal(raw: &str) -> Result<MetalType, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = check_health(&state.health_checkers, state.start_time).await;
    let status_code = if response.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}
