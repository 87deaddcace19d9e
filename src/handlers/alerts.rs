use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{parse_metal, UserId};
use crate::domain::AlertFrequency;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAlertRequest {
    pub metal_type: String,
    pub target_price: f64,
    #[serde(default = "default_frequency")]
    pub frequency: AlertFrequency,
}

fn default_frequency() -> AlertFrequency {
    AlertFrequency::Once
}

pub async fn create_alert(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CreateAlertRequest>,
) -> Result<impl IntoResponse, AppError> {
    let metal = parse_metal(&request.metal_type)?;
    let alert = state
        .alerts
        .create_alert(&user_id, metal, request.target_price, request.frequency)
        .await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

pub async fn list_alerts(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.alerts.list_alerts(&user_id).await?))
}

pub async fn cancel_alert(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.alerts.cancel_alert(&user_id, id).await?))
}
