use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::parse_metal;
use crate::error::AppError;
use crate::services::Period;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

impl PeriodQuery {
    fn period(&self) -> Result<Period, AppError> {
        match self.period.as_deref() {
            Some(raw) => raw.parse().map_err(AppError::BadRequest),
            None => Ok(Period::default()),
        }
    }
}

pub async fn current_price(
    State(state): State<AppState>,
    Path(metal): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let metal = parse_metal(&metal)?;
    Ok(Json(state.prices.engine(metal).effective_price().await))
}

pub async fn history(
    State(state): State<AppState>,
    Path(metal): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<impl IntoResponse, AppError> {
    let metal = parse_metal(&metal)?;
    let period = query.period()?;
    let points = state.analytics.history(metal, period).await?;

    Ok(Json(json!({
        "metal_type": metal,
        "period": period,
        "interval_seconds": period.sampling_interval().num_seconds(),
        "points": points,
    })))
}

pub async fn chart(
    State(state): State<AppState>,
    Path(metal): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<impl IntoResponse, AppError> {
    let metal = parse_metal(&metal)?;
    let period = query.period()?;
    let points = state.analytics.chart(metal, period).await?;

    Ok(Json(json!({
        "metal_type": metal,
        "period": period,
        "points": points,
    })))
}

pub async fn stats(
    State(state): State<AppState>,
    Path(metal): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<impl IntoResponse, AppError> {
    let metal = parse_metal(&metal)?;
    Ok(Json(state.analytics.stats(metal, query.period()?).await?))
}

pub async fn compare(
    State(state): State<AppState>,
    Path(metal): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let metal = parse_metal(&metal)?;
    Ok(Json(json!({
        "metal_type": metal,
        "periods": state.analytics.compare(metal).await?,
    })))
}

/// Forces a provider fetch, throttled per metal.
pub async fn refresh(
    State(state): State<AppState>,
    Path(metal): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let metal = parse_metal(&metal)?;
    if state.refresh_limiter.check_key(&metal).is_err() {
        return Err(AppError::TooManyRequests(format!("{} was refreshed too recently", metal)));
    }

    let update = state.prices.engine(metal).force_refresh().await;
    if update.is_market_data() {
        let observation = &update.observation;
        if let Err(e) = state
            .alerts
            .evaluate(metal, observation.buy_price, observation.timestamp)
            .await
        {
            tracing::error!(metal = %metal, error = %e, "Alert evaluation failed after refresh");
        }
    }

    Ok(Json(update))
}
