use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use super::{parse_metal, Pagination, UserId};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub metal_type: String,
    /// Local currency to spend.
    pub amount: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct SellRequest {
    pub metal_type: String,
    /// Grams to sell.
    pub quantity: BigDecimal,
}

pub async fn buy(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<BuyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let metal = parse_metal(&request.metal_type)?;
    let checkout = state.orders.initiate_buy(&user_id, request.amount, metal).await?;
    Ok((StatusCode::CREATED, Json(checkout)))
}

pub async fn sell(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<SellRequest>,
) -> Result<impl IntoResponse, AppError> {
    let metal = parse_metal(&request.metal_type)?;
    let order = state.orders.initiate_sell(&user_id, request.quantity, metal).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn verify(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.orders.verify_order(&user_id, id).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.orders.cancel_order(&user_id, id).await?))
}

pub async fn list_orders(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let orders = state
        .orders
        .get_user_orders(&user_id, pagination.limit(), pagination.offset())
        .await?;
    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.orders.get_order_by_id(&user_id, id).await?))
}

pub async fn wallet(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.orders.wallet_summary(&user_id).await?))
}

pub async fn transactions(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let entries = state
        .orders
        .get_user_transactions(&user_id, pagination.limit(), pagination.offset())
        .await?;
    Ok(Json(entries))
}
