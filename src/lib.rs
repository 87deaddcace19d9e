pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod ports;
pub mod providers;
pub mod services;
pub mod startup;

use axum::{
    routing::{delete, get, post},
    Router,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

use crate::domain::MetalType;
use crate::health::DependencyChecker;
use crate::services::{AlertService, OrderService, PriceAnalytics, PriceBook};

#[derive(Clone)]
pub struct AppState {
    pub prices: PriceBook,
    pub analytics: PriceAnalytics,
    pub orders: Arc<OrderService>,
    pub alerts: Arc<AlertService>,
    pub webhook_secret: String,
    pub refresh_limiter: Arc<DefaultKeyedRateLimiter<MetalType>>,
    pub health_checkers: Arc<Vec<Arc<dyn DependencyChecker>>>,
    pub start_time: Instant,
}

/// Per-metal throttle for the force-refresh endpoint.
pub fn refresh_limiter(per_minute: u32) -> Arc<DefaultKeyedRateLimiter<MetalType>> {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)))
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/prices/:metal", get(handlers::prices::current_price))
        .route("/prices/:metal/history", get(handlers::prices::history))
        .route("/prices/:metal/chart", get(handlers::prices::chart))
        .route("/prices/:metal/stats", get(handlers::prices::stats))
        .route("/prices/:metal/compare", get(handlers::prices::compare))
        .route("/prices/:metal/refresh", post(handlers::prices::refresh))
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/buy", post(handlers::orders::buy))
        .route("/orders/sell", post(handlers::orders::sell))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/verify", post(handlers::orders::verify))
        .route("/orders/:id/cancel", post(handlers::orders::cancel))
        .route("/wallet", get(handlers::orders::wallet))
        .route("/transactions", get(handlers::orders::transactions))
        .route(
            "/alerts",
            post(handlers::alerts::create_alert).get(handlers::alerts::list_alerts),
        )
        .route("/alerts/:id", delete(handlers::alerts::cancel_alert))
        .route("/webhooks/payment", post(handlers::webhook::payment_webhook))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
