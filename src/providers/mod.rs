//! Clients for the external collaborators: market-data APIs, FX rates,
//! the payment provider and the push-notification gateway.

pub mod fx;
pub mod gold_api;
pub mod http;
pub mod metals_live;
pub mod notification;
pub mod payment;
pub mod rates_api;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{MetalType, SpotQuote};

pub use fx::OpenExchangeRatesClient;
pub use gold_api::GoldApiProvider;
pub use http::GuardedClient;
pub use metals_live::MetalsLiveProvider;
pub use notification::{LogNotifier, Notifier, PushGatewayNotifier};
pub use payment::{
    sign_payload, verify_webhook_signature, PaymentGateway, PaymentOrderRequest, PaymentSession, PaymentState,
    PaymentStatus, RazorpayClient,
};
pub use rates_api::RatesApiProvider;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{provider} returned status {status}")]
    Status { provider: String, status: u16 },

    #[error("Malformed payload from {provider}: {message}")]
    Malformed { provider: String, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl ProviderError {
    pub fn malformed(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::Malformed {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// A market-data source quoting USD per troy ounce.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_spot_price(&self, metal: MetalType) -> Result<SpotQuote, ProviderError>;
}

#[async_trait]
pub trait FxRateProvider: Send + Sync {
    /// Units of `quote` per one unit of `base`.
    async fn fetch_rate(&self, base: &str, quote: &str) -> Result<f64, ProviderError>;
}
