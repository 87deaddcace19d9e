use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use super::{FxRateProvider, GuardedClient, ProviderError};

#[derive(Debug, Deserialize)]
struct LatestRates {
    result: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// open.er-api.com style client: `GET /v6/latest/{base}`.
pub struct OpenExchangeRatesClient {
    http: GuardedClient,
    base_url: String,
}

impl OpenExchangeRatesClient {
    pub fn new(http: GuardedClient, base_url: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FxRateProvider for OpenExchangeRatesClient {
    async fn fetch_rate(&self, base: &str, quote: &str) -> Result<f64, ProviderError> {
        let url = format!("{}/v6/latest/{}", self.base_url, base);
        let body: LatestRates = self.http.send_json(self.http.client().get(&url)).await?;

        if body.result.as_deref().is_some_and(|r| r != "success") {
            return Err(ProviderError::malformed(self.http.name(), "result was not success"));
        }

        match body.rates.get(quote) {
            Some(rate) if rate.is_finite() && *rate > 0.0 => Ok(*rate),
            _ => Err(ProviderError::malformed(
                self.http.name(),
                format!("no usable {}/{} rate", base, quote),
            )),
        }
    }
}
