use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use super::{GuardedClient, PriceProvider, ProviderError};
use crate::domain::{MetalType, SpotQuote};

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

fn default_success() -> bool {
    true
}

/// Generic USD-based rates API (metals-api / metalpriceapi style):
/// `GET /latest?{key_param}=..&base=USD&{symbols_param}=XAU`.
///
/// The response carries either `USDXAU` (USD per ounce) or `XAU` (ounces per USD).
pub struct RatesApiProvider {
    http: GuardedClient,
    base_url: String,
    api_key: String,
    key_param: String,
    symbols_param: String,
}

impl RatesApiProvider {
    pub fn new(
        http: GuardedClient,
        base_url: String,
        api_key: String,
        key_param: impl Into<String>,
        symbols_param: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            key_param: key_param.into(),
            symbols_param: symbols_param.into(),
        }
    }
}

fn price_from_rates(rates: &HashMap<String, f64>, symbol: &str) -> Option<f64> {
    if let Some(direct) = rates.get(&format!("USD{}", symbol)) {
        return Some(*direct);
    }
    rates
        .get(symbol)
        .filter(|rate| **rate > 0.0)
        .map(|rate| 1.0 / rate)
}

#[async_trait]
impl PriceProvider for RatesApiProvider {
    fn name(&self) -> &str {
        self.http.name()
    }

    async fn fetch_spot_price(&self, metal: MetalType) -> Result<SpotQuote, ProviderError> {
        let url = format!("{}/latest", self.base_url);
        let request = self.http.client().get(&url).query(&[
            (self.key_param.as_str(), self.api_key.as_str()),
            ("base", "USD"),
            (self.symbols_param.as_str(), metal.symbol()),
        ]);

        let body: RatesResponse = self.http.send_json(request).await?;
        if !body.success {
            return Err(ProviderError::malformed(self.name(), "success=false"));
        }

        let price = price_from_rates(&body.rates, metal.symbol())
            .ok_or_else(|| ProviderError::malformed(self.name(), format!("no rate for {}", metal.symbol())))?;
        let quote = SpotQuote::single(price);
        if !quote.is_well_formed() {
            return Err(ProviderError::malformed(self.name(), format!("unusable price {}", price)));
        }
        Ok(quote)
    }
}
