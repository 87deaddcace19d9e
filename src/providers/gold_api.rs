use async_trait::async_trait;
use serde::Deserialize;

use super::{GuardedClient, PriceProvider, ProviderError};
use crate::domain::{MetalType, SpotQuote};

#[derive(Debug, Deserialize)]
struct GoldApiQuote {
    price: f64,
    ask: Option<f64>,
    bid: Option<f64>,
}

/// Specialised precious-metals API (goldapi.io style): `GET /api/{XAU}/USD`.
pub struct GoldApiProvider {
    http: GuardedClient,
    base_url: String,
    api_key: String,
}

impl GoldApiProvider {
    pub fn new(http: GuardedClient, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl PriceProvider for GoldApiProvider {
    fn name(&self) -> &str {
        self.http.name()
    }

    async fn fetch_spot_price(&self, metal: MetalType) -> Result<SpotQuote, ProviderError> {
        let url = format!("{}/api/{}/USD", self.base_url, metal.symbol());
        let request = self
            .http
            .client()
            .get(&url)
            .header("x-access-token", &self.api_key);

        let body: GoldApiQuote = self.http.send_json(request).await?;
        let quote = SpotQuote {
            buy_usd: body.ask.unwrap_or(body.price),
            sell_usd: body.bid.unwrap_or(body.price),
        };

        if !quote.is_well_formed() {
            return Err(ProviderError::malformed(self.name(), format!("unusable quote {:?}", quote)));
        }
        Ok(quote)
    }
}
