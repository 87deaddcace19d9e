use async_trait::async_trait;
use serde_json::Value;

use super::{GuardedClient, PriceProvider, ProviderError};
use crate::domain::{MetalType, SpotQuote};

/// Free keyless spot API (metals.live style): `GET /v1/spot/{metal}` returning
/// a list of samples like `[{"gold": 2000.5}]` or `[{"price": 2000.5}]`. The last sample wins.
pub struct MetalsLiveProvider {
    http: GuardedClient,
    base_url: String,
}

impl MetalsLiveProvider {
    pub fn new(http: GuardedClient, base_url: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn latest_sample(samples: &[Value], metal: MetalType) -> Option<f64> {
    samples.iter().rev().find_map(|sample| {
        sample
            .get(metal.as_str())
            .or_else(|| sample.get("price"))
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
    })
}

#[async_trait]
impl PriceProvider for MetalsLiveProvider {
    fn name(&self) -> &str {
        self.http.name()
    }

    async fn fetch_spot_price(&self, metal: MetalType) -> Result<SpotQuote, ProviderError> {
        let url = format!("{}/v1/spot/{}", self.base_url, metal.as_str());
        let samples: Vec<Value> = self.http.send_json(self.http.client().get(&url)).await?;

        let price = latest_sample(&samples, metal)
            .ok_or_else(|| ProviderError::malformed(self.name(), "no usable sample"))?;
        let quote = SpotQuote::single(price);
        if !quote.is_well_formed() {
            return Err(ProviderError::malformed(self.name(), format!("unusable price {}", price)));
        }
        Ok(quote)
    }
}
