use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::providers::FxRateProvider;

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: f64,
    fetched_at: Instant,
}

/// USD to local-currency rate shared by all metals. Refetched at most once per
/// `max_age`; a failed fetch keeps the last known rate, or the configured
/// default when nothing was ever fetched. Never returns an error.
pub struct FxRateCache {
    provider: Arc<dyn FxRateProvider>,
    base: String,
    quote: String,
    max_age: Duration,
    default_rate: f64,
    cached: Mutex<Option<CachedRate>>,
}

impl FxRateCache {
    pub fn new(
        provider: Arc<dyn FxRateProvider>,
        quote: impl Into<String>,
        max_age: Duration,
        default_rate: f64,
    ) -> Self {
        Self {
            provider,
            base: "USD".to_string(),
            quote: quote.into(),
            max_age,
            default_rate,
            cached: Mutex::new(None),
        }
    }

    pub async fn rate(&self) -> f64 {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = *cached {
            if entry.fetched_at.elapsed() < self.max_age {
                return entry.rate;
            }
        }

        match self.provider.fetch_rate(&self.base, &self.quote).await {
            Ok(rate) if rate.is_finite() && rate > 0.0 => {
                tracing::debug!(base = %self.base, quote = %self.quote, rate, "FX rate refreshed");
                *cached = Some(CachedRate {
                    rate,
                    fetched_at: Instant::now(),
                });
                rate
            }
            outcome => {
                let fallback = cached.map(|c| c.rate).unwrap_or(self.default_rate);
                match outcome {
                    Err(e) => tracing::warn!(error = %e, fallback, "FX fetch failed, keeping last known rate"),
                    Ok(bad) => tracing::warn!(rate = bad, fallback, "FX provider returned an unusable rate"),
                }
                fallback
            }
        }
    }

    /// Last fetched rate without triggering a refresh.
    pub async fn last_known(&self) -> Option<f64> {
        self.cached.lock().await.map(|c| c.rate)
    }
}
