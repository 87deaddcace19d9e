use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MetalType;

/// Source tag for observations produced by the synthetic generator.
pub const SOURCE_SYNTHETIC: &str = "synthetic";
/// Source tag for the configured per-metal default price.
pub const SOURCE_DEFAULT: &str = "default";
/// Source tag for a provider price replaced because it fell outside the bounds.
pub const SOURCE_FALLBACK: &str = "fallback";

/// One immutable point of the price series, in local currency per gram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub id: Uuid,
    pub metal_type: MetalType,
    pub buy_price: f64,
    pub sell_price: f64,
    pub currency: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl PriceObservation {
    pub fn new(
        metal_type: MetalType,
        buy_price: f64,
        sell_price: f64,
        currency: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            metal_type,
            buy_price,
            sell_price,
            currency: currency.into(),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn mid_price(&self) -> f64 {
        (self.buy_price + self.sell_price) / 2.0
    }
}

/// Which tier answered an effective-price lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    Memory,
    Store,
    Default,
}

/// The price used for display and order pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePrice {
    pub metal_type: MetalType,
    pub buy_price: f64,
    pub sell_price: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub tier: PriceTier,
}

impl EffectivePrice {
    pub fn from_observation(obs: &PriceObservation, tier: PriceTier) -> Self {
        Self {
            metal_type: obs.metal_type,
            buy_price: obs.buy_price,
            sell_price: obs.sell_price,
            currency: obs.currency.clone(),
            timestamp: obs.timestamp,
            source: obs.source.clone(),
            tier,
        }
    }
}

/// Quote returned by an external provider, USD per troy ounce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotQuote {
    pub buy_usd: f64,
    pub sell_usd: f64,
}

impl SpotQuote {
    pub fn single(price_usd: f64) -> Self {
        Self {
            buy_usd: price_usd,
            sell_usd: price_usd,
        }
    }

    pub fn mid_usd(&self) -> f64 {
        (self.buy_usd + self.sell_usd) / 2.0
    }

    pub fn is_well_formed(&self) -> bool {
        self.buy_usd.is_finite()
            && self.sell_usd.is_finite()
            && self.buy_usd > 0.0
            && self.sell_usd > 0.0
    }
}

/// Round to `decimals` places, the granularity prices are stored at.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Buy and sell around `mid`, rounded, at least one minor unit apart.
pub fn spread_pair(mid: f64, spread: f64, decimals: u32) -> (f64, f64) {
    let buy = round_to(mid * (1.0 + spread), decimals);
    let sell = round_to(mid * (1.0 - spread), decimals);
    if buy > sell {
        return (buy, sell);
    }
    let tick = 10f64.powi(-(decimals as i32));
    (round_to(sell + tick, decimals), sell)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spread_pair_keeps_one_tick_apart() {
        assert_eq!(spread_pair(5337.0, 0.025, 0), (5470.0, 5204.0));
        assert_eq!(spread_pair(5337.0, 0.000001, 0), (5338.0, 5337.0));
        assert_eq!(spread_pair(91.5, 0.0, 2), (91.51, 91.5));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(5470.449, 0), 5470.0);
        assert_eq!(round_to(91.236, 2), 91.24);
    }

    #[test]
    fn test_malformed_quotes_are_rejected() {
        assert!(SpotQuote::single(2000.0).is_well_formed());
        assert!(!SpotQuote::single(0.0).is_well_formed());
        assert!(!SpotQuote::single(f64::NAN).is_well_formed());
        assert!(!SpotQuote { buy_usd: 10.0, sell_usd: -1.0 }.is_well_formed());
    }
}
