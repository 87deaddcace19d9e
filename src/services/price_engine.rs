//! Price acquisition for one metal.
//!
//! Each [`PriceEngine`] owns the feed of a single metal: the provider fallback
//! chain, the rate-limit clock, the synthetic generator of last resort and the
//! in-memory effective price. Updates for one metal are serialized by an async
//! mutex; reads of the effective price never wait on it.

use arc_swap::ArcSwapOption;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::{MetalSettings, PricingConfig};
use crate::domain::{
    spread_pair, EffectivePrice, MetalType, PriceObservation, PriceTier, SpotQuote, GRAMS_PER_TROY_OUNCE,
    SOURCE_DEFAULT, SOURCE_FALLBACK, SOURCE_SYNTHETIC,
};
use crate::ports::{PriceRepository, RepositoryResult};
use crate::providers::PriceProvider;
use crate::services::fx_cache::FxRateCache;

/// How an update cycle produced its observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Inside the rate-limit interval; the latest stored observation was returned.
    Cached,
    /// A provider answered with an in-bounds price.
    Fetched { provider: String },
    /// A provider answered but the converted price was out of bounds.
    Substituted { provider: String },
    /// Every provider failed.
    Synthetic,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceUpdate {
    pub observation: PriceObservation,
    pub outcome: UpdateOutcome,
}

impl PriceUpdate {
    /// True when the observation reflects a real market quote taken in this cycle.
    pub fn is_market_data(&self) -> bool {
        matches!(self.outcome, UpdateOutcome::Fetched { .. })
    }
}

#[derive(Debug, Default)]
struct UpdateState {
    last_api_call: Option<Instant>,
}

pub struct PriceEngine {
    metal: MetalType,
    settings: MetalSettings,
    currency: String,
    spread: f64,
    update_interval: Duration,
    provider_timeout: Duration,
    providers: Vec<Arc<dyn PriceProvider>>,
    fx: Arc<FxRateCache>,
    store: Arc<dyn PriceRepository>,
    memory: ArcSwapOption<PriceObservation>,
    update_lock: Mutex<UpdateState>,
}

impl PriceEngine {
    pub fn new(
        metal: MetalType,
        config: &PricingConfig,
        providers: Vec<Arc<dyn PriceProvider>>,
        fx: Arc<FxRateCache>,
        store: Arc<dyn PriceRepository>,
    ) -> Self {
        Self {
            metal,
            settings: config.metal(metal).clone(),
            currency: config.currency.clone(),
            spread: config.spread_percent / 100.0,
            update_interval: config.update_interval,
            provider_timeout: config.provider_timeout,
            providers,
            fx,
            store,
            memory: ArcSwapOption::empty(),
            update_lock: Mutex::new(UpdateState::default()),
        }
    }

    pub fn metal(&self) -> MetalType {
        self.metal
    }

    pub fn settings(&self) -> &MetalSettings {
        &self.settings
    }

    /// Price for display and order pricing. Never fails: memory, then the
    /// latest stored observation, then the configured default. The answering
    /// tier seeds memory.
    pub async fn effective_price(&self) -> EffectivePrice {
        if let Some(cached) = self.memory.load_full() {
            return EffectivePrice::from_observation(&cached, PriceTier::Memory);
        }

        match self.store.latest(self.metal).await {
            Ok(Some(stored)) => {
                self.remember(&stored);
                return EffectivePrice::from_observation(&stored, PriceTier::Store);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(metal = %self.metal, error = %e, "Could not read latest price"),
        }

        let default = self.default_observation(SOURCE_DEFAULT);
        self.remember(&default);
        EffectivePrice::from_observation(&default, PriceTier::Default)
    }

    /// Runs one acquisition cycle, waiting for any cycle already running for this metal.
    pub async fn update_price(&self) -> PriceUpdate {
        let mut state = self.update_lock.lock().await;
        self.run_update(&mut state).await
    }

    /// Ignores the rate-limit interval and queries providers now.
    pub async fn force_refresh(&self) -> PriceUpdate {
        let mut state = self.update_lock.lock().await;
        state.last_api_call = None;
        self.run_update(&mut state).await
    }

    /// Deletes this metal's observations older than `retention`.
    pub async fn cleanup(&self, retention: chrono::Duration) -> RepositoryResult<u64> {
        let cutoff = Utc::now() - retention;
        let deleted = self.store.delete_older_than(self.metal, cutoff).await?;
        tracing::info!(metal = %self.metal, deleted, %cutoff, "Price retention cleanup");
        Ok(deleted)
    }

    async fn run_update(&self, state: &mut UpdateState) -> PriceUpdate {
        if let Some(last) = state.last_api_call {
            if last.elapsed() < self.update_interval {
                match self.store.latest(self.metal).await {
                    Ok(Some(latest)) => {
                        tracing::debug!(metal = %self.metal, "Rate limited, serving stored price");
                        self.remember(&latest);
                        return PriceUpdate {
                            observation: latest,
                            outcome: UpdateOutcome::Cached,
                        };
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(metal = %self.metal, error = %e, "Could not read latest price"),
                }
            }
        }

        if let Some((provider, quote)) = self.fetch_from_providers().await {
            state.last_api_call = Some(Instant::now());
            let rate = self.fx.rate().await;
            let (observation, outcome) = self.price_from_quote(&provider, quote, rate);
            let observation = self.commit(observation).await;
            return PriceUpdate { observation, outcome };
        }

        let base = match self.memory.load_full() {
            Some(cached) => (*cached).clone(),
            None => match self.store.latest(self.metal).await {
                Ok(Some(stored)) => stored,
                _ => self.default_observation(SOURCE_DEFAULT),
            },
        };
        let observation = self.synthesize(&base, &mut rand::thread_rng());
        tracing::warn!(
            metal = %self.metal,
            buy = observation.buy_price,
            sell = observation.sell_price,
            "All providers failed, using synthetic price"
        );
        let observation = self.commit(observation).await;
        PriceUpdate {
            observation,
            outcome: UpdateOutcome::Synthetic,
        }
    }

    async fn fetch_from_providers(&self) -> Option<(String, SpotQuote)> {
        for provider in &self.providers {
            let name = provider.name().to_string();
            match tokio::time::timeout(self.provider_timeout, provider.fetch_spot_price(self.metal)).await {
                Ok(Ok(quote)) if quote.is_well_formed() => {
                    tracing::debug!(metal = %self.metal, provider = %name, usd = quote.mid_usd(), "Provider quote");
                    return Some((name, quote));
                }
                Ok(Ok(quote)) => {
                    tracing::warn!(metal = %self.metal, provider = %name, ?quote, "Provider returned unusable quote")
                }
                Ok(Err(e)) => tracing::warn!(metal = %self.metal, provider = %name, error = %e, "Provider failed"),
                Err(_) => tracing::warn!(
                    metal = %self.metal,
                    provider = %name,
                    timeout = ?self.provider_timeout,
                    "Provider timed out"
                ),
            }
        }
        None
    }

    /// USD/oz quote to local currency per gram, spread applied, bounds enforced.
    fn price_from_quote(&self, provider: &str, quote: SpotQuote, fx_rate: f64) -> (PriceObservation, UpdateOutcome) {
        let mid = quote.mid_usd() / GRAMS_PER_TROY_OUNCE * fx_rate;
        let (buy, sell) = spread_pair(mid, self.spread, self.settings.decimals);

        if self.settings.contains(buy) && self.settings.contains(sell) && buy > sell {
            let observation = PriceObservation::new(self.metal, buy, sell, self.currency.clone(), provider);
            return (
                observation,
                UpdateOutcome::Fetched {
                    provider: provider.to_string(),
                },
            );
        }

        tracing::warn!(
            metal = %self.metal,
            provider,
            buy,
            sell,
            min = self.settings.min_price,
            max = self.settings.max_price,
            "Price outside bounds, substituting fallback"
        );
        (
            self.default_observation(SOURCE_FALLBACK),
            UpdateOutcome::Substituted {
                provider: provider.to_string(),
            },
        )
    }

    /// Perturbs `base` by at most the metal's perturbation percent, keeps both
    /// sides inside the bounds and applies a spread between half and all of
    /// the configured one.
    fn synthesize<R: Rng>(&self, base: &PriceObservation, rng: &mut R) -> PriceObservation {
        let max_move = self.settings.perturbation_percent / 100.0;
        let delta = if max_move > 0.0 {
            rng.gen_range(-max_move..=max_move)
        } else {
            0.0
        };
        let spread = if self.spread > 0.0 {
            rng.gen_range(self.spread / 2.0..=self.spread)
        } else {
            0.0
        };

        let lowest_mid = self.settings.min_price / (1.0 - spread);
        let highest_mid = self.settings.max_price / (1.0 + spread);
        if lowest_mid > highest_mid {
            return self.default_observation(SOURCE_SYNTHETIC);
        }

        let mid = (base.mid_price() * (1.0 + delta)).clamp(lowest_mid, highest_mid);
        let (buy, sell) = spread_pair(mid, spread, self.settings.decimals);

        if self.settings.contains(buy) && self.settings.contains(sell) && buy > sell {
            PriceObservation::new(self.metal, buy, sell, self.currency.clone(), SOURCE_SYNTHETIC)
        } else {
            self.default_observation(SOURCE_SYNTHETIC)
        }
    }

    fn default_observation(&self, source: &str) -> PriceObservation {
        PriceObservation::new(
            self.metal,
            self.settings.fallback_buy,
            self.settings.fallback_sell,
            self.currency.clone(),
            source,
        )
    }

    /// Persists and caches. Timestamps never go backwards within a metal.
    async fn commit(&self, mut observation: PriceObservation) -> PriceObservation {
        if let Some(previous) = self.memory.load_full() {
            if observation.timestamp < previous.timestamp {
                observation.timestamp = previous.timestamp;
            }
        }

        match self.store.insert(&observation).await {
            Ok(saved) => observation = saved,
            Err(e) => tracing::error!(metal = %self.metal, error = %e, "Failed to persist price observation"),
        }
        self.remember(&observation);
        tracing::info!(
            metal = %self.metal,
            buy = observation.buy_price,
            sell = observation.sell_price,
            source = %observation.source,
            "Price updated"
        );
        observation
    }

    fn remember(&self, observation: &PriceObservation) {
        self.memory.store(Some(Arc::new(observation.clone())));
    }
}

/// One engine per metal, created at startup and shared.
#[derive(Clone)]
pub struct PriceBook {
    gold: Arc<PriceEngine>,
    silver: Arc<PriceEngine>,
}

impl PriceBook {
    pub fn new(gold: Arc<PriceEngine>, silver: Arc<PriceEngine>) -> Self {
        Self { gold, silver }
    }

    /// Builds both engines over the same providers, FX cache and store.
    pub fn build(
        config: &PricingConfig,
        providers: Vec<Arc<dyn PriceProvider>>,
        fx: Arc<FxRateCache>,
        store: Arc<dyn PriceRepository>,
    ) -> Self {
        let engine = |metal| {
            Arc::new(PriceEngine::new(
                metal,
                config,
                providers.clone(),
                fx.clone(),
                store.clone(),
            ))
        };
        Self::new(engine(MetalType::Gold), engine(MetalType::Silver))
    }

    pub fn engine(&self, metal: MetalType) -> &Arc<PriceEngine> {
        match metal {
            MetalType::Gold => &self.gold,
            MetalType::Silver => &self.silver,
        }
    }

    pub fn engines(&self) -> [&Arc<PriceEngine>; 2] {
        [&self.gold, &self.silver]
    }
}
