use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, Utc, Weekday};
use dotenvy::dotenv;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::MetalType;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub pricing: PricingConfig,
    pub trading_hours: TradingHours,
    pub providers: ProviderConfig,
    pub payment: PaymentConfig,
    pub notifications: NotificationConfig,
    pub min_buy_amount: BigDecimal,
    pub refresh_per_minute: u32,
    pub retention_cron: String,
}

/// Per-metal price policy, in local currency per gram.
#[derive(Debug, Clone, PartialEq)]
pub struct MetalSettings {
    pub min_price: f64,
    pub max_price: f64,
    /// Safe constant used for out-of-bounds quotes and as the last-resort default.
    pub fallback_buy: f64,
    pub fallback_sell: f64,
    /// Maximum relative move of a synthetic price, in percent.
    pub perturbation_percent: f64,
    /// Decimal places prices are stored at.
    pub decimals: u32,
}

impl MetalSettings {
    pub fn defaults(metal: MetalType) -> Self {
        match metal {
            MetalType::Gold => Self {
                min_price: 3000.0,
                max_price: 15000.0,
                fallback_buy: 7000.0,
                fallback_sell: 6800.0,
                perturbation_percent: 0.5,
                decimals: 0,
            },
            MetalType::Silver => Self {
                min_price: 40.0,
                max_price: 250.0,
                fallback_buy: 92.0,
                fallback_sell: 88.0,
                perturbation_percent: 1.0,
                decimals: 2,
            },
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        price.is_finite() && price >= self.min_price && price <= self.max_price
    }

    pub fn validate(&self, metal: MetalType) -> anyhow::Result<()> {
        if !(self.min_price > 0.0 && self.min_price < self.max_price) {
            anyhow::bail!(
                "{} bounds must satisfy 0 < min < max (got [{}, {}])",
                metal,
                self.min_price,
                self.max_price
            );
        }
        if !(self.fallback_buy > self.fallback_sell && self.fallback_sell > 0.0) {
            anyhow::bail!("{} fallback prices must satisfy buy > sell > 0", metal);
        }
        if !self.contains(self.fallback_buy) || !self.contains(self.fallback_sell) {
            anyhow::bail!("{} fallback prices must lie inside the bounds", metal);
        }
        if !(0.0..50.0).contains(&self.perturbation_percent) {
            anyhow::bail!("{} perturbation must be in [0, 50) percent", metal);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub currency: String,
    /// Minimum time between two external fetches for one metal.
    pub update_interval: Duration,
    pub spread_percent: f64,
    pub retention_days: i64,
    pub fx_default_rate: f64,
    pub fx_max_age: Duration,
    pub provider_timeout: Duration,
    pub gold: MetalSettings,
    pub silver: MetalSettings,
}

impl PricingConfig {
    pub fn metal(&self, metal: MetalType) -> &MetalSettings {
        match metal {
            MetalType::Gold => &self.gold,
            MetalType::Silver => &self.silver,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.spread_percent > 0.0 && self.spread_percent < 50.0) {
            anyhow::bail!("PRICE_SPREAD_PERCENT must be in (0, 50)");
        }
        if !(self.fx_default_rate.is_finite() && self.fx_default_rate > 0.0) {
            anyhow::bail!("FX_DEFAULT_RATE must be positive");
        }
        if self.retention_days <= 0 {
            anyhow::bail!("PRICE_RETENTION_DAYS must be positive");
        }
        for metal in MetalType::ALL {
            self.metal(metal).validate(metal)?;
        }
        Ok(())
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            update_interval: Duration::from_secs(60),
            spread_percent: 2.5,
            retention_days: 30,
            fx_default_rate: 83.0,
            fx_max_age: Duration::from_secs(3600),
            provider_timeout: Duration::from_secs(10),
            gold: MetalSettings::defaults(MetalType::Gold),
            silver: MetalSettings::defaults(MetalType::Silver),
        }
    }
}

/// Market session in a fixed UTC offset, e.g. Mon-Fri 09:00-23:30 at +05:30.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingHours {
    pub days: Vec<Weekday>,
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub offset: FixedOffset,
}

impl TradingHours {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.offset);
        if !self.days.contains(&local.weekday()) {
            return false;
        }
        let time = local.time();
        if self.open == self.close {
            // Full-day session.
            true
        } else if self.open < self.close {
            time >= self.open && time < self.close
        } else {
            // Session crosses midnight.
            time >= self.open || time < self.close
        }
    }

    /// Open around the clock every day.
    pub fn always() -> Self {
        Self {
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
            open: NaiveTime::MIN,
            close: NaiveTime::MIN,
            offset: utc_offset(),
        }
    }
}

impl Default for TradingHours {
    fn default() -> Self {
        Self {
            days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(23, 30, 0).unwrap_or(NaiveTime::MIN),
            offset: FixedOffset::east_opt(330 * 60).unwrap_or_else(utc_offset),
        }
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub goldapi_url: String,
    pub goldapi_key: Option<String>,
    pub metals_api_url: String,
    pub metals_api_key: Option<String>,
    pub metalprice_api_url: String,
    pub metalprice_api_key: Option<String>,
    pub metals_live_url: Option<String>,
    pub fx_api_url: String,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub api_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub push_gateway_url: Option<String>,
    pub push_gateway_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let defaults = PricingConfig::default();
        let pricing = PricingConfig {
            currency: env_or("PRICE_CURRENCY", defaults.currency.clone())?,
            update_interval: Duration::from_secs(env_or("PRICE_UPDATE_INTERVAL_SECS", 60u64)?),
            spread_percent: env_or("PRICE_SPREAD_PERCENT", defaults.spread_percent)?,
            retention_days: env_or("PRICE_RETENTION_DAYS", defaults.retention_days)?,
            fx_default_rate: env_or("FX_DEFAULT_RATE", defaults.fx_default_rate)?,
            fx_max_age: defaults.fx_max_age,
            provider_timeout: Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 10u64)?),
            gold: metal_from_env(MetalType::Gold)?,
            silver: metal_from_env(MetalType::Silver)?,
        };

        let trading_defaults = TradingHours::default();
        let offset_minutes: i32 = env_or("TRADING_UTC_OFFSET_MINUTES", 330)?;
        let trading_hours = TradingHours {
            days: match env::var("TRADING_DAYS") {
                Ok(raw) => parse_days(&raw)?,
                Err(_) => trading_defaults.days,
            },
            open: env_or("TRADING_OPEN", trading_defaults.open)?,
            close: env_or("TRADING_CLOSE", trading_defaults.close)?,
            offset: FixedOffset::east_opt(offset_minutes * 60)
                .ok_or_else(|| anyhow::anyhow!("TRADING_UTC_OFFSET_MINUTES out of range"))?,
        };

        let providers = ProviderConfig {
            goldapi_url: env_or("GOLDAPI_URL", "https://www.goldapi.io".to_string())?,
            goldapi_key: non_empty("GOLDAPI_KEY"),
            metals_api_url: env_or("METALS_API_URL", "https://metals-api.com/api".to_string())?,
            metals_api_key: non_empty("METALS_API_KEY"),
            metalprice_api_url: env_or(
                "METALPRICE_API_URL",
                "https://api.metalpriceapi.com/v1".to_string(),
            )?,
            metalprice_api_key: non_empty("METALPRICE_API_KEY"),
            metals_live_url: non_empty("METALS_LIVE_URL"),
            fx_api_url: env_or("FX_API_URL", "https://open.er-api.com".to_string())?,
        };

        let payment = PaymentConfig {
            api_url: env_or("RAZORPAY_API_URL", "https://api.razorpay.com".to_string())?,
            key_id: env::var("RAZORPAY_KEY_ID")?,
            key_secret: env::var("RAZORPAY_KEY_SECRET")?,
            webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET")?,
        };

        let config = Config {
            server_port: env_or("SERVER_PORT", 3000u16)?,
            database_url: env::var("DATABASE_URL")?,
            pricing,
            trading_hours,
            providers,
            payment,
            notifications: NotificationConfig {
                push_gateway_url: non_empty("PUSH_GATEWAY_URL"),
                push_gateway_secret: non_empty("PUSH_GATEWAY_SECRET"),
            },
            min_buy_amount: env_or("MIN_BUY_AMOUNT", BigDecimal::from(10))?,
            refresh_per_minute: env_or("REFRESH_PER_MINUTE", 6u32)?,
            retention_cron: env_or("RETENTION_CRON", "0 0 3 * * * *".to_string())?,
        };

        config.pricing.validate()?;
        Ok(config)
    }
}

fn metal_from_env(metal: MetalType) -> anyhow::Result<MetalSettings> {
    let prefix = metal.as_str().to_ascii_uppercase();
    let d = MetalSettings::defaults(metal);
    Ok(MetalSettings {
        min_price: env_or(&format!("{}_MIN_PRICE", prefix), d.min_price)?,
        max_price: env_or(&format!("{}_MAX_PRICE", prefix), d.max_price)?,
        fallback_buy: env_or(&format!("{}_FALLBACK_BUY", prefix), d.fallback_buy)?,
        fallback_sell: env_or(&format!("{}_FALLBACK_SELL", prefix), d.fallback_sell)?,
        perturbation_percent: env_or(&format!("{}_PERTURBATION_PERCENT", prefix), d.perturbation_percent)?,
        decimals: env_or(&format!("{}_DECIMALS", prefix), d.decimals)?,
    })
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}: {}", key, e)),
        _ => Ok(default),
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_days(raw: &str) -> anyhow::Result<Vec<Weekday>> {
    let days = raw
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            d.parse::<Weekday>()
                .map_err(|_| anyhow::anyhow!("invalid weekday '{}' in TRADING_DAYS", d))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if days.is_empty() {
        anyhow::bail!("TRADING_DAYS must list at least one weekday");
    }
    Ok(days)
}
