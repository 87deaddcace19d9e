//! Price alerts.
//!
//! Targets are buy-side. The condition is derived from the buy price at
//! creation and every later check compares the freshly observed buy price.
//! Sell prices are never compared.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::MetalType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    Above,
    Below,
}

impl AlertCondition {
    /// Direction is fixed by where the target sits relative to the price at creation.
    pub fn derive(target_price: f64, current_price: f64) -> Self {
        if target_price >= current_price {
            AlertCondition::Above
        } else {
            AlertCondition::Below
        }
    }

    /// `price` is the observed buy price.
    pub fn is_met(&self, price: f64, target_price: f64) -> bool {
        match self {
            AlertCondition::Above => price >= target_price,
            AlertCondition::Below => price <= target_price,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCondition::Above => "above",
            AlertCondition::Below => "below",
        }
    }
}

impl FromStr for AlertCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "above" => Ok(AlertCondition::Above),
            "below" => Ok(AlertCondition::Below),
            other => Err(format!("unknown alert condition '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertFrequency {
    Once,
    Recurring,
}

impl AlertFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertFrequency::Once => "once",
            AlertFrequency::Recurring => "recurring",
        }
    }
}

impl FromStr for AlertFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(AlertFrequency::Once),
            "recurring" => Ok(AlertFrequency::Recurring),
            other => Err(format!("unknown alert frequency '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Triggered,
    Cancelled,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Triggered => "triggered",
            AlertStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "triggered" => Ok(AlertStatus::Triggered),
            "cancelled" => Ok(AlertStatus::Cancelled),
            other => Err(format!("unknown alert status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: Uuid,
    pub user_id: String,
    pub metal_type: MetalType,
    pub target_price: f64,
    pub condition: AlertCondition,
    pub frequency: AlertFrequency,
    pub status: AlertStatus,
    pub triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PriceAlert {
    pub fn new(
        user_id: String,
        metal_type: MetalType,
        target_price: f64,
        current_price: f64,
        frequency: AlertFrequency,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            metal_type,
            target_price,
            condition: AlertCondition::derive(target_price, current_price),
            frequency,
            status: AlertStatus::Active,
            triggered_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether a notification is due for `price` observed at `now`.
    pub fn should_fire(&self, price: f64, now: DateTime<Utc>, cooldown: Duration) -> bool {
        if self.status != AlertStatus::Active || !self.condition.is_met(price, self.target_price) {
            return false;
        }
        match (self.frequency, self.triggered_at) {
            (AlertFrequency::Recurring, Some(last)) => now - last >= cooldown,
            _ => true,
        }
    }

    pub fn record_trigger(&mut self, now: DateTime<Utc>) {
        self.triggered_at = Some(now);
        if self.frequency == AlertFrequency::Once {
            self.status = AlertStatus::Triggered;
        }
    }
}
