//! Order entity and its status state machine.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::MetalType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            other => Err(format!("unknown order side '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PaymentPending,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// A failed buy is not terminal: a later capture on the same provider order settles it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Forward-only transitions. Sells skip the payment leg.
    pub fn can_transition_to(&self, side: OrderSide, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (side, self, next) {
            (OrderSide::Buy, Pending, PaymentPending) => true,
            (OrderSide::Buy, Pending, Failed | Cancelled) => true,
            (OrderSide::Buy, PaymentPending, Completed | Failed | Cancelled) => true,
            // The provider keeps the order open after a failed attempt; a retry can still capture.
            (OrderSide::Buy, Failed, Completed) => true,
            (OrderSide::Sell, Pending, Completed | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "payment_pending" => Ok(OrderStatus::PaymentPending),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

/// A buy or sell of metal at a price locked when the order was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub side: OrderSide,
    pub metal_type: MetalType,
    pub amount_in_currency: BigDecimal,
    pub quantity: BigDecimal,
    pub price_per_unit: BigDecimal,
    pub status: OrderStatus,
    pub provider_order_ref: Option<String>,
    pub provider_payment_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(
        user_id: String,
        side: OrderSide,
        metal_type: MetalType,
        amount_in_currency: BigDecimal,
        quantity: BigDecimal,
        price_per_unit: BigDecimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            side,
            metal_type,
            amount_in_currency,
            quantity,
            price_per_unit,
            status: OrderStatus::Pending,
            provider_order_ref: None,
            provider_payment_ref: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move to `next`, refusing backward or skipped transitions.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), String> {
        if !self.status.can_transition_to(self.side, next) {
            return Err(format!(
                "order {} cannot move from {} to {}",
                self.id, self.status, next
            ));
        }
        self.status = next;
        if next == OrderStatus::Completed {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}
