use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MetalType, Order, OrderSide};

/// Append-only record of a settled order. Exactly one per completed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: String,
    pub amount: BigDecimal,
    pub quantity: BigDecimal,
    pub metal_type: MetalType,
    pub kind: OrderSide,
    pub status: String,
    pub reference_order_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn for_order(order: &Order) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: order.user_id.clone(),
            amount: order.amount_in_currency.clone(),
            quantity: order.quantity.clone(),
            metal_type: order.metal_type,
            kind: order.side,
            status: "completed".to_string(),
            reference_order_id: order.id,
            created_at: order.completed_at.unwrap_or_else(Utc::now),
        }
    }
}
