use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::MetalType;

/// Balances embedded in the user aggregate. Only settlements change them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub user_id: String,
    pub wallet_balance: BigDecimal,
    pub gold_balance: BigDecimal,
    pub silver_balance: BigDecimal,
}

impl WalletBalance {
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            wallet_balance: BigDecimal::from(0),
            gold_balance: BigDecimal::from(0),
            silver_balance: BigDecimal::from(0),
        }
    }

    pub fn metal(&self, metal: MetalType) -> &BigDecimal {
        match metal {
            MetalType::Gold => &self.gold_balance,
            MetalType::Silver => &self.silver_balance,
        }
    }

    pub(crate) fn metal_mut(&mut self, metal: MetalType) -> &mut BigDecimal {
        match metal {
            MetalType::Gold => &mut self.gold_balance,
            MetalType::Silver => &mut self.silver_balance,
        }
    }
}
