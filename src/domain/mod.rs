//! Domain entities.
//! Framework-agnostic representation of prices, orders, ledger entries, alerts and wallets.

pub mod alert;
pub mod ledger;
pub mod metal;
pub mod order;
pub mod price;
pub mod wallet;

pub use alert::{AlertCondition, AlertFrequency, AlertStatus, PriceAlert};
pub use ledger::LedgerEntry;
pub use metal::{MetalType, GRAMS_PER_TROY_OUNCE};
pub use order::{Order, OrderSide, OrderStatus};
pub use price::{
    round_to, spread_pair, EffectivePrice, PriceObservation, PriceTier, SpotQuote, SOURCE_DEFAULT, SOURCE_FALLBACK,
    SOURCE_SYNTHETIC,
};
pub use wallet::WalletBalance;
