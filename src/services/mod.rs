pub mod alerts;
pub mod analytics;
pub mod fx_cache;
pub mod orders;
pub mod price_engine;
pub mod scheduler;

pub use alerts::AlertService;
pub use analytics::{Period, PriceAnalytics};
pub use fx_cache::FxRateCache;
pub use orders::{BuyCheckout, OrderService, WalletSummary};
pub use price_engine::{PriceBook, PriceEngine, PriceUpdate, UpdateOutcome};
pub use scheduler::PriceScheduler;
