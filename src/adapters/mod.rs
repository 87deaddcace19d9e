pub mod memory_store;
pub mod postgres_store;

pub use memory_store::InMemoryStore;
pub use postgres_store::PostgresStore;
