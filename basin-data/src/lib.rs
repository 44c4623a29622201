pub mod adapter;
pub mod error;
pub mod identifier;
pub mod memory;
pub mod postgres;

pub use adapter::{FindOptions, StorageAdapter};
pub use error::DataError;
pub use memory::MemoryAdapter;
pub use postgres::PostgresAdapter;
