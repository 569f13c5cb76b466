pub mod aggregator; // Cross-tenant listing and lookup
pub mod command_service;
pub mod connection_pool;
pub mod database; // Driver capability and backends
pub mod dialect;
pub mod kv_store;
pub mod row_decoder;
pub mod shared_table;

pub use aggregator::*;
pub use command_service::*;
pub use connection_pool::*;
pub use dialect::Dialect;
pub use kv_store::*;
