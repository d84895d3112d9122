//! Data access for the alerting pipeline: the `Store` seam over the
//! relational schema, the Postgres implementation, and the TTL-cached
//! facade the hot path reads through.

pub mod access;
pub mod cache;
pub mod error;
pub mod memory;
pub mod postgres;
mod store;

pub use access::DataAccess;
pub use cache::TtlCache;
pub use error::StoreError;
pub use memory::{MemoryStore, RecipientTiers};
pub use postgres::PgStore;
pub use store::{EntityNames, Store, Thresholds};
