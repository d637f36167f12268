mod redb_storage;
mod stats;
mod traits;

pub use redb_storage::{RedbStorage, CURRENT_SCHEMA_VERSION};
pub use stats::StoreStats;
pub use traits::{ConnectionStore, EntityStore};
