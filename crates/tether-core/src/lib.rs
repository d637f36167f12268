pub mod types;
pub mod schema;
pub mod storage;
pub mod error;
pub mod matcher;
pub mod detector;
pub mod aggregator;
pub mod api;

pub use error::{TetherError, Result};
pub use types::*;
pub use schema::{attribute, attributes_for, AttributeSpec};
pub use storage::{ConnectionStore, EntityStore, RedbStorage, StoreStats, CURRENT_SCHEMA_VERSION};
pub use matcher::{BulkMatcher, PairwiseMatcher};
pub use detector::{DetectionReport, DetectorConfig, ReconcileScope, RelationshipDetector};
pub use aggregator::ConnectionAggregator;
pub use api::{LibraryConfig, Tether, WriteOutcome};
