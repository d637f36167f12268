//! Matchers: turn shared attribute values into connections.
//!
//! Two strategies produce the same, deduplicated result:
//! - `BulkMatcher` hands a whole attribute to the store as one
//!   merge-on-pattern operation.
//! - `PairwiseMatcher` groups an in-memory snapshot by value and inserts each
//!   missing pair itself. It is the fallback of record.

mod bulk;
mod pairwise;

pub use bulk::BulkMatcher;
pub use pairwise::PairwiseMatcher;
