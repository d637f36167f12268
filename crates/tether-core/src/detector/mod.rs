//! Relationship detection: runs the bulk matcher and then the pairwise
//! matcher, swallowing failures so detection never fails the caller.

mod config;
mod engine;
mod report;

#[cfg(test)]
mod tests;

pub use config::{DetectorConfig, ReconcileScope};
pub use engine::RelationshipDetector;
pub use report::DetectionReport;
