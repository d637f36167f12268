use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one detection pass. Detection never returns an error; this
/// is where failures end up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionReport {
    /// False if any bulk merge failed or bulk matching is disabled.
    pub bulk_succeeded: bool,

    /// Connections created by the store's merge-on-pattern.
    pub bulk_edges_created: u64,

    /// Connections created by the pairwise matcher.
    pub pairwise_edges_created: u64,

    /// Bulk failures that were recovered by falling back.
    pub bulk_failures: Vec<String>,

    /// Pairwise failures. Nothing recovers these.
    pub errors: Vec<String>,

    /// Wall time of the pass.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl Default for DetectionReport {
    fn default() -> Self {
        Self {
            bulk_succeeded: true,
            bulk_edges_created: 0,
            pairwise_edges_created: 0,
            bulk_failures: Vec::new(),
            errors: Vec::new(),
            duration: Duration::from_secs(0),
        }
    }
}

impl DetectionReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total connections created by both strategies
    pub fn edges_created(&self) -> u64 {
        self.bulk_edges_created + self.pairwise_edges_created
    }

    /// Whether the pass left the graph fully reconciled
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_bulk_edges(&mut self, count: u64) {
        self.bulk_edges_created += count;
    }

    pub fn add_pairwise_edges(&mut self, count: u64) {
        self.pairwise_edges_created += count;
    }

    pub fn record_bulk_failure(&mut self, message: String) {
        self.bulk_succeeded = false;
        self.bulk_failures.push(message);
    }

    pub fn record_error(&mut self, message: String) {
        self.errors.push(message);
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    /// Get a summary string for logging
    pub fn summary(&self) -> String {
        format!(
            "bulk {} ({} created, {} failures), pairwise created {}, {} errors in {:?}",
            if self.bulk_succeeded { "ok" } else { "failed" },
            self.bulk_edges_created,
            self.bulk_failures.len(),
            self.pairwise_edges_created,
            self.errors.len(),
            self.duration
        )
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
