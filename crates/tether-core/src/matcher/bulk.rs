use crate::error::Result;
use crate::schema::AttributeSpec;
use crate::storage::ConnectionStore;
use crate::types::EntityKind;
use std::sync::Arc;

/// Set-at-a-time matcher backed by the store's merge-on-pattern operation
pub struct BulkMatcher<S: ConnectionStore> {
    storage: Arc<S>,
}

impl<S: ConnectionStore> BulkMatcher<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Link every pair of `kind` entities sharing `attribute`.
    ///
    /// Fails as a unit: on error nothing was committed and the caller
    /// falls back to the pairwise matcher.
    pub fn match_by_attribute(&self, kind: EntityKind, attribute: &AttributeSpec) -> Result<u64> {
        let created = self.storage.merge_on_pattern(kind, attribute.name)?;
        log::debug!(
            "Bulk match on {}.{} created {} {} connections",
            kind,
            attribute.name,
            created,
            attribute.relationship
        );
        Ok(created)
    }
}
