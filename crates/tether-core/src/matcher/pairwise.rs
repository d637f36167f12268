use crate::error::Result;
use crate::schema::{group_by_value, unordered_pairs, AttributeSpec, ValueGroup};
use crate::storage::ConnectionStore;
use crate::types::{Entity, RelationshipType};
use chrono::Utc;
use std::sync::Arc;

/// In-memory matcher: group by value, enumerate pairs, insert the missing ones.
///
/// Cost is O(n) to group plus O(k²) per group of size k, so the largest
/// shared-value group dominates.
pub struct PairwiseMatcher<S: ConnectionStore> {
    storage: Arc<S>,
}

impl<S: ConnectionStore> PairwiseMatcher<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Reconcile every value group of `attribute` across `entities`.
    /// Returns the number of connections created.
    pub fn reconcile_attribute(&self, entities: &[Entity], attribute: &AttributeSpec) -> Result<u64> {
        let groups = group_by_value(entities, attribute);
        self.reconcile_groups(groups, attribute.relationship)
    }

    /// Like `reconcile_attribute`, restricted to the groups keyed by `values`
    pub fn reconcile_values(
        &self,
        entities: &[Entity],
        attribute: &AttributeSpec,
        values: &[&str],
    ) -> Result<u64> {
        let groups = group_by_value(entities, attribute)
            .into_iter()
            .filter(|g| values.contains(&g.value))
            .collect();
        self.reconcile_groups(groups, attribute.relationship)
    }

    fn reconcile_groups(&self, groups: Vec<ValueGroup<'_>>, relationship: RelationshipType) -> Result<u64> {
        let mut created = 0u64;

        for group in groups.iter().filter(|g| g.members.len() > 1) {
            log::debug!(
                "Found {} entities sharing {} value {}",
                group.members.len(),
                relationship,
                group.value
            );

            for (a, b) in unordered_pairs(&group.members) {
                if self.link(a, b, relationship, group.value)? {
                    created += 1;
                }
            }
        }

        log::info!("Created {} {} connections", created, relationship);
        Ok(created)
    }

    /// Insert the pair unless it is already linked. Returns whether a connection was created.
    fn link(&self, a: &Entity, b: &Entity, relationship: RelationshipType, value: &str) -> Result<bool> {
        let (a, b) = (a.id(), b.id());
        if a == b {
            return Ok(false);
        }

        // The store does not normalize endpoint order
        if self.storage.exists_edge(a, b, relationship)? || self.storage.exists_edge(b, a, relationship)? {
            return Ok(false);
        }

        match self
            .storage
            .insert_edge_if_absent(a, b, relationship, value, Utc::now())?
        {
            Some(id) => {
                log::debug!(
                    "Created {} connection {} between {} and {} with shared value {}",
                    relationship,
                    id,
                    a,
                    b,
                    value
                );
                Ok(true)
            }
            // Another writer linked the pair after our check
            None => Ok(false),
        }
    }
}
