use crate::types::{EntityKind, RelationshipType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub entity_count: u64,
    pub connection_count: u64,
    pub entity_counts_by_kind: BTreeMap<EntityKind, u64>,
    pub connection_counts_by_relationship: BTreeMap<RelationshipType, u64>,
    pub db_size_bytes: u64,
}

impl StoreStats {
    /// Connection count for one relationship type, zero if none
    pub fn connections_of(&self, relationship: RelationshipType) -> u64 {
        self.connection_counts_by_relationship
            .get(&relationship)
            .copied()
            .unwrap_or(0)
    }

    /// Entity count for one kind, zero if none
    pub fn entities_of(&self, kind: EntityKind) -> u64 {
        self.entity_counts_by_kind.get(&kind).copied().unwrap_or(0)
    }
}
