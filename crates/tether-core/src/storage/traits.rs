use crate::error::Result;
use crate::storage::stats::StoreStats;
use crate::types::{Connection, ConnectionId, Entity, EntityId, EntityKind, RelationshipType};
use chrono::{DateTime, Utc};

/// Base entity persistence. Owns people and transactions; detection only reads.
pub trait EntityStore: Send + Sync {
    /// Store an entity (insert or update)
    fn put_entity(&self, entity: &Entity) -> Result<()>;

    /// Retrieve an entity by ID
    fn get_entity(&self, id: EntityId) -> Result<Option<Entity>>;

    /// All entities of one kind, oldest first
    fn list_entities(&self, kind: EntityKind) -> Result<Vec<Entity>>;

    /// Delete an entity and every connection touching it.
    /// Returns the number of connections removed.
    fn delete_entity(&self, id: EntityId) -> Result<u64>;
}

/// Connection persistence. One collection per entity kind, selected by
/// the relationship type.
pub trait ConnectionStore: Send + Sync {
    /// Whether a connection `a -> b` of this type exists in exactly this
    /// endpoint order. Callers check both orders.
    fn exists_edge(&self, a: EntityId, b: EntityId, relationship: RelationshipType) -> Result<bool>;

    /// Unconditionally insert a connection
    fn insert_edge(
        &self,
        a: EntityId,
        b: EntityId,
        relationship: RelationshipType,
        shared_value: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ConnectionId>;

    /// Insert unless a connection for `{a, b}` of this type exists in either
    /// order. The check and the insert are one atomic write.
    fn insert_edge_if_absent(
        &self,
        a: EntityId,
        b: EntityId,
        relationship: RelationshipType,
        shared_value: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Option<ConnectionId>>;

    /// Every connection with `id` as either endpoint, in insertion order
    fn find_edges_touching(&self, id: EntityId) -> Result<Vec<Connection>>;

    /// Every connection of one relationship type, in insertion order
    fn edges_by_relationship(&self, relationship: RelationshipType) -> Result<Vec<Connection>>;

    /// Link every pair of `kind` entities whose `attribute` is equal and not
    /// blank, skipping pairs already linked. All or nothing.
    /// Returns the number of connections created.
    fn merge_on_pattern(&self, kind: EntityKind, attribute: &str) -> Result<u64>;

    /// Remove every connection touching `id`. Returns how many were removed.
    fn delete_edges_touching(&self, id: EntityId) -> Result<u64>;

    /// Entity and connection counts
    fn stats(&self) -> Result<StoreStats>;
}
