use crate::error::{Result, TetherError};
use crate::storage::{ConnectionStore, EntityStore};
use crate::types::{AggregatedConnectionView, ConnectionDetail, Entity, EntityId};
use std::collections::HashMap;
use std::sync::Arc;

/// Read side of the connection graph. Every call reads the store directly;
/// nothing is cached between calls.
pub struct ConnectionAggregator<S: EntityStore + ConnectionStore> {
    storage: Arc<S>,
}

impl<S: EntityStore + ConnectionStore> ConnectionAggregator<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// One view per counterpart, merging every relationship type that links
    /// it to `id`. Views come out in the order their counterpart was first
    /// seen in the store's edge order.
    pub fn connections_for(&self, id: EntityId) -> Result<Vec<AggregatedConnectionView>> {
        self.require_root(id)?;

        let mut views: Vec<AggregatedConnectionView> = Vec::new();
        let mut positions: HashMap<EntityId, usize> = HashMap::new();

        for connection in self.storage.find_edges_touching(id)? {
            let other = connection.counterpart(id);

            if let Some(&pos) = positions.get(&other) {
                views[pos].merge(&connection);
                continue;
            }

            let Some(counterpart) = self.storage.get_entity(other)? else {
                log::debug!("Skipping stale connection {}: {} no longer exists", connection.id, other);
                continue;
            };

            positions.insert(other, views.len());
            views.push(AggregatedConnectionView::new(counterpart, &connection));
        }

        log::debug!("Aggregated {} counterparts for {}", views.len(), id);
        Ok(views)
    }

    /// Distinct counterpart entities, first-seen order
    pub fn connected_entities(&self, id: EntityId) -> Result<Vec<Entity>> {
        Ok(self
            .connections_for(id)?
            .into_iter()
            .map(|view| view.counterpart)
            .collect())
    }

    /// One entry per connection, without merging. Stale connections are skipped.
    pub fn connection_details(&self, id: EntityId) -> Result<Vec<ConnectionDetail>> {
        self.require_root(id)?;

        let mut resolved: HashMap<EntityId, Option<Entity>> = HashMap::new();
        let mut details = Vec::new();

        for connection in self.storage.find_edges_touching(id)? {
            let other = connection.counterpart(id);
            let counterpart = match resolved.get(&other) {
                Some(cached) => cached.clone(),
                None => {
                    let loaded = self.storage.get_entity(other)?;
                    resolved.insert(other, loaded.clone());
                    loaded
                }
            };

            if let Some(counterpart) = counterpart {
                details.push(ConnectionDetail {
                    counterpart,
                    relationship: connection.relationship,
                    shared_value: connection.shared_value,
                    created_at: connection.created_at,
                });
            }
        }

        Ok(details)
    }

    fn require_root(&self, id: EntityId) -> Result<()> {
        match self.storage.get_entity(id)? {
            Some(_) => Ok(()),
            None => Err(TetherError::EntityNotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RedbStorage;
    use crate::types::{Person, RelationshipType, Transaction};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn create_aggregator() -> (ConnectionAggregator<RedbStorage>, Arc<RedbStorage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(RedbStorage::open(temp_dir.path().join("aggregator.redb")).unwrap());
        (ConnectionAggregator::new(storage.clone()), storage, temp_dir)
    }

    fn put(storage: &RedbStorage, entity: impl Into<Entity>) -> Entity {
        let entity = entity.into();
        storage.put_entity(&entity).unwrap();
        entity
    }

    #[test]
    fn test_two_types_to_one_counterpart_merge() {
        let (aggregator, storage, _temp) = create_aggregator();
        let p1 = put(&storage, Person::new().with_phone("555-0100").with_address("1 Elm St"));
        let p2 = put(&storage, Person::new().with_phone("555-0100").with_address("1 Elm St"));

        let later = Utc::now();
        let earlier = later - Duration::hours(3);
        storage
            .insert_edge(p1.id(), p2.id(), RelationshipType::SharesPhone, "555-0100", later)
            .unwrap();
        storage
            .insert_edge(p2.id(), p1.id(), RelationshipType::SharesAddress, "1 Elm St", earlier)
            .unwrap();

        let views = aggregator.connections_for(p1.id()).unwrap();
        assert_eq!(views.len(), 1);

        let view = &views[0];
        assert_eq!(view.counterpart.id(), p2.id());
        assert_eq!(
            view.relationship_types,
            vec![RelationshipType::SharesPhone, RelationshipType::SharesAddress]
        );
        assert_eq!(view.shared_values[&RelationshipType::SharesPhone], "555-0100");
        assert_eq!(view.shared_values[&RelationshipType::SharesAddress], "1 Elm St");
        assert_eq!(view.earliest_created_at, earlier);
    }

    #[test]
    fn test_counterparts_keep_first_seen_order() {
        let (aggregator, storage, _temp) = create_aggregator();
        let root = put(&storage, Transaction::new().with_device("D1").with_ip("10.0.0.5"));
        let first = put(&storage, Transaction::new().with_ip("10.0.0.5"));
        let second = put(&storage, Transaction::new().with_device("D1"));
        let now = Utc::now();

        storage
            .insert_edge(second.id(), root.id(), RelationshipType::SameDevice, "D1", now)
            .unwrap();
        storage
            .insert_edge(root.id(), first.id(), RelationshipType::SameIp, "10.0.0.5", now)
            .unwrap();

        let order: Vec<EntityId> = aggregator
            .connections_for(root.id())
            .unwrap()
            .iter()
            .map(|v| v.counterpart.id())
            .collect();
        assert_eq!(order, vec![second.id(), first.id()]);
    }

    #[test]
    fn test_stale_counterpart_is_skipped() {
        let (aggregator, storage, _temp) = create_aggregator();
        let root = put(&storage, Person::new().with_email("a@example.com"));
        let live = put(&storage, Person::new().with_email("a@example.com"));
        let now = Utc::now();

        storage
            .insert_edge(root.id(), Uuid::now_v7(), RelationshipType::SharesEmail, "a@example.com", now)
            .unwrap();
        storage
            .insert_edge(root.id(), live.id(), RelationshipType::SharesEmail, "a@example.com", now)
            .unwrap();

        let views = aggregator.connections_for(root.id()).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].counterpart.id(), live.id());

        let details = aggregator.connection_details(root.id()).unwrap();
        assert_eq!(details.len(), 1);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let (aggregator, _storage, _temp) = create_aggregator();
        let missing = Uuid::now_v7();

        assert!(matches!(
            aggregator.connections_for(missing),
            Err(TetherError::EntityNotFound(id)) if id == missing
        ));
        assert!(aggregator.connected_entities(missing).is_err());
        assert!(aggregator.connection_details(missing).is_err());
    }

    #[test]
    fn test_root_without_connections() {
        let (aggregator, storage, _temp) = create_aggregator();
        let root = put(&storage, Person::new());
        assert!(aggregator.connections_for(root.id()).unwrap().is_empty());
    }

    #[test]
    fn test_details_are_not_merged() {
        let (aggregator, storage, _temp) = create_aggregator();
        let t1 = put(&storage, Transaction::new().with_device("D9").with_payment_method("card"));
        let t2 = put(&storage, Transaction::new().with_device("D9").with_payment_method("card"));
        let now = Utc::now();

        storage
            .insert_edge(t1.id(), t2.id(), RelationshipType::SameDevice, "D9", now)
            .unwrap();
        storage
            .insert_edge(t1.id(), t2.id(), RelationshipType::SamePaymentMethod, "card", now)
            .unwrap();

        let details = aggregator.connection_details(t2.id()).unwrap();
        assert_eq!(details.len(), 2);
        assert!(details.iter().all(|d| d.counterpart.id() == t1.id()));
        assert_eq!(details[0].relationship, RelationshipType::SameDevice);
        assert_eq!(details[1].shared_value, "card");

        let entities = aggregator.connected_entities(t2.id()).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].id(), t1.id());
    }
}
