use crate::{
    AggregatedConnectionView, Connection, ConnectionAggregator, ConnectionDetail,
    ConnectionStore, DetectionReport, DetectorConfig, Entity, EntityId, EntityKind,
    EntityStore, RedbStorage, RelationshipDetector, RelationshipType, Result, StoreStats,
    TetherError,
};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Config for embedded library mode.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Detector settings used for every pass the facade runs.
    pub detector: DetectorConfig,
    /// Run `detect_for_entity` after each create and update. Default: true
    pub detect_on_write: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            detect_on_write: true,
        }
    }
}

impl LibraryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_detect_on_write(mut self, enabled: bool) -> Self {
        self.detect_on_write = enabled;
        self
    }
}

/// Result of writing one entity through the facade.
#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub id: EntityId,
    /// Present when detection ran after the write.
    pub detection: Option<DetectionReport>,
}

/// High-level, embedded Tether API. No server required.
///
/// # Example
/// ```rust,no_run
/// use tether_core::{LibraryConfig, Person, Tether};
///
/// let tether = Tether::open("./tether.redb", LibraryConfig::default()).unwrap();
/// let alice = tether.create(Person::new().with_phone("555-0100")).unwrap();
/// let bob = tether.create(Person::new().with_phone("555-0100")).unwrap();
/// let views = tether.connections_for(alice.id).unwrap();
/// assert_eq!(views[0].counterpart.id(), bob.id);
/// ```
pub struct Tether {
    storage: Arc<RedbStorage>,
    detector: RelationshipDetector<RedbStorage>,
    aggregator: ConnectionAggregator<RedbStorage>,
    config: LibraryConfig,
}

impl Tether {
    /// Open (or create) a Tether database at the given path.
    pub fn open(path: impl AsRef<Path>, config: LibraryConfig) -> Result<Self> {
        let storage = Arc::new(RedbStorage::open(path.as_ref())?);
        let detector = RelationshipDetector::new(storage.clone(), config.detector.clone());
        let aggregator = ConnectionAggregator::new(storage.clone());

        log::info!("Opened tether database at {}", storage.path().display());

        Ok(Self { storage, detector, aggregator, config })
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Store a new entity, then detect its relationships.
    /// Detection never fails the write; its outcome is in the returned report.
    pub fn create(&self, entity: impl Into<Entity>) -> Result<WriteOutcome> {
        let entity = entity.into();
        if self.storage.get_entity(entity.id())?.is_some() {
            return Err(TetherError::Validation(format!(
                "{} {} already exists",
                entity.kind(),
                entity.id()
            )));
        }
        self.write(entity)
    }

    /// Replace an existing entity, then detect its relationships.
    ///
    /// `created_at` is carried over from the stored record. Connections created
    /// from the old values are kept; detection only adds.
    pub fn update(&self, entity: impl Into<Entity>) -> Result<WriteOutcome> {
        let mut entity = entity.into();
        let existing = self
            .storage
            .get_entity(entity.id())?
            .ok_or(TetherError::EntityNotFound(entity.id()))?;

        if existing.kind() != entity.kind() {
            return Err(TetherError::Validation(format!(
                "{} is a {}, not a {}",
                entity.id(),
                existing.kind(),
                entity.kind()
            )));
        }
        match (&mut entity, &existing) {
            (Entity::Person(person), Entity::Person(old)) => {
                person.created_at = old.created_at;
                person.updated_at = Utc::now();
            }
            (Entity::Transaction(tx), Entity::Transaction(old)) => {
                tx.created_at = old.created_at;
            }
            _ => {}
        }
        self.write(entity)
    }

    fn write(&self, entity: Entity) -> Result<WriteOutcome> {
        self.storage.put_entity(&entity)?;

        let detection = if self.config.detect_on_write {
            Some(self.detector.detect_for_entity(&entity))
        } else {
            None
        };

        Ok(WriteOutcome { id: entity.id(), detection })
    }

    /// Delete an entity and every connection touching it.
    /// Returns the number of connections removed.
    pub fn delete(&self, id: EntityId) -> Result<u64> {
        if self.storage.get_entity(id)?.is_none() {
            return Err(TetherError::EntityNotFound(id));
        }
        self.storage.delete_entity(id)
    }

    /// Get an entity by ID.
    pub fn get(&self, id: EntityId) -> Result<Option<Entity>> {
        self.storage.get_entity(id)
    }

    /// All entities of one kind, oldest first.
    pub fn list(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        self.storage.list_entities(kind)
    }

    /// Detect relationships for one stored entity.
    pub fn detect_for_entity(&self, id: EntityId) -> Result<DetectionReport> {
        let entity = self
            .storage
            .get_entity(id)?
            .ok_or(TetherError::EntityNotFound(id))?;
        Ok(self.detector.detect_for_entity(&entity))
    }

    /// Full detection across every entity of every kind.
    pub fn detect_all(&self) -> DetectionReport {
        self.detector.detect_all()
    }

    /// Connections of `id`, merged per counterpart.
    pub fn connections_for(&self, id: EntityId) -> Result<Vec<AggregatedConnectionView>> {
        self.aggregator.connections_for(id)
    }

    /// Distinct entities connected to `id`.
    pub fn connected_entities(&self, id: EntityId) -> Result<Vec<Entity>> {
        self.aggregator.connected_entities(id)
    }

    /// Connections of `id`, one entry per connection.
    pub fn connection_details(&self, id: EntityId) -> Result<Vec<ConnectionDetail>> {
        self.aggregator.connection_details(id)
    }

    /// Every connection of one relationship type.
    pub fn edges_by_relationship(&self, relationship: RelationshipType) -> Result<Vec<Connection>> {
        self.storage.edges_by_relationship(relationship)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.storage.stats()
    }
}
