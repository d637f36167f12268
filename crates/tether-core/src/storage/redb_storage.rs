use crate::error::{Result, TetherError};
use crate::schema::{self, unordered_pairs};
use crate::storage::stats::StoreStats;
use crate::storage::traits::{ConnectionStore, EntityStore};
use crate::types::{Connection, ConnectionId, Entity, EntityId, EntityKind, RelationshipType};
use chrono::{DateTime, Utc};
use redb::{
    Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable, ReadableTableMetadata,
    TableDefinition, WriteTransaction,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Table definitions
const ENTITIES: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("entities");
const ENTITIES_BY_KIND: MultimapTableDefinition<&str, &[u8; 16]> =
    MultimapTableDefinition::new("entities_by_kind");

// Two parallel connection collections, one per entity kind
const PERSON_CONNECTIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("person_connections");
const PERSON_CONNECTIONS_BY_ENDPOINT: MultimapTableDefinition<&[u8; 16], u64> =
    MultimapTableDefinition::new("person_connections_by_endpoint");
const PERSON_CONNECTIONS_BY_PAIR: MultimapTableDefinition<&[u8; 33], u64> =
    MultimapTableDefinition::new("person_connections_by_pair");
const TRANSACTION_CONNECTIONS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("transaction_connections");
const TRANSACTION_CONNECTIONS_BY_ENDPOINT: MultimapTableDefinition<&[u8; 16], u64> =
    MultimapTableDefinition::new("transaction_connections_by_endpoint");
const TRANSACTION_CONNECTIONS_BY_PAIR: MultimapTableDefinition<&[u8; 33], u64> =
    MultimapTableDefinition::new("transaction_connections_by_pair");

// Metadata table
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;
const SCHEMA_VERSION_KEY: &str = "schema_version";
const CONNECTION_SEQ_KEY: &str = "seq:connection_id";

type ConnectionTable = TableDefinition<'static, u64, &'static [u8]>;
type EndpointIndex = MultimapTableDefinition<'static, &'static [u8; 16], u64>;
type PairIndex = MultimapTableDefinition<'static, &'static [u8; 33], u64>;

/// Tables holding one kind's connections
struct ConnectionTables {
    records: ConnectionTable,
    by_endpoint: EndpointIndex,
    /// Keyed by `a ‖ b ‖ relationship tag`, in stored endpoint order
    by_pair: PairIndex,
}

fn connection_tables(kind: EntityKind) -> ConnectionTables {
    match kind {
        EntityKind::Person => ConnectionTables {
            records: PERSON_CONNECTIONS,
            by_endpoint: PERSON_CONNECTIONS_BY_ENDPOINT,
            by_pair: PERSON_CONNECTIONS_BY_PAIR,
        },
        EntityKind::Transaction => ConnectionTables {
            records: TRANSACTION_CONNECTIONS,
            by_endpoint: TRANSACTION_CONNECTIONS_BY_ENDPOINT,
            by_pair: TRANSACTION_CONNECTIONS_BY_PAIR,
        },
    }
}

/// Stable one-byte tag for a relationship type
fn relationship_tag(relationship: RelationshipType) -> u8 {
    match relationship {
        RelationshipType::SharesEmail => 1,
        RelationshipType::SharesPhone => 2,
        RelationshipType::SharesAddress => 3,
        RelationshipType::SameDevice => 4,
        RelationshipType::SameIp => 5,
        RelationshipType::SamePaymentMethod => 6,
    }
}

fn pair_key(a: EntityId, b: EntityId, relationship: RelationshipType) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[..16].copy_from_slice(a.as_bytes());
    key[16..32].copy_from_slice(b.as_bytes());
    key[32] = relationship_tag(relationship);
    key
}

/// Redb-based entity and connection store
pub struct RedbStorage {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbStorage {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TetherError::Validation(format!("Failed to create directory: {}", e))
            })?;
        }

        let is_new = !path.exists();
        let db = Database::create(&path)?;

        if !is_new {
            Self::check_schema_version(&db)?;
        }

        // Ensure tables exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ENTITIES)?;
            let _ = write_txn.open_multimap_table(ENTITIES_BY_KIND)?;
            let _ = write_txn.open_table(PERSON_CONNECTIONS)?;
            let _ = write_txn.open_multimap_table(PERSON_CONNECTIONS_BY_ENDPOINT)?;
            let _ = write_txn.open_multimap_table(PERSON_CONNECTIONS_BY_PAIR)?;
            let _ = write_txn.open_table(TRANSACTION_CONNECTIONS)?;
            let _ = write_txn.open_multimap_table(TRANSACTION_CONNECTIONS_BY_ENDPOINT)?;
            let _ = write_txn.open_multimap_table(TRANSACTION_CONNECTIONS_BY_PAIR)?;
            let mut meta = write_txn.open_table(META)?;
            if is_new {
                meta.insert(SCHEMA_VERSION_KEY, CURRENT_SCHEMA_VERSION.to_string().as_bytes())?;
            }
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Check schema version. Returns error if the file was written by another version.
    fn check_schema_version(db: &Database) -> Result<()> {
        let read_txn = db.begin_read()?;
        let version = {
            let table = read_txn.open_table(META).ok();
            table
                .and_then(|t| {
                    t.get(SCHEMA_VERSION_KEY).ok().flatten().and_then(|v| {
                        std::str::from_utf8(v.value())
                            .ok()
                            .and_then(|s| s.parse::<u32>().ok())
                    })
                })
                .unwrap_or(CURRENT_SCHEMA_VERSION)
        };

        match version.cmp(&CURRENT_SCHEMA_VERSION) {
            std::cmp::Ordering::Equal => Ok(()),
            std::cmp::Ordering::Less => Err(TetherError::Validation(format!(
                "Database schema v{} is older than current v{}.",
                version, CURRENT_SCHEMA_VERSION
            ))),
            std::cmp::Ordering::Greater => Err(TetherError::Validation(format!(
                "Database schema v{} is newer than this binary v{}. Upgrade tether.",
                version, CURRENT_SCHEMA_VERSION
            ))),
        }
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn uuid_to_bytes(id: &EntityId) -> [u8; 16] {
        *id.as_bytes()
    }

    fn bytes_to_uuid(bytes: &[u8; 16]) -> EntityId {
        EntityId::from_bytes(*bytes)
    }

    fn serialize_entity(entity: &Entity) -> Result<Vec<u8>> {
        bincode::serialize(entity).map_err(TetherError::from)
    }

    fn deserialize_entity(bytes: &[u8]) -> Result<Entity> {
        bincode::deserialize(bytes).map_err(TetherError::from)
    }

    fn serialize_connection(connection: &Connection) -> Result<Vec<u8>> {
        bincode::serialize(connection).map_err(TetherError::from)
    }

    fn deserialize_connection(bytes: &[u8]) -> Result<Connection> {
        bincode::deserialize(bytes).map_err(TetherError::from)
    }

    /// Connection ids indexed under `id`, ascending (= insertion order)
    fn connection_ids<I>(index: &I, id: &EntityId) -> Result<Vec<ConnectionId>>
    where
        I: ReadableMultimapTable<&'static [u8; 16], u64>,
    {
        let id_bytes = Self::uuid_to_bytes(id);
        let ids = index
            .get(&id_bytes)?
            .map(|result| result.map(|guard| guard.value()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn load_connections<T>(table: &T, ids: &[ConnectionId]) -> Result<Vec<Connection>>
    where
        T: ReadableTable<u64, &'static [u8]>,
    {
        let mut connections = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = table.get(*id)? {
                connections.push(Self::deserialize_connection(bytes.value())?);
            }
        }
        Ok(connections)
    }

    /// Entities of `kind` as seen by `txn`, in index order
    fn entities_in_txn(txn: &WriteTransaction, kind: EntityKind) -> Result<Vec<Entity>> {
        let ids: Vec<[u8; 16]> = {
            let index = txn.open_multimap_table(ENTITIES_BY_KIND)?;
            let raw = index
                .get(kind.as_str())?
                .map(|r| r.map(|g| *g.value()))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            raw
        };

        let table = txn.open_table(ENTITIES)?;
        let mut entities = Vec::with_capacity(ids.len());
        for id_bytes in &ids {
            if let Some(bytes) = table.get(id_bytes)? {
                entities.push(Self::deserialize_entity(bytes.value())?);
            }
        }
        Ok(entities)
    }

    /// Whether any connection is stored under exactly this pair key
    fn pair_indexed<I>(
        index: &I,
        a: EntityId,
        b: EntityId,
        relationship: RelationshipType,
    ) -> Result<bool>
    where
        I: ReadableMultimapTable<&'static [u8; 33], u64>,
    {
        let key = pair_key(a, b, relationship);
        let mut values = index.get(&key)?;
        Ok(values.next().transpose()?.is_some())
    }

    /// Whether `{a, b}` is linked by `relationship` in either order, as seen by `txn`
    fn linked_in_txn(
        txn: &WriteTransaction,
        a: EntityId,
        b: EntityId,
        relationship: RelationshipType,
    ) -> Result<bool> {
        let index = txn.open_multimap_table(connection_tables(relationship.kind()).by_pair)?;
        Ok(Self::pair_indexed(&index, a, b, relationship)?
            || Self::pair_indexed(&index, b, a, relationship)?)
    }

    /// Next value of the connection id sequence, starting at 1
    fn next_connection_id(txn: &WriteTransaction) -> Result<ConnectionId> {
        let mut meta = txn.open_table(META)?;
        let current = match meta.get(CONNECTION_SEQ_KEY)? {
            Some(v) => {
                let bytes = <[u8; 8]>::try_from(v.value()).map_err(|_| {
                    TetherError::Validation(format!(
                        "Corrupt connection id sequence: expected 8 bytes, found {}",
                        v.value().len()
                    ))
                })?;
                u64::from_le_bytes(bytes)
            }
            None => 0,
        };
        let next = current + 1;
        meta.insert(CONNECTION_SEQ_KEY, next.to_le_bytes().as_slice())?;
        Ok(next)
    }

    fn insert_in_txn(
        txn: &WriteTransaction,
        a: EntityId,
        b: EntityId,
        relationship: RelationshipType,
        shared_value: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ConnectionId> {
        let id = Self::next_connection_id(txn)?;
        let connection = Connection {
            id,
            endpoint_a: a,
            endpoint_b: b,
            relationship,
            shared_value: shared_value.to_string(),
            created_at,
        };
        let bytes = Self::serialize_connection(&connection)?;

        let tables = connection_tables(relationship.kind());
        {
            let mut table = txn.open_table(tables.records)?;
            table.insert(id, bytes.as_slice())?;
        }
        {
            let mut index = txn.open_multimap_table(tables.by_endpoint)?;
            index.insert(&Self::uuid_to_bytes(&a), id)?;
            index.insert(&Self::uuid_to_bytes(&b), id)?;
        }
        {
            let mut pairs = txn.open_multimap_table(tables.by_pair)?;
            pairs.insert(&pair_key(a, b, relationship), id)?;
        }
        Ok(id)
    }

    /// Remove `id`'s connections from `kind`'s collection
    fn delete_touching_in_txn(txn: &WriteTransaction, kind: EntityKind, id: EntityId) -> Result<u64> {
        let tables = connection_tables(kind);
        let ids = {
            let index = txn.open_multimap_table(tables.by_endpoint)?;
            Self::connection_ids(&index, &id)?
        };
        if ids.is_empty() {
            return Ok(0);
        }

        let connections = {
            let mut table = txn.open_table(tables.records)?;
            let mut removed = Vec::with_capacity(ids.len());
            for cid in &ids {
                let bytes = table.remove(*cid)?.map(|guard| guard.value().to_vec());
                if let Some(bytes) = bytes {
                    removed.push(Self::deserialize_connection(&bytes)?);
                }
            }
            removed
        };

        {
            let mut pairs = txn.open_multimap_table(tables.by_pair)?;
            for c in &connections {
                pairs.remove(&pair_key(c.endpoint_a, c.endpoint_b, c.relationship), c.id)?;
            }
        }

        let mut index = txn.open_multimap_table(tables.by_endpoint)?;
        for connection in &connections {
            index.remove(&Self::uuid_to_bytes(&connection.endpoint_a), connection.id)?;
            index.remove(&Self::uuid_to_bytes(&connection.endpoint_b), connection.id)?;
        }
        // Index entries whose connection record was already gone
        for cid in &ids {
            index.remove(&Self::uuid_to_bytes(&id), *cid)?;
        }

        Ok(connections.len() as u64)
    }

    fn validate_connection(a: EntityId, b: EntityId, shared_value: &str) -> Result<()> {
        Connection::validate(a, b, shared_value)
            .map_err(|reason| TetherError::InvalidConnection { reason })
    }
}

impl EntityStore for RedbStorage {
    fn put_entity(&self, entity: &Entity) -> Result<()> {
        let id_bytes = Self::uuid_to_bytes(&entity.id());
        let bytes = Self::serialize_entity(entity)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTITIES)?;
            table.insert(&id_bytes, bytes.as_slice())?;
        }
        {
            let mut index = write_txn.open_multimap_table(ENTITIES_BY_KIND)?;
            index.insert(entity.kind().as_str(), &id_bytes)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTITIES)?;
        let id_bytes = Self::uuid_to_bytes(&id);

        if let Some(bytes) = table.get(&id_bytes)? {
            Ok(Some(Self::deserialize_entity(bytes.value())?))
        } else {
            Ok(None)
        }
    }

    fn list_entities(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTITIES)?;
        let index = read_txn.open_multimap_table(ENTITIES_BY_KIND)?;

        let ids: Vec<EntityId> = index
            .get(kind.as_str())?
            .map(|result| result.map(|guard| Self::bytes_to_uuid(guard.value())))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = table.get(&Self::uuid_to_bytes(&id))? {
                entities.push(Self::deserialize_entity(bytes.value())?);
            }
        }
        Ok(entities)
    }

    fn delete_entity(&self, id: EntityId) -> Result<u64> {
        let id_bytes = Self::uuid_to_bytes(&id);

        // Single write transaction: entity, kind index and connections go together
        let write_txn = self.db.begin_write()?;
        let entity = {
            let mut table = write_txn.open_table(ENTITIES)?;
            let bytes = table.remove(&id_bytes)?.map(|guard| guard.value().to_vec());
            match bytes {
                Some(bytes) => Self::deserialize_entity(&bytes)?,
                None => return Err(TetherError::EntityNotFound(id)),
            }
        };
        {
            let mut index = write_txn.open_multimap_table(ENTITIES_BY_KIND)?;
            index.remove(entity.kind().as_str(), &id_bytes)?;
        }
        let removed = Self::delete_touching_in_txn(&write_txn, entity.kind(), id)?;
        write_txn.commit()?;

        log::debug!("Deleted {} {} and {} connections", entity.kind(), id, removed);
        Ok(removed)
    }
}

impl ConnectionStore for RedbStorage {
    fn exists_edge(&self, a: EntityId, b: EntityId, relationship: RelationshipType) -> Result<bool> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_multimap_table(connection_tables(relationship.kind()).by_pair)?;
        Self::pair_indexed(&index, a, b, relationship)
    }

    fn insert_edge(
        &self,
        a: EntityId,
        b: EntityId,
        relationship: RelationshipType,
        shared_value: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ConnectionId> {
        Self::validate_connection(a, b, shared_value)?;

        let write_txn = self.db.begin_write()?;
        let id = Self::insert_in_txn(&write_txn, a, b, relationship, shared_value, created_at)?;
        write_txn.commit()?;
        Ok(id)
    }

    fn insert_edge_if_absent(
        &self,
        a: EntityId,
        b: EntityId,
        relationship: RelationshipType,
        shared_value: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Option<ConnectionId>> {
        Self::validate_connection(a, b, shared_value)?;

        // redb admits one writer at a time, so check and insert cannot interleave
        let write_txn = self.db.begin_write()?;
        if Self::linked_in_txn(&write_txn, a, b, relationship)? {
            write_txn.abort()?;
            return Ok(None);
        }
        let id = Self::insert_in_txn(&write_txn, a, b, relationship, shared_value, created_at)?;
        write_txn.commit()?;
        Ok(Some(id))
    }

    fn find_edges_touching(&self, id: EntityId) -> Result<Vec<Connection>> {
        let read_txn = self.db.begin_read()?;
        let mut connections = Vec::new();

        for kind in EntityKind::all() {
            let tables = connection_tables(kind);
            let table = read_txn.open_table(tables.records)?;
            let index = read_txn.open_multimap_table(tables.by_endpoint)?;
            let ids = Self::connection_ids(&index, &id)?;
            connections.extend(Self::load_connections(&table, &ids)?);
        }

        Ok(connections)
    }

    fn edges_by_relationship(&self, relationship: RelationshipType) -> Result<Vec<Connection>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(connection_tables(relationship.kind()).records)?;

        let mut connections = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            let connection = Self::deserialize_connection(value.value())?;
            if connection.relationship == relationship {
                connections.push(connection);
            }
        }
        Ok(connections)
    }

    fn merge_on_pattern(&self, kind: EntityKind, attribute: &str) -> Result<u64> {
        let spec = schema::attribute(kind, attribute).ok_or_else(|| {
            TetherError::UnknownAttribute {
                kind,
                attribute: attribute.to_string(),
            }
        })?;

        // One write transaction for the whole pattern: commits fully or not at all
        let write_txn = self.db.begin_write()?;
        let entities = Self::entities_in_txn(&write_txn, kind)?;
        let now = Utc::now();
        let mut created = 0u64;

        for group in schema::group_by_value(&entities, spec) {
            for (a, b) in unordered_pairs(&group.members) {
                let (a, b) = (a.id(), b.id());
                if a == b || Self::linked_in_txn(&write_txn, a, b, spec.relationship)? {
                    continue;
                }
                Self::insert_in_txn(&write_txn, a, b, spec.relationship, group.value, now)?;
                created += 1;
            }
        }
        write_txn.commit()?;

        log::debug!(
            "Merged {} {} connections on {}.{}",
            created,
            spec.relationship,
            kind,
            attribute
        );
        Ok(created)
    }

    fn delete_edges_touching(&self, id: EntityId) -> Result<u64> {
        let write_txn = self.db.begin_write()?;
        let mut removed = 0;
        for kind in EntityKind::all() {
            removed += Self::delete_touching_in_txn(&write_txn, kind, id)?;
        }
        write_txn.commit()?;
        Ok(removed)
    }

    fn stats(&self) -> Result<StoreStats> {
        let read_txn = self.db.begin_read()?;
        let mut stats = StoreStats::default();

        {
            let index = read_txn.open_multimap_table(ENTITIES_BY_KIND)?;
            for kind in EntityKind::all() {
                let count = index.get(kind.as_str())?.count() as u64;
                stats.entity_counts_by_kind.insert(kind, count);
                stats.entity_count += count;
            }
        }

        for kind in EntityKind::all() {
            let table = read_txn.open_table(connection_tables(kind).records)?;
            stats.connection_count += table.len()?;
            for item in table.iter()? {
                let (_, value) = item?;
                let connection = Self::deserialize_connection(value.value())?;
                *stats
                    .connection_counts_by_relationship
                    .entry(connection.relationship)
                    .or_insert(0) += 1;
            }
        }

        stats.db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(stats)
    }
}
