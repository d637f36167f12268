use crate::detector::*;
use crate::error::{Result, TetherError};
use crate::storage::{ConnectionStore, EntityStore, RedbStorage, StoreStats};
use crate::types::*;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Store whose merge-on-pattern is unavailable, as with a backend that has
/// no declarative match support or is temporarily down.
struct NoBulkStore {
    inner: RedbStorage,
    merge_calls: AtomicU64,
}

impl EntityStore for NoBulkStore {
    fn put_entity(&self, entity: &Entity) -> Result<()> {
        self.inner.put_entity(entity)
    }

    fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        self.inner.get_entity(id)
    }

    fn list_entities(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        self.inner.list_entities(kind)
    }

    fn delete_entity(&self, id: EntityId) -> Result<u64> {
        self.inner.delete_entity(id)
    }
}

impl ConnectionStore for NoBulkStore {
    fn exists_edge(&self, a: EntityId, b: EntityId, relationship: RelationshipType) -> Result<bool> {
        self.inner.exists_edge(a, b, relationship)
    }

    fn insert_edge(
        &self,
        a: EntityId,
        b: EntityId,
        relationship: RelationshipType,
        shared_value: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ConnectionId> {
        self.inner.insert_edge(a, b, relationship, shared_value, created_at)
    }

    fn insert_edge_if_absent(
        &self,
        a: EntityId,
        b: EntityId,
        relationship: RelationshipType,
        shared_value: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Option<ConnectionId>> {
        self.inner
            .insert_edge_if_absent(a, b, relationship, shared_value, created_at)
    }

    fn find_edges_touching(&self, id: EntityId) -> Result<Vec<Connection>> {
        self.inner.find_edges_touching(id)
    }

    fn edges_by_relationship(&self, relationship: RelationshipType) -> Result<Vec<Connection>> {
        self.inner.edges_by_relationship(relationship)
    }

    fn merge_on_pattern(&self, _kind: EntityKind, _attribute: &str) -> Result<u64> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        Err(TetherError::StoreUnavailable("pattern merge not supported".into()))
    }

    fn delete_edges_touching(&self, id: EntityId) -> Result<u64> {
        self.inner.delete_edges_touching(id)
    }

    fn stats(&self) -> Result<StoreStats> {
        self.inner.stats()
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn create_test_storage() -> (Arc<RedbStorage>, TempDir) {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(RedbStorage::open(temp_dir.path().join("detector_test.redb")).unwrap());
    (storage, temp_dir)
}

fn create_no_bulk_storage() -> (Arc<NoBulkStore>, TempDir) {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let inner = RedbStorage::open(temp_dir.path().join("no_bulk_test.redb")).unwrap();
    let storage = Arc::new(NoBulkStore {
        inner,
        merge_calls: AtomicU64::new(0),
    });
    (storage, temp_dir)
}

fn put<S: EntityStore>(storage: &S, entity: impl Into<Entity>) -> Entity {
    let entity = entity.into();
    storage.put_entity(&entity).unwrap();
    entity
}

fn edges_of<S: ConnectionStore>(storage: &S, relationship: RelationshipType) -> Vec<Connection> {
    storage.edges_by_relationship(relationship).unwrap()
}

fn total_edges<S: ConnectionStore>(storage: &S) -> u64 {
    storage.stats().unwrap().connection_count
}

#[test]
fn test_shared_phone_scenario() {
    let (storage, _temp) = create_test_storage();
    let p1 = put(&*storage, Person::new().with_phone("555-0100"));
    let p2 = put(&*storage, Person::new().with_phone("555-0100"));
    let p3 = put(&*storage, Person::new().with_phone("555-0199"));

    let detector = RelationshipDetector::new(storage.clone(), DetectorConfig::default());
    let report = detector.detect_all();

    assert!(report.bulk_succeeded);
    assert!(report.is_complete());
    assert_eq!(report.edges_created(), 1);

    let phone = edges_of(&*storage, RelationshipType::SharesPhone);
    assert_eq!(phone.len(), 1);
    assert!(phone[0].links(p1.id(), p2.id(), RelationshipType::SharesPhone));
    assert!(storage.find_edges_touching(p3.id()).unwrap().is_empty());
}

#[test]
fn test_shared_device_scenario() {
    let (storage, _temp) = create_test_storage();
    let t1 = put(&*storage, Transaction::new().with_device("D9"));
    let t2 = put(&*storage, Transaction::new().with_device("D9"));
    let t3 = put(&*storage, Transaction::new().with_device("D9"));

    let detector = RelationshipDetector::new(storage.clone(), DetectorConfig::default());
    detector.detect_all();

    let device = edges_of(&*storage, RelationshipType::SameDevice);
    assert_eq!(device.len(), 3);
    for (a, b) in [(&t1, &t2), (&t1, &t3), (&t2, &t3)] {
        assert!(device
            .iter()
            .any(|e| e.links(a.id(), b.id(), RelationshipType::SameDevice)));
    }
}

#[test]
fn test_detect_all_twice_creates_nothing_new() {
    let (storage, _temp) = create_test_storage();
    for i in 0..5 {
        put(
            &*storage,
            Person::new()
                .with_email(&format!("user{}@example.com", i % 2))
                .with_phone("555-0100")
                .with_address(if i < 3 { "1 Elm St" } else { "9 Oak Ave" }),
        );
        put(
            &*storage,
            Transaction::new()
                .with_device("device_001")
                .with_ip(if i % 2 == 0 { "10.0.0.5" } else { "10.0.0.15" })
                .with_payment_method("paypal"),
        );
    }

    let detector = RelationshipDetector::new(storage.clone(), DetectorConfig::default());
    let first = detector.detect_all();
    assert!(first.edges_created() > 0);
    let before = storage.stats().unwrap();

    let second = detector.detect_all();
    assert_eq!(second.edges_created(), 0);

    let after = storage.stats().unwrap();
    for relationship in RelationshipType::all() {
        assert_eq!(before.connections_of(relationship), after.connections_of(relationship));
    }
}

#[test]
fn test_pair_completeness_for_group_sizes() {
    for k in [2u64, 3, 5] {
        let (storage, _temp) = create_test_storage();
        for _ in 0..k {
            put(&*storage, Transaction::new().with_ip("203.0.113.1"));
        }

        let detector = RelationshipDetector::new(storage.clone(), DetectorConfig::default());
        detector.detect_all();

        let edges = edges_of(&*storage, RelationshipType::SameIp);
        assert_eq!(edges.len() as u64, k * (k - 1) / 2, "group size {}", k);
        assert!(edges.iter().all(|e| e.endpoint_a != e.endpoint_b));
    }
}

#[test]
fn test_pairwise_alone_when_bulk_fails() {
    let (storage, _temp) = create_no_bulk_storage();
    put(&*storage, Person::new().with_phone("555-0100").with_address("1 Elm St"));
    put(&*storage, Person::new().with_phone("555-0100").with_address("1 Elm St"));
    put(&*storage, Person::new().with_phone("555-0100"));

    let detector = RelationshipDetector::new(storage.clone(), DetectorConfig::default());
    let report = detector.detect_all();

    assert!(!report.bulk_succeeded);
    // The bulk phase stops at its first failure
    assert_eq!(storage.merge_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.bulk_failures.len(), 1);
    assert!(report.is_complete());
    assert_eq!(report.pairwise_edges_created, 4);
    assert_eq!(edges_of(&*storage, RelationshipType::SharesPhone).len(), 3);
    assert_eq!(edges_of(&*storage, RelationshipType::SharesAddress).len(), 1);

    let again = detector.detect_all();
    assert_eq!(again.edges_created(), 0);
}

#[test]
fn test_detect_for_entity_falls_back_per_attribute() {
    let (storage, _temp) = create_no_bulk_storage();
    put(&*storage, Transaction::new().with_device("D1").with_ip("10.0.0.5"));
    let trigger = put(&*storage, Transaction::new().with_device("D1").with_ip("10.0.0.5"));

    let detector = RelationshipDetector::new(storage.clone(), DetectorConfig::default());
    let report = detector.detect_for_entity(&trigger);

    // One bulk attempt per non-empty attribute, each failing on its own
    assert_eq!(storage.merge_calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.bulk_failures.len(), 2);
    assert!(!report.bulk_succeeded);
    assert_eq!(report.pairwise_edges_created, 2);
    assert_eq!(total_edges(&*storage), 2);
}

#[test]
fn test_detect_for_entity_skips_blank_attributes() {
    let (storage, _temp) = create_no_bulk_storage();
    put(&*storage, Person::new().with_email("a@example.com").with_phone("  "));
    let trigger = put(&*storage, Person::new().with_email("a@example.com").with_phone("  "));

    let detector = RelationshipDetector::new(storage.clone(), DetectorConfig::default());
    let report = detector.detect_for_entity(&trigger);

    assert_eq!(storage.merge_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.pairwise_edges_created, 1);
    assert!(edges_of(&*storage, RelationshipType::SharesPhone).is_empty());
    assert_eq!(edges_of(&*storage, RelationshipType::SharesEmail).len(), 1);
}

#[test]
fn test_detect_for_entity_reconciles_whole_population() {
    let (storage, _temp) = create_test_storage();
    // An older pair sharing a phone that was never linked
    let old_a = put(&*storage, Person::new().with_phone("555-0142"));
    let old_b = put(&*storage, Person::new().with_phone("555-0142"));
    let trigger = put(&*storage, Person::new().with_phone("555-0100"));

    let detector = RelationshipDetector::new(
        storage.clone(),
        DetectorConfig::new().with_bulk_enabled(false),
    );
    let report = detector.detect_for_entity(&trigger);

    assert!(!report.bulk_succeeded);
    assert_eq!(report.pairwise_edges_created, 1);
    let phone = edges_of(&*storage, RelationshipType::SharesPhone);
    assert!(phone[0].links(old_a.id(), old_b.id(), RelationshipType::SharesPhone));
}

#[test]
fn test_touched_scope_leaves_other_groups_alone() {
    let (storage, _temp) = create_test_storage();
    put(&*storage, Person::new().with_phone("555-0142"));
    put(&*storage, Person::new().with_phone("555-0142"));
    put(&*storage, Person::new().with_phone("555-0100"));
    let trigger = put(&*storage, Person::new().with_phone("555-0100"));

    let detector = RelationshipDetector::new(
        storage.clone(),
        DetectorConfig::new()
            .with_bulk_enabled(false)
            .with_reconcile_scope(ReconcileScope::TouchedValues),
    );
    let report = detector.detect_for_entity(&trigger);

    assert_eq!(report.pairwise_edges_created, 1);
    let phone = edges_of(&*storage, RelationshipType::SharesPhone);
    assert_eq!(phone.len(), 1);
    assert_eq!(phone[0].shared_value, "555-0100");
}

#[test]
fn test_detect_for_entity_without_attributes() {
    let (storage, _temp) = create_test_storage();
    let trigger = put(&*storage, Transaction::new().with_amount(12.5, "INR"));

    let detector = RelationshipDetector::new(storage.clone(), DetectorConfig::default());
    let report = detector.detect_for_entity(&trigger);

    assert!(report.bulk_succeeded);
    assert_eq!(report.edges_created(), 0);
    assert!(report.is_complete());
}

#[test]
fn test_concurrent_detection_creates_each_pair_once() {
    let (storage, _temp) = create_test_storage();
    let mut entities = Vec::new();
    for _ in 0..6 {
        entities.push(put(&*storage, Transaction::new().with_payment_method("crypto")));
    }

    let handles: Vec<_> = entities
        .into_iter()
        .map(|entity| {
            let storage = storage.clone();
            std::thread::spawn(move || {
                let detector = RelationshipDetector::new(
                    storage,
                    DetectorConfig::new().with_bulk_enabled(false),
                );
                detector.detect_for_entity(&entity)
            })
        })
        .collect();

    let created: u64 = handles
        .into_iter()
        .map(|h| h.join().unwrap().pairwise_edges_created)
        .sum();

    assert_eq!(created, 15);
    assert_eq!(edges_of(&*storage, RelationshipType::SamePaymentMethod).len(), 15);
}

#[test]
fn test_report_serializes() {
    let report = DetectionReport::new();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["bulk_succeeded"], serde_json::json!(true));
    assert_eq!(json["duration"], serde_json::json!(0));
}
