use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Type alias for entity identifiers
pub type EntityId = Uuid;

/// Type alias for connection identifiers. Assigned by the store from a
/// monotonically increasing sequence, so ordering by id is insertion order.
pub type ConnectionId = u64;

/// The two kinds of entity that take part in relationship detection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A customer. Linked on email, phone and address.
    Person,

    /// A payment. Linked on device id, IP address and payment method.
    Transaction,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Transaction => "transaction",
        }
    }

    pub fn all() -> [EntityKind; 2] {
        [EntityKind::Person, EntityKind::Transaction]
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "person" | "user" => Ok(EntityKind::Person),
            "transaction" | "tx" => Ok(EntityKind::Transaction),
            other => Err(format!("unknown entity kind '{}'", other)),
        }
    }
}

/// A person record as owned by the entity store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Person {
    /// Unique identifier. UUIDv7 for time-sortability.
    pub id: EntityId,

    pub first_name: Option<String>,
    pub last_name: Option<String>,

    /// Matching attributes. Compared as raw strings.
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    pub fn new() -> Self {
        let now = Utc::now();
        Person {
            id: Uuid::now_v7(),
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
            address: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, first: &str, last: &str) -> Self {
        self.first_name = Some(first.to_string());
        self.last_name = Some(last.to_string());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }
}

impl Default for Person {
    fn default() -> Self {
        Self::new()
    }
}

/// A payment transaction record as owned by the entity store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Unique identifier. UUIDv7 for time-sortability.
    pub id: EntityId,

    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub status: Option<String>,

    /// Matching attributes. Compared as raw strings.
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub payment_method: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction {
            id: Uuid::now_v7(),
            amount: None,
            currency: None,
            status: None,
            device_id: None,
            ip_address: None,
            payment_method: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_amount(mut self, amount: f64, currency: &str) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.to_string());
        self
    }

    pub fn with_device(mut self, device_id: &str) -> Self {
        self.device_id = Some(device_id.to_string());
        self
    }

    pub fn with_ip(mut self, ip_address: &str) -> Self {
        self.ip_address = Some(ip_address.to_string());
        self
    }

    pub fn with_payment_method(mut self, payment_method: &str) -> Self {
        self.payment_method = Some(payment_method.to_string());
        self
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only snapshot of an entity taken from the entity store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Person(Person),
    Transaction(Transaction),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Entity::Person(p) => p.id,
            Entity::Transaction(t) => t.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Person(_) => EntityKind::Person,
            Entity::Transaction(_) => EntityKind::Transaction,
        }
    }

    /// Short human-readable label for logs and tables
    pub fn label(&self) -> String {
        match self {
            Entity::Person(p) => match (&p.first_name, &p.last_name, &p.email) {
                (Some(first), Some(last), _) => format!("{} {}", first, last),
                (_, _, Some(email)) => email.clone(),
                _ => p.id.to_string(),
            },
            Entity::Transaction(t) => match (t.amount, &t.currency) {
                (Some(amount), Some(currency)) => format!("{:.2} {}", amount, currency),
                _ => t.id.to_string(),
            },
        }
    }
}

impl From<Person> for Entity {
    fn from(p: Person) -> Self {
        Entity::Person(p)
    }
}

impl From<Transaction> for Entity {
    fn from(t: Transaction) -> Self {
        Entity::Transaction(t)
    }
}

/// Which shared attribute produced a connection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    SharesEmail,
    SharesPhone,
    SharesAddress,
    SameDevice,
    SameIp,
    SamePaymentMethod,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::SharesEmail => "SHARES_EMAIL",
            RelationshipType::SharesPhone => "SHARES_PHONE",
            RelationshipType::SharesAddress => "SHARES_ADDRESS",
            RelationshipType::SameDevice => "SAME_DEVICE",
            RelationshipType::SameIp => "SAME_IP",
            RelationshipType::SamePaymentMethod => "SAME_PAYMENT_METHOD",
        }
    }

    /// The entity kind whose connection collection holds this type
    pub fn kind(&self) -> EntityKind {
        match self {
            RelationshipType::SharesEmail
            | RelationshipType::SharesPhone
            | RelationshipType::SharesAddress => EntityKind::Person,
            RelationshipType::SameDevice
            | RelationshipType::SameIp
            | RelationshipType::SamePaymentMethod => EntityKind::Transaction,
        }
    }

    pub fn all() -> [RelationshipType; 6] {
        [
            RelationshipType::SharesEmail,
            RelationshipType::SharesPhone,
            RelationshipType::SharesAddress,
            RelationshipType::SameDevice,
            RelationshipType::SameIp,
            RelationshipType::SamePaymentMethod,
        ]
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    /// Accepts `SHARES_PHONE`, `shares_phone` or `shares-phone`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_uppercase();
        RelationshipType::all()
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| format!("unknown relationship type '{}'", s))
    }
}

/// A persisted link between two entities of the same kind
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    /// Store-assigned, increasing in insertion order.
    pub id: ConnectionId,

    /// First endpoint. Order of the endpoints carries no meaning.
    pub endpoint_a: EntityId,

    /// Second endpoint.
    pub endpoint_b: EntityId,

    pub relationship: RelationshipType,

    /// The literal attribute value both endpoints share.
    pub shared_value: String,

    pub created_at: DateTime<Utc>,
}

impl Connection {
    /// Validate the invariants every stored connection must satisfy
    pub fn validate(
        endpoint_a: EntityId,
        endpoint_b: EntityId,
        shared_value: &str,
    ) -> Result<(), String> {
        if endpoint_a == endpoint_b {
            return Err("Self-connections are not allowed".to_string());
        }
        if shared_value.trim().is_empty() {
            return Err("Shared value must not be blank".to_string());
        }
        Ok(())
    }

    pub fn touches(&self, id: EntityId) -> bool {
        self.endpoint_a == id || self.endpoint_b == id
    }

    /// The endpoint that is not `id`
    pub fn counterpart(&self, id: EntityId) -> EntityId {
        if self.endpoint_a == id {
            self.endpoint_b
        } else {
            self.endpoint_a
        }
    }

    /// True if this connection links `a` and `b` with `relationship`, in either order
    pub fn links(&self, a: EntityId, b: EntityId, relationship: RelationshipType) -> bool {
        self.relationship == relationship
            && ((self.endpoint_a == a && self.endpoint_b == b)
                || (self.endpoint_a == b && self.endpoint_b == a))
    }
}

/// Every relationship between one entity and one counterpart, merged.
/// Built on read, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedConnectionView {
    pub counterpart: Entity,

    /// Distinct relationship types in discovery order.
    pub relationship_types: Vec<RelationshipType>,

    pub shared_values: BTreeMap<RelationshipType, String>,

    /// Oldest `created_at` among the merged connections.
    pub earliest_created_at: DateTime<Utc>,
}

impl AggregatedConnectionView {
    pub fn new(counterpart: Entity, connection: &Connection) -> Self {
        let mut shared_values = BTreeMap::new();
        shared_values.insert(connection.relationship, connection.shared_value.clone());
        Self {
            counterpart,
            relationship_types: vec![connection.relationship],
            shared_values,
            earliest_created_at: connection.created_at,
        }
    }

    /// Fold another connection to the same counterpart into this view
    pub fn merge(&mut self, connection: &Connection) {
        if !self.relationship_types.contains(&connection.relationship) {
            self.relationship_types.push(connection.relationship);
            self.shared_values
                .insert(connection.relationship, connection.shared_value.clone());
        }
        if connection.created_at < self.earliest_created_at {
            self.earliest_created_at = connection.created_at;
        }
    }
}

/// One connection seen from one of its endpoints, not merged
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionDetail {
    pub counterpart: Entity,
    pub relationship: RelationshipType,
    pub shared_value: String,
    pub created_at: DateTime<Utc>,
}
