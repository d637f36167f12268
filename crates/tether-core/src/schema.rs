//! Attribute configuration table.
//!
//! Maps each entity kind to the attributes it is linked on. The matchers and
//! the detector iterate this table instead of carrying per-kind code.

use crate::types::{Entity, EntityKind, RelationshipType};
use std::collections::HashMap;

/// One matchable attribute of an entity kind
#[derive(Clone, Copy)]
pub struct AttributeSpec {
    /// Attribute name as used by `merge_on_pattern`.
    pub name: &'static str,

    /// Relationship created when two entities share this attribute.
    pub relationship: RelationshipType,

    /// Reads the raw attribute value. `None` for the wrong entity kind.
    pub extract: fn(&Entity) -> Option<&str>,
}

impl AttributeSpec {
    /// The attribute value if present and not blank
    pub fn value<'a>(&self, entity: &'a Entity) -> Option<&'a str> {
        (self.extract)(entity).filter(|v| !v.trim().is_empty())
    }
}

impl std::fmt::Debug for AttributeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeSpec")
            .field("name", &self.name)
            .field("relationship", &self.relationship)
            .finish()
    }
}

fn person_email(e: &Entity) -> Option<&str> {
    match e {
        Entity::Person(p) => p.email.as_deref(),
        _ => None,
    }
}

fn person_phone(e: &Entity) -> Option<&str> {
    match e {
        Entity::Person(p) => p.phone.as_deref(),
        _ => None,
    }
}

fn person_address(e: &Entity) -> Option<&str> {
    match e {
        Entity::Person(p) => p.address.as_deref(),
        _ => None,
    }
}

fn transaction_device(e: &Entity) -> Option<&str> {
    match e {
        Entity::Transaction(t) => t.device_id.as_deref(),
        _ => None,
    }
}

fn transaction_ip(e: &Entity) -> Option<&str> {
    match e {
        Entity::Transaction(t) => t.ip_address.as_deref(),
        _ => None,
    }
}

fn transaction_payment_method(e: &Entity) -> Option<&str> {
    match e {
        Entity::Transaction(t) => t.payment_method.as_deref(),
        _ => None,
    }
}

static PERSON_ATTRIBUTES: [AttributeSpec; 3] = [
    AttributeSpec {
        name: "email",
        relationship: RelationshipType::SharesEmail,
        extract: person_email,
    },
    AttributeSpec {
        name: "phone",
        relationship: RelationshipType::SharesPhone,
        extract: person_phone,
    },
    AttributeSpec {
        name: "address",
        relationship: RelationshipType::SharesAddress,
        extract: person_address,
    },
];

static TRANSACTION_ATTRIBUTES: [AttributeSpec; 3] = [
    AttributeSpec {
        name: "device_id",
        relationship: RelationshipType::SameDevice,
        extract: transaction_device,
    },
    AttributeSpec {
        name: "ip_address",
        relationship: RelationshipType::SameIp,
        extract: transaction_ip,
    },
    AttributeSpec {
        name: "payment_method",
        relationship: RelationshipType::SamePaymentMethod,
        extract: transaction_payment_method,
    },
];

/// Matchable attributes of `kind`, in detection order
pub fn attributes_for(kind: EntityKind) -> &'static [AttributeSpec] {
    match kind {
        EntityKind::Person => &PERSON_ATTRIBUTES,
        EntityKind::Transaction => &TRANSACTION_ATTRIBUTES,
    }
}

/// Look up one attribute of `kind` by name
pub fn attribute(kind: EntityKind, name: &str) -> Option<&'static AttributeSpec> {
    attributes_for(kind).iter().find(|a| a.name == name)
}

/// A set of entities sharing one attribute value
#[derive(Debug)]
pub struct ValueGroup<'a> {
    pub value: &'a str,
    pub members: Vec<&'a Entity>,
}

/// Group entities by the raw value of `attribute`.
///
/// Blank and missing values are dropped. Groups come out in first-seen
/// order and members keep their order from `entities`.
pub fn group_by_value<'a>(entities: &'a [Entity], attribute: &AttributeSpec) -> Vec<ValueGroup<'a>> {
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut groups: Vec<ValueGroup<'a>> = Vec::new();

    for entity in entities {
        let value = match attribute.value(entity) {
            Some(v) => v,
            None => continue,
        };
        match index.get(value) {
            Some(&i) => groups[i].members.push(entity),
            None => {
                index.insert(value, groups.len());
                groups.push(ValueGroup {
                    value,
                    members: vec![entity],
                });
            }
        }
    }

    groups
}

/// All unordered pairs `(members[i], members[j])` with `i < j`
pub fn unordered_pairs<'a, T>(members: &'a [T]) -> impl Iterator<Item = (&'a T, &'a T)> + 'a {
    members
        .iter()
        .enumerate()
        .flat_map(move |(i, a)| members[i + 1..].iter().map(move |b| (a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Person, Transaction};

    #[test]
    fn test_table_covers_every_relationship_once() {
        let mut seen = Vec::new();
        for kind in EntityKind::all() {
            for attr in attributes_for(kind) {
                assert_eq!(attr.relationship.kind(), kind);
                seen.push(attr.relationship);
            }
        }
        seen.sort();
        assert_eq!(seen, RelationshipType::all().to_vec());
    }

    #[test]
    fn test_attribute_lookup() {
        assert_eq!(
            attribute(EntityKind::Transaction, "ip_address").map(|a| a.relationship),
            Some(RelationshipType::SameIp)
        );
        assert!(attribute(EntityKind::Person, "ip_address").is_none());
    }

    #[test]
    fn test_grouping_skips_blank_values_and_keeps_order() {
        let entities: Vec<Entity> = vec![
            Person::new().with_phone("555-0100").into(),
            Person::new().with_phone("   ").into(),
            Person::new().into(),
            Person::new().with_phone("555-0199").into(),
            Person::new().with_phone("555-0100").into(),
        ];
        let phone = attribute(EntityKind::Person, "phone").unwrap();
        let groups = group_by_value(&entities, phone);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].value, "555-0100");
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[0].members[0].id(), entities[0].id());
        assert_eq!(groups[0].members[1].id(), entities[4].id());
        assert_eq!(groups[1].value, "555-0199");
    }

    #[test]
    fn test_grouping_compares_raw_values() {
        let entities: Vec<Entity> = vec![
            Transaction::new().with_device("D9").into(),
            Transaction::new().with_device("d9").into(),
            Transaction::new().with_device(" D9").into(),
        ];
        let device = attribute(EntityKind::Transaction, "device_id").unwrap();
        assert_eq!(group_by_value(&entities, device).len(), 3);
    }

    #[test]
    fn test_extract_wrong_kind_is_none() {
        let tx: Entity = Transaction::new().with_device("D1").into();
        let email = attribute(EntityKind::Person, "email").unwrap();
        assert_eq!(email.value(&tx), None);
    }

    #[test]
    fn test_unordered_pairs() {
        let items = [1, 2, 3];
        let pairs: Vec<_> = unordered_pairs(&items).map(|(a, b)| (*a, *b)).collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3), (2, 3)]);
        assert_eq!(unordered_pairs(&[7]).count(), 0);
    }
}
