use crate::cli::{describe, print_report, ImportArgs};
use crate::config::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tether_core::{Entity, EntityKind, Person, Tether, Transaction};

pub fn run(args: ImportArgs, config: &Config) -> Result<()> {
    let path = &args.file;

    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }

    // Determine format
    let format = args.input_format.clone().unwrap_or_else(|| {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") | Some("ndjson") => "jsonl",
            _ => "json",
        }
        .to_string()
    });

    println!("Importing {} as {} format...", path.display(), format);

    let entities = match format.as_str() {
        "json" => import_json(path)?,
        "jsonl" => import_jsonl(path)?,
        other => anyhow::bail!("Unknown format: {}", other),
    };

    println!("Parsed {} entities", entities.len());

    if args.dry_run {
        println!("Dry run, no changes written.");
        for entity in &entities {
            println!("  [{}] {} {}", entity.kind(), entity.id(), describe(entity));
        }
        return Ok(());
    }

    let library = config
        .library_config()
        .with_detect_on_write(!args.detect_at_end);
    let tether = Tether::open(config.db_path(), library)
        .with_context(|| format!("Failed to open database at {}", config.db_path().display()))?;

    let mut imported = 0;
    let mut errors = 0;
    let mut edges_created = 0;

    for entity in entities {
        let id = entity.id();
        let written = match tether.get(id) {
            Ok(Some(_)) => tether.update(entity),
            Ok(None) => tether.create(entity),
            Err(e) => Err(e),
        };

        match written {
            Ok(outcome) => {
                imported += 1;
                if let Some(report) = outcome.detection {
                    edges_created += report.edges_created();
                }
            }
            Err(e) => {
                eprintln!("  Error storing {}: {}", id, e);
                errors += 1;
            }
        }
    }

    println!("Imported {} entities ({} errors)", imported, errors);

    if args.detect_at_end {
        let report = tether.detect_all();
        print_report(&report, config.json())?;
    } else {
        println!("Created {} connections during import", edges_created);
    }

    Ok(())
}

fn import_json(path: &Path) -> Result<Vec<Entity>> {
    let content = std::fs::read_to_string(path)?;
    let records: Vec<Value> =
        serde_json::from_str(&content).context("Failed to parse JSON array")?;
    records.iter().map(json_to_entity).collect()
}

fn import_jsonl(path: &Path) -> Result<Vec<Entity>> {
    let content = std::fs::read_to_string(path)?;
    parse_jsonl(&content)
}

fn parse_jsonl(content: &str) -> Result<Vec<Entity>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(n, line)| {
            let v: Value = serde_json::from_str(line)
                .with_context(|| format!("Failed to parse JSONL line {}", n + 1))?;
            json_to_entity(&v)
        })
        .collect()
}

/// One flat record: `kind` plus the entity's own field names. `id` is
/// optional; a fresh one is assigned when it is missing.
fn json_to_entity(v: &Value) -> Result<Entity> {
    let kind_str = v["kind"]
        .as_str()
        .context("Record is missing a 'kind' field")?;
    let kind: EntityKind = kind_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid kind '{}': {}", kind_str, e))?;

    let text = |field: &str| v[field].as_str().map(String::from);

    let entity = match kind {
        EntityKind::Person => {
            let mut person = Person::new();
            person.first_name = text("first_name");
            person.last_name = text("last_name");
            person.email = text("email");
            person.phone = text("phone");
            person.address = text("address");
            Entity::Person(person)
        }
        EntityKind::Transaction => {
            let mut tx = Transaction::new();
            tx.amount = v["amount"].as_f64();
            tx.currency = text("currency");
            tx.status = text("status");
            tx.device_id = text("device_id");
            tx.ip_address = text("ip_address");
            tx.payment_method = text("payment_method");
            Entity::Transaction(tx)
        }
    };

    match v["id"].as_str() {
        Some(id) => {
            let id = id
                .parse()
                .with_context(|| format!("Invalid id '{}'", id))?;
            Ok(with_id(entity, id))
        }
        None => Ok(entity),
    }
}

fn with_id(entity: Entity, id: uuid::Uuid) -> Entity {
    match entity {
        Entity::Person(mut p) => {
            p.id = id;
            Entity::Person(p)
        }
        Entity::Transaction(mut t) => {
            t.id = id;
            Entity::Transaction(t)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ImportArgs;
    use tempfile::TempDir;
    use tether_core::{LibraryConfig, RelationshipType};

    #[test]
    fn test_json_to_person() {
        let v = serde_json::json!({
            "kind": "user",
            "first_name": "Asha",
            "email": "asha@example.com",
            "phone": "555-0100"
        });
        let entity = json_to_entity(&v).unwrap();
        assert_eq!(entity.kind(), EntityKind::Person);
        assert_eq!(describe(&entity), "email=asha@example.com phone=555-0100");
    }

    #[test]
    fn test_json_to_transaction_keeps_id() {
        let id = uuid::Uuid::now_v7();
        let v = serde_json::json!({
            "kind": "transaction",
            "id": id.to_string(),
            "amount": 120.5,
            "currency": "INR",
            "device_id": "device_001"
        });
        let entity = json_to_entity(&v).unwrap();
        assert_eq!(entity.id(), id);
        match entity {
            Entity::Transaction(t) => {
                assert_eq!(t.amount, Some(120.5));
                assert_eq!(t.device_id.as_deref(), Some("device_001"));
            }
            other => panic!("expected transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_or_bad_kind_is_rejected() {
        assert!(json_to_entity(&serde_json::json!({ "email": "a@example.com" })).is_err());
        assert!(json_to_entity(&serde_json::json!({ "kind": "device" })).is_err());
        assert!(json_to_entity(&serde_json::json!({ "kind": "person", "id": "nope" })).is_err());
    }

    #[test]
    fn test_parse_jsonl_skips_blank_lines() {
        let content = r#"{"kind":"tx","ip_address":"10.0.0.5"}

{"kind":"tx","ip_address":"10.0.0.5"}
"#;
        assert_eq!(parse_jsonl(content).unwrap().len(), 2);
        assert!(parse_jsonl("{\"kind\":\"tx\"}\nnot json").is_err());
    }

    #[test]
    fn test_import_file_detects_at_end() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("people.jsonl");
        std::fs::write(
            &file,
            "{\"kind\":\"person\",\"phone\":\"555-0100\"}\n\
             {\"kind\":\"person\",\"phone\":\"555-0100\"}\n\
             {\"kind\":\"person\",\"phone\":\"555-0199\"}\n",
        )
        .unwrap();

        let config = Config {
            data_dir: temp.path().join("data"),
            ..Config::default()
        };
        config.validate().unwrap();

        run(
            ImportArgs {
                file,
                input_format: None,
                detect_at_end: true,
                dry_run: false,
            },
            &config,
        )
        .unwrap();

        let tether = Tether::open(config.db_path(), LibraryConfig::default()).unwrap();
        assert_eq!(tether.list(EntityKind::Person).unwrap().len(), 3);
        assert_eq!(
            tether
                .edges_by_relationship(RelationshipType::SharesPhone)
                .unwrap()
                .len(),
            1
        );
    }
}
