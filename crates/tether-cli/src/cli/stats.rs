use crate::cli::open;
use crate::config::Config;
use anyhow::Result;
use tether_core::{EntityKind, RelationshipType};

pub fn run(config: &Config) -> Result<()> {
    let tether = open(config)?;
    let stats = tether.stats()?;

    if config.json() {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_mb = stats.db_size_bytes as f64 / 1_048_576.0;

    println!();
    println!("Relationship Overview");
    println!("{}", "─".repeat(50));
    println!("Entities:    {:>8}", stats.entity_count);
    for kind in EntityKind::all() {
        println!("  {:22} {:>8}", kind, stats.entities_of(kind));
    }

    println!("Connections: {:>8}", stats.connection_count);
    for relationship in RelationshipType::all() {
        println!("  {:22} {:>8}", relationship, stats.connections_of(relationship));
    }

    println!("DB Size:     {:>7.1} MB", db_mb);
    println!("{}", "─".repeat(50));
    println!();

    Ok(())
}
