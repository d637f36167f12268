pub mod connections;
pub mod detect;
pub mod entity;
pub mod import;
pub mod stats;

use crate::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tether_core::{attributes_for, DetectionReport, Entity, EntityId, RelationshipType, Tether};

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(version, about = "Link people and transactions that share an attribute value")]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Person operations
    #[command(subcommand)]
    Person(PersonCommands),
    /// Transaction operations
    #[command(subcommand, alias = "tx")]
    Transaction(TransactionCommands),
    /// Run relationship detection for one entity, or for everything
    Detect(DetectArgs),
    /// Show the connections of an entity
    Connections(ConnectionsArgs),
    /// List every connection of one relationship type
    Edges(EdgesArgs),
    /// Entity and connection counts
    Stats,
    /// Import entities from a JSON or JSON-lines file
    Import(ImportArgs),
}

#[derive(Subcommand, Debug)]
pub enum PersonCommands {
    Create(PersonFields),
    Update(PersonUpdateArgs),
    Get(EntityIdArgs),
    List,
    Delete(DeleteArgs),
}

#[derive(Subcommand, Debug)]
pub enum TransactionCommands {
    Create(TransactionFields),
    Update(TransactionUpdateArgs),
    Get(EntityIdArgs),
    List,
    Delete(DeleteArgs),
}

// --- Entity args ---

#[derive(Args, Debug, Default)]
pub struct PersonFields {
    #[arg(long)]
    pub first_name: Option<String>,
    #[arg(long)]
    pub last_name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
}

#[derive(Args, Debug)]
pub struct PersonUpdateArgs {
    pub id: String,
    #[command(flatten)]
    pub fields: PersonFields,
}

#[derive(Args, Debug, Default)]
pub struct TransactionFields {
    #[arg(long)]
    pub amount: Option<f64>,
    #[arg(long)]
    pub currency: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub device_id: Option<String>,
    #[arg(long)]
    pub ip_address: Option<String>,
    #[arg(long)]
    pub payment_method: Option<String>,
}

#[derive(Args, Debug)]
pub struct TransactionUpdateArgs {
    pub id: String,
    #[command(flatten)]
    pub fields: TransactionFields,
}

#[derive(Args, Debug)]
pub struct EntityIdArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub id: String,
    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

// --- Detection and read args ---

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Entity to detect for. Omit to run full detection.
    pub id: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConnectionsArgs {
    pub id: String,
    /// One row per connection instead of one per counterpart
    #[arg(long)]
    pub details: bool,
}

#[derive(Args, Debug)]
pub struct EdgesArgs {
    /// e.g. SHARES_PHONE, same-device
    pub relationship: RelationshipType,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub file: PathBuf,
    /// json or jsonl. Guessed from the extension when omitted.
    #[arg(long)]
    pub input_format: Option<String>,
    /// Write everything first, then run one full detection pass
    #[arg(long)]
    pub detect_at_end: bool,
    /// Parse and print, write nothing
    #[arg(long)]
    pub dry_run: bool,
}

pub fn open(config: &Config) -> Result<Tether> {
    let path = config.db_path();
    Tether::open(&path, config.library_config())
        .with_context(|| format!("Failed to open database at {}", path.display()))
}

pub fn parse_id(id: &str) -> Result<EntityId> {
    id.parse::<EntityId>()
        .with_context(|| format!("Invalid entity id '{}'", id))
}

// --- Table printing helpers ---

pub fn print_entity_table(entities: &[Entity]) {
    if entities.is_empty() {
        println!("(no results)");
        return;
    }
    println!("{:<36}  {:<12}  {:<20}  {}", "ID", "KIND", "LABEL", "ATTRIBUTES");
    println!("{}", "─".repeat(110));
    for e in entities {
        println!(
            "{:<36}  {:<12}  {:<20}  {}",
            e.id(),
            e.kind(),
            truncate(&e.label(), 20),
            describe(e)
        );
    }
}

/// Matching attributes as `name=value`, blanks omitted
pub fn describe(entity: &Entity) -> String {
    attributes_for(entity.kind())
        .iter()
        .filter_map(|attr| attr.value(entity).map(|v| format!("{}={}", attr.name, v)))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn print_report(report: &DetectionReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Detection: {}", report.summary());
    for failure in &report.bulk_failures {
        println!("  bulk fallback: {}", failure);
    }
    for error in &report.errors {
        println!("  error: {}", error);
    }
    Ok(())
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max - 1).collect::<String>())
    }
}
