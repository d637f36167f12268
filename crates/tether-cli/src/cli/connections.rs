use crate::cli::{describe, open, parse_id, ConnectionsArgs, EdgesArgs};
use crate::config::Config;
use anyhow::Result;
use tether_core::{AggregatedConnectionView, ConnectionDetail};

pub fn run(args: ConnectionsArgs, config: &Config) -> Result<()> {
    let tether = open(config)?;
    let id = parse_id(&args.id)?;

    if args.details {
        let details = tether.connection_details(id)?;
        if config.json() {
            println!("{}", serde_json::to_string_pretty(&details)?);
        } else {
            print_detail_table(&details);
        }
    } else {
        let views = tether.connections_for(id)?;
        if config.json() {
            println!("{}", serde_json::to_string_pretty(&views)?);
        } else {
            print_view_table(&views);
        }
    }
    Ok(())
}

pub fn run_edges(args: EdgesArgs, config: &Config) -> Result<()> {
    let tether = open(config)?;
    let edges = tether.edges_by_relationship(args.relationship)?;

    if config.json() {
        println!("{}", serde_json::to_string_pretty(&edges)?);
        return Ok(());
    }

    if edges.is_empty() {
        println!("(no connections)");
        return Ok(());
    }
    println!("{:<8}  {:<36}  {:<36}  {}", "ID", "FROM", "TO", "SHARED VALUE");
    println!("{}", "─".repeat(110));
    for e in &edges {
        println!(
            "{:<8}  {:<36}  {:<36}  {}",
            e.id, e.endpoint_a, e.endpoint_b, e.shared_value
        );
    }
    println!("Total: {} {} connections", edges.len(), args.relationship);
    Ok(())
}

fn print_view_table(views: &[AggregatedConnectionView]) {
    if views.is_empty() {
        println!("(no connections)");
        return;
    }
    println!("{:<36}  {:<40}  {:<20}  {}", "COUNTERPART", "RELATIONSHIPS", "SINCE", "ATTRIBUTES");
    println!("{}", "─".repeat(120));
    for v in views {
        let relationships = v
            .relationship_types
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<36}  {:<40}  {:<20}  {}",
            v.counterpart.id(),
            relationships,
            v.earliest_created_at.format("%Y-%m-%d %H:%M:%S"),
            describe(&v.counterpart)
        );
    }
}

fn print_detail_table(details: &[ConnectionDetail]) {
    if details.is_empty() {
        println!("(no connections)");
        return;
    }
    println!("{:<36}  {:<20}  {:<20}  {}", "COUNTERPART", "RELATIONSHIP", "CREATED", "SHARED VALUE");
    println!("{}", "─".repeat(110));
    for d in details {
        println!(
            "{:<36}  {:<20}  {:<20}  {}",
            d.counterpart.id(),
            d.relationship,
            d.created_at.format("%Y-%m-%d %H:%M:%S"),
            d.shared_value
        );
    }
}
