mod cli;
mod config;

use clap::Parser;
use cli::{Cli, Commands};
use tracing::debug;

fn main() -> anyhow::Result<()> {
    // log records from tether-core are bridged into this subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { config, command } = Cli::parse();
    config.validate()?;

    debug!("Data: {:?}", config.data_dir);

    match command {
        Commands::Person(cmd) => cli::entity::run_person(cmd, &config),
        Commands::Transaction(cmd) => cli::entity::run_transaction(cmd, &config),
        Commands::Detect(args) => cli::detect::run(args, &config),
        Commands::Connections(args) => cli::connections::run(args, &config),
        Commands::Edges(args) => cli::connections::run_edges(args, &config),
        Commands::Stats => cli::stats::run(&config),
        Commands::Import(args) => cli::import::run(args, &config),
    }
}
