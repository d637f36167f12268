use clap::Parser;
use std::path::PathBuf;
use tether_core::{DetectorConfig, LibraryConfig, ReconcileScope};

/// Options shared by every subcommand.
#[derive(Parser, Debug, Clone)]
pub struct Config {
    /// Data directory
    #[arg(long, global = true, env = "TETHER_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Skip the store's bulk merge and detect with the pairwise matcher only
    #[arg(long, global = true, env = "TETHER_BULK_DISABLED")]
    pub no_bulk: bool,

    /// Pairwise scope after a single write: population, touched
    #[arg(long, global = true, env = "TETHER_RECONCILE_SCOPE", default_value = "population")]
    pub reconcile_scope: ReconcileScope,

    /// Output format: table (default), json
    #[arg(long, global = true, default_value = "table")]
    pub format: String,
}

impl Config {
    pub fn library_config(&self) -> LibraryConfig {
        LibraryConfig::new().with_detector(
            DetectorConfig::new()
                .with_bulk_enabled(!self.no_bulk)
                .with_reconcile_scope(self.reconcile_scope),
        )
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("tether.redb")
    }

    pub fn json(&self) -> bool {
        self.format == "json"
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.format.as_str(), "table" | "json") {
            anyhow::bail!("Unknown output format '{}' (expected table or json)", self.format);
        }
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            no_bulk: false,
            reconcile_scope: ReconcileScope::Population,
            format: "table".to_string(),
        }
    }
}
