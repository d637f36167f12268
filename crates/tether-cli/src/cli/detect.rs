use crate::cli::{open, parse_id, print_report, DetectArgs};
use crate::config::Config;
use anyhow::Result;

pub fn run(args: DetectArgs, config: &Config) -> Result<()> {
    let tether = open(config)?;

    let report = match args.id {
        Some(id) => tether.detect_for_entity(parse_id(&id)?)?,
        None => tether.detect_all(),
    };

    print_report(&report, config.json())?;

    // Incomplete passes exit non-zero
    if !report.is_complete() {
        anyhow::bail!("Detection finished with {} error(s)", report.errors.len());
    }
    Ok(())
}
