//! Daqconf - Beamline configuration file converter
//!
//! Converts configuration files to JSON and answers lookup-table and
//! insertion-device calibration queries from the command line.

mod config;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use daqconf_core::{ConfigModel, DispatchMap, Orchestrator, Pol};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "daqconf")]
#[command(about = "Beamline configuration file converter")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "daqconf.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a file and print it as JSON
    Convert {
        path: PathBuf,
        /// Print on a single line
        #[arg(long)]
        compact: bool,
    },
    /// List the paths that have a converter
    Paths,
    /// Evaluate the calibration polynomial of an insertion-device table
    Poly {
        path: PathBuf,
        /// Polarisation mode (lh, lv, pc, nc, la, lh3, lv3)
        #[arg(long)]
        pol: Pol,
        #[arg(long)]
        energy: f64,
    },
    /// Look a value up in a lookup table
    Lookup {
        path: PathBuf,
        /// Column to search
        #[arg(long)]
        search: String,
        #[arg(long)]
        value: f64,
        /// Column to return
        #[arg(long)]
        target: String,
        /// Use the nearest row instead of requiring an exact match
        #[arg(long)]
        nearest: bool,
    },
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration is read before logging starts, so the level can come from it
    let config = config::load_config(&args.config)?;
    let level = parse_level(args.log_level.as_deref().unwrap_or(&config.logging.level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Daqconf v{}", env!("CARGO_PKG_VERSION"));

    let dispatch = Arc::new(DispatchMap::from_config(&config.dispatch));
    info!(paths = dispatch.len(), "Dispatch map ready");
    let orchestrator = Orchestrator::new(dispatch);

    match args.command {
        Command::Convert { path, compact } => {
            let value = orchestrator.get_converted_file_contents(&path)?;
            let output = if compact {
                serde_json::to_string(&value)?
            } else {
                serde_json::to_string_pretty(&value)?
            };
            println!("{}", output);
        }
        Command::Paths => {
            for path in orchestrator.dispatch().paths() {
                let name = orchestrator
                    .dispatch()
                    .get(path)
                    .map(|c| c.name())
                    .unwrap_or_default();
                println!("{}\t{}", path, name);
            }
        }
        Command::Poly { path, pol, energy } => {
            let ConfigModel::InsertionDevice(table) = orchestrator.convert_model(&path)? else {
                bail!("{} is not an insertion-device calibration table", path.display());
            };
            let poly = table.get_poly(energy, pol)?;
            println!("coefficients: {:?}", poly.coefficients());
            println!("value: {}", poly.evaluate(energy));
        }
        Command::Lookup {
            path,
            search,
            value,
            target,
            nearest,
        } => {
            let ConfigModel::LookupTable(table) = orchestrator.convert_model(&path)? else {
                bail!("{} is not a lookup table", path.display());
            };
            let found = table.get_value(&search, value, &target, !nearest)?;
            println!("{}", found);
        }
    }

    Ok(())
}
