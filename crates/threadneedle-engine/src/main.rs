//! Command shell for the Threadneedle simulation.
//!
//! # Usage
//!
//! ```text
//! threadneedle-engine [CONFIG] [--batch FILE] [--restore SNAPSHOT] [--run]
//! ```
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `CONFIG`, else `threadneedle.yaml` in the
//!    working directory, else built-in defaults
//! 2. Initialize structured logging (tracing) on stderr
//! 3. Validate the command table
//! 4. Build the world, or restore it from a snapshot
//! 5. Run `world.max_steps` steps (`--run`), or read commands from the
//!    batch file or stdin until `quit` or end of input
//!
//! A step that breaks the books prints the full state dump and ends the
//! process with an error.

mod shell;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use clap::Parser;
use threadneedle_core::{Snapshot, SimulationConfig, StepError, World, validate_commands, COMMANDS};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Configuration read when no path is given.
const DEFAULT_CONFIG: &str = "threadneedle.yaml";

/// Parsed command line.
#[derive(Debug, Parser)]
#[command(name = "threadneedle-engine")]
#[command(about = "Run the Threadneedle economy simulation", long_about = None)]
struct Args {
    /// Configuration file (default: threadneedle.yaml if present)
    config: Option<PathBuf>,

    /// Read commands from a file instead of stdin
    #[arg(long, value_name = "FILE")]
    batch: Option<PathBuf>,

    /// Start from a saved snapshot instead of the configuration
    #[arg(long, value_name = "SNAPSHOT")]
    restore: Option<PathBuf>,

    /// Run `world.max_steps` steps, print the state dump and exit
    #[arg(long, conflicts_with = "batch")]
    run: bool,
}

/// Application entry point.
///
/// # Errors
///
/// Bad arguments or configuration, a failed restore, or a failed step.
fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    init_logging(&config);
    info!(
        world_name = %config.world.name,
        seed = config.world.seed,
        max_steps = config.world.max_steps,
        "threadneedle-engine starting"
    );

    validate_commands(COMMANDS)?;

    let mut world = match &args.restore {
        Some(path) => Snapshot::load(path)
            .and_then(Snapshot::restore)
            .with_context(|| format!("restoring {}", path.display()))?,
        None => World::new(config)?,
    };

    if args.run {
        let steps = world.config().world.max_steps;
        if let Err(err) = world.run(steps) {
            return Err(abort(err));
        }
        println!("{}", world.dump());
        info!(steps, "run complete");
        return Ok(());
    }

    match &args.batch {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("opening batch file {}", path.display()))?;
            shell::run(&mut world, std::io::BufReader::new(file), false)?;
        }
        None => shell::run(&mut world, std::io::stdin().lock(), true)?,
    }
    info!(step = world.current_step(), "threadneedle-engine shutdown complete");
    Ok(())
}

/// Load configuration from `path`, or from [`DEFAULT_CONFIG`] when present.
fn load_config(path: Option<&Path>) -> anyhow::Result<SimulationConfig> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG));
    if path.exists() {
        return SimulationConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()));
    }
    if path != Path::new(DEFAULT_CONFIG) {
        bail!("config file {} not found", path.display());
    }
    let mut config = SimulationConfig::default();
    config.apply_env_overrides()?;
    Ok(config)
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(config: &SimulationConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Print what a failed step leaves behind and turn it into the process
/// error.
fn abort(err: StepError) -> anyhow::Error {
    if let StepError::Anomaly { dump, .. } = &err {
        eprintln!("{dump}");
    }
    anyhow::Error::new(err).context("simulation aborted")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("threadneedle-engine").chain(raw.iter().copied()))
    }

    #[test]
    fn options_parse_in_any_order() {
        let parsed = args(&["--restore", "snap.json", "econ.yaml", "--batch", "cmds.txt"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("econ.yaml")));
        assert_eq!(parsed.batch, Some(PathBuf::from("cmds.txt")));
        assert_eq!(parsed.restore, Some(PathBuf::from("snap.json")));
        assert!(!parsed.run);

        let parsed = args(&["--run"]).unwrap();
        assert!(parsed.run);
        assert!(parsed.config.is_none());
    }

    #[test]
    fn bad_command_lines_are_refused() {
        assert!(args(&["--batch"]).is_err());
        assert!(args(&["--fast"]).is_err());
        assert!(args(&["a.yaml", "b.yaml"]).is_err());
        assert!(args(&["--run", "--batch", "cmds.txt"]).is_err());
    }

    #[test]
    fn missing_named_config_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/threadneedle.yaml"))).is_err());
    }
}
