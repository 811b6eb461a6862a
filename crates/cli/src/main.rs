//! marl-config - compose MARL experiment configs from the command line
//!
//! # Configuration
//!
//! Tool settings are loaded with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`MARL_CONFIG_*`)
//! 3. `marl-config.toml` in the current directory
//! 4. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `MARL_CONFIG_CONFIG_DIRS`: comma-separated search path
//! - `MARL_CONFIG_CONFIG_NAME`: primary config
//! - `MARL_CONFIG_FORMAT`: `yaml` or `json`
//! - `MARL_CONFIG_LOG_LEVEL`: log filter when `RUST_LOG` is unset
//! - `MARL_CONFIG_DEVICES`: device count for `--schedule`

mod settings;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use marl_config::{FileRepository, Override, OverrideOp, ResolvedConfig, Resolver, TrainingSchedule};
use marl_core::ConfigMap;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use settings::{CliSettings, OutputFormat};

/// Compose an experiment config from a defaults tree plus overrides
#[derive(Parser, Debug)]
#[command(name = "marl-config")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config search directory, repeatable; earlier directories win
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    config_dirs: Vec<PathBuf>,

    /// Primary config name, e.g. `rec_iql`
    #[arg(short = 'n', long)]
    config_name: Option<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Print the configs merged, in order, instead of the result
    #[arg(long)]
    info: bool,

    /// Print the derived training schedule instead of the config
    #[arg(long)]
    schedule: bool,

    /// Device count used by --schedule
    #[arg(long, value_name = "N")]
    devices: Option<u64>,

    /// Replace every leaf named KEY, at any depth (KEY=VALUE, repeatable)
    #[arg(long = "replace", value_name = "KEY=VALUE")]
    replacements: Vec<String>,

    /// Fail if any `???` values are left
    #[arg(long)]
    strict: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Overrides: group=option, key=value, +key=value, ++key=value, ~key
    overrides: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let work_dir = std::env::current_dir().context("failed to read the working directory")?;
    let settings = CliSettings::load(&work_dir).context("failed to load marl-config settings")?;

    // Logs go to stderr so stdout stays machine-readable.
    // Filter: --debug > RUST_LOG > log_level setting
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level))
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();

    let search_paths: Vec<PathBuf> = if args.config_dirs.is_empty() {
        settings.config_dirs.iter().map(PathBuf::from).collect()
    } else {
        args.config_dirs.clone()
    };
    let name = args
        .config_name
        .clone()
        .or_else(|| settings.config_name.clone())
        .context("no primary config; pass --config-name or set config_name")?;
    let format = args.format.unwrap_or(settings.format);

    info!(
        config = %name,
        search_paths = ?search_paths,
        overrides = args.overrides.len(),
        "Resolving experiment config"
    );

    let overrides = Override::parse_all(&args.overrides)?;
    let resolver = Resolver::new(FileRepository::with_search_paths(search_paths))
        .with_overrides(overrides);
    let mut config = resolver
        .resolve(&name)
        .with_context(|| format!("failed to resolve config '{}'", name))?;

    if !args.replacements.is_empty() {
        let table = replacement_table(&args.replacements)?;
        let (replaced, count) = config.with_replacements(&table);
        info!(count, "Replaced values");
        config = replaced;
    }

    if args.strict {
        config.ensure_complete()?;
    }

    if args.info {
        print_trace(&config);
        return Ok(());
    }

    if args.schedule {
        let devices = args.devices.unwrap_or(settings.devices);
        let experiment = config.settings()?;
        let schedule = TrainingSchedule::derive(&experiment.system, &experiment.arch, devices)?;
        println!("{}", render(&schedule, format)?);
        return Ok(());
    }

    println!("{}", render(&config, format)?);
    Ok(())
}

/// Parse `--replace KEY=VALUE` arguments into a replacement table
fn replacement_table(raw: &[String]) -> Result<ConfigMap> {
    let mut table = ConfigMap::new();
    for arg in raw {
        let parsed = Override::parse(arg)?;
        if parsed.op != OverrideOp::Assign || parsed.key.contains(|c: char| c == '.' || c == '/') {
            bail!("invalid replacement '{}': expected a plain KEY=VALUE", arg);
        }
        let value = parsed.value.unwrap_or_default();
        table.insert(parsed.key, value);
    }
    Ok(table)
}

fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    let text = match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
    };
    Ok(text.trim_end().to_string())
}

fn print_trace(config: &ResolvedConfig) {
    println!("{:<32} {:<24} {}", "config", "package", "source");
    for step in config.trace() {
        println!("{}", step);
    }
}
