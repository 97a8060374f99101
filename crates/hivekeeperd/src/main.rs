//! hivekeeperd: the hivekeeper daemon.
//!
//! Single binary that assembles the hive polling subsystems:
//! - State store (redb)
//! - Command dispatcher (HTTP actuator transport)
//! - Controller (delta queue + polling clock + rule evaluation)
//!
//! # Usage
//!
//! ```text
//! hivekeeperd --config /etc/hivekeeper/hivekeeper.toml run
//! hivekeeperd --config /etc/hivekeeper/hivekeeper.toml check-config
//! hivekeeperd rules
//! ```

mod daemon;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hivekeeper_core::HivekeeperConfig;

#[derive(Parser)]
#[command(name = "hivekeeperd", about = "hivekeeper daemon", version)]
struct Cli {
    /// Path to hivekeeper.toml. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and dispatcher until Ctrl-C.
    Run,

    /// Validate the configuration and print the effective settings.
    CheckConfig,

    /// Print the persisted rules as JSON.
    Rules,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config, cli.log_json)?;

    match cli.command {
        Command::Run => daemon::run(config).await,
        Command::CheckConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Rules => daemon::print_rules(&config),
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<HivekeeperConfig> {
    match path {
        Some(path) => HivekeeperConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(HivekeeperConfig::default()),
    }
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(config: &HivekeeperConfig, json: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log.filter)
            .with_context(|| format!("invalid log filter {:?}", config.log.filter))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
