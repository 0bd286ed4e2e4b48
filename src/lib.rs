pub mod config;
pub mod context;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod ports;
pub mod privacy;
pub mod router;
pub mod sensing;
pub mod settings;
pub mod store;
pub mod utils;

pub use config::MonitorConfig;
pub use context::{render_prompt, ContextView, LexicalAnalyzer};
pub use metrics::MetricsCollector;
pub use models::{Activity, ActivityKind, Context};
pub use monitor::Monitor;
pub use privacy::PrivacyFilter;
pub use router::ActivityRouter;
pub use sensing::{Capabilities, SourceKind, SourceState};
pub use settings::SettingsStore;
pub use store::{load_or_create_key, ContextStore, StoreError};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ports::EnvSecretStore;

/// Environment variable holding the base64 context key for maintenance runs.
pub const CONTEXT_KEY_VAR: &str = "GLIMPSE_CONTEXT_KEY";

#[derive(Parser)]
#[command(name = "glimpse", version, about = "Inspect and maintain stored activity contexts")]
struct Cli {
    /// Data directory holding `Contexts/` and `settings.json`; defaults to the
    /// platform data directory
    #[arg(long, env = "GLIMPSE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the most recent stored contexts as prompt text
    Contexts {
        #[arg(default_value_t = 5)]
        limit: usize,
    },
    /// Delete stored contexts older than the retention period
    Cleanup {
        /// Defaults to `GLIMPSE_RETENTION_DAYS`, or 30
        days: Option<u32>,
    },
}

/// Platform data directory (`~/.local/share/glimpse`, `~/Library/Application
/// Support/glimpse`, ...), or `./glimpse` when the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("glimpse")
}

pub fn run() -> anyhow::Result<()> {
    utils::init_logging();

    let cli = Cli::parse();
    let config = MonitorConfig::from_env(cli.data_dir.unwrap_or_else(default_data_dir));
    let secrets = EnvSecretStore::new(CONTEXT_KEY_VAR);

    match cli.command {
        Command::Contexts { limit } => {
            let key = load_or_create_key(&secrets)
                .with_context(|| format!("export {CONTEXT_KEY_VAR} to read stored contexts"))?;
            let store = ContextStore::new(config.store.directory.clone(), key);
            let contexts = store.load(limit)?;
            if contexts.is_empty() {
                println!("No stored contexts in {}", store.directory().display());
            }
            for context in &contexts {
                println!("== {} ({})", context.id, context.timestamp.to_rfc3339());
                println!("{}", render_prompt(context));
            }
        }
        Command::Cleanup { days } => {
            // Cleanup only looks at file times, so any key will do.
            let key = load_or_create_key(&secrets).unwrap_or_else(|_| store::generate_key());
            let store = ContextStore::new(config.store.directory.clone(), key);
            let days = days.unwrap_or(config.store.retention_days);
            let removed = store.cleanup(days)?;
            println!("Removed {removed} context file(s) older than {days} day(s)");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_data_dir_is_under_platform_data_dir() {
        let dir = default_data_dir();
        assert!(dir.ends_with("glimpse"));
        if let Some(base) = dirs::data_local_dir() {
            assert_eq!(dir, base.join("glimpse"));
        }
    }

    #[test]
    fn cli_parses_maintenance_commands() {
        let cli = Cli::try_parse_from(["glimpse", "--data-dir", "/tmp/g", "contexts", "3"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/g")));
        assert!(matches!(cli.command, Command::Contexts { limit: 3 }));

        let cli = Cli::try_parse_from(["glimpse", "cleanup"]).unwrap();
        assert!(matches!(cli.command, Command::Cleanup { days: None }));
    }
}
