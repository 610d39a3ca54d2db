//! FinOS CLI - Command-line interface for the FinOS local session
//!
//! Provides commands for:
//! - Signing in, switching identity and logging out
//! - Unlocking and enrolling the unlock secret
//! - Viewing and running synchronization
//! - Reading the audit trail and the configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod output;

use app::App;
use commands::{
    audit::AuditCommand,
    auth::{EnrollCommand, UnlockCommand},
    config::ConfigCommand,
    logout::LogoutCommand,
    status::StatusCommand,
    switch::SwitchCommand,
    sync::SyncCommand,
    watch::WatchCommand,
};
use finos_core::config::Config;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "finos", version, about = "FinOS personal finance session manager")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the signed-in identity and sync state
    Status(StatusCommand),
    /// Push unsaved changes and pull server updates
    Sync(SyncCommand),
    /// Sign in as another identity, replacing local data
    Switch(SwitchCommand),
    /// Remove the signed-in identity from this device
    Logout(LogoutCommand),
    /// Verify the unlock gate
    Unlock(UnlockCommand),
    /// Store or remove the unlock secret
    Enroll(EnrollCommand),
    /// Keep data in sync until interrupted
    Watch(WatchCommand),
    /// View audit log entries
    Audit(AuditCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = app::config_path(cli.config.as_deref());
    let logging = Config::load_or_default(&config_path).logging;

    let level = match cli.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    if let Commands::Config(cmd) = &cli.command {
        return cmd.execute(&config_path, format).await;
    }

    let app = App::open(&config_path).await?;
    match cli.command {
        Commands::Status(cmd) => cmd.execute(&app, format).await,
        Commands::Sync(cmd) => cmd.execute(&app, format).await,
        Commands::Switch(cmd) => cmd.execute(&app, format).await,
        Commands::Logout(cmd) => cmd.execute(&app, format).await,
        Commands::Unlock(cmd) => cmd.execute(&app, format).await,
        Commands::Enroll(cmd) => cmd.execute(&app, format).await,
        Commands::Watch(cmd) => cmd.execute(&app, format).await,
        Commands::Audit(cmd) => cmd.execute(&app, format).await,
        Commands::Config(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_switch_with_retries() {
        let cli = Cli::try_parse_from(["finos", "switch", "bob@example.com", "--retries", "2"])
            .unwrap();
        match cli.command {
            Commands::Switch(cmd) => {
                assert_eq!(cmd.email, "bob@example.com");
                assert_eq!(cmd.retries, 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_logout_yes_requires_force() {
        assert!(Cli::try_parse_from(["finos", "logout", "--yes"]).is_err());
        assert!(Cli::try_parse_from(["finos", "logout", "--force", "--yes"]).is_ok());
    }

    #[test]
    fn test_global_json_flag() {
        let cli = Cli::try_parse_from(["finos", "status", "--json"]).unwrap();
        assert!(cli.json);
    }
}
