//! Command-line interface definition.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use rotaplan_core::{TracingConfig, TracingOutputFormat};
use rotaplan_google::{AuthConfig, default_config_dir};

use crate::error::{CliError, CliResult};

/// google-rotation-planner - Create on-call rota events in a Google calendar
#[derive(Debug, Parser)]
#[command(name = "google-rotation-planner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the rota file
    #[arg(long, short, env = "ROTATION_PLANNER_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Directory holding credentials.json and token.json
    #[arg(long, env = "ROTATION_PLANNER_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Delete upcoming events of the rota calendar instead of creating shifts
    #[arg(long, conflicts_with = "dry_run")]
    pub cleanup: bool,

    /// Print the computed shifts without contacting the calendar
    #[arg(long)]
    pub dry_run: bool,

    /// Do not open a browser during authorization
    #[arg(long)]
    pub no_browser: bool,

    /// Give up waiting for the browser authorization after N seconds
    #[arg(long, value_name = "SECS")]
    pub auth_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl From<LogFormat> for TracingOutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Compact => Self::Compact,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Json => Self::Json,
        }
    }
}

/// Available commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create the config directory and authorize access
    Init,

    /// Delete the cached token and credentials
    Reset,

    /// Check the cached token and authorize again if it is rejected
    RefreshToken,
}

impl Cli {
    /// Returns the logging configuration for the flags.
    pub fn tracing_config(&self) -> TracingConfig {
        let config = if self.debug {
            TracingConfig::cli_debug()
        } else {
            TracingConfig::default()
        };
        config.with_format(self.log_format.into())
    }

    /// Returns the authentication settings for the flags.
    pub fn auth_config(&self) -> CliResult<AuthConfig> {
        let dir = match self.config_dir {
            Some(ref dir) => dir.clone(),
            None => default_config_dir().ok_or_else(|| {
                CliError::Config(
                    "unable to determine the home directory, use --config-dir".to_string(),
                )
            })?,
        };

        Ok(AuthConfig::new(dir)
            .with_open_browser(!self.no_browser)
            .with_callback_timeout(self.auth_timeout.map(Duration::from_secs)))
    }
}
