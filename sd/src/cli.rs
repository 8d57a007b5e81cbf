//! CLI command definitions and subcommands

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Sousdaemon - conversational pantry and recipe assistant
#[derive(Parser)]
#[command(
    name = "sd",
    about = "Conversational recipe assistant over the household pantry",
    version,
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one message and print the assistant's reply
    Ask {
        /// The message, e.g. "what can I make tonight?"
        message: String,

        /// Session (household conversation) to speak in
        #[arg(short, long, default_value = "kitchen")]
        session: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Hold an interactive conversation (default when no command is given)
    Chat {
        /// Session (household conversation) to speak in
        #[arg(short, long, default_value = "kitchen")]
        session: String,
    },

    /// Inspect or edit the pantry directly
    Pantry {
        #[command(subcommand)]
        command: PantryCommand,
    },

    /// Show recent turn events for a session
    Events {
        /// Session to read events for
        #[arg(short, long, default_value = "kitchen")]
        session: String,

        /// Number of events to show
        #[arg(short = 'n', long, default_value = "20")]
        lines: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Pantry management subcommands
#[derive(Debug, Subcommand)]
pub enum PantryCommand {
    /// List everything on hand
    Show {
        /// Session whose pantry to list
        #[arg(short, long, default_value = "kitchen")]
        session: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Add an item (or top up an existing one)
    Add {
        /// Ingredient name, e.g. "chicken breast"
        name: String,

        /// Quantity to add
        #[arg(short, long, default_value = "1")]
        quantity: f64,

        /// Unit, e.g. "g", "ml", "head"
        #[arg(short, long)]
        unit: Option<String>,

        /// Expiration date (YYYY-MM-DD)
        #[arg(short, long)]
        expires: Option<NaiveDate>,

        /// Session whose pantry to edit
        #[arg(short, long, default_value = "kitchen")]
        session: String,
    },

    /// Remove a quantity of an item, or the whole item
    Remove {
        /// Ingredient name
        name: String,

        /// Quantity to remove (omit to remove the item entirely)
        #[arg(short, long)]
        quantity: Option<f64>,

        /// Session whose pantry to edit
        #[arg(short, long, default_value = "kitchen")]
        session: String,
    },

    /// List items that expire soon
    Expiring {
        /// Days ahead to look (defaults to the configured window)
        #[arg(short, long)]
        days: Option<u32>,

        /// Session whose pantry to inspect
        #[arg(short, long, default_value = "kitchen")]
        session: String,
    },

    /// Empty a session's pantry
    Clear {
        /// Session whose pantry to empty
        #[arg(short, long, default_value = "kitchen")]
        session: String,
    },
}

/// Configuration inspection subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as YAML
    Show,

    /// Print which config file is in effect
    Path,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sousdaemon")
        .join("logs")
        .join("sousdaemon.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with config locations and the log path
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("Config is read from the first of:\n");
    help.push_str("  --config PATH\n");
    help.push_str("  ./.sousdaemon.yml\n");
    if let Some(config_dir) = dirs::config_dir() {
        let user_config = config_dir.join("sousdaemon").join("sousdaemon.yml");
        help.push_str(&format!("  {}\n", user_config.display()));
    }

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));

    help
}

/// Output format for show/events commands
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
