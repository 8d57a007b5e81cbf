//! CLI argument parsing for pantrystore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ps")]
#[command(author, version, about = "Session-scoped pantry inventory", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Session the command applies to
    #[arg(short, long, default_value = "default", global = true)]
    pub session: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add quantity of an item (creates it if absent)
    Add {
        /// Item name, normalized to lowercase
        #[arg(required = true)]
        name: String,

        /// Quantity to add
        #[arg(short, long, default_value = "1")]
        quantity: f64,

        /// Unit label ("g", "cloves", ...)
        #[arg(short, long)]
        unit: Option<String>,

        /// Expiration date (YYYY-MM-DD)
        #[arg(short, long)]
        expires: Option<String>,
    },

    /// Remove quantity of an item, or the whole item with --all
    Remove {
        /// Item name
        #[arg(required = true)]
        name: String,

        /// Quantity to remove
        #[arg(short, long, default_value = "1")]
        quantity: f64,

        /// Remove the item entirely regardless of quantity
        #[arg(long)]
        all: bool,
    },

    /// List everything in the pantry
    List,

    /// Show items expiring soon
    Expiring {
        /// Window in days
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Delete every item in the session's pantry
    Clear,

    /// List sessions with stored items
    Sessions,
}
