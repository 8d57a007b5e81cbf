use chrono::{NaiveDate, Utc};
use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;

use pantrystore::cli::{Cli, Command};
use pantrystore::config::Config;
use pantrystore::{PantryDelta, PantryItem, PantryStore};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("pantrystore starting");

    let store = PantryStore::open(&config.db_path)?;
    let session = cli.session.as_str();

    match cli.command {
        Command::Add {
            name,
            quantity,
            unit,
            expires,
        } => {
            let mut delta = PantryDelta::add(&name, quantity);
            if let Some(unit) = unit {
                delta = delta.with_unit(unit);
            }
            if let Some(expires) = expires {
                let date = parse_date(&expires)?;
                delta = delta.with_expiry(date);
            }
            store.apply_delta(session, &[delta])?;
            println!("{} Added {} {}", "✓".green(), quantity, name.cyan());
        }
        Command::Remove { name, quantity, all } => {
            if all {
                if store.remove(session, &name)? {
                    println!("{} Removed {}", "✓".green(), name.cyan());
                } else {
                    println!("{} not found", name.yellow());
                }
            } else {
                store.apply_delta(session, &[PantryDelta::remove(&name, quantity)])?;
                println!("{} Removed {} {}", "✓".green(), quantity, name.cyan());
            }
        }
        Command::List => {
            let items = store.items(session)?;
            if items.is_empty() {
                println!("Pantry is empty");
            } else {
                for item in items {
                    print_item(&item);
                }
            }
        }
        Command::Expiring { days } => {
            let days = days.unwrap_or(config.expiring_days);
            let items = store.expiring_within(session, days)?;
            if items.is_empty() {
                println!("Nothing expires within {} days", days);
            } else {
                let today = Utc::now().date_naive();
                for item in items {
                    let note = match item.days_until_expiry(today) {
                        Some(d) if d < 0 => "expired".red().to_string(),
                        Some(0) => "expires today".red().to_string(),
                        Some(1) => "expires tomorrow".yellow().to_string(),
                        Some(d) => format!("expires in {} days", d).yellow().to_string(),
                        None => String::new(),
                    };
                    println!("{:<24} {:>8}  {}", item.name.cyan(), item.quantity, note);
                }
            }
        }
        Command::Clear => {
            let removed = store.clear(session)?;
            println!("{} Cleared {} items from session {}", "✓".green(), removed, session.cyan());
        }
        Command::Sessions => {
            let sessions = store.sessions()?;
            if sessions.is_empty() {
                println!("No sessions found");
            } else {
                for s in sessions {
                    println!("{}", s);
                }
            }
        }
    }

    Ok(())
}

fn print_item(item: &PantryItem) {
    let unit = item.unit.as_deref().unwrap_or("");
    let expiry = item
        .expires_on
        .map(|d| d.to_string().dimmed().to_string())
        .unwrap_or_default();
    println!("{:<24} {:>8} {:<8} {}", item.name.cyan(), item.quantity, unit, expiry);
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| eyre!("Invalid date '{}', expected YYYY-MM-DD", s))
}
