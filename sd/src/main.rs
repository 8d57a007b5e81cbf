//! Sousdaemon - conversational pantry and recipe assistant
//!
//! CLI entry point for one-shot messages, interactive chat, and direct
//! pantry management.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info};

use pantrystore::{PantryDelta, PantryItem, PantryStore, StoreError};
use sousdaemon::adapter::RecipeAdapter;
use sousdaemon::classifier::IntentClassifier;
use sousdaemon::cli::{Cli, Command, ConfigCommand, OutputFormat, PantryCommand, generate_after_help};
use sousdaemon::collaborators::{RecipeIndex, SqlitePantry, YamlCatalog, load_corpus};
use sousdaemon::config::Config;
use sousdaemon::domain::Provenance;
use sousdaemon::events::{create_event_bus, read_session_events, spawn_event_logger};
use sousdaemon::llm::{create_client, create_embedding_client};
use sousdaemon::orchestrator::{Orchestrator, TurnRequest, TurnResponse};
use sousdaemon::prompts::PromptLoader;
use sousdaemon::router::Router;
use sousdaemon::session::{SessionManager, spawn_idle_sweeper};
use sousdaemon::synthesizer::{StructuredPayload, Synthesizer};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sousdaemon")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level_str = cli_log_level.or(config_log_level);
    let level = if let Some(s) = level_str {
        match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        }
    } else {
        tracing::Level::INFO
    };

    let log_file = fs::File::create(log_dir.join("sousdaemon.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Build command with dynamic after_help that shows config locations
    let cmd = Cli::command().after_help(generate_after_help());

    // Parse CLI arguments using the modified command
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Sousdaemon loaded config: provider={}", config.llm.provider);

    // Dispatch command
    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Ask { message, session, format }) => {
            debug!(%message, %session, ?format, "main: matched Ask command");
            cmd_ask(&config, &session, &message, format).await
        }
        Some(Command::Chat { session }) => {
            debug!(%session, "main: matched Chat command");
            cmd_chat(&config, &session).await
        }
        Some(Command::Pantry { command }) => {
            debug!(?command, "main: matched Pantry command");
            cmd_pantry(&config, command).await
        }
        Some(Command::Events { session, lines, format }) => {
            debug!(%session, lines, ?format, "main: matched Events command");
            cmd_events(&config, &session, lines, format).await
        }
        Some(Command::Config { command }) => {
            debug!(?command, "main: matched Config command");
            cmd_config(&config, cli.config.as_ref(), command).await
        }
        None => {
            debug!("main: no command specified, starting chat");
            // Default: interactive chat in the household session
            cmd_chat(&config, "kitchen").await
        }
    }
}

/// The assembled turn pipeline plus its background tasks
struct Assistant {
    orchestrator: Arc<Orchestrator>,
    logger_handle: tokio::task::JoinHandle<()>,
    sweeper_handle: tokio::task::JoinHandle<()>,
}

impl Assistant {
    /// Give the event logger a moment to drain, then stop the background tasks
    async fn shutdown(self) {
        debug!("Assistant::shutdown: called");
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.sweeper_handle.abort();
        self.logger_handle.abort();
    }
}

/// Wire every collaborator and pipeline stage together
async fn build_assistant(config: &Config) -> Result<Assistant> {
    debug!("build_assistant: called");

    // Fail fast on missing API keys before touching any collaborator
    config.validate()?;

    // LLM and embedding clients
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let embedder = create_embedding_client(&config.embedding).context("Failed to create embedding client")?;
    info!("LLM client initialized ({})", config.llm.provider);

    // Recipe index
    let recipes = load_corpus(&config.search.recipes_path).context(format!(
        "Failed to load recipe corpus from {}",
        config.search.recipes_path.display()
    ))?;
    let index = RecipeIndex::new(embedder);
    let indexed = index.index_recipes(recipes).await.context("Failed to index recipes")?;
    info!("Recipe index ready ({} recipes)", indexed);

    // Substitution catalog
    let catalog = match &config.catalog.path {
        Some(path) => {
            debug!(path = %path.display(), "build_assistant: loading catalog from file");
            YamlCatalog::load(path).context(format!("Failed to load catalog from {}", path.display()))?
        }
        None => YamlCatalog::builtin(),
    };

    // Pantry store
    let pantry = SqlitePantry::open(&config.pantry.db_path).context(format!(
        "Failed to open pantry database at {}",
        config.pantry.db_path.display()
    ))?;
    info!("Pantry store opened at {}", config.pantry.db_path.display());

    // Sessions, events, and the background tasks that tend them
    let sessions = SessionManager::spawn();
    let events = create_event_bus();
    let logger_handle =
        spawn_event_logger(Arc::clone(&events), &config.events.log_dir).context("Failed to start event logger")?;
    let sweeper_handle = spawn_idle_sweeper(
        sessions.clone(),
        Arc::clone(&events),
        Duration::from_secs(config.session.idle_timeout_secs),
        Duration::from_secs(config.session.sweep_interval_secs),
    );

    // Router fronts every collaborator call
    let router = Router::new(
        Arc::new(pantry),
        Arc::new(index),
        Arc::new(catalog),
        Arc::clone(&llm),
        &config.router,
    );

    // Turn pipeline
    let classifier = IntentClassifier::new(llm, PromptLoader::new(config.prompts.user_dir.clone()));
    let adapter = RecipeAdapter::new(
        PromptLoader::new(config.prompts.user_dir.clone()),
        config.ranker.expiring_window_days,
    );
    let synthesizer = Synthesizer::new(PromptLoader::new(config.prompts.user_dir.clone()));
    let orchestrator = Orchestrator::new(
        sessions,
        classifier,
        router,
        adapter,
        synthesizer,
        PromptLoader::new(config.prompts.user_dir.clone()),
        events,
        config.clone(),
    );
    info!("Orchestrator initialized");

    Ok(Assistant {
        orchestrator,
        logger_handle,
        sweeper_handle,
    })
}

/// Send one message and print the reply
async fn cmd_ask(config: &Config, session: &str, message: &str, format: OutputFormat) -> Result<()> {
    debug!(%session, %message, "cmd_ask: called");
    let assistant = build_assistant(config).await?;

    let response = assistant
        .orchestrator
        .handle_message(TurnRequest {
            session_id: session.to_string(),
            message: message.to_string(),
            known_preferences: None,
        })
        .await;

    match format {
        OutputFormat::Json => {
            debug!("cmd_ask: format is Json");
            let json = serde_json::json!({
                "stage": response.stage.as_str(),
                "payload": response.structured_payload,
                "explanation": response.explanation_text,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            debug!("cmd_ask: format is Text");
            print_response(&response);
        }
    }

    assistant.shutdown().await;
    Ok(())
}

/// Hold an interactive conversation until EOF, Ctrl+C, or "quit"
async fn cmd_chat(config: &Config, session: &str) -> Result<()> {
    debug!(%session, "cmd_chat: called");
    let assistant = build_assistant(config).await?;

    println!("{}", "Sousdaemon is listening. Type a message, or 'quit' to leave.".bold());
    println!();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", "you:".cyan().bold());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            maybe_line = lines.next_line() => match maybe_line? {
                Some(line) => line,
                None => {
                    debug!("cmd_chat: stdin closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("cmd_chat: ctrl_c received");
                println!();
                break;
            }
        };

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message.eq_ignore_ascii_case("quit") || message.eq_ignore_ascii_case("exit") {
            debug!("cmd_chat: user quit");
            break;
        }

        let response = assistant
            .orchestrator
            .handle_message(TurnRequest {
                session_id: session.to_string(),
                message: message.to_string(),
                known_preferences: None,
            })
            .await;

        print!("{} ", "sd:".green().bold());
        print_response(&response);
        println!();
    }

    println!("Until next meal.");
    assistant.shutdown().await;
    Ok(())
}

/// Render a turn response for the terminal
fn print_response(response: &TurnResponse) {
    match &response.structured_payload {
        StructuredPayload::Recommendations { recommendations, .. } => {
            println!("{}", response.explanation_text);
            println!();
            for (i, rec) in recommendations.iter().enumerate() {
                let coverage = if rec.missing_ingredients.is_empty() {
                    "everything on hand".green().to_string()
                } else {
                    format!("missing: {}", rec.missing_ingredients.join(", ")).yellow().to_string()
                };
                println!("  {}. {} ({})", i + 1, rec.recipe.title.bold(), coverage);
                if rec.uses_expiring {
                    println!("     uses expiring: {}", rec.expiring_used.join(", ").yellow());
                }
            }
        }
        StructuredPayload::AdaptedRecipe { recipe } => {
            println!("{}", response.explanation_text);
            println!();
            println!("{} (serves {})", recipe.title.bold(), recipe.servings);
            for line in &recipe.ingredients {
                let marker = match &line.provenance {
                    Provenance::Pantry => "have".green(),
                    Provenance::Substituted { original } => format!("was {}", original).yellow(),
                    Provenance::ToBuy => "buy".red(),
                };
                let amount = match (line.quantity, line.unit.as_deref()) {
                    (Some(q), Some(u)) => format!("{} {} ", q, u),
                    (Some(q), None) => format!("{} ", q),
                    _ => String::new(),
                };
                println!("  - {}{} [{}]", amount, line.name, marker);
            }
            for (i, step) in recipe.instructions.iter().enumerate() {
                println!("  {}. {}", i + 1, step);
            }
            if !recipe.shopping_list.is_empty() {
                println!("  {} {}", "Shopping list:".bold(), recipe.shopping_list.join(", "));
            }
        }
        StructuredPayload::PantrySummary { items, expiring } => {
            println!("{}", response.explanation_text);
            if !items.is_empty() {
                println!();
                print_pantry_items(items, expiring);
            }
        }
        _ => {
            println!("{}", response.explanation_text);
        }
    }
}

/// Render pantry items, flagging the ones that expire soon
fn print_pantry_items(items: &[PantryItem], expiring: &[PantryItem]) {
    let today = chrono::Utc::now().date_naive();
    for item in items {
        let amount = match item.unit.as_deref() {
            Some(unit) => format!("{} {}", item.quantity, unit),
            None => format!("{}", item.quantity),
        };
        let urgency = match item.days_until_expiry(today) {
            Some(days) if days < 0 => format!("expired {} day(s) ago", -days).red().to_string(),
            Some(0) => "expires today".red().to_string(),
            Some(days) if expiring.iter().any(|e| e.name == item.name) => {
                format!("expires in {} day(s)", days).yellow().to_string()
            }
            Some(days) => format!("expires in {} day(s)", days),
            None => String::new(),
        };
        println!("  {:<24} {:<10} {}", item.name, amount, urgency);
    }
}

/// Inspect or edit the pantry without going through a conversation
async fn cmd_pantry(config: &Config, command: PantryCommand) -> Result<()> {
    debug!(?command, "cmd_pantry: called");
    let store = PantryStore::open(&config.pantry.db_path).context(format!(
        "Failed to open pantry database at {}",
        config.pantry.db_path.display()
    ))?;

    match command {
        PantryCommand::Show { session, format } => {
            debug!(%session, ?format, "cmd_pantry: matched Show command");
            let items = store.items(&session)?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&items)?);
                }
                OutputFormat::Text => {
                    if items.is_empty() {
                        println!("The pantry is empty.");
                    } else {
                        let expiring = store.expiring_within(&session, config.pantry.expiring_report_days)?;
                        print_pantry_items(&items, &expiring);
                    }
                }
            }
        }
        PantryCommand::Add {
            name,
            quantity,
            unit,
            expires,
            session,
        } => {
            debug!(%name, quantity, ?unit, ?expires, %session, "cmd_pantry: matched Add command");
            let mut delta = PantryDelta::add(&name, quantity);
            if let Some(unit) = unit {
                delta = delta.with_unit(unit);
            }
            if let Some(date) = expires {
                delta = delta.with_expiry(date);
            }
            let items = store.apply_delta(&session, &[delta])?;
            println!("Added {} {}. The pantry now holds {} item(s).", quantity, name, items.len());
        }
        PantryCommand::Remove { name, quantity, session } => {
            debug!(%name, ?quantity, %session, "cmd_pantry: matched Remove command");
            match quantity {
                Some(quantity) => match store.apply_delta(&session, &[PantryDelta::remove(&name, quantity)]) {
                    Ok(items) => {
                        println!("Removed {} {}. The pantry now holds {} item(s).", quantity, name, items.len());
                    }
                    Err(StoreError::BelowZero { name, have, removed }) => {
                        eprintln!("Cannot remove {} '{}': only {} on hand", removed, name, have);
                    }
                    Err(e) => return Err(e.into()),
                },
                None => {
                    if store.remove(&session, &name)? {
                        println!("Removed '{}' from the pantry.", name);
                    } else {
                        println!("'{}' was not in the pantry.", name);
                    }
                }
            }
        }
        PantryCommand::Expiring { days, session } => {
            debug!(?days, %session, "cmd_pantry: matched Expiring command");
            let days = days.unwrap_or(config.pantry.expiring_report_days);
            let items = store.expiring_within(&session, days)?;
            if items.is_empty() {
                println!("Nothing expires in the next {} day(s).", days);
            } else {
                print_pantry_items(&items, &items);
            }
        }
        PantryCommand::Clear { session } => {
            debug!(%session, "cmd_pantry: matched Clear command");
            let removed = store.clear(&session)?;
            println!("Cleared {} item(s) from the pantry.", removed);
        }
    }

    Ok(())
}

/// Show recent turn events for a session
async fn cmd_events(config: &Config, session: &str, lines: usize, format: OutputFormat) -> Result<()> {
    debug!(%session, lines, ?format, "cmd_events: called");
    let entries = read_session_events(&config.events.log_dir, session)?;

    if entries.is_empty() {
        println!("No events recorded for session '{}'.", session);
        return Ok(());
    }

    let start = entries.len().saturating_sub(lines);
    for entry in &entries[start..] {
        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(entry)?);
            }
            OutputFormat::Text => {
                println!(
                    "{}  {:<20} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.event.event_type(),
                    entry.event.session_id()
                );
            }
        }
    }

    Ok(())
}

/// Inspect the effective configuration
async fn cmd_config(config: &Config, explicit_path: Option<&PathBuf>, command: ConfigCommand) -> Result<()> {
    debug!(?explicit_path, ?command, "cmd_config: called");
    match command {
        ConfigCommand::Show => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        ConfigCommand::Path => {
            if let Some(path) = explicit_path {
                println!("{}", path.display());
                return Ok(());
            }
            let local = PathBuf::from(".sousdaemon.yml");
            if local.exists() {
                println!("{}", local.display());
                return Ok(());
            }
            if let Some(user) = dirs::config_dir().map(|d| d.join("sousdaemon").join("sousdaemon.yml"))
                && user.exists()
            {
                println!("{}", user.display());
                return Ok(());
            }
            println!("No config file found; built-in defaults are in effect.");
        }
    }

    Ok(())
}
