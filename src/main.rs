use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use toolhost::resources::ResourceStack;
use toolhost::session::{self, FileSession, SessionProxy};
use toolhost::tools::{self, ModuleCatalog, ToolCreationResult, ToolDiscoveryResult, ToolFactory};

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, SessionCommands};
use config::Config;

fn setup_logging(level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolhost")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("toolhost.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        if let Some(level) = level {
            builder.parse_filters(level);
        }
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Discover { paths } => handle_discover_command(paths, config),
        Commands::Load { paths, timeout_ms } => handle_load_command(paths, *timeout_ms, cli.is_verbose(), config).await,
        Commands::Sessions { command } => handle_sessions_command(command, config),
    }
}

fn config_paths(paths: &[PathBuf], config: &Config) -> Vec<PathBuf> {
    if paths.is_empty() {
        config.tools.paths.clone()
    } else {
        paths.to_vec()
    }
}

fn report_discovery(result: &ToolDiscoveryResult) {
    println!(
        "{} {} file(s) scanned, {} loaded, {} failed",
        "Discovery:".green(),
        result.total_files_scanned,
        result.successful_configs.len(),
        result.failed_configs.len()
    );
    for failed in &result.failed_configs {
        println!(
            "  {} {} ({}): {}",
            "✗".red(),
            failed.file_path.display(),
            failed.config_id,
            failed.error
        );
    }
}

fn handle_discover_command(paths: &[PathBuf], config: &Config) -> Result<()> {
    let paths = config_paths(paths, config);
    info!("Discovering tool configs in {} file(s)", paths.len());

    let (configs, result) = tools::discover(&paths);
    report_discovery(&result);
    for tool_config in &configs {
        let state = if tool_config.is_enabled() { "" } else { " (disabled)" };
        println!("  {} {} [{}]{}", "✓".green(), tool_config.id, tool_config.tool_type, state);
    }
    Ok(())
}

fn report_creation(result: &ToolCreationResult, id: &str) {
    match &result.error {
        Some(error) => println!("  {} {}: {}", "✗".red(), id, error),
        None => println!("  {} {}: {} tool(s)", "✓".green(), id, result.tools.len()),
    }
    if !result.missing_functions.is_empty() {
        println!("    {} {}", "missing:".yellow(), result.missing_functions.join(", "));
    }
}

async fn handle_load_command(paths: &[PathBuf], timeout_ms: Option<u64>, verbose: bool, config: &Config) -> Result<()> {
    let paths = config_paths(paths, config);
    let (configs, discovery) = tools::discover(&paths);
    report_discovery(&discovery);

    let factory = ToolFactory::new(Arc::new(ModuleCatalog::with_builtins()), config.mcp_settings());
    let limit = Duration::from_millis(timeout_ms.unwrap_or(config.mcp.load_timeout_ms));
    let mut resources = ResourceStack::new();
    let mut results = Vec::new();

    println!("{}", "Loading tools...".cyan());
    for tool_config in configs.iter().filter(|c| c.is_enabled()) {
        let result =
            match tokio::time::timeout(limit, factory.create_tools_from_config(tool_config, &mut resources)).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!("Loading '{}' timed out after {}ms", tool_config.id, limit.as_millis());
                    ToolCreationResult::failed(tool_config, format!("timed out after {}ms", limit.as_millis()))
                }
            };
        report_creation(&result, &tool_config.id);
        results.push(result);
    }

    let loaded = tools::collect_tools(results);
    println!("{} {} tool(s) available", "Loaded:".green(), loaded.len());
    for tool in &loaded {
        if verbose {
            let definition = serde_json::to_string_pretty(&tool.to_definition())?;
            println!("{}", definition);
        } else {
            println!("  {} - {}", tool.name().bold(), tool.description());
        }
    }
    drop(loaded);

    match resources.close() {
        Ok(()) => Ok(()),
        Err(teardown) => {
            for failure in &teardown.failures {
                println!("  {} {}", "teardown failed:".red(), failure);
            }
            Err(teardown).context("Failed to release tool resources")
        }
    }
}

fn handle_sessions_command(command: &SessionCommands, config: &Config) -> Result<()> {
    let home = &config.sessions.home;
    info!("Handling sessions command: {:?}", command);
    match command {
        SessionCommands::List => {
            let names = session::list_sessions(home).context("Failed to list sessions")?;
            if names.is_empty() {
                println!("{}", "No sessions".yellow());
            }
            for name in names {
                println!("  {}", name);
            }
        }
        SessionCommands::Info { id: Some(id) } => {
            let names = session::list_sessions(home).context("Failed to list sessions")?;
            if !names.contains(id) {
                println!("{} {}", "No such session:".red(), id);
                return Ok(());
            }
            let stored = FileSession::open(home, id).context(format!("Failed to open session {}", id))?;
            println!("{}", serde_json::to_string_pretty(stored.metadata())?);
        }
        SessionCommands::Info { id: None } => {
            let proxy = SessionProxy::new(config.sessions.default_session.as_deref(), Some(home.clone()));
            println!("{}", serde_json::to_string_pretty(&proxy.session_info())?);
        }
        SessionCommands::Delete { id } => {
            if session::delete_session(home, id).context(format!("Failed to delete session {}", id))? {
                println!("{} {}", "Deleted:".green(), id);
            } else {
                println!("{} {}", "No such session:".red(), id);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
