//! # NoteFabric
//!
//! Self-hosted automation fabric: notes carry tool workflows that are
//! scheduled, executed and persisted continuously.
//!
//! Usage:
//!   notefabric                          # Serve (default port 3900)
//!   notefabric --port 8080 serve        # Custom port
//!   notefabric --config ./fabric.toml   # Explicit config file
//!   notefabric notes                    # List stored notes and exit
//!   notefabric tools                    # Print the capability catalog

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use notefabric_core::config::FabricConfig;
use notefabric_scheduler::{FabricEngine, TestHook, ToolTestHook};
use notefabric_tools::ToolRegistry;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "notefabric",
    version,
    about = "🧵 NoteFabric — notes that run themselves"
)]
struct Cli {
    /// Config file (default: ~/.notefabric/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the gateway port
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine and the WebSocket gateway
    Serve,
    /// List stored notes
    Notes,
    /// Print the capability catalog
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "notefabric=debug,tower_http=debug"
    } else {
        "notefabric=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => FabricConfig::load_from(path)?,
        None => FabricConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    config.validate()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Notes => list_notes(&config).await,
        Command::Tools => {
            let registry = ToolRegistry::with_defaults();
            for def in registry.list() {
                println!("{:<16} {}", def.name, def.description);
            }
            Ok(())
        }
    }
}

async fn list_notes(config: &FabricConfig) -> Result<()> {
    let storage = notefabric_graph::create_storage(&config.persistence)?;
    let mut notes = storage.load().await?;
    notes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    if notes.is_empty() {
        println!("No notes in {} storage.", storage.name());
    }
    for note in notes {
        println!(
            "{}  [{:<18}] p{:<3} {} ({} step(s))",
            note.id,
            note.status.to_string(),
            note.priority,
            note.title,
            note.logic.len()
        );
    }
    Ok(())
}

async fn serve(config: FabricConfig) -> Result<()> {
    let storage = notefabric_graph::create_storage(&config.persistence)?;
    let generator = notefabric_providers::create_generator(&config.llm)?;
    let registry = Arc::new(ToolRegistry::with_defaults());

    let mut hooks: Vec<Arc<dyn TestHook>> = Vec::new();
    for name in &config.tests.hook_tools {
        if registry.contains(name) {
            hooks.push(Arc::new(ToolTestHook::new(name, registry.clone())));
        } else {
            tracing::warn!("⚠️ Test hook '{name}' is not a registered capability, skipping");
        }
    }

    println!("🧵 NoteFabric v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Storage:   {} ({})", storage.name(), config.persistence.resolved_path().display());
    println!("   🤖 Generator: {}", generator.name());
    println!("   🔧 Tools:     {}", registry.len());
    println!(
        "   🌐 Gateway:   ws://{}:{}/ws",
        config.gateway.host, config.gateway.port
    );
    println!();

    let gateway = config.gateway.clone();
    let engine = Arc::new(FabricEngine::with_test_hooks(
        config, storage, registry, generator, hooks,
    ));
    let restored = engine.bootstrap().await?;
    tracing::info!("📚 Restored {restored} runnable note(s)");
    engine.spawn();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {e}");
        }
        tracing::info!("🛑 Shutdown requested");
    };
    let served = notefabric_gateway::start(&gateway, engine.clone(), shutdown).await;
    engine.shutdown().await;
    served
}
