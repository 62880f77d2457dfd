//! chatplays
//!
//! Reads chat lines from stdin, counts votes and drives the loaded plugin.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use chatplays::engine::spawn_engine;
use chatplays::logging;
use chatplays::publisher::FileSnapshotSink;
use chatplays::queue::TracingActuator;
use chatplays::settings::{DEFAULT_SETTINGS_FILE, Settings};
use chatplays::transport::{ChatMessage, tokenize};
use chatplays::watcher::PluginWatcher;

/// Crowd-vote driven plugin host
#[derive(Parser, Debug)]
#[command(name = "chatplays")]
#[command(about = "Turns chat votes into plugin actions", long_about = None)]
struct Args {
    /// Path to the settings file
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Plugin to load, overriding the settings file
    #[arg(short, long)]
    plugin: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Don't reload plugins when their scripts change
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // First run: write a starter settings file and stop
    if !args.settings.exists() {
        Settings::write_default(&args.settings)?;
        println!(
            "Created default settings at {}. Edit it and start chatplays again.",
            args.settings.display()
        );
        return Ok(());
    }

    // Load settings
    let mut settings = Settings::load(&args.settings)
        .with_context(|| format!("loading {}", args.settings.display()))?;
    if let Some(plugin) = args.plugin {
        settings.plugin = Some(plugin);
    }
    settings.debug |= args.debug;

    // Initialize tracing
    logging::init(&settings.paths.logs, settings.debug, settings.log_json)
        .context("initializing logging")?;
    info!("Starting chatplays v{}", env!("CARGO_PKG_VERSION"));

    // Prepare plugin config directory and snapshot file
    tokio::fs::create_dir_all(&settings.paths.plugin_configs)
        .await
        .with_context(|| format!("creating {}", settings.paths.plugin_configs.display()))?;

    let sink = FileSnapshotSink::new(&settings.paths.snapshot);
    if let Err(e) = sink.ensure_exists().await {
        warn!(path = %sink.path().display(), error = %e, "Failed to create snapshot file");
    }

    // Start the engine
    let (engine, task) = spawn_engine(
        settings.engine_config(),
        Arc::new(TracingActuator),
        Arc::new(sink),
    );

    // Load the configured plugin
    match settings.plugin.as_deref() {
        Some(id) => {
            if let Err(e) = engine.load(id).await {
                error!(plugin = %id, error = %e, "Plugin failed to load");
            }
        }
        None => info!("No plugin configured"),
    }

    // Start file watcher if not disabled
    if !args.no_watch {
        match PluginWatcher::new(&settings.paths.scripts, engine.clone()) {
            Ok(watcher) => {
                tokio::spawn(watcher.run());
            }
            Err(e) => warn!("Failed to start plugin watcher: {}", e),
        }
    }

    info!(channel = %settings.channel, "Reading chat from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    // The local operator is the broadcaster
                    if let Some(token) = tokenize(&ChatMessage::new(line, true)) {
                        engine.submit(token).await?;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Shutdown the engine gracefully
    engine.shutdown().await?;
    task.await?;
    info!("chatplays stopped");
    Ok(())
}
