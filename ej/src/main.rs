//! ej - Elite Dangerous journal companion
//!
//! CLI entry point and composition root: builds the bus, the signals, the
//! aggregator and the background tasks, and tears them down on exit.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{info, warn};

use edjournal::cli::{Cli, Command, OutputFormat};
use edjournal::config::Config;
use edjournal::journal::{Event, JournalReader, JournalTailer};
use edjournal::state::{GameState, GameStateAggregator, MaterialCategory, default_registry};
use edjournal::supervisor::DEFAULT_SHUTDOWN_TIMEOUT;
use edjournal::{AppSignals, Bus, EventBuffer, Supervisor};

fn setup_logging(log_level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("edjournal")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to log file, not stdout/stderr
    let level = match log_level {
        Some(level) => level
            .parse::<tracing::Level>()
            .map_err(|e| eyre::eyre!("Invalid log level '{}': {}", level, e))?,
        None => tracing::Level::INFO,
    };
    let log_file = fs::File::create(log_dir.join("edjournal.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(dir) = cli.journal_dir {
        config.journal.dir = dir;
    }
    info!(dir = %config.journal.dir.display(), "Journal directory");

    match cli.command {
        Some(Command::Watch { events }) => cmd_watch(&config, events).await,
        Some(Command::State { format }) => cmd_state(&config, format),
        Some(Command::Events { event_type, limit, raw }) => cmd_events(&config, event_type.as_deref(), limit, raw),
        Some(Command::Version) => cmd_version(&config),
        None => cmd_watch(&config, false).await,
    }
}

fn journal_reader(config: &Config) -> Arc<JournalReader> {
    Arc::new(JournalReader::with_pattern(&config.journal.dir, &config.journal.pattern))
}

/// Follow the journal until interrupted
async fn cmd_watch(config: &Config, print_events: bool) -> Result<()> {
    let reader = journal_reader(config);
    if !reader.dir().is_dir() {
        warn!(dir = %reader.dir().display(), "Journal directory does not exist yet");
    }

    let (bus, dispatcher) = Bus::new();
    let dispatcher_handle = dispatcher.spawn();
    let signals = AppSignals::new(&bus);

    let aggregator = GameStateAggregator::new(default_registry(), signals.clone(), reader.clone());
    aggregator.attach();

    signals.state_initialized.subscribe("console", |state: GameState| {
        println!("{}", "Initial state".bold());
        print_state(&state);
        Ok(())
    });
    signals.state_changed.subscribe("console", |state: GameState| {
        println!("{}", "State changed".bold());
        print_state(&state);
        Ok(())
    });
    if print_events {
        signals.journal_event.subscribe("console", |event: Event| {
            print_event(&event);
            Ok(())
        });
    }

    // Decide on backlog skipping before anything can rotate the journal
    let tailer = JournalTailer::new(reader.clone(), signals.journal_event.clone(), config.journal.tailer_config());

    let mut supervisor = Supervisor::new();
    let activity = EventBuffer::new("activity");
    activity.attach(
        &signals,
        &mut supervisor,
        config.plugins.buffer_flush_interval(),
        |events| {
            info!(count = events.len(), "Journal activity since last flush");
            Ok(())
        },
    );

    // Startup replay reads the journal from disk
    let init_signals = signals.clone();
    tokio::task::spawn_blocking(move || init_signals.init_complete.publish_sync(()))
        .await
        .context("Startup replay failed")?;

    let stop = supervisor.stop_signal();
    supervisor.spawn("journal tailer", tailer.run(stop));
    info!(tasks = supervisor.len(), "Watching journal. Press Ctrl+C to stop.");

    wait_for_shutdown().await?;

    info!("Shutting down...");
    signals.exiting.publish_sync(());
    supervisor.stop();
    supervisor.join_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await;

    if let Err(e) = bus.flush().await {
        warn!(error = %e, "Failed to flush bus");
    }
    bus.shutdown();
    dispatcher_handle.join().await;

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl+C received");
    }

    Ok(())
}

/// Replay the latest journal and print the state
fn cmd_state(config: &Config, format: OutputFormat) -> Result<()> {
    let reader = journal_reader(config);
    let (bus, _dispatcher) = Bus::new();
    let signals = AppSignals::new(&bus);

    let aggregator = GameStateAggregator::new(default_registry(), signals, reader);
    aggregator.bootstrap();
    let state = aggregator.snapshot();

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&state).context("Failed to serialize state")?;
            println!("{}", json);
        }
        OutputFormat::Text => print_state(&state),
    }
    Ok(())
}

/// List events of the latest journal
fn cmd_events(config: &Config, event_type: Option<&str>, limit: Option<usize>, raw: bool) -> Result<()> {
    let reader = journal_reader(config);
    let Some(latest) = reader.latest_file() else {
        println!("No journal files found in {}", reader.dir().display());
        return Ok(());
    };

    let events = reader.cached_latest_events();
    let selected: Vec<&Event> = events
        .iter()
        .filter(|event| event_type.is_none_or(|wanted| event.name() == wanted))
        .collect();
    let skip = limit.map_or(0, |limit| selected.len().saturating_sub(limit));

    println!("{}", latest.display().to_string().dimmed());
    for event in &selected[skip..] {
        if raw {
            println!("{}", event.raw());
        } else {
            print_event(event);
        }
    }
    Ok(())
}

/// Print the game version of the latest journal
fn cmd_version(config: &Config) -> Result<()> {
    let reader = journal_reader(config);
    match reader.game_version() {
        Some(version) => println!("{} (build {})", version.version.green(), version.build),
        None => println!("No journal header found in {}", reader.dir().display()),
    }
    Ok(())
}

fn print_event(event: &Event) {
    println!(
        "{} {}",
        edjournal::journal::format_timestamp(&event.timestamp()).dimmed(),
        event.name().cyan()
    );
}

fn or_unknown<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "-".to_string(), ToString::to_string)
}

fn print_state(state: &GameState) {
    let running = if *state.running { "running".green() } else { "not running".red() };
    println!("  Game:      {} {} ({})", state.version.version, state.version.build, running);
    println!(
        "  Commander: {} [{}]",
        or_unknown(state.commander.name.get()).bold(),
        or_unknown(state.commander.frontier_id.get())
    );
    println!(
        "  Ship:      {} {} ({})",
        or_unknown(state.ship.model.get()),
        or_unknown(state.ship.name.get()),
        or_unknown(state.ship.ident.get())
    );
    println!("  Credits:   {}", *state.credits);

    let mut place = or_unknown(state.location.system.get());
    if *state.location.docked {
        place = format!("{} / {}", place, or_unknown(state.location.station.name.get()));
    } else if *state.location.supercruise {
        place = format!("{} (supercruise)", place);
    }
    println!("  Location:  {}", place);

    for category in MaterialCategory::ALL {
        let materials = state.materials.category(category);
        let total: u64 = materials.values().sum();
        println!("  {:<10} {} kinds, {} total", format!("{}:", category), materials.len(), total);
    }
    println!("  Engineers: {}", state.engineers.len());
}
