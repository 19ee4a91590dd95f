//! midirc - MIDI remote-control client
//!
//! Records, plays back and routes MIDI between local ports from an
//! interactive console.

use anyhow::Result;
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use midirc::cli::Repl;
use midirc::config::AppConfig;
use midirc::controller::SessionController;
use midirc::engine::{EngineOptions, LocalEngine, MidirDriver, PortDriver, QueuedPicker};
use midirc::paths::AppPaths;
use midirc::session::PortDirection;

/// midirc - record, play back and route MIDI from the terminal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MIDIRC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = AppPaths::detect();
    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    let config = AppConfig::load_or_default(&config_path).await?;

    let log_directory = config.logging.file_directory(&paths);
    let _log_guard = init_logging(&args.log_level, log_directory.as_deref())?;

    info!("Starting midirc v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", config_path.display());

    if args.config.is_none() && !config_path.exists() {
        if let Err(e) = write_default_config(&paths, &config).await {
            warn!("Failed to write default configuration: {:#}", e);
        }
    }

    let driver = Arc::new(MidirDriver::new(config.midi.client_name.clone()));

    if args.list_ports {
        list_ports(driver.as_ref());
        return Ok(());
    }

    let picker = Arc::new(QueuedPicker::new());
    let engine = Arc::new(LocalEngine::new(
        driver,
        picker.clone(),
        EngineOptions::from_config(&config, &paths),
    ));
    let controller = SessionController::start(engine).await?;

    if let Err(e) = controller.scan().await {
        warn!("Initial port scan failed: {}", e);
    }
    auto_connect(&controller, &config).await;

    tokio::select! {
        result = Repl::new(controller.clone(), picker).run() => result?,
        _ = shutdown_signal() => {}
    }

    // Leave the synth quiet
    let playing = controller
        .update_playback()
        .await
        .map(|playback| !playback.is_stopped())
        .unwrap_or(false);
    if playing {
        if let Err(e) = controller.stop_playback().await {
            warn!("Failed to stop playback: {}", e);
        }
    }
    controller.disconnect_events();

    info!("midirc shutdown complete");
    Ok(())
}

/// First run: leave an editable config file where the next run looks
async fn write_default_config(paths: &AppPaths, config: &AppConfig) -> Result<()> {
    paths.ensure_directories()?;
    config.save(&paths.config).await?;
    info!("Wrote default configuration to {}", paths.config.display());
    Ok(())
}

/// Connect the first port whose name contains the configured pattern
async fn auto_connect(controller: &SessionController, config: &AppConfig) {
    let session = controller.session();

    if let Some(pattern) = &config.midi.input_port {
        match session.find_by_name(PortDirection::Input, pattern) {
            Some(port) => {
                if let Err(e) = controller.connect_input(&port.id).await {
                    warn!("Failed to connect input '{}': {}", port.name, e);
                }
            }
            None => warn!("No input port matches '{}'", pattern),
        }
    }

    if let Some(pattern) = &config.midi.output_port {
        match session.find_by_name(PortDirection::Output, pattern) {
            Some(port) => {
                if let Err(e) = controller.connect_output(&port.id).await {
                    warn!("Failed to connect output '{}': {}", port.name, e);
                }
            }
            None => warn!("No output port matches '{}'", pattern),
        }
    }
}

fn list_ports(driver: &dyn PortDriver) {
    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    for (title, ports) in [
        ("Input Ports:", driver.input_ports()),
        ("Output Ports:", driver.output_ports()),
    ] {
        println!("\n{}", title.bold());
        match ports {
            Ok(ports) if ports.is_empty() => println!("  {}", "No ports found".dimmed()),
            Ok(ports) => {
                for port in ports {
                    println!("  {} {}", port.name, port.id.dimmed());
                }
            }
            Err(e) => println!("  {} {}", "error:".red(), e),
        }
    }

    println!();
}

fn init_logging(level: &str, directory: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, "midirc.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
