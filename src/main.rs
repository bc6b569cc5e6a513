use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use output_route_selector::channel::{self, MethodCall};
use output_route_selector::config::{Config, ConfigLoader};
use output_route_selector::logging::{LoggingConfig, cleanup_old_logs, initialize_logging};
use output_route_selector::route::{RouteSession, RouteSessionHandle, SwitchOutcome};
use output_route_selector::service::ServiceManager;
use output_route_selector::system::{ConsolePicker, SimulatedAudioRoute, StandardFileSystem};

const LOG_RETENTION_DAYS: u64 = 7;

#[derive(Parser)]
#[command(name = "output-route-selector")]
#[command(about = "Audio output route selector for speaker, receiver, wired and Bluetooth outputs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available audio outputs and the active one
    List,
    /// Switch to an output and print the route the OS settled on
    Switch {
        /// Output title: speaker, receiver, wiredHeadset or a Bluetooth name
        #[arg(short, long)]
        device: String,
    },
    /// Send one raw method call and print the JSON response
    Call {
        #[arg(short, long)]
        method: String,
        /// Arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
    },
    /// Print route events until interrupted; method calls are read from stdin
    Watch,
    /// Validate configuration file
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::new_production(path.clone()),
        None => ConfigLoader::new_with_default_path()?,
    };
    let config = loader.load_config()?;

    let (_guard, log_dir) =
        initialize_logging(LoggingConfig::from_settings(&config.general.log_level, cli.verbose)?)?;
    if let Some(dir) = &log_dir {
        if let Err(e) = cleanup_old_logs(dir, LOG_RETENTION_DAYS) {
            warn!("Failed to clean up old logs: {:#}", e);
        }
    }

    info!(
        "Configuration loaded from {}",
        loader.get_config_path().display()
    );

    match cli.command {
        Some(Commands::List) => list_outputs(&config).await,
        Some(Commands::Switch { device }) => switch_output(&config, &device).await,
        Some(Commands::Call { method, args }) => call_method(&config, method, args.as_deref()).await,
        Some(Commands::CheckConfig) => check_config(&loader, &config),
        Some(Commands::Watch) | None => {
            let mut manager = ServiceManager::new(loader)?;
            manager.run().await
        }
    }
}

fn start_session(config: &Config) -> Result<RouteSessionHandle> {
    let backend = SimulatedAudioRoute::from_config(&config.simulator);
    RouteSession::spawn(backend, ConsolePicker::new(), &config.timing)
}

async fn stop_session(session: RouteSessionHandle) {
    session.shutdown();
    session.stopped().await;
}

async fn list_outputs(config: &Config) -> Result<()> {
    let session = start_session(config)?;
    let outputs = session.available_outputs().await;
    stop_session(session).await;

    let outputs = outputs.context("Failed to list audio outputs")?;
    println!("Available audio outputs:");
    for (i, device) in outputs.iter().enumerate() {
        println!("  {}. {}", i + 1, device);
    }
    Ok(())
}

async fn switch_output(config: &Config, device: &str) -> Result<()> {
    info!("Manual output switch requested: {}", device);
    println!("Switching audio output to: {}", device);

    let session = start_session(config)?;
    let outcome = session.change_audio_output(device).await;
    stop_session(session).await;

    match outcome {
        Ok(SwitchOutcome::Confirmed(active)) => {
            if active.title == device || active.device_type.as_str().eq_ignore_ascii_case(device) {
                println!("✓ Audio output is now: {}", active);
            } else {
                println!("! Requested {} but the OS kept: {}", device, active);
            }
            Ok(())
        }
        Ok(SwitchOutcome::Undetermined) => {
            println!("! Route changed but no active output could be determined");
            Ok(())
        }
        Ok(SwitchOutcome::Superseded) => {
            println!("! Switch was superseded by a newer request");
            Ok(())
        }
        Err(e) => {
            println!("✗ Failed to switch output [{}]: {}", e.code(), e);
            Err(e.into())
        }
    }
}

async fn call_method(config: &Config, method: String, args: Option<&str>) -> Result<()> {
    let arguments = match args {
        Some(raw) => serde_json::from_str(raw)
            .with_context(|| format!("Arguments are not valid JSON: {raw}"))?,
        None => serde_json::Value::Null,
    };

    let session = start_session(config)?;
    let response = channel::dispatch(&session, MethodCall::new(method, arguments)).await;
    stop_session(session).await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn check_config(loader: &ConfigLoader<StandardFileSystem>, config: &Config) -> Result<()> {
    info!("Validating configuration");

    if !loader.config_exists() {
        bail!(
            "No configuration file at {}",
            loader.get_config_path().display()
        );
    }

    println!("Configuration validation:");
    println!("  ✓ Configuration file parsed successfully");
    println!("  ✓ Log level: {}", config.general.log_level);
    println!(
        "  ✓ Confirmation: settle {}ms, retry step {}ms, {} attempts",
        config.timing.settle_delay_ms,
        config.timing.retry_step_ms,
        config.timing.max_confirm_attempts
    );
    if config.timing.poll_interval_ms == 0 {
        println!("  ✓ Polling disabled");
    } else {
        println!("  ✓ Poll interval: {}ms", config.timing.poll_interval_ms);
    }
    println!(
        "  ✓ Simulated Bluetooth devices: {}",
        config.simulator.bluetooth_devices.len()
    );

    Ok(())
}
