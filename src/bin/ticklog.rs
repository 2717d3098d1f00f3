//! ticklog CLI: run the periodic logging engine or check its configuration.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use ticklog::config::{Config, ConfigOverrides};
use ticklog::engine::Engine;
use ticklog::telemetry::{TelemetryConfig, init_telemetry};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ticklog", about = "Append a sequenced line to a log file every interval")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine until interrupted
    Run(Overrides),
    /// Validate the configuration and print the effective values
    Check(Overrides),
}

#[derive(Args)]
struct Overrides {
    /// TOML config file; environment variables are used when absent
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log file to append to
    #[arg(long)]
    destination: Option<PathBuf>,
    /// Seconds between lines (1-3600)
    #[arg(long)]
    interval: Option<u32>,
    /// Worker count; only 1 keeps lines in sequence order
    #[arg(long)]
    workers: Option<usize>,
}

impl Overrides {
    /// File or environment first, flags on top, validated once merged.
    fn load(&self) -> anyhow::Result<Config> {
        let overrides = ConfigOverrides {
            destination: self.destination.clone(),
            interval_secs: self.interval,
            workers: self.workers,
        };
        Ok(Config::resolve(self.config.as_deref(), &overrides)?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(overrides) => cmd_run(overrides).await,
        Command::Check(overrides) => cmd_check(&overrides),
    }
}

async fn cmd_run(overrides: Overrides) -> anyhow::Result<()> {
    let config = overrides.load()?;

    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "ticklog".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let engine = Arc::new(Engine::default());
    engine.start(config.engine.clone()).await?;

    #[cfg(unix)]
    let reload = tokio::spawn(reload_on_sighup(Arc::clone(&engine), overrides));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, stopping");

    #[cfg(unix)]
    reload.abort();

    let report = engine.stop().await?;
    println!(
        "Stopped: {} produced, {} appended, {} failed, terminal line {}",
        report.total_produced,
        report.appended,
        report.failed,
        if report.terminal_written {
            "written"
        } else {
            "not written"
        }
    );

    guard.force_flush();
    Ok(())
}

/// Re-read the configuration on SIGHUP and hand it to the running engine.
#[cfg(unix)]
async fn reload_on_sighup(engine: Arc<Engine>, overrides: Overrides) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    while hangup.recv().await.is_some() {
        match overrides.load() {
            Ok(config) => {
                if let Err(e) = engine.reconfigure(config.engine) {
                    warn!(error = %e, "reload rejected");
                }
            }
            Err(e) => warn!(error = %e, "reload failed, keeping current settings"),
        }
    }
    Ok(())
}

fn cmd_check(overrides: &Overrides) -> anyhow::Result<()> {
    let config = overrides.load()?;

    println!("Destination:  {}", config.engine.destination.display());
    println!("Interval:     {}s", config.engine.interval_secs);
    println!("Message:      {}", config.engine.message);
    println!("Workers:      {}", config.engine.workers);
    println!(
        "OTLP:         {}",
        config.otel_endpoint.as_deref().unwrap_or("-")
    );
    println!("Log level:    {}", config.log_level);
    Ok(())
}
