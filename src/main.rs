// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! CrashDoc - Accident Documentation and Emergency Alerting
//!
//! Headless crash monitor, manual SOS and damage assessment from the
//! command line.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crashdoc::alert::AlertEvent;
use crashdoc::report::{Photo, ReportWizard, CAPTURE_STEPS};
use crashdoc::{assessment, location, Config, Engine, ReportExporter, WebSocketServer, VERSION};

/// CrashDoc - Accident Documentation and Emergency Alerting
#[derive(Parser, Debug)]
#[command(name = "crashdoc")]
#[command(author = "CrashDoc Project")]
#[command(version = VERSION)]
#[command(about = "Crash detection, emergency SOS and AI damage assessment")]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch for crashes and run the alert flow
    Monitor {
        /// Use the simulated accelerometer
        #[arg(long)]
        demo: bool,

        /// Replay a JSON-lines accelerometer trace
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Impact threshold in m/s²
        #[arg(long)]
        threshold: Option<f64>,

        /// Serve the WebSocket presentation channel
        #[arg(long)]
        ws: bool,

        /// WebSocket server port
        #[arg(long)]
        ws_port: Option<u16>,

        /// Raise a test crash once monitoring starts
        #[arg(long)]
        test_crash: bool,
    },

    /// Trigger a manual SOS and wait until every channel is notified
    Sos {
        /// Seconds of cancellable countdown before dispatch
        #[arg(long)]
        countdown: Option<u32>,
    },

    /// Assess accident photos and export a report
    Assess {
        /// Photos in capture order: front, rear, left, right, close-ups
        photos: Vec<PathBuf>,

        /// Report output directory
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("🚗 CrashDoc v{} - Accident Documentation and Emergency Alerting", VERSION);

    // Load or create configuration
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let config = Config::load_or_create(&config_path)?;
    info!("Configuration loaded from {:?}", config_path);

    let rt = tokio::runtime::Runtime::new()?;
    match args.command {
        Command::Monitor {
            demo,
            replay,
            threshold,
            ws,
            ws_port,
            test_crash,
        } => {
            let mut config = config;
            if demo {
                config.detection.demo_mode = true;
            }
            if replay.is_some() {
                config.detection.replay_file = replay;
            }
            if let Some(threshold) = threshold {
                config.detection.threshold = threshold;
            }
            if ws {
                config.streaming.websocket_enabled = true;
            }
            if let Some(port) = ws_port {
                config.streaming.websocket_port = port;
            }
            rt.block_on(run_monitor(config, test_crash))
        }
        Command::Sos { countdown } => {
            let mut config = config;
            if let Some(secs) = countdown {
                config.alert.sos_countdown_secs = secs;
            }
            rt.block_on(run_sos(config))
        }
        Command::Assess { photos, out } => {
            let mut config = config;
            if let Some(out) = out {
                config.report_dir = out;
            }
            rt.block_on(run_assess(config, photos))
        }
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Log alert transitions for a headless session
fn spawn_alert_log(mut events: broadcast::Receiver<AlertEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AlertEvent::Armed { remaining, .. }) => {
                    warn!("⚠️  Crash alert - dispatching in {}s unless cancelled", remaining)
                }
                Ok(AlertEvent::CountdownTick { remaining, .. }) if remaining > 0 => {
                    info!("   {}s", remaining)
                }
                Ok(AlertEvent::ChannelNotified { channel, .. }) => info!("   ✓ {}", channel),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Run the crash monitor until Ctrl+C
async fn run_monitor(config: Config, test_crash: bool) -> Result<()> {
    let streaming = config.streaming.clone();
    let mut engine = Engine::new(config).await?;
    spawn_alert_log(engine.alerts().subscribe());
    engine.start().await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server = if streaming.websocket_enabled {
        let server = WebSocketServer::new(&streaming, engine.alerts().clone(), engine.bus());
        server.start(shutdown_rx).await?;
        Some(server)
    } else {
        None
    };

    if test_crash {
        engine.test_crash().await;
    }

    info!("🚀 CrashDoc monitoring");
    info!("   Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");
    let _ = shutdown_tx.send(());
    drop(server);
    engine.stop().await?;

    info!("CrashDoc shutdown complete");
    Ok(())
}

/// Trigger SOS, wait for dispatch to complete, then stand down
async fn run_sos(mut config: Config) -> Result<()> {
    config.detection.auto_start = false;
    let mut engine = Engine::new(config).await?;
    let alerts = engine.alerts().clone();
    let mut events = alerts.subscribe();
    spawn_alert_log(alerts.subscribe());

    alerts.trigger_sos().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(AlertEvent::Active { .. }) => break,
                Ok(AlertEvent::Cancelled { .. }) => {
                    info!("SOS cancelled");
                    engine.stop().await?;
                    return Ok(());
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => bail!("alert controller stopped"),
            },
            _ = tokio::signal::ctrl_c() => {
                if alerts.session().remaining().is_some() {
                    alerts.cancel().await?;
                }
                info!("SOS interrupted");
                engine.stop().await?;
                return Ok(());
            }
        }
    }

    let session = alerts.session();
    info!(
        "🆘 Help is on the way - {}",
        location::describe(session.location.as_ref())
    );
    alerts.dismiss().await?;
    engine.stop().await
}

/// Assess photos and export the report
async fn run_assess(config: Config, paths: Vec<PathBuf>) -> Result<()> {
    if paths.len() > CAPTURE_STEPS.len() {
        warn!(
            "Only the first {} photos are used, {} ignored",
            CAPTURE_STEPS.len(),
            paths.len() - CAPTURE_STEPS.len()
        );
    }

    let mut wizard = ReportWizard::new();
    for (step, path) in CAPTURE_STEPS.iter().zip(paths) {
        if !path.exists() {
            bail!("photo not found: {:?}", path);
        }
        info!("{}: {:?}", step.title, path);
        wizard.set_photo(step.id, Photo::from_path(path))?;
    }

    let service = assessment::from_config(&config.assessment);
    let locator = location::from_config(&config.location);
    let report = wizard
        .finish(service.as_deref(), locator.as_ref(), config.location.timeout())
        .await;

    let exporter = ReportExporter::new(&config.report_dir)?;
    let path = exporter.export(&report)?;

    let analysis = &report.analysis;
    info!("Severity: {}/10", analysis.severity_score);
    info!(
        "Estimated cost: {}-{} {}",
        analysis.estimated_cost.min, analysis.estimated_cost.max, analysis.estimated_cost.currency
    );
    for part in &analysis.parts_damaged {
        info!("   {} ({:?})", part.part, part.status);
    }
    info!(
        "Likely fault: {} ({}% confidence)",
        analysis.fault_analysis.likely_fault, analysis.fault_analysis.confidence
    );
    info!("Recommended: {}", analysis.recommended_action);
    info!("Report saved to {:?}", path);
    Ok(())
}
