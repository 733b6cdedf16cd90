// # zcnotifyd - Zeroconf Change Notifier Daemon
//
// The zcnotifyd daemon is responsible for:
// 1. Parsing arguments and loading the TOML configuration
// 2. Initializing logging and the runtime
// 3. Registering notifiers and starting the mDNS discoverer
// 4. Running the scan scheduler and change dispatcher until a signal arrives
//
// All change-detection logic lives in zcnotify-core; this binary only wires
// the pieces together.
//
// ## Configuration
//
// - `--config` / `ZCNOTIFY_CONFIG`: Path to the TOML file (default `zcnotify.toml`)
// - `--log-level` / `ZCNOTIFY_LOG_LEVEL`: trace, debug, info, warn, error
// - `ZCNOTIFY_MODE=dry-run`: Build notification emails but do not send them
//
// ## Example
//
// ```bash
// zcnotifyd --config /etc/zcnotify.toml --log-level debug
// ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use zcnotify_core::scheduler::ScanEvent;
use zcnotify_core::traits::Notifier;
use zcnotify_core::{
    ChangeDispatcher, NotifierRegistry, ScanScheduler, ScanSettings, ZcnotifyConfig,
};
use zcnotify_discovery_mdns::MdnsDiscoverer;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (discovery failure, unexpected failure)
#[derive(Debug, Clone, Copy)]
enum ZcnotifyExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<ZcnotifyExitCode> for ExitCode {
    fn from(code: ZcnotifyExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// zcnotifyd - report zeroconf services appearing, changing and disappearing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "ZCNOTIFY_CONFIG", default_value = "zcnotify.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ZCNOTIFY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "Log level '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

/// Load and validate the configuration file
fn load_config(path: &Path) -> Result<ZcnotifyConfig> {
    let config = ZcnotifyConfig::load(path)?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Build one notifier per enabled notification type
fn build_notifiers(config: &ZcnotifyConfig) -> Result<Vec<Box<dyn Notifier>>> {
    #[allow(unused_mut)]
    let mut registry = NotifierRegistry::with_builtin();

    #[cfg(feature = "email")]
    zcnotify_notifier_email::register(&mut registry);

    debug!("Registered notifiers: {:?}", registry.list_notifiers());

    Ok(registry.create_notifiers(config)?)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = match parse_log_level(&args.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ZcnotifyExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ZcnotifyExitCode::ConfigError.into();
    }

    info!("Starting zcnotifyd daemon");

    let config = match load_config(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return ZcnotifyExitCode::ConfigError.into();
        }
    };

    info!(
        "Configuration loaded: {} notifier type(s), scanning every {}s",
        config.notify_types.len(),
        config.scan_period().as_secs()
    );

    let notifiers = match build_notifiers(&config) {
        Ok(notifiers) => notifiers,
        Err(e) => {
            error!("Notifier setup failed: {:#}", e);
            return ZcnotifyExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ZcnotifyExitCode::RuntimeError.into();
        }
    };

    let discoverer = match MdnsDiscoverer::new(&config.browse_query()) {
        Ok(discoverer) => discoverer,
        Err(e) => {
            error!("Failed to start discovery: {}", e);
            return ZcnotifyExitCode::ConfigError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, discoverer, notifiers).await {
            error!("Daemon error: {:#}", e);
            ZcnotifyExitCode::RuntimeError
        } else {
            ZcnotifyExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until a shutdown signal or a fatal discovery error
async fn run_daemon(
    config: ZcnotifyConfig,
    discoverer: MdnsDiscoverer,
    notifiers: Vec<Box<dyn Notifier>>,
) -> Result<()> {
    let settings = ScanSettings::from_config(&config);
    let (scheduler, events_rx) = ScanScheduler::new(Box::new(discoverer), settings)?;
    let (scheduler, monitor_rx) = scheduler.monitored(config.engine.monitor_channel_capacity);

    let monitor = tokio::spawn(log_scan_events(monitor_rx));

    let dispatcher = ChangeDispatcher::new(notifiers, config.engine.shutdown_policy);
    info!("Dispatching to {} notifier(s)", dispatcher.notifier_count());
    let dispatcher = tokio::spawn(dispatcher.run(events_rx));

    let shutdown = CancellationToken::new();
    let signals = tokio::spawn(cancel_on_signal(shutdown.clone()));

    let outcome = scheduler.run(shutdown).await;
    signals.abort();

    let report = dispatcher.await.context("Dispatcher task failed")?;
    if report.outstanding > 0 {
        warn!(
            "{} notification(s) still in flight at exit",
            report.outstanding
        );
    }

    if let Err(e) = monitor.await {
        warn!("Monitor task failed: {}", e);
    }

    outcome?;
    info!("Shutting down daemon");
    Ok(())
}

/// Log scheduler monitoring events until the scheduler stops
async fn log_scan_events(mut monitor_rx: mpsc::Receiver<ScanEvent>) {
    while let Some(event) = monitor_rx.recv().await {
        match event {
            ScanEvent::Started { service_type } => info!("Browsing for {}", service_type),
            ScanEvent::ScanCompleted {
                cycle,
                discovered,
                changes,
            } => debug!(
                "Scan {} complete: {} instance(s), {} change(s)",
                cycle, discovered, changes
            ),
            ScanEvent::DiscoveryFailed {
                cycle,
                attempt,
                error,
            } => warn!("Scan {} attempt {} failed: {}", cycle, attempt, error),
            ScanEvent::Stopped { reason } => info!("Scanner stopped: {}", reason),
        }
    }
}

/// Cancel `shutdown` on the first SIGTERM or SIGINT
async fn cancel_on_signal(shutdown: CancellationToken) {
    match wait_for_shutdown_signal().await {
        Ok(signal) => info!("Received shutdown signal: {}", signal),
        Err(e) => error!("Signal handling failed, shutting down: {}", e),
    }
    shutdown.cancel();
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };

    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
