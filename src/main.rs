//! Synheart Sync Agent CLI
//!
//! Periodic upload of biometric and location snapshots.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use synheart_sync_agent::{
    collector::{Collector, FileCollector, NoopCollector},
    config::Config,
    gateway::GatewayClient,
    sync::{
        queue, BackgroundCoordinator, ConfigResolver, DeliveryPipeline, DeviceInfo,
        ExecutionContext, IntervalScheduler, LocalGrantHost, OfflineQueue, PassOutcome,
        PassRunner, StatusHandle, SyncConfiguration, SyncEngine, SyncKind,
    },
    transparency::{create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog},
    DATA_DECLARATION, VERSION,
};
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "synheart-sync")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Background sync agent for biometric and location snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start periodic syncing
    Start {
        /// Run passes only inside granted background windows
        #[arg(long)]
        background: bool,

        /// Length of each background window in seconds
        #[arg(long, default_value = "30")]
        window: u64,
    },

    /// Run one manual sync pass
    Sync,

    /// Show sync settings, queue length and statistics
    Status {
        /// Zero the persisted statistics first
        #[arg(long)]
        reset: bool,
    },

    /// List the offline queue
    Queue {
        /// Drop every queued record
        #[arg(long)]
        clear: bool,
    },

    /// Edit sync settings and push them to the control plane
    Settings {
        /// Location cadence in minutes
        #[arg(long)]
        location_minutes: Option<u64>,

        /// Biometric cadence in minutes
        #[arg(long)]
        biometric_minutes: Option<u64>,

        /// Run a pass when the agent starts
        #[arg(long)]
        sync_on_open: Option<bool>,

        /// Show notifications
        #[arg(long)]
        notifications: Option<bool>,
    },

    /// Show configuration
    Config,

    /// Display the data declaration
    Declaration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { background, window } => cmd_start(background, window).await,
        Commands::Sync => cmd_sync().await,
        Commands::Status { reset } => cmd_status(reset).await,
        Commands::Queue { clear } => cmd_queue(clear).await,
        Commands::Settings {
            location_minutes,
            biometric_minutes,
            sync_on_open,
            notifications,
        } => {
            cmd_settings(location_minutes, biometric_minutes, sync_on_open, notifications).await
        }
        Commands::Config => {
            cmd_config();
            Ok(())
        }
        Commands::Declaration => {
            println!("{DATA_DECLARATION}");
            Ok(())
        }
    }
}

/// Everything a pass needs, wired from the local config.
struct Agent {
    engine: Arc<SyncEngine>,
    stats: SharedTransparencyLog,
}

async fn build_agent(config: &mut Config) -> anyhow::Result<Agent> {
    config
        .ensure_directories()
        .context("could not create data directory")?;
    let principal = ensure_principal(config);

    let client = GatewayClient::new(config.request_timeout)?;
    let resolver = Arc::new(ConfigResolver::new(
        client.clone(),
        SyncConfiguration::with_endpoint(config.endpoint.clone()),
    ));
    let queue = Arc::new(OfflineQueue::open(config.queue_path()).await);
    let status = StatusHandle::new();
    let stats = create_shared_log_with_persistence(config.stats_path());
    let pipeline = DeliveryPipeline::new(
        client,
        queue,
        status.clone(),
        resolver.subscribe(),
        config.queue_policy,
        stats.clone(),
    );

    let collector: Arc<dyn Collector> = match &config.snapshot_source {
        Some(path) => Arc::new(FileCollector::new(path.clone())),
        None => Arc::new(NoopCollector::new()),
    };

    let engine = SyncEngine::new(
        collector,
        resolver,
        pipeline,
        status,
        DeviceInfo::current(config.simulated),
        stats.clone(),
    )
    .with_principal(principal)
    .with_collector_timeout(config.collector_timeout);

    Ok(Agent {
        engine: Arc::new(engine),
        stats,
    })
}

/// Use the configured principal, generating and saving one on first run.
fn ensure_principal(config: &mut Config) -> String {
    let existing = config.user_id.is_some();
    let principal = config.principal_or_generate();
    if !existing {
        match config.save() {
            Ok(()) => info!(user_id = %principal, "generated user ID"),
            Err(e) => warn!(error = %e, "could not save generated user ID"),
        }
    }
    principal
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "could not load config; using defaults");
            Config::default()
        }
    }
}

async fn cmd_start(background: bool, window: u64) -> anyhow::Result<()> {
    println!("Synheart Sync Agent v{VERSION}");
    println!();

    let mut config = load_config();
    let agent = build_agent(&mut config).await?;
    let engine = Arc::clone(&agent.engine);

    println!("Starting sync...");
    println!("  Endpoint: {}", config.endpoint);
    println!(
        "  User ID: {}",
        engine.principal().unwrap_or_else(|| "(none)".to_string())
    );
    println!("  Queue policy: {:?}", config.queue_policy);
    println!(
        "  Mode: {}",
        if background {
            format!("background ({window}s windows)")
        } else {
            "foreground".to_string()
        }
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || signal.notify_one()).context("Error setting Ctrl+C handler")?;

    let mut status_rx = engine.status().subscribe();
    let status_printer = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            println!("[{}] {status}", chrono::Local::now().format("%H:%M:%S"));
        }
    });

    engine.request_authorizations().await;
    if let Some(outcome) = engine.on_foreground_activate().await {
        print_outcome(&outcome);
    }

    let refresh = {
        let engine = Arc::clone(&engine);
        let every = config.config_refresh.max(Duration::from_secs(60));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                engine.refresh_config().await;
            }
        })
    };

    let runner: Arc<dyn PassRunner> = engine.clone();
    if background {
        let (host, requests) = LocalGrantHost::new();
        let coordinator = Arc::new(BackgroundCoordinator::new(
            Arc::new(host),
            runner,
            engine.resolver().subscribe(),
            engine.status().clone(),
        ));
        coordinator.request_grant()?;
        let driver = tokio::spawn(LocalGrantHost::run(
            Arc::clone(&coordinator),
            requests,
            Duration::from_secs(window),
        ));

        shutdown.notified().await;
        driver.abort();
    } else {
        let scheduler = Arc::new(IntervalScheduler::new(runner));
        scheduler.watch(engine.resolver().subscribe());

        shutdown.notified().await;
        scheduler.stop();
    }

    println!();
    println!("Stopping sync...");
    refresh.abort();
    status_printer.abort();

    if let Err(e) = agent.stats.save() {
        eprintln!("Warning: Could not save transparency stats: {e}");
    }

    println!();
    println!("{}", agent.stats.summary());
    println!();
    println!(
        "Offline queue: {} record(s)",
        engine.pipeline().queue().count().await
    );
    Ok(())
}

async fn cmd_sync() -> anyhow::Result<()> {
    let mut config = load_config();
    let agent = build_agent(&mut config).await?;

    agent.engine.refresh_config().await;
    let outcome = agent
        .engine
        .run_pass(SyncKind::Manual, ExecutionContext::Foreground)
        .await;
    print_outcome(&outcome);
    println!("Status: {}", agent.engine.status().current());
    println!(
        "Offline queue: {} record(s)",
        agent.engine.pipeline().queue().count().await
    );

    if let Err(e) = agent.stats.save() {
        eprintln!("Warning: Could not save transparency stats: {e}");
    }
    Ok(())
}

async fn cmd_status(reset: bool) -> anyhow::Result<()> {
    let config = load_config();

    if reset {
        let stats = TransparencyLog::with_persistence(config.stats_path());
        stats.reset();
        stats.save().context("could not save reset statistics")?;
        println!("Statistics reset.");
        println!();
    }

    println!("Synheart Sync Agent Status");
    println!("==========================");
    println!();
    println!("Endpoint: {}", config.endpoint);
    println!(
        "User ID: {}",
        config.user_id.as_deref().unwrap_or("(not set)")
    );

    let client = GatewayClient::new(config.request_timeout)?;
    let resolver = ConfigResolver::new(
        client,
        SyncConfiguration::with_endpoint(config.endpoint.clone()),
    );
    let settings = match &config.user_id {
        Some(principal) => resolver.fetch(principal).await,
        None => resolver.current(),
    };
    println!();
    println!(
        "Sync settings ({}):",
        if resolver.has_remote() {
            "from control plane"
        } else {
            "defaults"
        }
    );
    print_settings(&settings);

    println!();
    match queue::load(&config.queue_path()).await {
        Ok(records) => println!("Offline queue: {} record(s)", records.len()),
        Err(e) => println!("Offline queue: unreadable ({e})"),
    }

    let stats_path = config.stats_path();
    if stats_path.exists() {
        let stats = TransparencyLog::with_persistence(stats_path).stats();
        let last = stats
            .last_delivery
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!();
        println!("Statistics:");
        println!("  Passes run: {}", stats.passes_run);
        println!("  Passes skipped: {}", stats.passes_skipped);
        println!("  Records delivered: {}", stats.records_delivered);
        println!("  Delivery failures: {}", stats.delivery_failures);
        println!("  Discarded by queue clear: {}", stats.records_discarded);
        println!("  Last delivery: {last}");
    } else {
        println!();
        println!("No previous session data found.");
    }
    Ok(())
}

async fn cmd_queue(clear: bool) -> anyhow::Result<()> {
    let config = load_config();
    let queue = OfflineQueue::open(config.queue_path()).await;

    if clear {
        let dropped = queue.clear_all().await?;
        println!("Dropped {dropped} queued record(s)");
        return Ok(());
    }

    let records = queue.records().await;
    if records.is_empty() {
        println!("Offline queue is empty");
        return Ok(());
    }

    println!("Offline queue ({} record(s)):", records.len());
    for record in &records {
        let location = record.location();
        println!(
            "  {}  user={}  lat={:.5} lon={:.5}  biometrics={}",
            record.timestamp().to_rfc3339(),
            record.user_id(),
            location.latitude,
            location.longitude,
            if record.has_biometrics() { "yes" } else { "no" }
        );
    }
    Ok(())
}

async fn cmd_settings(
    location_minutes: Option<u64>,
    biometric_minutes: Option<u64>,
    sync_on_open: Option<bool>,
    notifications: Option<bool>,
) -> anyhow::Result<()> {
    let mut config = load_config();
    let principal = ensure_principal(&mut config);

    let client = GatewayClient::new(config.request_timeout)?;
    let resolver = Arc::new(ConfigResolver::new(
        client,
        SyncConfiguration::with_endpoint(config.endpoint.clone()),
    ));
    let mut settings = resolver.fetch(&principal).await;

    let edited = location_minutes.is_some()
        || biometric_minutes.is_some()
        || sync_on_open.is_some()
        || notifications.is_some();
    if !edited {
        print_settings(&settings);
        return Ok(());
    }

    if let Some(minutes) = location_minutes {
        anyhow::ensure!(minutes > 0, "location interval must be at least one minute");
        settings.location_interval = Duration::from_secs(minutes * 60);
    }
    if let Some(minutes) = biometric_minutes {
        anyhow::ensure!(minutes > 0, "biometric interval must be at least one minute");
        settings.biometric_interval = Duration::from_secs(minutes * 60);
    }
    if let Some(flag) = sync_on_open {
        settings.sync_on_app_open = flag;
    }
    if let Some(flag) = notifications {
        settings.notifications_enabled = flag;
    }

    resolver.update(&principal, settings.clone()).await?;
    println!("Settings updated:");
    print_settings(&settings);
    Ok(())
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn print_settings(settings: &SyncConfiguration) {
    println!(
        "  Location interval: {} min",
        settings.location_interval.as_secs() / 60
    );
    println!(
        "  Biometric interval: {} min",
        settings.biometric_interval.as_secs() / 60
    );
    println!("  Sync on app open: {}", settings.sync_on_app_open);
    println!("  Notifications: {}", settings.notifications_enabled);
    println!("  Location precision: {:?}", settings.location_precision);
}

fn print_outcome(outcome: &PassOutcome) {
    match outcome {
        PassOutcome::Delivered(delivered) => {
            println!("Delivered at {}", delivered.at.to_rfc3339());
            if delivered.backlog_delivered > 0 {
                println!("  Backlog re-sent: {}", delivered.backlog_delivered);
            }
            if delivered.backlog_discarded > 0 {
                println!(
                    "  Backlog dropped without retry: {}",
                    delivered.backlog_discarded
                );
            }
        }
        PassOutcome::Failed(e) => println!("Sync failed: {e} (record kept in offline queue)"),
        PassOutcome::Skipped(reason) => println!("Sync skipped: {reason:?}"),
    }
}
