//! later-send - Background daemon for scheduled posting
//!
//! Watches the Latercast queue and delivers posts when their scheduled
//! time arrives.

use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use liblatercast::platforms::create_publishers;
use liblatercast::{
    Config, NotificationDispatcher, PostStore, PublishOrchestrator, Result, Scheduler, Trigger,
    TriggerHandle, Triggers,
};

#[derive(Parser, Debug)]
#[command(name = "later-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled posting")]
#[command(long_about = "\
later-send - Background daemon for scheduled posting

DESCRIPTION:
    later-send is a long-running daemon that watches the Latercast queue
    and automatically publishes scheduled posts at the right time.

    Delivery checks run on several independent triggers with identical
    effect: a fine-grained poll timer, a coarse wake timer that catches up
    after the machine was suspended, and an explicit SIGUSR1 signal. Due
    posts are claimed with a per-post lease, so several daemons (or a
    daemon racing a 'later-queue check') never publish the same post
    twice.

USAGE:
    # Run in foreground (logs to stderr)
    later-send

    # Run with custom poll interval
    later-send --poll-interval 30

    # Process due posts once and exit
    later-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes in-flight posts)
    SIGUSR1         - Force an immediate delivery check

CONFIGURATION:
    Configuration file: ~/.config/latercast/config.toml
    Database location:  ~/.local/share/latercast/posts.db

    [scheduler]
    poll_interval = 60    # seconds between delivery checks
    wake_interval = 900   # coarse catch-up timer
    lease_duration = 120  # seconds before a stalled pass loses its claim
    publish_timeout = 30  # per-platform delivery bound

    [scheduler.retry]
    enabled = false       # re-queue posts whose every platform failed
    max_retries = 3
    retry_delay = 300

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due posts (default: 60)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit (for testing)
    #[arg(long)]
    #[arg(help = "Process due posts once and exit")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    liblatercast::logging::init_from_env(if cli.verbose { "debug" } else { "info" });

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let store = PostStore::connect(&config.database.path).await?;

    let mut orchestrator = PublishOrchestrator::new(config.scheduler.publish_timeout());
    for publisher in create_publishers(&config.platforms) {
        orchestrator.register(publisher);
    }

    let scheduler = Scheduler::new(
        store,
        orchestrator,
        NotificationDispatcher::default(),
        config.scheduler.clone(),
    );

    info!("later-send daemon starting");

    if cli.once {
        let due = scheduler.check_now().await?;
        info!(count = due.len(), "processed due posts once, exiting");
    } else {
        let poll_interval = cli
            .poll_interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.scheduler.poll_interval());
        info!(poll_interval_secs = poll_interval.as_secs(), "poll interval");

        let (triggers, handle) =
            Triggers::new(poll_interval, config.scheduler.wake_interval());

        let shutdown = Arc::new(AtomicBool::new(false));
        setup_signal_handlers(shutdown.clone(), handle)?;
        log_alerts(&scheduler);

        scheduler.run(triggers, shutdown).await;
    }

    info!("later-send daemon stopped");
    Ok(())
}

/// Surface user-facing alerts on the daemon's log.
fn log_alerts(scheduler: &Scheduler) {
    let mut alerts = scheduler.dispatcher().subscribe_alerts();
    tokio::spawn(async move {
        while let Ok(alert) = alerts.recv().await {
            info!(post_id = %alert.post_id, "{}: {}", alert.title, alert.body);
        }
    });
}

/// Set up signal handlers for graceful shutdown and forced checks
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>, trigger: TriggerHandle) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGUSR1]).map_err(|e| {
        liblatercast::LatercastError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                SIGUSR1 => {
                    info!("Received SIGUSR1, forcing a delivery check");
                    trigger.try_fire(Trigger::Wake);
                }
                _ => {}
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>, _trigger: TriggerHandle) -> Result<()> {
    Ok(())
}
