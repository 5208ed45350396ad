//! later-queue - Manage the scheduled post queue
//!
//! Unix-style tool for scheduling posts and managing the queue.

use clap::{Parser, Subcommand};

use liblatercast::platforms::create_publishers;
use liblatercast::{
    Config, NotificationDispatcher, PostDraft, PostStatus, PostStore, PublishOrchestrator,
    Result, ScheduledPost, Scheduler,
};

#[derive(Parser, Debug)]
#[command(name = "later-queue")]
#[command(version)]
#[command(about = "Manage scheduled posts")]
#[command(long_about = "\
later-queue - Manage scheduled posts

DESCRIPTION:
    later-queue is a Unix-style tool for managing the Latercast post queue.
    Use it to schedule, list, cancel, or reschedule posts, to force an
    immediate delivery check, and to view queue statistics.

COMMANDS:
    add         Schedule a new post
    list        List posts in the queue
    cancel      Cancel a post
    reschedule  Move a post to a different time
    check       Run a delivery check right now
    stats       Show queue statistics

USAGE EXAMPLES:
    # Schedule a post for tomorrow afternoon on two platforms
    later-queue add --at \"tomorrow 3pm\" --on instagram,facebook \"Big news!\"

    # Schedule a post two hours from now
    later-queue add --at 2h \"See you soon\"

    # List scheduled posts, or everything that failed
    later-queue list
    later-queue list --status failed --format json

    # Cancel or reschedule
    later-queue cancel <POST_ID>
    later-queue reschedule <POST_ID> \"+30m\"

    # Force an immediate delivery check
    later-queue check

CONFIGURATION:
    Configuration file: ~/.config/latercast/config.toml
    Database location:  ~/.local/share/latercast/posts.db

    Override with environment variables:
        LATERCAST_CONFIG - Path to config file

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Conflict (post is being published right now)
    3 - Invalid input (bad post ID, time format, empty platform list, ...)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Schedule a new post
    Add {
        /// Post caption
        caption: String,

        /// When to publish (e.g., "2h", "tomorrow 3pm")
        #[arg(long, value_name = "WHEN")]
        at: String,

        /// Comma-separated target platforms (defaults to the configured set)
        #[arg(long, value_name = "PLATFORMS")]
        on: Option<String>,
    },

    /// List posts
    List {
        /// Filter by status: scheduled, publishing, published, failed
        #[arg(short, long, default_value = "scheduled")]
        status: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Cancel a post
    Cancel {
        /// Post ID to cancel
        post_id: String,
    },

    /// Reschedule a post
    Reschedule {
        /// Post ID to reschedule
        post_id: String,

        /// New schedule time (e.g., "tomorrow 3pm", "+2h")
        time: String,
    },

    /// Run a delivery check right now
    Check,

    /// Show queue statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    liblatercast::logging::init_from_env(if cli.verbose { "debug" } else { "error" });

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let store = PostStore::connect(&config.database.path).await?;
    let scheduler = build_scheduler(&config, store);

    match cli.command {
        Commands::Add { caption, at, on } => {
            cmd_add(&scheduler, &config, caption, &at, on.as_deref()).await?;
        }
        Commands::List { status, format } => {
            cmd_list(&scheduler, &status, &format).await?;
        }
        Commands::Cancel { post_id } => {
            cmd_cancel(&scheduler, &post_id).await?;
        }
        Commands::Reschedule { post_id, time } => {
            cmd_reschedule(&scheduler, &post_id, &time).await?;
        }
        Commands::Check => {
            cmd_check(&scheduler).await?;
        }
        Commands::Stats { format } => {
            cmd_stats(&scheduler, &format).await?;
        }
    }

    Ok(())
}

fn build_scheduler(config: &Config, store: PostStore) -> Scheduler {
    let mut orchestrator = PublishOrchestrator::new(config.scheduler.publish_timeout());
    for publisher in create_publishers(&config.platforms) {
        orchestrator.register(publisher);
    }

    Scheduler::new(
        store,
        orchestrator,
        NotificationDispatcher::default(),
        config.scheduler.clone(),
    )
}

/// Schedule a new post
async fn cmd_add(
    scheduler: &Scheduler,
    config: &Config,
    caption: String,
    at: &str,
    on: Option<&str>,
) -> Result<()> {
    let when = liblatercast::scheduling::parse_when(at)?;

    let platforms: Vec<String> = match on {
        Some(list) => list.split(',').map(|p| p.trim().to_string()).collect(),
        None => config.platforms.enabled.clone(),
    };

    let post = scheduler
        .schedule_post(PostDraft {
            caption,
            platforms,
            scheduled_for: when.timestamp(),
        })
        .await?;

    println!(
        "Scheduled {} for {} ({})",
        post.id,
        when.format("%Y-%m-%d %H:%M UTC"),
        format_time_until(chrono::Utc::now().timestamp(), post.scheduled_for)
    );
    Ok(())
}

/// List posts by status
async fn cmd_list(scheduler: &Scheduler, status: &str, format: &str) -> Result<()> {
    validate_format(format)?;

    let status: PostStatus = status
        .parse()
        .map_err(liblatercast::LatercastError::InvalidInput)?;

    let posts = scheduler.store().list_by_status(status).await?;

    if format == "json" {
        output_list_json(&posts);
    } else {
        output_list_text(&posts);
    }

    Ok(())
}

/// Output posts as JSON
fn output_list_json(posts: &[ScheduledPost]) {
    let json: Vec<serde_json::Value> = posts
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "caption": p.caption,
                "platforms": p.platforms,
                "scheduled_for": p.scheduled_for,
                "status": p.status.as_str(),
                "attempts": p.attempts,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json).unwrap());
}

/// Output posts as human-readable text
fn output_list_text(posts: &[ScheduledPost]) {
    if posts.is_empty() {
        return;
    }

    let now = chrono::Utc::now().timestamp();

    for post in posts {
        println!(
            "{} | {} | {} | {}",
            post.id,
            truncate_caption(&post.caption, 50),
            post.platforms.join(","),
            format_time_until(now, post.scheduled_for)
        );
    }
}

/// Truncate a caption to max length with ellipsis
fn truncate_caption(caption: &str, max_chars: usize) -> String {
    if caption.chars().count() <= max_chars {
        caption.to_string()
    } else {
        let head: String = caption.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

/// Format time until the scheduled moment in human-readable form
fn format_time_until(now: i64, scheduled_for: i64) -> String {
    let diff = scheduled_for - now;

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

/// Cancel a post
async fn cmd_cancel(scheduler: &Scheduler, post_id: &str) -> Result<()> {
    scheduler.delete_post(post_id).await?;
    println!("Cancelled {}", post_id);
    Ok(())
}

/// Reschedule a post
async fn cmd_reschedule(scheduler: &Scheduler, post_id: &str, time: &str) -> Result<()> {
    let existing = scheduler.store().get(post_id).await?;
    let when = liblatercast::scheduling::parse_when(time)?;

    scheduler
        .update_post(
            post_id,
            PostDraft {
                caption: existing.caption,
                platforms: existing.platforms,
                scheduled_for: when.timestamp(),
            },
        )
        .await?;

    println!(
        "Rescheduled {} for {}",
        post_id,
        when.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}

/// Run an immediate delivery check
async fn cmd_check(scheduler: &Scheduler) -> Result<()> {
    let due = scheduler.check_now().await?;

    if due.is_empty() {
        println!("No posts due");
        return Ok(());
    }

    println!("Processed {} due post(s):", due.len());
    for post in &due {
        let outcome = scheduler.store().get(&post.id).await?;
        println!(
            "  {} | {} | {}",
            post.id,
            truncate_caption(&post.caption, 40),
            outcome.status
        );
    }
    Ok(())
}

/// Show queue statistics
async fn cmd_stats(scheduler: &Scheduler, format: &str) -> Result<()> {
    validate_format(format)?;

    let counts = scheduler.store().status_counts().await?;
    let count_for = |status: PostStatus| {
        counts
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };

    if format == "json" {
        let json = serde_json::json!({
            "scheduled": count_for(PostStatus::Scheduled),
            "publishing": count_for(PostStatus::Publishing),
            "published": count_for(PostStatus::Published),
            "failed": count_for(PostStatus::Failed),
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        println!("scheduled:  {}", count_for(PostStatus::Scheduled));
        println!("publishing: {}", count_for(PostStatus::Publishing));
        println!("published:  {}", count_for(PostStatus::Published));
        println!("failed:     {}", count_for(PostStatus::Failed));
    }

    Ok(())
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(liblatercast::LatercastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}
