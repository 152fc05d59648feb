//! vitrine: maintenance CLI for ordered media.
//!
//! Every command prints its result as JSON on stdout. Logs go to stderr
//! (or `LOG_FILE`).

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use vitrine_core::defaults;
use vitrine_db::{log_pool_metrics, Database, FilesystemGateway, MediaFamily, VitrineConfig};
use vitrine_media::MediaLibrary;

#[derive(Parser)]
#[command(name = "vitrine")]
#[command(author, version, about = "Ordered media maintenance")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List an owner's media in display order
    List {
        /// Media family (e.g. item_image, partner-logo)
        #[arg(short, long)]
        family: MediaFamily,

        /// Owner id
        #[arg(short, long)]
        owner: Uuid,
    },

    /// List pool media, newest first
    Pool {
        #[arg(long, default_value_t = defaults::PAGE_LIMIT)]
        limit: i64,

        #[arg(long, default_value_t = defaults::PAGE_OFFSET)]
        offset: i64,
    },

    /// Swap a media item with its predecessor
    MoveUp {
        #[arg(short, long)]
        family: MediaFamily,

        /// Media id
        id: Uuid,
    },

    /// Swap a media item with its successor
    MoveDown {
        #[arg(short, long)]
        family: MediaFamily,

        /// Media id
        id: Uuid,
    },

    /// Move a media item to a 1-based position
    MoveTo {
        #[arg(short, long)]
        family: MediaFamily,

        /// Media id
        id: Uuid,

        /// Target position (clamped to the list length)
        #[arg(short, long)]
        position: i32,
    },

    /// Renumber an owner's media to 1..N
    Tighten {
        #[arg(short, long)]
        family: MediaFamily,

        /// Owner id
        #[arg(short, long)]
        owner: Uuid,
    },

    /// Attach a pool item to an owner
    Attach {
        #[arg(short, long)]
        family: MediaFamily,

        /// Owner id
        #[arg(short, long)]
        owner: Uuid,

        /// Pool media id
        pool_id: Uuid,

        /// Alt text (defaults to the pool item's comment)
        #[arg(short, long)]
        alt_text: Option<String>,
    },

    /// Return an attached item to the pool
    Detach {
        #[arg(short, long)]
        family: MediaFamily,

        /// Media id
        id: Uuid,
    },

    /// Delete an attached item and retighten its owner
    Destroy {
        #[arg(short, long)]
        family: MediaFamily,

        /// Media id
        id: Uuid,
    },

    /// Repair a file left in the wrong storage root
    Reconcile {
        #[arg(short, long)]
        family: MediaFamily,

        /// Media id
        id: Uuid,
    },

    /// Probe every configured storage disk
    Check,

    /// Apply pending database migrations
    Migrate,
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // LOG_FORMAT - "json" or "text" (default: "text")
    // LOG_FILE   - path to log file (optional, daily rotation)
    // RUST_LOG   - standard env filter (default: "vitrine=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vitrine=info,vitrine_media=info,vitrine_db=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("vitrine.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let config = VitrineConfig::from_env().context("loading configuration")?;
    let files = FilesystemGateway::from_config(&config.storage);

    // Commands that need no database connection.
    if let Commands::Check = cli.command {
        files.validate().await.context("storage check failed")?;
        print_json(&json!({ "disks": config.storage.disks }))?;
        return Ok(());
    }

    let db = Database::from_config(&config)
        .await
        .context("connecting to database")?;
    info!(max_connections = config.max_connections, "Database connected");
    log_pool_metrics(&db.pool);

    let library = MediaLibrary::new(
        Arc::new(db.media.clone()),
        Arc::new(files),
        config.storage.clone(),
    );

    let output = match cli.command {
        Commands::List { family, owner } => {
            json!(library.collection(family).list(owner).await?)
        }
        Commands::Pool { limit, offset } => json!(library.pool().list(limit, offset).await?),
        Commands::MoveUp { family, id } => {
            json!({ "moved": library.collection(family).move_up(id).await? })
        }
        Commands::MoveDown { family, id } => {
            json!({ "moved": library.collection(family).move_down(id).await? })
        }
        Commands::MoveTo {
            family,
            id,
            position,
        } => {
            json!({ "moved": library.collection(family).move_to_position(id, position).await? })
        }
        Commands::Tighten { family, owner } => {
            json!({ "rows_updated": library.collection(family).retighten(owner).await? })
        }
        Commands::Attach {
            family,
            owner,
            pool_id,
            alt_text,
        } => json!(
            library
                .collection(family)
                .attach_from_pool(owner, pool_id, alt_text)
                .await?
        ),
        Commands::Detach { family, id } => {
            json!(library.collection(family).detach_to_pool(id).await?)
        }
        Commands::Destroy { family, id } => {
            json!({ "deleted": library.collection(family).destroy(id).await? })
        }
        Commands::Reconcile { family, id } => {
            json!({ "outcome": library.collection(family).reconcile_file(id).await? })
        }
        Commands::Migrate => {
            db.migrate().await.context("running migrations")?;
            json!({ "migrated": true })
        }
        Commands::Check => json!({ "disks": config.storage.disks }),
    };

    print_json(&output)
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
