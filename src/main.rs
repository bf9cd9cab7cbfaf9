use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use feedhub::api::{AddSourceRequest, AdminControl, Caller, SourceApi};
use feedhub::config::Config;
use feedhub::feed::{FeedClient, SyncEngine};
use feedhub::scheduler::RefreshScheduler;
use feedhub::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "feedhub", about = "Feed discovery, validation and refresh service")]
struct Args {
    /// Configuration file (TOML); missing file means defaults
    #[arg(long, value_name = "FILE", default_value = "feedhub.toml")]
    config: PathBuf,

    /// SQLite database path, overriding `database_path` from the config
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the refresh scheduler until Ctrl-C
    Serve {
        /// Minutes between refresh cycles (1-60)
        #[arg(long)]
        interval: Option<u32>,
    },
    /// Check whether a URL serves a parsable RSS/Atom feed
    Validate { url: String },
    /// Find feeds for a website
    Discover { url: String },
    /// Register a feed source for a user
    Add {
        url: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        name: Option<String>,
        /// Minutes between refreshes (5-1440)
        #[arg(long)]
        refresh_rate: Option<u32>,
    },
    /// List a user's sources
    List {
        #[arg(long)]
        user: String,
    },
    /// Delete a source and its items
    Remove {
        id: i64,
        #[arg(long)]
        user: String,
    },
    /// Refresh one source, or every due source
    Refresh {
        #[arg(long, requires = "user")]
        source: Option<i64>,
        #[arg(long)]
        user: Option<String>,
        /// Treat sources fetched more than this many minutes ago as due
        #[arg(long, conflicts_with = "source")]
        older_than: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from '{}'", args.config.display()))?;
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let client = FeedClient::new(&config.http).context("Failed to build HTTP client")?;

    // Commands that never touch the database
    match &args.command {
        Command::Validate { url } => {
            return print_json(&feedhub::feed::validate_feed_url(&client, url).await);
        }
        Command::Discover { url } => {
            return print_json(&feedhub::feed::discover_feeds(&client, url).await);
        }
        _ => {}
    }

    let db = Arc::new(
        Database::open(&config.database_path)
            .await
            .with_context(|| format!("Failed to open database '{}'", config.database_path))?,
    );
    let engine = Arc::new(
        SyncEngine::new(db.clone(), db, client)
            .with_default_refresh_rate(config.default_refresh_rate)
            .with_max_concurrent_fetches(config.max_concurrent_fetches),
    );
    let sources = SourceApi::new(Arc::clone(&engine));

    match args.command {
        Command::Serve { interval } => serve(&config, engine, interval).await,
        Command::Add {
            url,
            user,
            name,
            refresh_rate,
        } => {
            let source = sources
                .add_source(
                    &Caller::user(user),
                    AddSourceRequest {
                        url,
                        name,
                        refresh_rate,
                        settings: None,
                    },
                )
                .await?;
            print_json(&source)
        }
        Command::List { user } => print_json(&sources.list_sources(&Caller::user(user)).await?),
        Command::Remove { id, user } => {
            sources.delete_source(&Caller::user(user), id).await?;
            println!("Removed source {id}");
            Ok(())
        }
        Command::Refresh {
            source: Some(id),
            user,
            ..
        } => {
            let caller = Caller::user(user.unwrap_or_default());
            print_json(&sources.refresh_source(&caller, id).await?)
        }
        Command::Refresh {
            source: None,
            older_than,
            ..
        } => print_json(&engine.refresh_all_feeds(older_than).await?),
        Command::Validate { .. } | Command::Discover { .. } => Ok(()),
    }
}

async fn serve(config: &Config, engine: Arc<SyncEngine>, interval: Option<u32>) -> Result<()> {
    let scheduler = Arc::new(RefreshScheduler::new(engine));
    let admin = AdminControl::new(Arc::clone(&scheduler));
    let operator = Caller::admin("cli");

    if config.autostart_scheduler || interval.is_some() {
        let minutes = interval.unwrap_or(config.check_interval_minutes);
        let status = admin.start(&operator, Some(minutes))?;
        tracing::info!(
            check_interval_minutes = ?status.check_interval_minutes,
            "Serving; press Ctrl-C to stop"
        );
    } else {
        tracing::info!("Scheduler autostart disabled; running one cycle and exiting");
        print_json(&admin.run_once(&operator).await?)?;
        return Ok(());
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    admin.stop(&operator)?;
    print_json(&admin.status(&operator)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
