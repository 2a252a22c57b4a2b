use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revchain::config::{Config, DEFAULT_REVISIONS_DIR};
use revchain::runner::{self, display_marker, RunOutcome};
use revchain::api;
use revchain_core::store::SchemaStore;
use revchain_core::{source, Direction, RunLock, Target};

#[derive(Parser)]
#[command(name = "revchain")]
#[command(about = "Apply and revert an ordered chain of schema revisions")]
struct Cli {
    /// SQLite database to migrate
    #[arg(long, global = true, env = "REVCHAIN_DATABASE")]
    database: Option<PathBuf>,

    /// Directory holding revision files
    #[arg(long, global = true, env = "REVCHAIN_REVISIONS", default_value = DEFAULT_REVISIONS_DIR)]
    revisions: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply revisions up to a target (default: head)
    Upgrade {
        /// head, root, +N, or a revision id / unique prefix
        #[arg(default_value = "head")]
        target: String,

        /// Print the SQL instead of running it
        #[arg(long)]
        sql: bool,
    },
    /// Revert revisions down to a target
    Downgrade {
        /// base, root, -N, or a revision id / unique prefix
        #[arg(allow_hyphen_values = true)]
        target: String,

        /// Print the SQL instead of running it
        #[arg(long)]
        sql: bool,
    },
    /// Show the applied revision
    Current,
    /// Show the resolved revision chain
    Chain,
    /// Show applied/reverted revisions, oldest first
    History,
    /// Validate the revision files without touching the database
    Check,
    /// Create a new empty revision on top of the current head
    Revision {
        /// Short description of the change
        #[arg(short, long)]
        message: String,
    },
    /// Remove a lock left behind by a crashed run
    Unlock,
    /// Serve the read-only status API
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "revchain=info,revchain_core=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::resolve(cli.database, cli.revisions)?;
    tracing::debug!(database = %config.database.display(), revisions = %config.revisions.display(), "configuration");

    match cli.command {
        Commands::Upgrade { target, sql } => {
            migrate(config, Target::parse(&target), Direction::Upgrade, sql).await?;
        }
        Commands::Downgrade { target, sql } => {
            migrate(config, Target::parse(&target), Direction::Downgrade, sql).await?;
        }
        Commands::Current => {
            let marker = config.peek_marker()?;
            let chain = config.load_chain()?;
            let head = chain.head().map(|r| &r.id);
            let suffix = if marker.as_ref() == head { " (head)" } else { "" };
            println!("{}{}", display_marker(marker.as_ref()), suffix);
        }
        Commands::Chain => {
            let chain = config.load_chain()?;
            let marker = config.peek_marker()?;
            let applied_through = chain.position(marker.as_ref())?;
            if chain.is_empty() {
                println!("(no revisions)");
            }
            for (i, revision) in chain.revisions().iter().enumerate() {
                let mut tags = Vec::new();
                if i == 0 {
                    tags.push("root");
                }
                if i + 1 == chain.len() {
                    tags.push("head");
                }
                if i + 1 == applied_through {
                    tags.push("current");
                }
                let state = if i < applied_through { "applied" } else { "pending" };
                let tags = if tags.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", tags.join(", "))
                };
                println!(
                    "{} -> {} [{}]{} {}",
                    display_marker(revision.parent_id.as_ref()),
                    revision.id,
                    state,
                    tags,
                    revision.message.as_deref().unwrap_or("")
                );
            }
        }
        Commands::History => {
            if !config.database.exists() {
                println!("(no history)");
                return Ok(());
            }
            let history = config.open_store()?.history()?;
            if history.is_empty() {
                println!("(no history)");
            }
            for entry in history {
                println!(
                    "{} {:<9} {} ({} -> {}) run {}",
                    entry.applied_at.to_rfc3339(),
                    entry.direction,
                    entry.revision_id,
                    display_marker(entry.marker_before.as_ref()),
                    display_marker(entry.marker_after.as_ref()),
                    entry.run_id
                );
            }
        }
        Commands::Check => {
            let chain = config.load_chain()?;
            println!(
                "ok: {} revisions, head {}",
                chain.len(),
                display_marker(chain.head().map(|r| &r.id))
            );
        }
        Commands::Revision { message } => {
            let chain = config.load_chain()?;
            let head = chain.head().map(|r| r.id.clone());
            let (revision, path) = source::scaffold(&config.revisions, &message, head.as_ref())?;
            println!(
                "created {} (parent {}) at {}",
                revision.id,
                display_marker(head.as_ref()),
                path.display()
            );
        }
        Commands::Unlock => {
            let path = config.lock_path();
            if RunLock::force_release(&path)? {
                println!("removed {}", path.display());
            } else {
                println!("no lock at {}", path.display());
            }
        }
        Commands::Serve { port } => {
            tracing::info!("Starting revchain status API on port {}", port);

            let chain = config.load_chain()?;
            let store = config.open_store()?;
            let app = api::create_router(store, chain);

            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
            tracing::info!("revchain status API listening on http://127.0.0.1:{}", port);

            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

async fn migrate(
    config: Config,
    target: Target,
    direction: Direction,
    dry_run: bool,
) -> anyhow::Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current revision");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let outcome = tokio::task::spawn_blocking(move || {
        runner::run(&config, &target, direction, dry_run, cancel)
    })
    .await??;

    match outcome {
        RunOutcome::DryRun { plan, sql } => {
            if plan.is_empty() {
                println!("-- nothing to do");
            }
            for line in sql {
                println!("{}", line);
            }
        }
        RunOutcome::Ran(report) => {
            for id in &report.succeeded {
                println!("{} {}", report.direction, id);
            }
            let marker = display_marker(report.marker.as_ref());
            if report.cancelled {
                anyhow::bail!(
                    "cancelled at {}; not attempted: {}",
                    marker,
                    join(&report.not_attempted)
                );
            }
            if let Some(failure) = report.failed {
                anyhow::bail!(
                    "{}\napplied marker is {}; not attempted: {}",
                    failure.error,
                    marker,
                    join(&report.not_attempted)
                );
            }
            println!("at {}", marker);
        }
    }

    Ok(())
}

fn join(ids: &[revchain_core::RevisionId]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}
