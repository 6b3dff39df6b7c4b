mod config;
mod error;
mod server;

use chorus_core::{ReconcileTalliesOperation, ReconcileTalliesOperationRequest};
use clap::{Parser, Subcommand};
use config::Config;
use server::run_server;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "chorus")]
#[command(about = "Like/dislike tallies for a music discovery app")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Server {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Recompute like/dislike counters from user vote maps
    Reconcile {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,

        /// Report drift without writing counters
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chorus=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config } => {
            tracing::info!("Starting Chorus server with config: {}", config);

            let cfg = load_config(&config);

            tracing::info!(
                "Bind: {}, store: {} ({}), consistency: {:?}",
                cfg.server.bind_addr,
                cfg.store.backend.as_str(),
                cfg.store.namespace_or_default(),
                cfg.votes.consistency
            );

            if let Err(e) = run_server(cfg).await {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Reconcile { config, dry_run } => {
            let cfg = load_config(&config);

            if let Err(e) = run_reconcile(&cfg, dry_run).await {
                tracing::error!("Reconciliation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load_config(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_reconcile(config: &Config, dry_run: bool) -> chorus_core::Result<()> {
    let store = config.store.open().await?;

    let report = ReconcileTalliesOperation::new(store)
        .run(ReconcileTalliesOperationRequest { dry_run })
        .await?;

    tracing::info!(
        "Reconciliation finished: users={} skipped={} items={} drifted={} applied={} took={}ms",
        report.users_scanned,
        report.users_skipped,
        report.items_checked,
        report.drifts.len(),
        report.applied,
        (report.finished_at - report.started_at).num_milliseconds()
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
