use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gradesync::cli::{Cli, Command};
use gradesync::config::SyncConfig;
use gradesync::delivery::DeliveryClient;
use gradesync::ingest::read_event;
use gradesync::pipeline::SyncPipeline;
use gradesync::store::{GradingStore, SqliteStore};
use gradesync::ui::Printer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => SyncConfig::load_from(path)?,
        None => SyncConfig::load()?,
    };
    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path.clone());
    let store = SqliteStore::open(&db_path, config.grader_role_id)
        .with_context(|| format!("opening {}", db_path.display()))?;
    let printer = Printer::default();

    match cli.command {
        Command::Init => {
            println!("Schema ready at {}", db_path.display());
        }
        Command::Ingest { event, actor } => {
            let raw = read_event(&event).with_context(|| format!("reading event {event}"))?;
            let client = DeliveryClient::new(&config)?;
            let pipeline = SyncPipeline::new(store, client);
            let report = pipeline.process(&raw, actor).await?;
            printer.print_report(&report);
        }
        Command::Queue => printer.print_queue(&store.queue_entries()?),
        Command::Outbox => printer.print_outbox(&store.pending_outbox()?),
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise `--verbose` picks debug over info.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
