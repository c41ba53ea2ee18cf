//! Offline ingestion CLI: load paper records from a JSON file and upload
//! chunks, embeddings, and graph fragments to the store.

use anyhow::Result;
use clap::Parser;
use scholarag::db::{migrate, Db};
use scholarag::embeddings::OllamaEmbedder;
use scholarag::generation::Generator;
use scholarag::ingest::{ingest_records, load_records};
use scholarag::Config;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Ingest paper records into the Scholarag store")]
struct Args {
    /// Path to a JSON file of paper records (text already extracted)
    #[arg(long)]
    path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();

    log::info!("Starting Scholarag ingestion");
    let config = Config::load()?;

    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await?;

    let embedder = OllamaEmbedder::new(
        config.embeddings.api_url.clone(),
        config.embeddings.model.clone(),
        config.embeddings.dimensions,
    );
    let generator = Generator::from_config(&config.generation)?;

    let records = load_records(&args.path)?;
    log::info!("Loaded {} paper records from {}", records.len(), args.path.display());

    let summary = ingest_records(&db, &embedder, &generator, records, &config.ingest).await?;

    log::info!(
        "Ingestion complete: {} papers, {} chunks, {} entities, {} relations ({} failed)",
        summary.papers,
        summary.chunks,
        summary.entities,
        summary.relations,
        summary.failed_papers
    );

    Ok(())
}
