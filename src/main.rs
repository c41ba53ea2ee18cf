use anyhow::Result;
use scholarag::db::{migrate, Db};
use scholarag::embeddings::{EmbeddingCache, OllamaEmbedder};
use scholarag::generation::Generator;
use scholarag::server::HttpServer;
use scholarag::Config;
use std::path::Path;
use std::sync::Arc;

/// Build a configured embedder with an optional LRU query-embedding cache.
fn build_embedder(config: &Config) -> OllamaEmbedder {
    let cache = if config.embeddings.cache_capacity > 0 {
        Some(Arc::new(EmbeddingCache::new(config.embeddings.cache_capacity)))
    } else {
        None
    };

    OllamaEmbedder::with_cache(
        config.embeddings.api_url.clone(),
        config.embeddings.model.clone(),
        config.embeddings.dimensions,
        cache,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "stats" => run_stats().await?,
        "serve" | _ => run_server().await?,
    }

    Ok(())
}

/// Run the query-serving HTTP server.
async fn run_server() -> Result<()> {
    log::info!("Starting Scholarag v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    log::info!("Store path: {}", config.db_path().display());
    log::info!("Embedding model: {}", config.embeddings.model);
    log::info!("Generation provider: {}", config.generation.provider);

    let db = Db::new(config.db_path());

    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await?;

    db.health_check().await?;
    log::info!("Store initialized");

    let embedder = build_embedder(&config);
    let generator = Generator::from_config(&config.generation)?;

    let server = HttpServer::new(db, embedder, generator, config);
    server.run().await?;

    Ok(())
}

/// Print store contents summary.
async fn run_stats() -> Result<()> {
    let config = Config::load()?;
    let db = Db::new(config.db_path());

    let (papers, chunks, embedded, entities, mentions, relations) = db
        .with_connection(|conn| {
            let count = |sql: &str| -> scholarag::Result<i64> {
                Ok(conn.query_row(sql, [], |row| row.get(0))?)
            };
            Ok((
                count("SELECT count(*) FROM papers")?,
                count("SELECT count(*) FROM chunks")?,
                count("SELECT count(*) FROM chunks WHERE embedding IS NOT NULL")?,
                count("SELECT count(*) FROM entities")?,
                count("SELECT count(*) FROM mentions")?,
                count("SELECT count(*) FROM entity_relations")?,
            ))
        })
        .await?;

    println!("papers:           {}", papers);
    println!("chunks:           {} ({} embedded)", chunks, embedded);
    println!("entities:         {}", entities);
    println!("mentions:         {}", mentions);
    println!("entity relations: {}", relations);

    Ok(())
}
