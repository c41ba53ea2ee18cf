//! Standalone retrieval CLI: embed, seed search, expand, assemble under the
//! configured byte budget, then print the generated answer.

use anyhow::Result;
use clap::Parser;
use scholarag::context::assemble;
use scholarag::db::Db;
use scholarag::embeddings::OllamaEmbedder;
use scholarag::generation::{render_prompt, Generator};
use scholarag::graph::expand;
use scholarag::search::seed_search;
use scholarag::Config;
use std::io::Write;

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Ask a question against the indexed paper corpus")]
struct Args {
    /// The question to answer
    query: String,

    /// Number of seed chunks (defaults to retrieval.top_k)
    #[arg(short, long)]
    k: Option<usize>,

    /// Expansion depth (defaults to retrieval.expansion_depth)
    #[arg(short, long)]
    depth: Option<usize>,

    /// Stream the answer token by token
    #[arg(long)]
    stream: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "warn")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let top_k = args.k.unwrap_or(config.retrieval.top_k);
    let depth = args.depth.unwrap_or(config.retrieval.expansion_depth);

    let db = Db::new(config.db_path());
    let embedder = OllamaEmbedder::new(
        config.embeddings.api_url.clone(),
        config.embeddings.model.clone(),
        config.embeddings.dimensions,
    );
    let generator = Generator::from_config(&config.generation)?;

    let query_vec = embedder.embed(&args.query).await?;
    let seeds = seed_search(&db, &query_vec, top_k).await?;
    let rows = expand(&db, &seeds, depth).await?;

    // The byte budget applies here and only here; the streaming server
    // assembles without one.
    let assembled = assemble(&rows, Some(config.retrieval.context_budget_bytes));
    log::info!(
        "Assembled {} sources ({} bytes of context)",
        assembled.sources.len(),
        assembled.context.len()
    );

    let prompt = render_prompt(&assembled.context, &args.query);

    println!("--- Answer ---");
    if args.stream {
        let mut fragments = generator.complete_streaming(&prompt).await?;
        let mut stdout = std::io::stdout();
        while let Some(fragment) = fragments.recv().await {
            print!("{}", fragment?);
            stdout.flush()?;
        }
        println!();
    } else {
        let answer = generator.complete(&prompt).await?;
        println!("{}", answer);
    }

    Ok(())
}
