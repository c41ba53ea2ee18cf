//! Offline ingestion: chunk paper text, extract a knowledge-graph fragment
//! per paper, embed the chunks through a bounded worker pool, and upload
//! everything to the store.
//!
//! Paper acquisition and PDF text extraction happen upstream; the input here
//! is a JSON file of records with the text already extracted.

mod chunker;
mod upload;

pub use chunker::chunk_text;

use serde::Deserialize;
use std::path::Path;

use crate::config::IngestConfig;
use crate::db::Db;
use crate::embeddings::OllamaEmbedder;
use crate::error::{Result, ScholaragError};
use crate::generation::Generator;
use crate::graph::{extract_json_block, parse_graph_fragment, sanitize_rel_type, GraphFragment};
use upload::{upload_paper, ChunkUpload};

const GRAPH_PROMPT: &str = r#"From the academic text below, extract structured knowledge as entities and relationships.

Entity types:
- Method
- Dataset
- Tool
- Metric
- ScientificConcept

Relationship types:
- USES_METHOD
- EVALUATED_ON
- COMPARES
- IMPROVES
- BASED_ON

Output format:
Return ONLY a valid JSON object structured like this:
{
  "entities": [
    {"name": "BERT", "type": "Tool"},
    {"name": "SQuAD", "type": "Dataset"}
  ],
  "relationships": [
    {"source": "BERT", "target": "SQuAD", "type": "EVALUATED_ON"}
  ]
}
Rules:
- Only include entities/relations explicitly stated or clearly implied.
- No speculation or hallucination.
- No explanations, comments, or markdown.
- Ensure valid JSON.
- Use exact entity names from text.

Input Text:
{text}

Output JSON only:"#;

/// One paper record from the ingest input file.
#[derive(Debug, Clone, Deserialize)]
pub struct PaperRecord {
    pub paper_id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub pdf_url: String,
    #[serde(default)]
    pub published: Option<String>,
}

/// Counts reported after an ingest run
#[derive(Debug, Default, PartialEq)]
pub struct IngestSummary {
    pub papers: usize,
    pub chunks: usize,
    pub entities: usize,
    pub relations: usize,
    pub failed_papers: usize,
}

/// Load paper records from a JSON file.
pub fn load_records(path: &Path) -> Result<Vec<PaperRecord>> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| ScholaragError::Parse(format!("{}: {}", path.display(), e)))
}

/// Collapse whitespace runs; extraction artifacts are full of them.
fn clean_whitespace(text: &str) -> String {
    let re = regex::Regex::new(r"\s+").expect("valid pattern");
    re.replace_all(text.trim(), " ").into_owned()
}

/// Extract a knowledge-graph fragment from paper text via the generation
/// provider.
///
/// Model output is free-form, so the JSON block is recovered best-effort and
/// every failure mode (call error, no block, unparseable block) degrades to
/// an empty fragment. Relation types are sanitized before storage.
pub async fn extract_graph_fragment(generator: &Generator, text: &str) -> GraphFragment {
    let snippet: String = text.chars().take(3000).collect();
    let prompt = GRAPH_PROMPT.replace("{text}", &snippet);

    let raw = match generator.complete(&prompt).await {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!("Graph extraction call failed: {}", e);
            return GraphFragment::default();
        }
    };

    let Some(block) = extract_json_block(&raw) else {
        log::warn!("No JSON block in graph extraction output");
        return GraphFragment::default();
    };

    let mut fragment = parse_graph_fragment(block);
    for relationship in &mut fragment.relationships {
        relationship.rel_type = sanitize_rel_type(&relationship.rel_type);
    }
    fragment
}

/// Ingest a set of paper records end to end.
///
/// Failures are isolated per paper: a failed upload is logged and counted,
/// never aborting the run. Embedding failures within a paper leave the
/// affected chunks unembedded (they are stored and remain reachable through
/// graph expansion, just not as vector seeds).
pub async fn ingest_records(
    db: &Db,
    embedder: &OllamaEmbedder,
    generator: &Generator,
    records: Vec<PaperRecord>,
    settings: &IngestConfig,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    for record in records {
        let summary_text = clean_whitespace(&record.summary);
        let body_text = clean_whitespace(&record.full_text);
        let full_text = if body_text.is_empty() {
            summary_text.clone()
        } else if summary_text.is_empty() {
            body_text.clone()
        } else {
            format!("{}\n\n{}", summary_text, body_text)
        };

        if full_text.is_empty() {
            log::warn!("Paper {} has no text, skipping", record.paper_id);
            continue;
        }

        // Graph extraction works off the summary (shorter = faster) with the
        // body head as fallback.
        let fragment_source = if summary_text.is_empty() {
            &body_text
        } else {
            &summary_text
        };
        let fragment = extract_graph_fragment(generator, fragment_source).await;

        let chunks = chunk_text(&full_text, settings.chunk_chars, settings.overlap_chars);
        let embeddings = embedder.embed_many(chunks.clone(), settings.embed_workers).await;

        let uploads: Vec<ChunkUpload> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, text)| ChunkUpload {
                chunk_id: format!("{}_chunk_{}", record.paper_id, i),
                text,
                embedding: embeddings.get(i).cloned().unwrap_or_default(),
            })
            .collect();

        let chunk_count = uploads.len();
        match upload_paper(db, &record, &fragment, uploads).await {
            Ok(()) => {
                log::info!("Ingested paper {} ({} chunks)", record.paper_id, chunk_count);
                summary.papers += 1;
                summary.chunks += chunk_count;
                summary.entities += fragment.entities.len();
                summary.relations += fragment.relationships.len();
            }
            Err(e) => {
                log::error!("Upload failed for paper {}: {}", record.paper_id, e);
                summary.failed_papers += 1;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::db::migrate;
    use tempfile::TempDir;

    #[test]
    fn test_clean_whitespace() {
        assert_eq!(clean_whitespace("  a \n\n b\t c  "), "a b c");
        assert_eq!(clean_whitespace(""), "");
    }

    #[test]
    fn test_load_records() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("papers.json");
        std::fs::write(
            &path,
            r#"[{"paper_id": "2301.00001", "title": "A Paper", "summary": "About things."}]"#,
        )
        .unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].paper_id, "2301.00001");
        assert!(records[0].full_text.is_empty());
        assert!(records[0].published.is_none());
    }

    #[test]
    fn test_load_records_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("papers.json");
        std::fs::write(&path, "{not a list").unwrap();
        assert!(matches!(
            load_records(&path),
            Err(ScholaragError::Parse(_))
        ));
    }

    fn offline_embedder() -> OllamaEmbedder {
        OllamaEmbedder::new(
            "http://127.0.0.1:9/api/embeddings".to_string(),
            "nomic-embed-text:v1.5".to_string(),
            8,
        )
    }

    fn offline_generator() -> Generator {
        let mut config = GenerationConfig::default();
        config.ollama.api_url = "http://127.0.0.1:9/api/generate".to_string();
        Generator::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_records_offline_providers() {
        // With both providers unreachable, ingest still stores the paper and
        // its chunks: fragments come back empty and embeddings stay NULL.
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();

        let records = vec![PaperRecord {
            paper_id: "p1".to_string(),
            title: "A Paper".to_string(),
            summary: "word ".repeat(100),
            full_text: String::new(),
            pdf_url: "https://arxiv.org/pdf/p1".to_string(),
            published: Some("2023-01-01".to_string()),
        }];

        let settings = IngestConfig {
            chunk_chars: 120,
            overlap_chars: 20,
            embed_workers: 2,
        };

        let summary = ingest_records(&db, &offline_embedder(), &offline_generator(), records, &settings)
            .await
            .unwrap();

        assert_eq!(summary.papers, 1);
        assert!(summary.chunks > 1);
        assert_eq!(summary.failed_papers, 0);

        let (paper_count, chunk_count, embedded_count) = db
            .with_connection(|conn| {
                let papers: i64 = conn.query_row("SELECT count(*) FROM papers", [], |r| r.get(0))?;
                let chunks: i64 = conn.query_row("SELECT count(*) FROM chunks", [], |r| r.get(0))?;
                let embedded: i64 = conn.query_row(
                    "SELECT count(*) FROM chunks WHERE embedding IS NOT NULL",
                    [],
                    |r| r.get(0),
                )?;
                Ok((papers, chunks, embedded))
            })
            .await
            .unwrap();
        assert_eq!(paper_count, 1);
        assert_eq!(chunk_count as usize, summary.chunks);
        assert_eq!(embedded_count, 0);
    }

    #[tokio::test]
    async fn test_ingest_skips_empty_paper() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();

        let records = vec![PaperRecord {
            paper_id: "empty".to_string(),
            title: "Empty".to_string(),
            summary: String::new(),
            full_text: "   ".to_string(),
            pdf_url: String::new(),
            published: None,
        }];

        let summary = ingest_records(
            &db,
            &offline_embedder(),
            &offline_generator(),
            records,
            &IngestConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary, IngestSummary::default());
    }
}
