//! Store writes for the ingest pipeline.

use rusqlite::params;

use super::PaperRecord;
use crate::db::Db;
use crate::error::Result;
use crate::graph::GraphFragment;
use crate::search::encode_embedding;

/// One chunk ready for upload. An empty embedding stores as NULL.
pub(crate) struct ChunkUpload {
    pub chunk_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Upload one paper with its chunks and graph fragment in a single
/// transaction.
///
/// Re-ingestion is tolerated: existing papers, chunks, entities, mentions,
/// and relations are left in place (first write wins). Every chunk of the
/// paper is linked to every entity of the paper-level fragment, which is what
/// lets expansion bridge papers through shared entities.
pub(crate) async fn upload_paper(
    db: &Db,
    record: &PaperRecord,
    fragment: &GraphFragment,
    chunks: Vec<ChunkUpload>,
) -> Result<()> {
    let record = record.clone();
    let fragment = fragment.clone();
    let graph_data = serde_json::to_string(&fragment).unwrap_or_default();

    db.with_connection(move |conn| {
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO papers (paper_id, title, pdf_url, published) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(paper_id) DO NOTHING",
            params![record.paper_id, record.title, record.pdf_url, record.published],
        )?;

        for chunk in &chunks {
            let blob = if chunk.embedding.is_empty() {
                None
            } else {
                Some(encode_embedding(&chunk.embedding))
            };
            tx.execute(
                "INSERT INTO chunks (chunk_id, paper_id, chunk_text, embedding, graph_data) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(chunk_id) DO NOTHING",
                params![chunk.chunk_id, record.paper_id, chunk.text, blob, graph_data],
            )?;
        }

        for entity in &fragment.entities {
            tx.execute(
                "INSERT INTO entities (name, entity_type) VALUES (?1, ?2) \
                 ON CONFLICT(name) DO NOTHING",
                params![entity.name, entity.entity_type],
            )?;
            for chunk in &chunks {
                tx.execute(
                    "INSERT OR IGNORE INTO mentions (chunk_id, entity_name) VALUES (?1, ?2)",
                    params![chunk.chunk_id, entity.name],
                )?;
            }
        }

        for relation in &fragment.relationships {
            if relation.source.is_empty() || relation.target.is_empty() || relation.rel_type.is_empty() {
                continue;
            }
            tx.execute(
                "INSERT OR IGNORE INTO entity_relations (source_entity, relation_type, target_entity) \
                 VALUES (?1, ?2, ?3)",
                params![relation.source, relation.rel_type, relation.target],
            )?;
        }

        tx.commit()?;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use crate::graph::{EntityNode, RelationshipEdge};
    use std::path::Path;
    use tempfile::TempDir;

    async fn setup_store() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        (db, temp_dir)
    }

    fn fixture_record() -> PaperRecord {
        PaperRecord {
            paper_id: "p1".to_string(),
            title: "A Paper".to_string(),
            summary: String::new(),
            full_text: String::new(),
            pdf_url: "https://arxiv.org/pdf/p1".to_string(),
            published: Some("2023-01-01".to_string()),
        }
    }

    fn fixture_fragment() -> GraphFragment {
        GraphFragment {
            entities: vec![
                EntityNode {
                    name: "BERT".to_string(),
                    entity_type: "Tool".to_string(),
                },
                EntityNode {
                    name: "SQuAD".to_string(),
                    entity_type: "Dataset".to_string(),
                },
            ],
            relationships: vec![RelationshipEdge {
                source: "BERT".to_string(),
                target: "SQuAD".to_string(),
                rel_type: "EVALUATED_ON".to_string(),
            }],
        }
    }

    fn fixture_chunks() -> Vec<ChunkUpload> {
        vec![
            ChunkUpload {
                chunk_id: "p1_chunk_0".to_string(),
                text: "first chunk".to_string(),
                embedding: vec![1.0, 0.0],
            },
            ChunkUpload {
                chunk_id: "p1_chunk_1".to_string(),
                text: "second chunk".to_string(),
                embedding: Vec::new(),
            },
        ]
    }

    #[tokio::test]
    async fn test_upload_stores_everything() {
        let (db, _temp) = setup_store().await;
        upload_paper(&db, &fixture_record(), &fixture_fragment(), fixture_chunks())
            .await
            .unwrap();

        db.with_connection(|conn| {
            let chunks: i64 = conn.query_row("SELECT count(*) FROM chunks", [], |r| r.get(0))?;
            assert_eq!(chunks, 2);

            // one embedded, one NULL
            let embedded: i64 = conn.query_row(
                "SELECT count(*) FROM chunks WHERE embedding IS NOT NULL",
                [],
                |r| r.get(0),
            )?;
            assert_eq!(embedded, 1);

            let entities: i64 = conn.query_row("SELECT count(*) FROM entities", [], |r| r.get(0))?;
            assert_eq!(entities, 2);

            // every chunk mentions every fragment entity
            let mentions: i64 = conn.query_row("SELECT count(*) FROM mentions", [], |r| r.get(0))?;
            assert_eq!(mentions, 4);

            let relations: i64 =
                conn.query_row("SELECT count(*) FROM entity_relations", [], |r| r.get(0))?;
            assert_eq!(relations, 1);

            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let (db, _temp) = setup_store().await;
        for _ in 0..2 {
            upload_paper(&db, &fixture_record(), &fixture_fragment(), fixture_chunks())
                .await
                .unwrap();
        }

        db.with_connection(|conn| {
            let chunks: i64 = conn.query_row("SELECT count(*) FROM chunks", [], |r| r.get(0))?;
            assert_eq!(chunks, 2);
            let mentions: i64 = conn.query_row("SELECT count(*) FROM mentions", [], |r| r.get(0))?;
            assert_eq!(mentions, 4);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_incomplete_relations_skipped() {
        let (db, _temp) = setup_store().await;
        let mut fragment = fixture_fragment();
        fragment.relationships.push(RelationshipEdge {
            source: String::new(),
            target: "SQuAD".to_string(),
            rel_type: "USES_METHOD".to_string(),
        });

        upload_paper(&db, &fixture_record(), &fragment, fixture_chunks())
            .await
            .unwrap();

        db.with_connection(|conn| {
            let relations: i64 =
                conn.query_row("SELECT count(*) FROM entity_relations", [], |r| r.get(0))?;
            assert_eq!(relations, 1);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_stored_graph_data_parses_back() {
        let (db, _temp) = setup_store().await;
        upload_paper(&db, &fixture_record(), &fixture_fragment(), fixture_chunks())
            .await
            .unwrap();

        let raw: String = db
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT graph_data FROM chunks WHERE chunk_id = 'p1_chunk_0'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .await
            .unwrap();

        let fragment = crate::graph::parse_graph_fragment(&raw);
        assert_eq!(fragment.entities.len(), 2);
        assert_eq!(fragment.relationships.len(), 1);
    }
}
