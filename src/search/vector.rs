use crate::db::Db;
use crate::error::{Result, ScholaragError};

/// Find the `top_k` chunks most similar to the query vector.
///
/// Scores every stored embedding by cosine similarity and returns chunk ids
/// ranked best-first, ties broken by chunk id so results are deterministic.
/// Stored embeddings whose dimensionality does not match the query vector are
/// skipped. The embedded store has no native vector index, so this is a full
/// scan; corpora here are small enough that the scan is not the bottleneck
/// (the LLM calls are).
pub async fn seed_search(db: &Db, query_vec: &[f32], top_k: usize) -> Result<Vec<String>> {
    if top_k == 0 {
        return Err(ScholaragError::InvalidInput(
            "top_k must be greater than 0".to_string(),
        ));
    }

    let rows = db
        .with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT chunk_id, embedding FROM chunks WHERE embedding IS NOT NULL",
            )?;
            let mut rows = stmt.query([])?;
            let mut out: Vec<(String, Vec<u8>)> = Vec::new();
            while let Some(row) = rows.next()? {
                out.push((row.get(0)?, row.get(1)?));
            }
            Ok(out)
        })
        .await?;

    let mut scored: Vec<(f32, String)> = Vec::new();
    for (chunk_id, blob) in rows {
        let embedding = match parse_embedding(&blob) {
            Some(e) => e,
            None => {
                log::warn!("Chunk {} has a malformed embedding blob, skipping", chunk_id);
                continue;
            }
        };
        if embedding.len() != query_vec.len() {
            continue;
        }
        scored.push((cosine_similarity(query_vec, &embedding), chunk_id));
    }

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });

    Ok(scored.into_iter().take(top_k).map(|(_, id)| id).collect())
}

/// Encode an embedding as a little-endian f32 BLOB
pub(crate) fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Parse an embedding BLOB back into a vector; None if the length is not a
/// multiple of 4.
fn parse_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    blob.chunks(4)
        .map(|bytes| {
            let arr: [u8; 4] = bytes.try_into().ok()?;
            Some(f32::from_le_bytes(arr))
        })
        .collect()
}

/// Cosine similarity of two equal-length vectors; 0.0 when either has zero
/// magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
