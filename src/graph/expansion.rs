//! Bounded multi-hop expansion from seed chunks.
//!
//! Starting at each seed chunk, walk MENTIONS (chunk–entity) and HAS_CHUNK
//! (paper–chunk) edges up to `max_depth` hops, treating both edge kinds as
//! undirected for reachability. Entity co-mention deliberately links chunks
//! across papers; the whole closure of reachable chunks is returned, each
//! resolved to its owning paper.

use std::collections::{HashSet, VecDeque};

use rusqlite::Connection;

use crate::db::Db;
use crate::error::Result;

/// One flattened (paper, chunk) row produced by expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextRow {
    pub paper_id: String,
    pub paper_title: String,
    pub pdf_url: String,
    pub chunk_text: String,
    /// Raw stored fragment; parsed leniently downstream.
    pub graph_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node {
    Chunk(String),
    Entity(String),
    Paper(String),
}

/// Expand the seed set and return the distinct (paper, chunk) rows reachable
/// within `max_depth` hops.
///
/// Seeds that do not resolve to a stored chunk contribute nothing and are not
/// an error. `max_depth == 0` returns exactly the seed chunks with their
/// papers. Output order follows BFS encounter order, which is deterministic
/// for a given store state (seed order is respected and neighbor queries are
/// sorted).
pub async fn expand(db: &Db, seeds: &[String], max_depth: usize) -> Result<Vec<ContextRow>> {
    let seeds = seeds.to_vec();
    db.with_connection(move |conn| expand_sync(conn, &seeds, max_depth))
        .await
}

fn expand_sync(conn: &mut Connection, seeds: &[String], max_depth: usize) -> Result<Vec<ContextRow>> {
    let mut visited: HashSet<Node> = HashSet::new();
    let mut queue: VecDeque<(Node, usize)> = VecDeque::new();
    // Chunk ids in encounter order; the visited set guarantees uniqueness.
    let mut chunk_ids: Vec<String> = Vec::new();

    {
        let mut exists_stmt = conn.prepare("SELECT 1 FROM chunks WHERE chunk_id = ?1")?;
        for seed in seeds {
            let node = Node::Chunk(seed.clone());
            if visited.contains(&node) {
                continue;
            }
            if exists_stmt.exists([seed])? {
                visited.insert(node.clone());
                queue.push_back((node, 0));
                chunk_ids.push(seed.clone());
            } else {
                log::debug!("Seed chunk {} not found in store, skipping", seed);
            }
        }
    }

    let mut mentions_of_chunk =
        conn.prepare("SELECT entity_name FROM mentions WHERE chunk_id = ?1 ORDER BY entity_name")?;
    let mut paper_of_chunk = conn.prepare("SELECT paper_id FROM chunks WHERE chunk_id = ?1")?;
    let mut chunks_of_entity =
        conn.prepare("SELECT chunk_id FROM mentions WHERE entity_name = ?1 ORDER BY chunk_id")?;
    let mut chunks_of_paper =
        conn.prepare("SELECT chunk_id FROM chunks WHERE paper_id = ?1 ORDER BY chunk_id")?;

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }

        let mut neighbors: Vec<Node> = Vec::new();
        match &node {
            Node::Chunk(chunk_id) => {
                let entities = mentions_of_chunk
                    .query_map([chunk_id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                neighbors.extend(entities.into_iter().map(Node::Entity));

                let papers = paper_of_chunk
                    .query_map([chunk_id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                neighbors.extend(papers.into_iter().map(Node::Paper));
            }
            Node::Entity(name) => {
                let chunks = chunks_of_entity
                    .query_map([name], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                neighbors.extend(chunks.into_iter().map(Node::Chunk));
            }
            Node::Paper(paper_id) => {
                let chunks = chunks_of_paper
                    .query_map([paper_id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                neighbors.extend(chunks.into_iter().map(Node::Chunk));
            }
        }

        for neighbor in neighbors {
            if visited.insert(neighbor.clone()) {
                if let Node::Chunk(chunk_id) = &neighbor {
                    chunk_ids.push(chunk_id.clone());
                }
                queue.push_back((neighbor, depth + 1));
            }
        }
    }

    // Resolve every reached chunk to its owning paper.
    let mut row_stmt = conn.prepare(
        "SELECT p.paper_id, p.title, coalesce(p.pdf_url, ''), c.chunk_text, coalesce(c.graph_data, '') \
         FROM chunks c JOIN papers p ON p.paper_id = c.paper_id \
         WHERE c.chunk_id = ?1",
    )?;

    let mut rows = Vec::with_capacity(chunk_ids.len());
    for chunk_id in &chunk_ids {
        let row = row_stmt.query_row([chunk_id], |row| {
            Ok(ContextRow {
                paper_id: row.get(0)?,
                paper_title: row.get(1)?,
                pdf_url: row.get(2)?,
                chunk_text: row.get(3)?,
                graph_data: row.get(4)?,
            })
        })?;
        rows.push(row);
    }

    Ok(rows)
}
