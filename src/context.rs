//! Context assembly: deduplicate expanded rows, build the LLM-facing context
//! string, and derive the unified graph view plus the source list.

use std::collections::HashSet;

use serde::Serialize;

use crate::graph::{parse_graph_fragment, ContextRow, GraphView};

/// Source record surfaced to the client alongside the generated answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub paper_id: String,
    pub paper_title: String,
    pub pdf_url: String,
    pub chunk_text: String,
}

/// Output of [`assemble`]: everything one session needs downstream.
#[derive(Debug, Default)]
pub struct AssembledContext {
    pub context: String,
    pub graph: GraphView,
    pub sources: Vec<Source>,
}

/// Assemble the retrieved rows into context, graph view, and sources.
///
/// Chunk text is included exactly once per session, keyed by exact text
/// equality in input order (first occurrence wins). Each included chunk adds
/// one formatted block and one [`Source`] record.
///
/// `byte_budget` is `None` on the streaming-server path. The CLI path passes
/// `Some(n)`: appending stops permanently once the running total would exceed
/// `n`, even if more deduplicated chunks remain.
///
/// The graph view accumulates every row's fragment regardless of text
/// deduplication and regardless of the byte budget; malformed fragments are
/// skipped per-row. This function cannot fail.
pub fn assemble(rows: &[ContextRow], byte_budget: Option<usize>) -> AssembledContext {
    let mut assembled = AssembledContext::default();
    let mut seen_texts: HashSet<&str> = HashSet::new();
    let mut budget_exhausted = false;

    for row in rows {
        let fragment = parse_graph_fragment(&row.graph_data);
        assembled.graph.merge_fragment(&fragment);

        if row.chunk_text.is_empty() || seen_texts.contains(row.chunk_text.as_str()) {
            continue;
        }

        let block = format!("Paper: {}\nChunk: {}\n\n", row.paper_title, row.chunk_text);
        if let Some(limit) = byte_budget {
            if budget_exhausted || assembled.context.len() + block.len() > limit {
                budget_exhausted = true;
                continue;
            }
        }

        seen_texts.insert(row.chunk_text.as_str());
        assembled.context.push_str(&block);
        assembled.sources.push(Source {
            paper_id: row.paper_id.clone(),
            paper_title: row.paper_title.clone(),
            pdf_url: row.pdf_url.clone(),
            chunk_text: row.chunk_text.clone(),
        });
    }

    assembled
}
