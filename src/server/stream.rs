//! Query session orchestration: the strictly sequential stage pipeline and
//! the frame protocol delivered over one long-lived stream.
//!
//! The orchestrator produces [`Frame`]s onto a channel; the transport layer
//! consumes and forwards them as server-sent events. Client disconnection
//! surfaces as a failed send, which aborts the remaining stages.

use axum::response::sse::Event;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::AppState;
use crate::context::{assemble, AssembledContext, Source};
use crate::error::Result;
use crate::generation::render_prompt;
use crate::graph::{expand, EntityNode, RelationshipEdge};
use crate::search::seed_search;

/// Client-facing message for any session failure; detail stays in the log.
const GENERIC_ERROR: &str = "Something went wrong";

/// One discrete message on the streaming response.
///
/// A successful session emits exactly [graph, metadata, text*, end]; a failed
/// one ends with [error, end]. The terminal frame is emitted on every path so
/// clients can reliably detect end-of-stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Graph {
        nodes: Vec<EntityNode>,
        edges: Vec<RelationshipEdge>,
    },
    Metadata {
        sources: Vec<Source>,
    },
    Text {
        chunk: String,
    },
    Error {
        message: String,
    },
    /// Terminal sentinel
    End,
}

impl Frame {
    /// Encode for the SSE transport. The terminal frame uses a named event
    /// with a `[DONE]` payload; all others are JSON data events.
    pub(crate) fn to_event(&self) -> Event {
        match self {
            Frame::End => Event::default().event("end").data("[DONE]"),
            other => Event::default().data(serde_json::to_string(other).unwrap_or_default()),
        }
    }
}

/// Run one query session end to end, emitting frames onto `tx`.
///
/// Stages are strictly sequential: embed, seed search, expansion, assembly,
/// then generation. Any stage failure emits one generic error frame; the
/// terminal frame is sent on every path. A failed send means the client
/// disconnected, and the session stops doing work.
pub async fn run_session(state: AppState, query: String, tx: mpsc::Sender<Frame>) {
    let session_id = Uuid::new_v4();
    log::info!("[{}] query session started", session_id);

    match retrieve(&state, &query).await {
        Ok(AssembledContext {
            context,
            graph,
            sources,
        }) => {
            let (nodes, edges) = graph.into_payload();
            log::debug!(
                "[{}] retrieved {} sources, {} graph nodes",
                session_id,
                sources.len(),
                nodes.len()
            );

            if tx.send(Frame::Graph { nodes, edges }).await.is_err() {
                log::info!("[{}] client disconnected before graph frame", session_id);
                return;
            }
            if tx.send(Frame::Metadata { sources }).await.is_err() {
                log::info!("[{}] client disconnected before metadata frame", session_id);
                return;
            }

            let prompt = render_prompt(&context, &query);
            match state.generator.complete_streaming(&prompt).await {
                Ok(mut fragments) => match forward_fragments(&mut fragments, &tx).await {
                    ForwardOutcome::Completed => {}
                    ForwardOutcome::Failed(e) => {
                        // graph and metadata are already out; still terminate
                        // cleanly with an error frame before the sentinel
                        log::error!("[{}] generation failed mid-answer: {}", session_id, e);
                        let _ = tx
                            .send(Frame::Error {
                                message: GENERIC_ERROR.to_string(),
                            })
                            .await;
                    }
                    ForwardOutcome::Disconnected => {
                        log::info!("[{}] client disconnected mid-answer", session_id);
                        // dropping `fragments` tears down the provider read
                        return;
                    }
                },
                Err(e) => {
                    log::error!("[{}] generation failed: {}", session_id, e);
                    let _ = tx
                        .send(Frame::Error {
                            message: GENERIC_ERROR.to_string(),
                        })
                        .await;
                }
            }
        }
        Err(e) => {
            log::error!("[{}] query session failed: {}", session_id, e);
            let _ = tx
                .send(Frame::Error {
                    message: GENERIC_ERROR.to_string(),
                })
                .await;
        }
    }

    let _ = tx.send(Frame::End).await;
    log::debug!("[{}] session finished", session_id);
}

/// Stages 1-4: embed the query, find seeds, expand, assemble.
async fn retrieve(state: &AppState, query: &str) -> Result<AssembledContext> {
    let query_vec = state.embedder.embed(query).await?;
    let seeds = seed_search(&state.db, &query_vec, state.config.retrieval.top_k).await?;
    log::debug!("Seed search returned {} chunks", seeds.len());
    let rows = expand(&state.db, &seeds, state.config.retrieval.expansion_depth).await?;
    Ok(assemble(&rows, None))
}

enum ForwardOutcome {
    Completed,
    Failed(crate::error::ScholaragError),
    Disconnected,
}

/// Forward generation fragments as text frames, one frame per fragment, in
/// provider emission order.
async fn forward_fragments(
    fragments: &mut mpsc::Receiver<Result<String>>,
    tx: &mpsc::Sender<Frame>,
) -> ForwardOutcome {
    while let Some(item) = fragments.recv().await {
        match item {
            Ok(chunk) => {
                if tx.send(Frame::Text { chunk }).await.is_err() {
                    return ForwardOutcome::Disconnected;
                }
            }
            Err(e) => return ForwardOutcome::Failed(e),
        }
    }
    ForwardOutcome::Completed
}
