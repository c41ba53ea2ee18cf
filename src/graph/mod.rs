//! Derived knowledge graph: per-chunk fragments, the per-query merged view,
//! and multi-hop expansion from seed chunks.

mod expansion;
mod fragment;
mod view;

pub use expansion::{expand, ContextRow};
pub use fragment::{extract_json_block, parse_graph_fragment, sanitize_rel_type, GraphFragment};
pub use view::GraphView;

use serde::{Deserialize, Serialize};

/// A node in the derived knowledge graph.
///
/// The entity name is the identity key (case-sensitive). Serializes in the
/// client wire shape (`id`/`type`); stored fragments that use `name` instead
/// of `id` deserialize via the alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNode {
    #[serde(rename = "id", alias = "name")]
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

/// An edge in the derived knowledge graph.
///
/// Identified by the full (source, target, type) triple; duplicate triples
/// collapse to one edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub rel_type: String,
}
