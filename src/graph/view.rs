//! The per-query merged graph view.

use std::collections::BTreeMap;

use super::fragment::GraphFragment;
use super::{EntityNode, RelationshipEdge};

/// Deduplicated graph accumulated across all expanded chunks of one query.
///
/// Nodes are keyed by entity name, edges by the full (source, target, type)
/// triple. Sorted maps give deterministic iteration and serialization order.
/// Reinserting a node under an existing name replaces it (last-seen wins),
/// which is deterministic because assembly processes rows in a fixed order.
#[derive(Debug, Default)]
pub struct GraphView {
    nodes: BTreeMap<String, EntityNode>,
    edges: BTreeMap<(String, String, String), RelationshipEdge>,
}

impl GraphView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&mut self, node: EntityNode) {
        self.nodes.insert(node.name.clone(), node);
    }

    pub fn insert_edge(&mut self, edge: RelationshipEdge) {
        let key = (edge.source.clone(), edge.target.clone(), edge.rel_type.clone());
        self.edges.insert(key, edge);
    }

    /// Fold one chunk's fragment into the view.
    pub fn merge_fragment(&mut self, fragment: &GraphFragment) {
        for entity in &fragment.entities {
            self.insert_node(entity.clone());
        }
        for relationship in &fragment.relationships {
            self.insert_edge(relationship.clone());
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn get_node(&self, name: &str) -> Option<&EntityNode> {
        self.nodes.get(name)
    }

    /// Consume the view into node and edge lists for the wire payload.
    pub fn into_payload(self) -> (Vec<EntityNode>, Vec<RelationshipEdge>) {
        (
            self.nodes.into_values().collect(),
            self.edges.into_values().collect(),
        )
    }
}
