use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::record::ChunkRecord;
use crate::error::{Error, Result};

/// Node namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Chunk,
    Section,
    Signal,
    EcoTable,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Chunk => "chunk",
            NodeKind::Section => "section",
            NodeKind::Signal => "signal",
            NodeKind::EcoTable => "eco",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "chunk" => Ok(NodeKind::Chunk),
            "section" => Ok(NodeKind::Section),
            "signal" | "system_signal" => Ok(NodeKind::Signal),
            "eco" | "eco_table" => Ok(NodeKind::EcoTable),
            other => Err(Error::InvalidArgument(format!("unknown node kind: {}", other))),
        }
    }
}

/// Node identity: namespace plus raw id, so equal strings in different
/// namespaces never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub kind: NodeKind,
    pub id: String,
}

impl NodeKey {
    pub fn new(kind: NodeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn chunk(id: impl Into<String>) -> Self {
        Self::new(NodeKind::Chunk, id)
    }

    pub fn section(id: impl Into<String>) -> Self {
        Self::new(NodeKind::Section, id)
    }

    pub fn signal(id: impl Into<String>) -> Self {
        Self::new(NodeKind::Signal, id)
    }

    pub fn eco(id: impl Into<String>) -> Self {
        Self::new(NodeKind::EcoTable, id)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Graph node. Only chunk nodes carry attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphNode {
    Chunk { record: ChunkRecord },
    Section { id: String },
    Signal { id: String },
    EcoTable { id: String },
}

impl GraphNode {
    pub fn key(&self) -> NodeKey {
        match self {
            GraphNode::Chunk { record } => NodeKey::chunk(record.chunk_id.clone()),
            GraphNode::Section { id } => NodeKey::section(id.clone()),
            GraphNode::Signal { id } => NodeKey::signal(id.clone()),
            GraphNode::EcoTable { id } => NodeKey::eco(id.clone()),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            GraphNode::Chunk { .. } => NodeKind::Chunk,
            GraphNode::Section { .. } => NodeKind::Section,
            GraphNode::Signal { .. } => NodeKind::Signal,
            GraphNode::EcoTable { .. } => NodeKind::EcoTable,
        }
    }
}

/// Relation type between a chunk and one of its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    HasChunk,
    ContainsSignal,
    RefersToEco,
}

impl EdgeKind {
    /// Node kind on the non-chunk end of the edge.
    pub fn target_kind(&self) -> NodeKind {
        match self {
            EdgeKind::HasChunk => NodeKind::Section,
            EdgeKind::ContainsSignal => NodeKind::Signal,
            EdgeKind::RefersToEco => NodeKind::EcoTable,
        }
    }
}

/// Undirected typed edge, stored chunk-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub chunk: String,
    pub target: NodeKey,
    pub kind: EdgeKind,
}

/// Flat form used for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphSnapshot {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

/// Typed graph linking chunks to their section, signals and ECO tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "GraphSnapshot", try_from = "GraphSnapshot")]
pub struct RelationshipGraph {
    nodes: BTreeMap<NodeKey, GraphNode>,
    adjacency: BTreeMap<NodeKey, BTreeMap<NodeKey, EdgeKind>>,
}

impl RelationshipGraph {
    /// Build the graph from chunk metadata. Deterministic for a fixed corpus.
    pub fn build(corpus: &[ChunkRecord]) -> Result<Self> {
        let mut graph = Self::default();

        let sections: BTreeSet<&str> = corpus.iter().map(|c| c.section_id.as_str()).collect();
        let signals: BTreeSet<&str> = corpus
            .iter()
            .flat_map(|c| c.signal_ids.iter().map(String::as_str))
            .collect();
        let ecos: BTreeSet<&str> = corpus
            .iter()
            .flat_map(|c| c.eco_ids.iter().map(String::as_str))
            .collect();

        for id in sections {
            graph.insert_node(GraphNode::Section { id: id.to_string() });
        }
        for id in signals {
            graph.insert_node(GraphNode::Signal { id: id.to_string() });
        }
        for id in ecos {
            graph.insert_node(GraphNode::EcoTable { id: id.to_string() });
        }

        for record in corpus {
            let chunk = NodeKey::chunk(record.chunk_id.clone());
            if graph.nodes.contains_key(&chunk) {
                return Err(Error::InvalidCorpus(format!(
                    "duplicate chunk id {}",
                    record.chunk_id
                )));
            }
            graph.insert_node(GraphNode::Chunk {
                record: record.clone(),
            });

            graph.link(&chunk, NodeKey::section(record.section_id.clone()), EdgeKind::HasChunk);
            for signal in &record.signal_ids {
                graph.link(&chunk, NodeKey::signal(signal.clone()), EdgeKind::ContainsSignal);
            }
            for eco in &record.eco_ids {
                graph.link(&chunk, NodeKey::eco(eco.clone()), EdgeKind::RefersToEco);
            }
        }

        info!(
            "Relationship graph built: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    fn insert_node(&mut self, node: GraphNode) {
        let key = node.key();
        self.adjacency.entry(key.clone()).or_default();
        self.nodes.insert(key, node);
    }

    fn link(&mut self, chunk: &NodeKey, target: NodeKey, kind: EdgeKind) {
        self.adjacency
            .entry(chunk.clone())
            .or_default()
            .insert(target.clone(), kind);
        self.adjacency
            .entry(target)
            .or_default()
            .insert(chunk.clone(), kind);
    }

    /// Adjacent nodes, optionally restricted to one kind. Order is unspecified.
    pub fn neighbors(&self, key: &NodeKey, filter: Option<NodeKind>) -> Result<Vec<&NodeKey>> {
        let adjacent = self
            .adjacency
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;

        Ok(adjacent
            .keys()
            .filter(|neighbor| filter.map_or(true, |kind| neighbor.kind == kind))
            .collect())
    }

    /// Adjacent nodes together with the edge type.
    pub fn edges_of(&self, key: &NodeKey) -> Result<Vec<(&NodeKey, EdgeKind)>> {
        let adjacent = self
            .adjacency
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        Ok(adjacent.iter().map(|(k, kind)| (k, *kind)).collect())
    }

    pub fn node(&self, key: &NodeKey) -> Option<&GraphNode> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Stored record of a chunk node.
    pub fn chunk(&self, chunk_id: &str) -> Option<&ChunkRecord> {
        match self.nodes.get(&NodeKey::chunk(chunk_id)) {
            Some(GraphNode::Chunk { record }) => Some(record),
            _ => None,
        }
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values().filter(move |node| node.kind() == kind)
    }

    /// Every edge exactly once, chunk end first.
    pub fn edges(&self) -> impl Iterator<Item = GraphEdge> + '_ {
        self.adjacency
            .iter()
            .filter(|(key, _)| key.kind == NodeKind::Chunk)
            .flat_map(|(chunk, adjacent)| {
                adjacent.iter().map(move |(target, kind)| GraphEdge {
                    chunk: chunk.id.clone(),
                    target: target.clone(),
                    kind: *kind,
                })
            })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeMap::len).sum::<usize>() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl From<RelationshipGraph> for GraphSnapshot {
    fn from(graph: RelationshipGraph) -> Self {
        let edges = graph.edges().collect();
        GraphSnapshot {
            nodes: graph.nodes.into_values().collect(),
            edges,
        }
    }
}

impl TryFrom<GraphSnapshot> for RelationshipGraph {
    type Error = Error;

    fn try_from(snapshot: GraphSnapshot) -> Result<Self> {
        let mut graph = RelationshipGraph::default();
        for node in snapshot.nodes {
            graph.insert_node(node);
        }

        for edge in snapshot.edges {
            let chunk = NodeKey::chunk(edge.chunk.clone());
            if !graph.contains(&chunk) {
                return Err(Error::SerializationError(format!(
                    "edge references unknown chunk {}",
                    edge.chunk
                )));
            }
            if edge.target.kind != edge.kind.target_kind() || !graph.contains(&edge.target) {
                return Err(Error::SerializationError(format!(
                    "edge {:?} has invalid target {}",
                    edge.kind, edge.target
                )));
            }
            graph.link(&chunk, edge.target, edge.kind);
        }

        Ok(graph)
    }
}
