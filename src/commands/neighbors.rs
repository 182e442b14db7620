//! Graph neighbourhood lookup

use anyhow::{Context, Result};

use crate::hybrid::{HybridSearchEngine, NodeKey, NodeKind};

/// Neighbours of `kind:id`, optionally restricted to `filter`, sorted.
pub fn run(
    engine: &HybridSearchEngine,
    kind: NodeKind,
    id: &str,
    filter: Option<NodeKind>,
) -> Result<Vec<NodeKey>> {
    let key = NodeKey::new(kind, id);
    let mut neighbors: Vec<NodeKey> = engine
        .neighbors(&key, filter)
        .with_context(|| format!("no node {} in the graph", key))?
        .into_iter()
        .cloned()
        .collect();
    neighbors.sort();
    Ok(neighbors)
}
