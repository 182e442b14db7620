use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::graph::{NodeKey, NodeKind, RelationshipGraph};
use super::record::{validate_records, ChunkRecord};
use super::stats::{PhaseSummary, PhaseTimings, SearchPhase, StatsCollector};
use super::store::{self, IndexBundle};
use super::vector_index::{VectorIndex, VectorizerConfig};
use crate::error::{Error, Result};

/// Scores at or below this are treated as non-matches.
pub const DEFAULT_SCORE_EPSILON: f32 = 1e-6;
/// Results returned when the caller does not ask for a count.
pub const DEFAULT_TOP_N: usize = 5;

/// Hybrid search configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridConfig {
    /// Vocabulary pruning used at build time
    pub vectorizer: VectorizerConfig,
    /// Default number of results
    pub top_n: usize,
    /// Minimum score (exclusive) for a hit to be kept
    pub score_epsilon: f32,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            vectorizer: VectorizerConfig::default(),
            top_n: DEFAULT_TOP_N,
            score_epsilon: DEFAULT_SCORE_EPSILON,
        }
    }
}

/// Ranked chunk before graph expansion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticHit {
    pub chunk_id: String,
    pub score: f32,
}

/// Ranked chunk enriched with its metadata and graph neighbours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridResult {
    pub chunk_id: String,
    pub score: f32,
    pub text: String,
    pub section_id: String,
    pub signal_ids: Vec<String>,
    pub eco_ids: Vec<String>,
    pub image_paths: Vec<String>,
    pub section_neighbors: Vec<String>,
    pub signal_neighbors: Vec<String>,
    pub eco_neighbors: Vec<String>,
}

/// Full outcome of one search call.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub results: Vec<HybridResult>,
    /// Ranked chunk ids dropped because the graph does not know them
    pub skipped: Vec<String>,
    pub timings: PhaseTimings,
}

/// Vector ranking followed by graph expansion over one frozen corpus.
///
/// An engine only exists in the built state: both the vector index and the
/// graph are complete before the value is returned, and neither changes
/// afterwards. Share it behind an `Arc` for concurrent queries.
#[derive(Debug)]
pub struct HybridSearchEngine {
    config: HybridConfig,
    index: VectorIndex,
    graph: RelationshipGraph,
    stats: StatsCollector,
    built_at: DateTime<Utc>,
}

impl HybridSearchEngine {
    /// Build the vector index and the graph from one corpus snapshot.
    pub fn build(corpus: &[ChunkRecord], config: HybridConfig) -> Result<Self> {
        if corpus.is_empty() {
            return Err(Error::InvalidCorpus("corpus is empty".to_string()));
        }
        validate_records(corpus)?;

        let index = VectorIndex::build(corpus, config.vectorizer)?;
        let graph = RelationshipGraph::build(corpus)?;

        info!(
            "Hybrid engine ready: {} chunks, {} terms, {} graph nodes",
            index.len(),
            index.vocabulary().len(),
            graph.node_count()
        );

        Ok(Self::from_parts(config, index, graph, Utc::now()))
    }

    fn from_parts(
        config: HybridConfig,
        index: VectorIndex,
        graph: RelationshipGraph,
        built_at: DateTime<Utc>,
    ) -> Self {
        Self {
            config: HybridConfig {
                vectorizer: *index.config(),
                ..config
            },
            index,
            graph,
            stats: StatsCollector::new(),
            built_at,
        }
    }

    /// Persist index and graph together under `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        store::save(dir.as_ref(), &self.index, &self.graph, self.built_at)
    }

    /// Reload a persisted engine without recomputation.
    ///
    /// Pruning thresholds come from the stored index; only the search
    /// parameters of `config` apply.
    pub fn load<P: AsRef<Path>>(dir: P, config: HybridConfig) -> Result<Self> {
        let IndexBundle {
            built_at,
            vector_index,
            graph,
            ..
        } = store::load(dir.as_ref())?;
        Ok(Self::from_parts(config, vector_index, graph, built_at))
    }

    /// Ranked, graph-expanded results for `query`.
    pub fn search(&self, query: &str, top_n: usize) -> Result<Vec<HybridResult>> {
        self.search_detailed(query, top_n).map(|response| response.results)
    }

    /// Like [`search`](Self::search), also reporting skipped hits and timings.
    pub fn search_detailed(&self, query: &str, top_n: usize) -> Result<SearchResponse> {
        let started = Instant::now();
        let mut timings = PhaseTimings::default();

        let ranked = self.rank(query, top_n, &mut timings)?;

        let assembly = Instant::now();
        let mut results = Vec::with_capacity(ranked.len());
        let mut skipped = Vec::new();
        for (position, score) in ranked {
            let chunk_id = &self.index.chunk_ids()[position];
            match self.expand(chunk_id, score) {
                Ok(result) => results.push(result),
                Err(err) => {
                    warn!("Skipping hit {}: {}", chunk_id, err);
                    skipped.push(chunk_id.clone());
                }
            }
        }
        timings.result_assembly = assembly.elapsed();
        timings.total = started.elapsed();

        self.stats.record_timings(&timings);
        debug!(
            "Search '{}' returned {} results ({} skipped) in {:?}",
            query,
            results.len(),
            skipped.len(),
            timings.total
        );

        Ok(SearchResponse {
            results,
            skipped,
            timings,
        })
    }

    /// Vector ranking only, without graph expansion.
    pub fn semantic_search(&self, query: &str, top_n: usize) -> Result<Vec<SemanticHit>> {
        let mut timings = PhaseTimings::default();
        let ranked = self.rank(query, top_n, &mut timings)?;
        Ok(ranked
            .into_iter()
            .map(|(position, score)| SemanticHit {
                chunk_id: self.index.chunk_ids()[position].clone(),
                score,
            })
            .collect())
    }

    fn rank(
        &self,
        query: &str,
        top_n: usize,
        timings: &mut PhaseTimings,
    ) -> Result<Vec<(usize, f32)>> {
        if top_n == 0 {
            return Err(Error::InvalidArgument(
                "top_n must be a positive integer".to_string(),
            ));
        }

        let phase = Instant::now();
        let query_vector = self.index.vectorize(query);
        timings.query_vectorization = phase.elapsed();

        let phase = Instant::now();
        let scores = self.index.similarity(&query_vector);
        timings.similarity_computation = phase.elapsed();

        let phase = Instant::now();
        let mut ranked: Vec<(usize, f32)> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > self.config.score_epsilon)
            .collect();
        // Stable sort keeps corpus order among equal scores.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(top_n);
        timings.filtering = phase.elapsed();

        Ok(ranked)
    }

    fn expand(&self, chunk_id: &str, score: f32) -> Result<HybridResult> {
        let record = self
            .graph
            .chunk(chunk_id)
            .ok_or_else(|| Error::NotFound(NodeKey::chunk(chunk_id).to_string()))?;

        let mut section_neighbors = Vec::new();
        let mut signal_neighbors = Vec::new();
        let mut eco_neighbors = Vec::new();
        for neighbor in self.graph.neighbors(&NodeKey::chunk(chunk_id), None)? {
            match neighbor.kind {
                NodeKind::Section => section_neighbors.push(neighbor.id.clone()),
                NodeKind::Signal => signal_neighbors.push(neighbor.id.clone()),
                NodeKind::EcoTable => eco_neighbors.push(neighbor.id.clone()),
                NodeKind::Chunk => {}
            }
        }

        Ok(HybridResult {
            chunk_id: chunk_id.to_string(),
            score,
            text: record.text.clone(),
            section_id: record.section_id.clone(),
            signal_ids: record.signal_ids.iter().cloned().collect(),
            eco_ids: record.eco_ids.iter().cloned().collect(),
            image_paths: record.image_paths.clone(),
            section_neighbors,
            signal_neighbors,
            eco_neighbors,
        })
    }

    /// Graph neighbours of any node.
    pub fn neighbors(&self, key: &NodeKey, filter: Option<NodeKind>) -> Result<Vec<&NodeKey>> {
        self.graph.neighbors(key, filter)
    }

    /// Aggregate per-phase latency of this instance.
    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub fn phase_summary(&self, phase: SearchPhase) -> Option<PhaseSummary> {
        self.stats.summary(phase)
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
