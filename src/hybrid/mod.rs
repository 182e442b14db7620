//! Hybrid retrieval over technical manual chunks.
//!
//! Two deterministic passes over one corpus snapshot:
//! - a sparse TF-IDF vector space used for similarity ranking
//! - a typed relationship graph linking each chunk to its section,
//!   engineering signals and ECO tables
//!
//! A query is ranked in the vector space first; every surviving hit is then
//! expanded with its graph neighbours.

pub mod engine;
pub mod extractor;
pub mod graph;
pub mod record;
pub mod stats;
pub mod store;
pub mod vector_index;

pub use engine::{HybridConfig, HybridResult, HybridSearchEngine, SearchResponse, SemanticHit};
pub use extractor::{records_from_pages, IdentifierExtractor, PageText, RegexExtractor};
pub use graph::{EdgeKind, GraphEdge, GraphNode, NodeKey, NodeKind, RelationshipGraph};
pub use record::{load_chunks, parse_records, ChunkId, ChunkRecord, UNKNOWN_SECTION};
pub use stats::{PhaseSummary, PhaseTimings, SearchPhase, StatsCollector};
pub use vector_index::{ChunkVector, VectorIndex, VectorizerConfig, Vocabulary};
