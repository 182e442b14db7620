//! Hybrid search over technical manual chunks
//!
//! This library provides tools to:
//! - Load and validate extracted manual chunks (`all_chunks.json`)
//! - Extract section, signal and ECO identifiers from page text
//! - Rank chunks with a sparse TF-IDF vector index
//! - Expand hits through a typed chunk/section/signal/ECO relationship graph
//! - Persist and reload built indexes
//! - Collect per-phase search timings and Prometheus command metrics

pub mod config;
pub mod error;
pub mod hybrid;
pub mod metrics;

// Re-export common types
pub use config::Config;
pub use error::{Error, Result};
pub use hybrid::{
    ChunkRecord, HybridConfig, HybridResult, HybridSearchEngine, NodeKey, NodeKind,
    RelationshipGraph, SearchPhase, StatsCollector, VectorIndex,
};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
