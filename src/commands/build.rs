//! Build and persist a hybrid index from extracted chunks

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::hybrid::{load_chunks, HybridSearchEngine};
use crate::metrics;

/// Overrides for a build run; `None` keeps the configured value.
#[derive(Debug, Default, Clone)]
pub struct BuildArgs {
    pub chunks: Option<PathBuf>,
    pub index_dir: Option<PathBuf>,
    pub max_df: Option<f64>,
    pub min_df: Option<usize>,
}

/// What a build produced
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub chunks: usize,
    pub vocabulary: usize,
    pub nodes: usize,
    pub edges: usize,
    pub index_path: PathBuf,
}

impl BuildArgs {
    fn apply(&self, config: &Config) -> Result<Config> {
        let mut config = config.clone();
        if let Some(path) = &self.chunks {
            config.chunks_path = path.clone();
        }
        if let Some(dir) = &self.index_dir {
            config.index_dir = dir.clone();
        }
        if let Some(max_df) = self.max_df {
            config.max_df = max_df;
        }
        if let Some(min_df) = self.min_df {
            config.min_df = min_df;
        }
        config.validate().context("invalid build parameters")?;
        Ok(config)
    }
}

/// Load chunks, build both indexes and write them to the index directory.
pub fn run(config: &Config, args: &BuildArgs) -> Result<BuildSummary> {
    let config = args.apply(config)?;

    info!("Loading chunks from {}", config.chunks_path.display());
    let corpus = load_chunks(&config.chunks_path)
        .with_context(|| format!("failed to load chunks from {}", config.chunks_path.display()))?;

    let engine =
        HybridSearchEngine::build(&corpus, config.hybrid()).context("failed to build index")?;
    let index_path = engine
        .save(&config.index_dir)
        .with_context(|| format!("failed to save index to {}", config.index_dir.display()))?;
    metrics::record_index_size("build", &engine);

    Ok(BuildSummary {
        chunks: engine.len(),
        vocabulary: engine.index().vocabulary().len(),
        nodes: engine.graph().node_count(),
        edges: engine.graph().edge_count(),
        index_path,
    })
}
