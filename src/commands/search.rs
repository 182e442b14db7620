//! Hybrid search over a persisted index

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::hybrid::{HybridResult, HybridSearchEngine, SearchResponse};
use crate::metrics;

/// Search command arguments
#[derive(Debug, Clone)]
pub struct SearchArgs {
    pub query: String,
    /// Number of results (falls back to `search.top_n`)
    pub top_n: Option<usize>,
    pub index_dir: Option<PathBuf>,
}

/// Load the engine persisted under `index_dir` (or the configured directory).
pub fn open_engine(config: &Config, index_dir: Option<&Path>) -> Result<HybridSearchEngine> {
    let dir = index_dir.unwrap_or(&config.index_dir);
    let engine = HybridSearchEngine::load(dir, config.hybrid()).with_context(|| {
        format!(
            "failed to load index from {} (run `manual_search build` first)",
            dir.display()
        )
    })?;
    info!(
        "Index loaded: {} chunks, built {}",
        engine.len(),
        engine.built_at().format("%Y-%m-%d %H:%M:%S")
    );
    metrics::record_index_size("load", &engine);
    Ok(engine)
}

/// Run one query against the persisted index.
pub fn run(config: &Config, args: &SearchArgs) -> Result<SearchResponse> {
    let engine = open_engine(config, args.index_dir.as_deref())?;
    let response = query(&engine, &args.query, args.top_n.unwrap_or(config.top_n))?;
    metrics::record_results_returned("search", response.results.len());
    Ok(response)
}

/// Run one query against an already loaded engine.
pub fn query(engine: &HybridSearchEngine, query: &str, top_n: usize) -> Result<SearchResponse> {
    let response = engine
        .search_detailed(query, top_n)
        .with_context(|| format!("search failed for '{}'", query))?;
    Ok(response)
}

/// Render results for terminal output.
pub fn format_results(query: &str, results: &[HybridResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n=== Hybrid results for '{}' ===\n", query);

    if results.is_empty() {
        let _ = writeln!(out, "No results found.");
        return out;
    }

    for (idx, res) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} | score: {:.4} | section: {}",
            idx + 1,
            res.chunk_id,
            res.score,
            res.section_id
        );
        let _ = writeln!(out, "   {}", truncate(&res.text.replace('\n', " "), 240));

        if !res.signal_neighbors.is_empty() {
            let _ = writeln!(out, "   signals: {}", res.signal_neighbors.join(", "));
        }
        if !res.eco_neighbors.is_empty() {
            let _ = writeln!(out, "   eco tables: {}", res.eco_neighbors.join(", "));
        }
        if !res.image_paths.is_empty() {
            let _ = writeln!(out, "   images: {}", res.image_paths.join(", "));
        }
        let _ = writeln!(out);
    }
    out
}

/// Results as pretty JSON.
pub fn to_json(results: &[HybridResult]) -> Result<String> {
    serde_json::to_string_pretty(results).context("failed to serialize results")
}

/// Shorten `s` to at most `max_chars` characters.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, text: &str) -> HybridResult {
        HybridResult {
            chunk_id: id.to_string(),
            score: 0.5,
            text: text.to_string(),
            section_id: "68.4.2".to_string(),
            signal_ids: vec!["BOOST_LIMIT".to_string()],
            eco_ids: vec![],
            image_paths: vec![],
            section_neighbors: vec!["68.4.2".to_string()],
            signal_neighbors: vec!["BOOST_LIMIT".to_string()],
            eco_neighbors: vec![],
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ключ давления", 4), "ключ...");
    }

    #[test]
    fn test_format_results() {
        let text = format_results("boost", &[result("ch1", "boost\nlimit")]);
        assert!(text.contains("1. ch1 | score: 0.5000 | section: 68.4.2"));
        assert!(text.contains("boost limit"));
        assert!(text.contains("signals: BOOST_LIMIT"));
        assert!(!text.contains("eco tables"));

        assert!(format_results("none", &[]).contains("No results found."));
    }

    #[test]
    fn test_json_output_has_all_fields() {
        let json = to_json(&[result("ch1", "boost")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let first = &value[0];
        for field in [
            "chunk_id",
            "score",
            "text",
            "section_id",
            "signal_ids",
            "eco_ids",
            "image_paths",
            "section_neighbors",
            "signal_neighbors",
            "eco_neighbors",
        ] {
            assert!(first.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_open_engine_reports_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_yaml("").unwrap();
        let err = open_engine(&config, Some(dir.path())).unwrap_err();
        assert!(err.to_string().contains("manual_search build"));
    }
}
