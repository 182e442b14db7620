//! Tests for build, search and neighbors commands against a real index directory

use std::fs;
use std::path::Path;

use manual_search::commands::{self, BuildArgs, SearchArgs};
use manual_search::hybrid::{NodeKey, NodeKind};
use manual_search::Config;

const CHUNKS: &str = r#"[
    {"chunk_id": "ch1", "text": "oil change reminder service", "section_id": "12.1",
     "signal_ids": ["OIL_CHG"], "eco_ids": []},
    {"chunk_id": "ch2", "text": "ignition timing retarded cold start", "section_id": "64.5",
     "signal_ids": ["IGN_ADV"], "eco_ids": ["ECO-0210"]},
    {"chunk_id": "ch3", "text": "oil change reset tool clears flag", "section_id": "12.2",
     "signal_ids": ["OIL_CHG"], "eco_ids": []}
]"#;

fn build_index(root: &Path) -> Config {
    let chunks = root.join("all_chunks.json");
    fs::write(&chunks, CHUNKS).unwrap();

    let mut config = Config::from_yaml("").unwrap();
    config.index_dir = root.join("index");

    let args = BuildArgs {
        chunks: Some(chunks),
        index_dir: None,
        max_df: Some(0.85),
        min_df: Some(1),
    };
    let summary = commands::build_run(&config, &args).unwrap();
    assert_eq!(summary.chunks, 3);
    // 3 chunks + 3 sections + 2 signals + 1 eco
    assert_eq!(summary.nodes, 9);
    config
}

#[test]
fn test_search_after_build() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_index(dir.path());

    let args = SearchArgs {
        query: "oil change reset".to_string(),
        top_n: Some(2),
        index_dir: None,
    };
    let response = commands::search_run(&config, &args).unwrap();
    let ids: Vec<&str> = response
        .results
        .iter()
        .map(|r| r.chunk_id.as_str())
        .collect();
    assert_eq!(ids, vec!["ch3", "ch1"]);
    assert!(response.skipped.is_empty());
}

#[test]
fn test_search_default_top_n_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = build_index(dir.path());
    config.top_n = 1;

    let args = SearchArgs {
        query: "oil".to_string(),
        top_n: None,
        index_dir: None,
    };
    assert_eq!(commands::search_run(&config, &args).unwrap().results.len(), 1);
}

#[test]
fn test_neighbors_after_build() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_index(dir.path());

    let engine = commands::open_engine(&config, None).unwrap();
    let found = commands::neighbors_run(&engine, NodeKind::Chunk, "ch2", None).unwrap();
    assert_eq!(
        found,
        vec![
            NodeKey::section("64.5"),
            NodeKey::signal("IGN_ADV"),
            NodeKey::eco("ECO-0210"),
        ]
    );
}

#[test]
fn test_rebuild_overwrites_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_index(dir.path());
    build_index(dir.path());

    let engine = commands::open_engine(&config, None).unwrap();
    assert_eq!(engine.len(), 3);
}
