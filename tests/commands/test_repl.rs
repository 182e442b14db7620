//! Tests for the interactive query loop

use std::io::Cursor;

use manual_search::commands::repl_run;
use manual_search::hybrid::{ChunkRecord, HybridConfig, HybridSearchEngine, VectorizerConfig};

fn engine() -> HybridSearchEngine {
    let corpus = vec![
        ChunkRecord::new("ch1", "oil change reminder service", "12.1").with_signals(["OIL_CHG"]),
        ChunkRecord::new("ch3", "oil change reset tool clears flag", "12.2")
            .with_signals(["OIL_CHG"]),
    ];
    let config = HybridConfig {
        vectorizer: VectorizerConfig {
            max_df: 1.0,
            min_df: 1,
        },
        ..Default::default()
    };
    HybridSearchEngine::build(&corpus, config).unwrap()
}

#[test]
fn test_exit_is_case_insensitive() {
    let engine = engine();
    let mut output = Vec::new();
    let answered = repl_run(&engine, 3, Cursor::new("reset\nEXIT\noil\n"), &mut output).unwrap();
    assert_eq!(answered, 1);

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("1. ch3"));
    assert!(text.contains("signals: OIL_CHG"));
    assert!(text.contains("Count: 1"));
}

#[test]
fn test_unmatched_query_prints_no_results() {
    let engine = engine();
    let mut output = Vec::new();
    repl_run(&engine, 3, Cursor::new("wastegate\n"), &mut output).unwrap();
    assert!(String::from_utf8(output).unwrap().contains("No results found."));
}
