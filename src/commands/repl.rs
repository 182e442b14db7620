//! Interactive query loop

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::warn;

use super::search::{format_results, query};
use crate::hybrid::HybridSearchEngine;
use crate::metrics;

const PROMPT: &str = "query> ";

/// Read queries line by line until EOF, `quit` or `exit`.
///
/// Each answered query prints its results followed by the engine's
/// cumulative timing report. Returns the number of queries answered.
pub fn run<R: BufRead, W: Write>(
    engine: &HybridSearchEngine,
    top_n: usize,
    input: R,
    mut output: W,
) -> Result<usize> {
    let mut answered = 0;
    write!(output, "{}", PROMPT).context("failed to write prompt")?;
    output.flush().context("failed to flush output")?;

    for line in input.lines() {
        let line = line.context("failed to read query")?;
        let text = line.trim();

        if text.eq_ignore_ascii_case("quit") || text.eq_ignore_ascii_case("exit") {
            break;
        }

        if !text.is_empty() {
            match query(engine, text, top_n) {
                Ok(response) => {
                    answered += 1;
                    metrics::record_results_returned("repl", response.results.len());
                    write!(output, "{}", format_results(text, &response.results))?;
                    if !response.skipped.is_empty() {
                        writeln!(
                            output,
                            "({} hits skipped: not in graph)",
                            response.skipped.len()
                        )?;
                    }
                    writeln!(output, "{}", engine.stats().render_report())?;
                }
                Err(err) => {
                    warn!("Query failed: {:#}", err);
                    writeln!(output, "Error: {:#}", err)?;
                }
            }
        }

        write!(output, "{}", PROMPT)?;
        output.flush()?;
    }

    writeln!(output)?;
    Ok(answered)
}
