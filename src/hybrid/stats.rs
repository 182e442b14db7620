//! Per-phase search latency collection.
//!
//! A collector belongs to one engine instance; there is no process-wide
//! timing state. Recording is purely observational and never fails a search.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::warn;

/// Timed sub-phase of a search call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SearchPhase {
    QueryVectorization,
    SimilarityComputation,
    Filtering,
    ResultAssembly,
    TotalSearch,
}

impl SearchPhase {
    pub const ALL: [SearchPhase; 5] = [
        SearchPhase::QueryVectorization,
        SearchPhase::SimilarityComputation,
        SearchPhase::Filtering,
        SearchPhase::ResultAssembly,
        SearchPhase::TotalSearch,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SearchPhase::QueryVectorization => "Query Vectorization",
            SearchPhase::SimilarityComputation => "Similarity Computation",
            SearchPhase::Filtering => "Filtering",
            SearchPhase::ResultAssembly => "Result Assembly",
            SearchPhase::TotalSearch => "Total Search",
        }
    }
}

/// Timings of a single search call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    pub query_vectorization: Duration,
    pub similarity_computation: Duration,
    pub filtering: Duration,
    pub result_assembly: Duration,
    pub total: Duration,
}

impl PhaseTimings {
    pub fn get(&self, phase: SearchPhase) -> Duration {
        match phase {
            SearchPhase::QueryVectorization => self.query_vectorization,
            SearchPhase::SimilarityComputation => self.similarity_computation,
            SearchPhase::Filtering => self.filtering,
            SearchPhase::ResultAssembly => self.result_assembly,
            SearchPhase::TotalSearch => self.total,
        }
    }
}

/// Aggregate over all recorded samples of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSummary {
    pub count: u64,
    pub min: Duration,
    pub max: Duration,
    pub average: Duration,
    pub last: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    last: Duration,
}

impl Accumulator {
    fn new(sample: Duration) -> Self {
        Self {
            count: 1,
            total: sample,
            min: sample,
            max: sample,
            last: sample,
        }
    }

    fn push(&mut self, sample: Duration) {
        self.count += 1;
        self.total = self.total.saturating_add(sample);
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
        self.last = sample;
    }

    fn summary(&self) -> PhaseSummary {
        let average = u32::try_from(self.count)
            .ok()
            .and_then(|count| self.total.checked_div(count))
            .unwrap_or_else(|| Duration::from_secs_f64(self.total.as_secs_f64() / self.count as f64));
        PhaseSummary {
            count: self.count,
            min: self.min,
            max: self.max,
            average,
            last: self.last,
        }
    }
}

/// Thread-safe latency accumulator.
#[derive(Debug, Default)]
pub struct StatsCollector {
    phases: Mutex<BTreeMap<SearchPhase, Accumulator>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SearchPhase, Accumulator>> {
        match self.phases.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Stats lock poisoned, recovering accumulated samples");
                poisoned.into_inner()
            }
        }
    }

    fn push(
        phases: &mut BTreeMap<SearchPhase, Accumulator>,
        phase: SearchPhase,
        elapsed: Duration,
    ) {
        phases
            .entry(phase)
            .and_modify(|acc| acc.push(elapsed))
            .or_insert_with(|| Accumulator::new(elapsed));
    }

    /// Record one sample.
    pub fn record(&self, phase: SearchPhase, elapsed: Duration) {
        Self::push(&mut self.lock(), phase, elapsed);
    }

    /// Record every phase of one search call under a single lock, so a
    /// snapshot never sees part of a call.
    pub fn record_timings(&self, timings: &PhaseTimings) {
        let mut phases = self.lock();
        for phase in SearchPhase::ALL {
            Self::push(&mut phases, phase, timings.get(phase));
        }
    }

    pub fn summary(&self, phase: SearchPhase) -> Option<PhaseSummary> {
        self.snapshot().remove(&phase)
    }

    pub fn snapshot(&self) -> BTreeMap<SearchPhase, PhaseSummary> {
        let phases = match self.phases.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        phases
            .iter()
            .map(|(phase, acc)| (*phase, acc.summary()))
            .collect()
    }

    pub fn reset(&self) {
        match self.phases.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Human-readable timing report.
    pub fn render_report(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();
        let _ = writeln!(out, "Search System Timing Report");
        let _ = writeln!(out, "{}", "-".repeat(50));

        if snapshot.is_empty() {
            let _ = writeln!(out, "No searches recorded.");
        }

        for (phase, s) in &snapshot {
            let _ = writeln!(out, "\n{}:", phase.label());
            let _ = writeln!(out, "  Last:  {:.4}s", s.last.as_secs_f64());
            let _ = writeln!(out, "  Avg:   {:.4}s", s.average.as_secs_f64());
            let _ = writeln!(out, "  Min:   {:.4}s", s.min.as_secs_f64());
            let _ = writeln!(out, "  Max:   {:.4}s", s.max.as_secs_f64());
            let _ = writeln!(out, "  Count: {}", s.count);
        }
        let _ = writeln!(out, "{}", "-".repeat(50));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn aggregates_samples() {
        let stats = StatsCollector::new();
        stats.record(SearchPhase::Filtering, Duration::from_millis(30));
        stats.record(SearchPhase::Filtering, Duration::from_millis(10));
        stats.record(SearchPhase::Filtering, Duration::from_millis(20));

        let summary = stats.summary(SearchPhase::Filtering).unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min, Duration::from_millis(10));
        assert_eq!(summary.max, Duration::from_millis(30));
        assert_eq!(summary.average, Duration::from_millis(20));
        assert_eq!(summary.last, Duration::from_millis(20));
        assert!(stats.summary(SearchPhase::TotalSearch).is_none());
    }

    #[test]
    fn records_all_phases_of_a_call() {
        let stats = StatsCollector::new();
        let timings = PhaseTimings {
            total: Duration::from_millis(5),
            ..Default::default()
        };
        stats.record_timings(&timings);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.len(), SearchPhase::ALL.len());
        assert_eq!(
            snapshot[&SearchPhase::TotalSearch].last,
            Duration::from_millis(5)
        );
    }

    #[test]
    fn instances_do_not_share_state() {
        let a = StatsCollector::new();
        let b = StatsCollector::new();
        a.record(SearchPhase::TotalSearch, Duration::from_millis(1));
        assert!(b.snapshot().is_empty());
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let stats = Arc::new(StatsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record(SearchPhase::SimilarityComputation, Duration::from_micros(5));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = stats.summary(SearchPhase::SimilarityComputation).unwrap();
        assert_eq!(summary.count, 800);
    }

    #[test]
    fn snapshots_never_see_partial_calls() {
        let stats = Arc::new(StatsCollector::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    let timings = PhaseTimings {
                        total: Duration::from_micros(10),
                        ..Default::default()
                    };
                    for _ in 0..200 {
                        stats.record_timings(&timings);
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            let snapshot = stats.snapshot();
            let counts: Vec<u64> = snapshot.values().map(|s| s.count).collect();
            assert!(counts.windows(2).all(|pair| pair[0] == pair[1]));
        }
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(stats.summary(SearchPhase::Filtering).unwrap().count, 800);
    }

    #[test]
    fn report_lists_recorded_phases() {
        let stats = StatsCollector::new();
        assert!(stats.render_report().contains("No searches recorded"));

        stats.record(SearchPhase::QueryVectorization, Duration::from_millis(2));
        let report = stats.render_report();
        assert!(report.contains("Query Vectorization"));
        assert!(report.contains("Count: 1"));

        stats.reset();
        assert!(stats.snapshot().is_empty());
    }
}
