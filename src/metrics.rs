//! Prometheus metrics for the manual search CLI.
//!
//! Exposes:
//! - `manual_search_command_duration_seconds` (histogram)
//! - `manual_search_command_total` (counter with status)
//! - `manual_search_command_inflight` (gauge)
//! - `manual_search_results_returned{command}` (histogram of hits per query)
//! - `manual_search_index_size{source,part}` (chunks/terms/nodes/edges of a built or loaded index)
//! - process metrics via `process` collector
//!
//! Per-phase search latency lives in the engine's own `StatsCollector`;
//! these collectors only describe CLI command executions.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::hybrid::HybridSearchEngine;

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 1ms up to ~30s (index builds on large manuals).
    let buckets =
        prometheus::exponential_buckets(0.001, 2.0, 16).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "manual_search_command_duration_seconds",
        "CLI command duration in seconds",
        &["command"],
        buckets
    )
    .expect("failed to register command duration histogram")
});

static COMMAND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "manual_search_command_total",
        "Total command executions by status",
        &["command", "status"]
    )
    .expect("failed to register command counter")
});

static COMMAND_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "manual_search_command_inflight",
        "Number of in-flight commands",
        &["command"]
    )
    .expect("failed to register inflight gauge")
});

static RESULTS_RETURNED: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "manual_search_results_returned",
        "Number of hybrid search results returned per query",
        &["command"],
        vec![0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0]
    )
    .expect("failed to register results histogram")
});

static INDEX_SIZE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "manual_search_index_size",
        "Size of the most recently built or loaded index",
        &["source", "part"]
    )
    .expect("failed to register index size gauge")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&COMMAND_DURATION);
    Lazy::force(&COMMAND_TOTAL);
    Lazy::force(&COMMAND_INFLIGHT);
    Lazy::force(&RESULTS_RETURNED);
    Lazy::force(&INDEX_SIZE);
}

/// Increment inflight gauge for a command.
pub fn record_command_start(command: &'static str) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).inc();
}

/// Record command completion with duration and status.
pub fn record_command_result(command: &'static str, duration: Duration, success: bool) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).dec();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
    COMMAND_TOTAL
        .with_label_values(&[command, if success { "ok" } else { "error" }])
        .inc();
}

/// Record how many results a query issued by `command` produced.
pub fn record_results_returned(command: &'static str, count: usize) {
    init_collectors();
    RESULTS_RETURNED
        .with_label_values(&[command])
        .observe(count as f64);
}

/// Publish the shape of an index; `source` is `build` or `load`.
pub fn record_index_size(source: &'static str, engine: &HybridSearchEngine) {
    init_collectors();
    let graph = engine.graph();
    for (part, value) in [
        ("chunks", engine.len()),
        ("terms", engine.index().vocabulary().len()),
        ("nodes", graph.node_count()),
        ("edges", graph.edge_count()),
    ] {
        INDEX_SIZE
            .with_label_values(&[source, part])
            .set(i64::try_from(value).unwrap_or(i64::MAX));
    }
}

/// Times a command from creation until [`finish`](CommandTimer::finish).
pub struct CommandTimer {
    command: &'static str,
    started: Instant,
}

impl CommandTimer {
    pub fn start(command: &'static str) -> Self {
        record_command_start(command);
        Self {
            command,
            started: Instant::now(),
        }
    }

    pub fn finish(self, success: bool) -> Duration {
        let elapsed = self.started.elapsed();
        record_command_result(self.command, elapsed, success);
        elapsed
    }
}

fn plain_response(status: StatusCode, body: Full<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            Full::from("encode error"),
        ));
    }

    let mut response = plain_response(StatusCode::OK, Full::from(buffer));
    if let Ok(value) = hyper::header::HeaderValue::from_str(encoder.format_type()) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(plain_response(StatusCode::NOT_FOUND, Full::new(Bytes::new()))),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn records_successful_command_metrics() {
        let cmd = "test_build_success";

        record_command_start(cmd);
        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 1);

        record_command_result(cmd, Duration::from_millis(120), true);

        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 0);
        assert_eq!(COMMAND_TOTAL.with_label_values(&[cmd, "ok"]).get(), 1);
        assert_eq!(
            COMMAND_DURATION
                .with_label_values(&[cmd])
                .get_sample_count(),
            1
        );
    }

    #[test]
    fn command_timer_records_failure() {
        let cmd = "test_search_timer_error";

        let timer = CommandTimer::start(cmd);
        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 1);
        timer.finish(false);

        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 0);
        assert_eq!(COMMAND_TOTAL.with_label_values(&[cmd, "error"]).get(), 1);
    }

    #[test]
    fn results_histogram_is_labelled_by_command() {
        record_results_returned("test_results_search", 3);
        record_results_returned("test_results_search", 0);

        let histogram = RESULTS_RETURNED.with_label_values(&["test_results_search"]);
        assert_eq!(histogram.get_sample_count(), 2);
        assert_eq!(histogram.get_sample_sum(), 3.0);
    }

    #[test]
    fn index_size_reflects_engine() {
        use crate::hybrid::{ChunkRecord, HybridConfig};

        let corpus = vec![
            ChunkRecord::new("ch1", "boost limit", "68.4").with_signals(["BOOST_LIMIT"]),
            ChunkRecord::new("ch2", "fuel trim", "37.2"),
        ];
        let engine = HybridSearchEngine::build(&corpus, HybridConfig::default()).unwrap();
        record_index_size("test_index_size", &engine);

        let size = |part: &str| INDEX_SIZE.with_label_values(&["test_index_size", part]).get();
        assert_eq!(size("chunks"), 2);
        assert_eq!(size("terms"), 4);
        assert_eq!(size("nodes"), 5);
        assert_eq!(size("edges"), 3);
    }

    #[test]
    fn metrics_response_sets_prometheus_content_type() {
        let response = tokio_test::block_on(metrics_response()).expect("metrics response");
        let content_type = response
            .headers()
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn metrics_response_contains_registered_metrics() {
        let cmd = "test_metrics_response";
        record_command_start(cmd);
        record_command_result(cmd, Duration::from_millis(10), true);

        let response = metrics_response().await.expect("metrics response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(hyper::header::CONTENT_TYPE).is_some());

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect metrics body")
            .to_bytes();
        let text = String::from_utf8(body_bytes.to_vec()).expect("utf-8 metrics body");
        assert!(text.contains("manual_search_command_total"));
        assert!(text.contains(cmd));
    }
}
