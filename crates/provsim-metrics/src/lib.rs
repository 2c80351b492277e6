//! ---
//! ps_section: "03-observability"
//! ps_subsection: "exporter"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Prometheus metrics for the engine and bridge, with an HTTP exporter."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Registry shared by every metrics producer in the process.
pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Render every registered family in the Prometheus text format.
pub fn encode_text(registry: &Registry) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("failed to encode metrics")
}

async fn scrape(registry: SharedRegistry) -> Response {
    match encode_text(&registry) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            warn!(error = %err, "metrics scrape failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

/// Serve `registry` at `GET /metrics` on `addr`. Port 0 picks a free port;
/// the bound address is available from [`MetricsServer::addr`].
pub async fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener {addr}"))?;
    let addr = listener
        .local_addr()
        .context("failed to read metrics listener address")?;
    let app = Router::new().route("/metrics", get(move || scrape(registry.clone())));

    let (shutdown, stop) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.await;
            })
            .await
            .context("metrics exporter stopped with an error")
    });
    info!(address = %addr, "metrics exporter listening");

    Ok(MetricsServer {
        addr,
        shutdown,
        task,
    })
}

/// Running `/metrics` exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting scrapes and wait for in-flight ones to finish.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task.await.context("metrics exporter task panicked")?
    }
}

/// Metrics recorded by the simulation engine's real-time loop.
#[derive(Clone, Debug)]
pub struct EngineMetrics {
    ticks: IntCounter,
    overruns: IntCounter,
    tick_seconds: Histogram,
}

impl EngineMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let ticks = IntCounter::with_opts(Opts::new(
            "provsim_engine_ticks_total",
            "Total number of simulation steps advanced",
        ))?;
        registry.register(Box::new(ticks.clone()))?;

        let overruns = IntCounter::with_opts(Opts::new(
            "provsim_engine_overruns_total",
            "Simulation steps whose computation exceeded the configured timestep",
        ))?;
        registry.register(Box::new(overruns.clone()))?;

        let buckets = prometheus::exponential_buckets(0.0001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let tick_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "provsim_engine_step_seconds",
                "Wall-clock time spent inside a single simulation step",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(tick_seconds.clone()))?;

        Ok(Self {
            ticks,
            overruns,
            tick_seconds,
        })
    }

    pub fn observe_tick(&self, seconds: f64, overrun: bool) {
        self.ticks.inc();
        self.tick_seconds.observe(seconds);
        if overrun {
            self.overruns.inc();
        }
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.get()
    }
}

/// Metrics recorded by the provider bridge for protocol traffic.
#[derive(Clone, Debug)]
pub struct BridgeMetrics {
    requests: IntCounterVec,
    publishes: IntCounterVec,
}

impl BridgeMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let requests = IntCounterVec::new(
            Opts::new(
                "provsim_provider_requests_total",
                "Protocol requests handled by operation and outcome",
            ),
            &["op", "outcome"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        let publishes = IntCounterVec::new(
            Opts::new(
                "provsim_provider_publishes_total",
                "Periodic snapshot publications by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(publishes.clone()))?;

        Ok(Self {
            requests,
            publishes,
        })
    }

    pub fn record_request(&self, op: &str, ok: bool) {
        self.requests
            .with_label_values(&[op, outcome_label(ok)])
            .inc();
    }

    pub fn record_publish(&self, ok: bool) {
        self.publishes.with_label_values(&[outcome_label(ok)]).inc();
    }

    pub fn requests(&self, op: &str, ok: bool) -> u64 {
        self.requests
            .with_label_values(&[op, outcome_label(ok)])
            .get()
    }

    pub fn publishes(&self, ok: bool) -> u64 {
        self.publishes.with_label_values(&[outcome_label(ok)]).get()
    }
}

fn outcome_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_metrics_count_overruns_separately() {
        let registry = new_registry();
        let metrics = EngineMetrics::new(registry.clone()).expect("register");
        metrics.observe_tick(0.01, false);
        metrics.observe_tick(2.0, true);
        assert_eq!(metrics.overruns(), 1);
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_owned())
            .collect();
        assert!(names.contains(&"provsim_engine_ticks_total".to_owned()));
    }

    #[test]
    fn bridge_metrics_label_outcomes() {
        let metrics = BridgeMetrics::new(new_registry()).expect("register");
        metrics.record_request("read", true);
        metrics.record_request("read", false);
        metrics.record_request("read", false);
        metrics.record_publish(true);
        assert_eq!(metrics.requests("read", true), 1);
        assert_eq!(metrics.requests("read", false), 2);
        assert_eq!(metrics.publishes(true), 1);
        assert_eq!(metrics.publishes(false), 0);
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let registry = new_registry();
        EngineMetrics::new(registry.clone()).expect("first registration");
        assert!(EngineMetrics::new(registry).is_err());
    }

    #[test]
    fn text_encoding_lists_registered_families() {
        let registry = new_registry();
        BridgeMetrics::new(registry.clone())
            .expect("register")
            .record_request("query", true);
        let body = encode_text(&registry).expect("encode");
        assert!(body.contains("provsim_provider_requests_total{op=\"query\",outcome=\"ok\"} 1"));
    }

    #[tokio::test]
    async fn exporter_binds_and_shuts_down() {
        let registry = new_registry();
        EngineMetrics::new(registry.clone())
            .expect("register")
            .observe_tick(0.001, false);
        let server = spawn_http_server(registry, "127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind");
        assert_ne!(server.addr().port(), 0);
        server.shutdown().await.expect("clean shutdown");
    }
}
