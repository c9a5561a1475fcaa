// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("refresh_cycles_total", "Refresh cycles started");
        describe_counter!("refresh_cycle_failures_total", "Cycles aborted on ranking fetch failure");
        describe_counter!("refresh_items_enriched_total", "Items fully enriched");
        describe_counter!("refresh_items_reused_total", "Items refreshed on the reuse path");
        describe_counter!("refresh_item_failures_total", "Items skipped for a cycle");
        describe_counter!("notifications_dispatched_total", "Push notifications delivered");
        describe_counter!("notification_failures_total", "Push notifications that failed");
        describe_gauge!("refresh_last_completed_ts", "Unix time of the last completed cycle");
        describe_counter!("rate_limit_denied_total", "Requests rejected by the rate limiter");
        describe_counter!("proxy_requests_total", "Upstream fetches relayed by the proxy");
        describe_counter!("proxy_rejected_total", "Proxy requests rejected, by reason");

        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
