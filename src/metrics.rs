//! C0 — observability surface shared by every component: a `prometheus`
//! registry carrying one counter/gauge per tracked invariant, served over
//! HTTP by a small `warp` app (`/metrics`, `/health`), with per-tier
//! fields trimmed down to the BD-intel core's own counters.

use std::sync::Arc;

use prometheus::{Counter, Encoder, Registry, TextEncoder};
use serde_json::json;
use tracing::info;
use warp::Filter;

use crate::store::Store;

/// One counter/gauge per tracked invariant. Cloneable: every `Counter` is
/// an `Arc` internally.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub enrich_decrypt_failures: Counter,
    pub ingest_messages_total: Counter,
    pub ingest_flood_wait_seconds_total: Counter,
    pub ingest_dialog_failures_total: Counter,
    pub sync_tasks_completed_total: Counter,
    pub sync_tasks_failed_total: Counter,
    pub sync_tasks_conflict_total: Counter,
    pub leads_created_total: Counter,
    pub follow_ups_created_total: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let metric = |name: &str, help: &str| {
            let c = Counter::new(name, help).expect("static metric name/help are valid");
            registry.register(Box::new(c.clone())).expect("metric name is unique");
            c
        };

        Self {
            enrich_decrypt_failures: metric(
                "enrich_decrypt_failures",
                "rows skipped by the Enricher due to a decrypt failure",
            ),
            ingest_messages_total: metric("ingest_messages_total", "messages successfully ingested"),
            ingest_flood_wait_seconds_total: metric(
                "ingest_flood_wait_seconds_total",
                "cumulative seconds slept honoring Telegram FLOOD_WAIT",
            ),
            ingest_dialog_failures_total: metric(
                "ingest_dialog_failures_total",
                "dialogs that exhausted their retry budget (ErrDialogFailed)",
            ),
            sync_tasks_completed_total: metric("sync_tasks_completed_total", "SyncTask rows reaching state=completed"),
            sync_tasks_failed_total: metric("sync_tasks_failed_total", "SyncTask rows reaching terminal state=failed"),
            sync_tasks_conflict_total: metric("sync_tasks_conflict_total", "SyncTask rows reaching state=conflict"),
            leads_created_total: metric("leads_created_total", "Lead rows created during lead qualification"),
            follow_ups_created_total: metric("follow_ups_created_total", "FollowUp rows created during follow-up synthesis"),
            registry,
        }
    }

    fn render(&self) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer).expect("text encoding never fails");
        String::from_utf8(buffer).expect("prometheus output is valid utf-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves `/metrics` (Prometheus text exposition) and `/health` (Store
/// reachability + lock ownership) on `port` until the process exits. The
/// contract for `/health` and `MONITORING_PORT` is internal — there is no
/// documented external surface for it.
pub async fn serve(metrics: Arc<Metrics>, store: Arc<Store>, port: u16) {
    let metrics_route = warp::path("metrics").and(warp::get()).map({
        let metrics = metrics.clone();
        move || warp::reply::with_header(metrics.render(), "content-type", "text/plain; version=0.0.4")
    });

    let health_route = warp::path("health").and(warp::get()).and_then({
        let store = store.clone();
        move || {
            let store = store.clone();
            async move {
                let body = match store.stats().await {
                    Ok(stats) => json!({
                        "status": "ok",
                        "store_reachable": true,
                        "pending_syncs": stats.pending_syncs,
                        "failed_syncs": stats.failed_syncs,
                    }),
                    Err(err) => json!({
                        "status": "degraded",
                        "store_reachable": false,
                        "error": err.to_string(),
                    }),
                };
                Ok::<_, std::convert::Infallible>(warp::reply::json(&body))
            }
        }
    });

    info!(port, "serving /metrics and /health");
    warp::serve(metrics_route.or(health_route)).run(([127, 0, 0, 1], port)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_output_contains_registered_metric_names() {
        let metrics = Metrics::new();
        metrics.enrich_decrypt_failures.inc();
        let rendered = metrics.render();
        assert!(rendered.contains("enrich_decrypt_failures"));
    }
}
