// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the synchronization engine.
//!
//! All metrics carry the prefix `tailscale_bind_ddns_`.
//!
//! # Metrics Categories
//!
//! - **Discovery Metrics** - Roster fetches and online endpoint count
//! - **Synthesis Metrics** - Records produced, skipped and dropped
//! - **Update Metrics** - Zone updates by outcome and their duration
//! - **Pipeline Metrics** - Snapshots coalesced by the transmission stage
//!
//! # Example
//!
//! ```rust,no_run
//! use tailscale_bind_ddns::metrics::{gather_metrics, record_roster_fetch};
//!
//! record_roster_fetch(true);
//! let text = gather_metrics().unwrap();
//! assert!(text.contains("tailscale_bind_ddns_roster_fetches_total"));
//! ```

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::dns::records::RecordKind;
use crate::dns_errors::{ClassificationError, SyncError};

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "tailscale_bind_ddns";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Discovery Metrics
// ============================================================================

/// Total number of Tailscale roster fetches
///
/// Labels:
/// - `status`: Outcome (`success`, `error`)
pub static ROSTER_FETCHES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_roster_fetches_total"),
        "Total number of Tailscale roster fetches by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Number of online endpoints in the latest roster
pub static ONLINE_ENDPOINTS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_online_endpoints"),
        "Number of online endpoints in the latest roster",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Synthesis Metrics
// ============================================================================

/// Total number of records synthesized
///
/// Labels:
/// - `kind`: Record type (`A`, `AAAA`, `PTR`)
pub static RECORDS_SYNTHESIZED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_records_synthesized_total"),
        "Total number of DNS records synthesized by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of records skipped during synthesis
///
/// Labels:
/// - `reason`: Classification reason (`OutsideSubnet`, `InvalidAddress`, `UnsupportedBoundary`)
pub static RECORDS_SKIPPED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_records_skipped_total"),
        "Total number of records skipped during synthesis by reason",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of records dropped because no zone could be resolved
///
/// Labels:
/// - `kind`: Record type
pub static RECORDS_UNROUTABLE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_records_unroutable_total"),
        "Total number of records dropped while grouping by zone",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Update Metrics
// ============================================================================

/// Total number of zone updates
///
/// Labels:
/// - `zone`: Target zone
/// - `status`: `success` or the error's reason code (e.g., `UpdateRejected`)
pub static ZONE_UPDATES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_zone_updates_total"),
        "Total number of dynamic zone updates by zone and status",
    );
    let counter = CounterVec::new(opts, &["zone", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of zone updates in seconds
///
/// Labels:
/// - `zone`: Target zone
pub static ZONE_UPDATE_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_zone_update_duration_seconds"),
        "Duration of dynamic zone updates in seconds by zone",
    )
    .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = HistogramVec::new(opts, &["zone"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Pipeline Metrics
// ============================================================================

/// Total number of record sets replaced by a newer one before transmission
pub static SNAPSHOTS_COALESCED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        format!("{METRICS_NAMESPACE}_snapshots_coalesced_total"),
        "Total number of pending record sets skipped in favor of a newer one",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record the outcome of a roster fetch
pub fn record_roster_fetch(success: bool) {
    let status = if success { "success" } else { "error" };
    ROSTER_FETCHES_TOTAL.with_label_values(&[status]).inc();
}

/// Set the number of online endpoints
#[allow(clippy::cast_precision_loss)]
pub fn set_online_endpoints(count: usize) {
    ONLINE_ENDPOINTS.set(count as f64);
}

/// Record one synthesized record
pub fn record_synthesized(kind: RecordKind) {
    RECORDS_SYNTHESIZED_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc();
}

/// Record a record skipped for a classification reason
pub fn record_skipped(error: &ClassificationError) {
    let reason = SyncError::from(error.clone()).status_reason();
    RECORDS_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a record dropped while grouping
pub fn record_unroutable(kind: RecordKind) {
    RECORDS_UNROUTABLE_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc();
}

/// Record a zone update and how long it took
///
/// # Arguments
/// * `zone` - Zone the update targeted
/// * `result` - Outcome of the update
/// * `duration` - Time spent signing and exchanging the update
pub fn record_zone_update(zone: &str, result: &Result<(), SyncError>, duration: Duration) {
    let status = match result {
        Ok(()) => "success",
        Err(e) => e.status_reason(),
    };
    ZONE_UPDATES_TOTAL.with_label_values(&[zone, status]).inc();
    ZONE_UPDATE_DURATION_SECONDS
        .with_label_values(&[zone])
        .observe(duration.as_secs_f64());
}

/// Record pending record sets that were skipped for a newer one
pub fn record_coalesced(count: usize) {
    SNAPSHOTS_COALESCED_TOTAL.inc_by(u64::try_from(count).unwrap_or(u64::MAX));
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Returns
/// Prometheus-formatted metrics as a String
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Router exposing `GET /metrics`.
pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve `/metrics` on `addr` until `cancel` fires.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, cancel: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Metrics endpoint listening");

    axum::serve(listener, router())
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await?;

    debug!("Metrics endpoint stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_errors::TransportError;

    #[test]
    fn test_record_zone_update_labels_outcome() {
        let zone = "metrics-test.example.com";

        record_zone_update(zone, &Ok(()), Duration::from_millis(20));
        let rejected: Result<(), SyncError> = Err(TransportError::Rejected {
            server: "127.0.0.1:53".to_string(),
            zone: zone.to_string(),
            code: "REFUSED".to_string(),
        }
        .into());
        record_zone_update(zone, &rejected, Duration::from_millis(5));

        assert!(ZONE_UPDATES_TOTAL.with_label_values(&[zone, "success"]).get() > 0.0);
        assert!(
            ZONE_UPDATES_TOTAL
                .with_label_values(&[zone, "UpdateRejected"])
                .get()
                > 0.0
        );
        let histogram = ZONE_UPDATE_DURATION_SECONDS.with_label_values(&[zone]);
        assert!(histogram.get_sample_count() >= 2);
    }

    #[test]
    fn test_record_skipped_uses_reason_code() {
        record_skipped(&ClassificationError::OutsideSubnet {
            address: "10.0.0.1".to_string(),
            subnet: "100.64.0.0/10".to_string(),
        });

        let counter = RECORDS_SKIPPED_TOTAL.with_label_values(&["OutsideSubnet"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn test_record_coalesced() {
        let before = SNAPSHOTS_COALESCED_TOTAL.get();
        record_coalesced(3);
        assert!(SNAPSHOTS_COALESCED_TOTAL.get() >= before + 3);
    }

    #[test]
    fn test_gather_metrics() {
        record_roster_fetch(true);
        record_synthesized(RecordKind::Aaaa);

        let metrics_text = gather_metrics().unwrap();
        assert!(
            metrics_text.contains("tailscale_bind_ddns_roster_fetches_total"),
            "Metrics should contain the roster counter"
        );
        assert!(metrics_text.contains("records_synthesized_total{kind=\"AAAA\"}"));
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve("127.0.0.1:0".parse().unwrap(), cancel.clone()));

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
