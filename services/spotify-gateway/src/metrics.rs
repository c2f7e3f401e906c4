//! Prometheus metrics exposition
//!
//! Gateway-level metrics recorded here:
//!
//! - `gateway_requests_total` (counter): labels `route`, `status`
//! - `gateway_request_duration_seconds` (histogram): label `route`
//! - `gateway_upstream_duration_seconds` (histogram): labels `resource`, `outcome`
//! - `gateway_upstream_errors_total` (counter): labels `resource`, `error_type`
//!
//! Token exchange and refresh counters are emitted by `spotify-auth` and
//! `token-manager` through the same global recorder.

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries from 5ms to 60s, covering the configurable timeout range.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> anyhow::Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .and_then(|b| {
            b.set_buckets_for_metric(
                Matcher::Full("gateway_upstream_duration_seconds".to_string()),
                DURATION_BUCKETS,
            )
        })
        .context("failed to set histogram buckets")
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a completed HTTP request against its matched route.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(duration_secs);
}

/// Record the latency of a Web API call.
pub fn record_upstream(resource: &'static str, outcome: &'static str, duration_secs: f64) {
    metrics::histogram!(
        "gateway_upstream_duration_seconds",
        "resource" => resource,
        "outcome" => outcome
    )
    .record(duration_secs);
}

/// Record a Web API call that never produced a response.
pub fn record_upstream_error(resource: &'static str, error_type: &'static str) {
    metrics::counter!(
        "gateway_upstream_errors_total",
        "resource" => resource,
        "error_type" => error_type
    )
    .increment(1);
}

#[cfg(test)]
pub(crate) fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    let recorder = builder().unwrap().build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("/health", 200, 0.001);
        record_upstream("top_artists", "success", 0.2);
        record_upstream_error("top_tracks", "timeout");
    }

    #[test]
    fn record_request_writes_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("/spotify/top-artists", 200, 0.042);
        record_request("/spotify/refresh-token", 400, 0.3);

        let output = handle.render();
        assert!(output.contains("gateway_requests_total"));
        assert!(output.contains("route=\"/spotify/top-artists\""));
        assert!(output.contains("status=\"400\""));
        assert!(
            output.contains("gateway_request_duration_seconds_bucket"),
            "request histogram must render _bucket lines"
        );
    }

    #[test]
    fn upstream_metrics_carry_resource_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_upstream("top_tracks", "rejected", 0.01);
        record_upstream_error("top_artists", "timeout");

        let output = handle.render();
        assert!(output.contains("gateway_upstream_duration_seconds_bucket"));
        assert!(output.contains("resource=\"top_tracks\""));
        assert!(output.contains("outcome=\"rejected\""));
        assert!(output.contains("gateway_upstream_errors_total"));
        assert!(output.contains("error_type=\"timeout\""));
    }

    #[test]
    fn histogram_buckets_span_timeout_range() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_upstream("top_artists", "success", 0.003);

        let output = handle.render();
        assert!(output.contains("le=\"0.005\""));
        assert!(output.contains("le=\"60\""));
        assert!(output.contains("le=\"+Inf\""));
    }
}
