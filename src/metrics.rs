//! Metric names and recording helpers for the sync engine.
//!
//! Recording goes through the `metrics` facade; the binary installs a
//! Prometheus recorder when asked to, otherwise the calls are no-ops.

use crate::error::{Result, SyncError};
use std::fmt;
use std::net::SocketAddr;
use tracing::info;

/// All metric names used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    PollingPasses,
    JobsDue,
    BatchesDispatched,
    RemoteRejections,
    TransportFailures,
    RecordsMerged,
    RecordsCreated,
    MatchesAmbiguous,
    MatchesMissing,
    EndpointsUnresolved,
    IntakeLines,
    IntakeLinesSkipped,
    IntakeFilesConsumed,
    DispatchDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::PollingPasses => "ecr_polling_passes_total",
            MetricName::JobsDue => "ecr_jobs_due",
            MetricName::BatchesDispatched => "ecr_batches_dispatched_total",
            MetricName::RemoteRejections => "ecr_remote_rejections_total",
            MetricName::TransportFailures => "ecr_transport_failures_total",
            MetricName::RecordsMerged => "ecr_records_merged_total",
            MetricName::RecordsCreated => "ecr_records_created_total",
            MetricName::MatchesAmbiguous => "ecr_matches_ambiguous_total",
            MetricName::MatchesMissing => "ecr_matches_missing_total",
            MetricName::EndpointsUnresolved => "ecr_endpoints_unresolved_total",
            MetricName::IntakeLines => "ecr_intake_lines_total",
            MetricName::IntakeLinesSkipped => "ecr_intake_lines_skipped_total",
            MetricName::IntakeFilesConsumed => "ecr_intake_files_consumed_total",
            MetricName::DispatchDuration => "ecr_dispatch_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn increment(name: MetricName) {
    ::metrics::counter!(name.as_str()).increment(1);
}

pub fn gauge(name: MetricName, value: f64) {
    ::metrics::gauge!(name.as_str()).set(value);
}

pub fn record_duration(name: MetricName, secs: f64) {
    ::metrics::histogram!(name.as_str()).record(secs);
}

/// Installs the Prometheus recorder with its HTTP scrape listener.
pub fn init(listen: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .map_err(|e| SyncError::Config(format!("Failed to install Prometheus recorder: {}", e)))?;
    info!("Metrics exporter listening on {}", listen);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_prometheus_conventions() {
        for name in [
            MetricName::PollingPasses,
            MetricName::RemoteRejections,
            MetricName::IntakeLines,
        ] {
            assert!(name.as_str().starts_with("ecr_"));
            assert!(name.as_str().ends_with("_total"));
        }
        assert_eq!(MetricName::DispatchDuration.to_string(), "ecr_dispatch_duration_seconds");
    }
}
