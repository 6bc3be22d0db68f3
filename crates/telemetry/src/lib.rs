//! Telemetry - logging setup and engine metrics
//!
//! Metrics go through the `metrics` facade; without an installed recorder
//! every call below is a no-op, so the engine records unconditionally.

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use harrow_common::{JobState, Stage};

pub const ADMISSIONS_TOTAL: &str = "harrow_admissions_total";
pub const SCANS_FINISHED_TOTAL: &str = "harrow_scans_finished_total";
pub const STAGE_DURATION_SECONDS: &str = "harrow_stage_duration_seconds";
pub const FINDINGS_TOTAL: &str = "harrow_findings_total";
pub const COLLECTION_TOOL_FAILURES_TOTAL: &str = "harrow_collection_tool_failures_total";

/// Map `-v` occurrences to a default filter; `RUST_LOG` always wins.
#[must_use]
pub fn default_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global fmt subscriber. Safe to call more than once; only the
/// first call takes effect.
pub fn init_logging(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));

    let installed = if json {
        fmt().with_env_filter(filter).json().try_init()
    } else {
        fmt().with_env_filter(filter).compact().try_init()
    };
    if installed.is_err() {
        tracing::debug!("subscriber already installed");
    }
}

/// Serve Prometheus metrics on `addr`. Must run inside a tokio runtime.
pub fn install_prometheus(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to start metrics exporter on {addr}"))?;
    info!(%addr, "prometheus exporter listening");
    Ok(())
}

/// `outcome` is `admitted` or the rejection kind.
pub fn record_admission(outcome: &'static str) {
    counter!(ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_scan_finished(state: JobState) {
    counter!(SCANS_FINISHED_TOTAL, "state" => state.as_str()).increment(1);
}

pub fn record_stage_duration(stage: Stage, elapsed: Duration) {
    histogram!(STAGE_DURATION_SECONDS, "stage" => stage.name()).record(elapsed.as_secs_f64());
}

pub fn record_findings(count: usize) {
    counter!(FINDINGS_TOTAL).increment(count as u64);
}

pub fn record_collection_tool_failure(tool: &str) {
    counter!(COLLECTION_TOOL_FAILURES_TOTAL, "tool" => tool.to_string()).increment(1);
}
