//! Prometheus metrics for the session orchestrator
//!
//! All metrics live in the default registry and are served as text on
//! `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Chat & Loop Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// User turns accepted by `POST /chat`.
    pub static ref CHAT_SUBMISSIONS: Counter = register_counter!(
        "sessionvisor_chat_submissions_total",
        "User messages appended to the conversation"
    ).expect("failed to register CHAT_SUBMISSIONS metric");

    /// Completed sampling loop passes.
    ///
    /// Labels:
    /// - outcome: "success", "failure" or "panic"
    pub static ref LOOP_RUNS: CounterVec = register_counter_vec!(
        "sessionvisor_loop_runs_total",
        "Sampling loop passes by outcome",
        &["outcome"]
    ).expect("failed to register LOOP_RUNS metric");

    pub static ref LOOP_DURATION: Histogram = register_histogram!(
        "sessionvisor_loop_duration_seconds",
        "Wall time of one sampling loop pass",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).expect("failed to register LOOP_DURATION metric");

    /// 1 while a sampling loop is in flight.
    pub static ref SESSION_BUSY: Gauge = register_gauge!(
        "sessionvisor_session_busy",
        "Whether the sampling loop is currently running"
    ).expect("failed to register SESSION_BUSY metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Callback Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Labels:
    /// - status: "ok" or "error"
    pub static ref API_EXCHANGES: CounterVec = register_counter_vec!(
        "sessionvisor_api_exchanges_total",
        "API calls reported by the sampling loop",
        &["status"]
    ).expect("failed to register API_EXCHANGES metric");

    pub static ref TOOL_OUTPUTS: Counter = register_counter!(
        "sessionvisor_tool_outputs_total",
        "Tool results written to the tool ledger"
    ).expect("failed to register TOOL_OUTPUTS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Labels:
    /// - outcome: "ok", "conflict" or "failed"
    pub static ref RESETS: CounterVec = register_counter_vec!(
        "sessionvisor_resets_total",
        "Reset requests by outcome",
        &["outcome"]
    ).expect("failed to register RESETS metric");
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
