//! Launching the external load generator and shaping what it reports.

pub mod orchestrator;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LocustgenError;

pub use orchestrator::RunOrchestrator;

/// Outcome of one run. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success: bool,
    /// The generator's JSON output as it was printed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl RunResult {
    pub fn completed(statistics: Value) -> Self {
        let summary = RunSummary::from_statistics(&statistics);
        Self {
            success: true,
            statistics: Some(statistics),
            error: None,
            raw_output: None,
            summary,
        }
    }

    pub fn failed(error: LocustgenError) -> Self {
        let (message, raw_output) = match error {
            LocustgenError::ExternalProcess {
                message,
                raw_output,
            } => (message, raw_output),
            other => (other.to_string(), None),
        };
        Self {
            success: false,
            statistics: None,
            error: Some(message),
            raw_output,
            summary: None,
        }
    }
}

/// Totals across every per-endpoint stats entry of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_requests: u64,
    pub total_failures: u64,
    /// `total_failures / total_requests`, 0 when nothing was sent.
    pub failure_ratio: f64,
    /// Milliseconds, weighted by each entry's request count.
    pub mean_response_time_ms: f64,
}

impl RunSummary {
    /// Summarize Locust's `--json` output: an array of stats objects with
    /// `num_requests`, `num_failures` and `total_response_time`. Anything
    /// else yields `None`.
    pub fn from_statistics(statistics: &Value) -> Option<Self> {
        let entries = statistics.as_array()?;
        let mut total_requests = 0u64;
        let mut total_failures = 0u64;
        let mut total_response_time = 0f64;
        let mut seen = false;

        for entry in entries {
            if entry.get("name").and_then(Value::as_str) == Some("Aggregated") {
                continue;
            }
            let Some(requests) = entry.get("num_requests").and_then(Value::as_u64) else {
                continue;
            };
            seen = true;
            total_requests += requests;
            total_failures += entry
                .get("num_failures")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            total_response_time += match entry.get("total_response_time").and_then(Value::as_f64) {
                Some(total) => total,
                None => {
                    entry
                        .get("avg_response_time")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0)
                        * requests as f64
                }
            };
        }

        if !seen {
            return None;
        }

        let (failure_ratio, mean_response_time_ms) = if total_requests == 0 {
            (0.0, 0.0)
        } else {
            (
                total_failures as f64 / total_requests as f64,
                total_response_time / total_requests as f64,
            )
        };

        Some(Self {
            total_requests,
            total_failures,
            failure_ratio,
            mean_response_time_ms,
        })
    }
}

/// Reply to a `stop` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopOutcome {
    pub success: bool,
    pub message: String,
}
