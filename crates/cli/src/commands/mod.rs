pub mod analyze;
pub mod config;
pub mod local;
pub mod sanitize;

use std::path::Path;

use anyhow::Context;
use rentwise_core::AnalysisPayload;

/// Read a `{transactions, reservations}` JSON document from `path`.
pub(crate) fn read_payload(path: &Path) -> anyhow::Result<AnalysisPayload> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read payload {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("payload {} is not valid JSON", path.display()))?;
    Ok(AnalysisPayload::from_value(value)?)
}
