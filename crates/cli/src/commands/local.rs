use std::path::PathBuf;

use clap::Args;
use rentwise_core::{AnalysisKind, KpiNarrator, LocalMetrics, MetricsContext};
use rentwise_llm::sanitize;

use crate::OutputFormat;
use crate::config::RentwiseConfig;

#[derive(Args, Debug)]
pub struct LocalArgs {
    /// JSON file with `transactions` and `reservations`.
    #[arg(long)]
    pub payload: PathBuf,
    /// Sections to render (defaults to what the payload holds).
    #[arg(long)]
    pub kind: Option<AnalysisKind>,
}

pub fn run(config: &RentwiseConfig, args: &LocalArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let payload = super::read_payload(&args.payload)?;
    let kind = args
        .kind
        .or_else(|| AnalysisKind::for_payload(&payload))
        .unwrap_or(AnalysisKind::Combined);
    let ctx = MetricsContext::new(kind).with_currency(config.metrics.currency.as_str());
    let narrative = sanitize(&KpiNarrator.narrate(&payload.transactions, &payload.reservations, &ctx));

    match format {
        OutputFormat::Json => {
            let body = serde_json::json!({"kind": kind, "narrative": narrative});
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => println!("{narrative}"),
    }
    Ok(())
}
