use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use rentwise_core::{AnalysisKind, AnalysisOutcome};
use rentwise_gateway::{AnalysisProgress, OrchestratorBuilder, RequestOptions};
use rentwise_llm::HttpAnalysisEndpoint;
use tracing::debug;

use crate::OutputFormat;
use crate::config::RentwiseConfig;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// JSON file with `transactions` and `reservations`.
    #[arg(long)]
    pub payload: PathBuf,
    /// Analysis kind (defaults to what the payload holds).
    #[arg(long)]
    pub kind: Option<AnalysisKind>,
}

pub async fn run(
    config: &RentwiseConfig,
    args: &AnalyzeArgs,
    format: &OutputFormat,
) -> anyhow::Result<ExitCode> {
    let payload = super::read_payload(&args.payload)?;
    let endpoint = HttpAnalysisEndpoint::new(config.endpoint_config())?;
    let orchestrator = Arc::new(
        OrchestratorBuilder::new()
            .endpoint(Arc::new(endpoint))
            .config(config.orchestrator_config())
            .circuit_breakers(Arc::new(config.breaker_registry()))
            .degraded_mode_config(config.degraded_mode_config())
            .build()?,
    );

    let mut options = RequestOptions::new().with_progress(report_progress);
    if let Some(kind) = args.kind {
        options = options.with_kind(kind);
    }

    let canceller = Arc::clone(&orchestrator);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            canceller.cancel_in_flight();
        }
    });
    let outcome = orchestrator.request_analysis_with(&payload, &options).await;
    ctrl_c.abort();

    print_outcome(&outcome, format)?;
    Ok(ExitCode::from(exit_status(&outcome)))
}

/// Process status for an outcome: 0 whenever a narrative was produced.
fn exit_status(outcome: &AnalysisOutcome) -> u8 {
    u8::from(!outcome.succeeded)
}

fn report_progress(event: &AnalysisProgress) {
    match event {
        AnalysisProgress::Attempting {
            attempt,
            max_attempts,
        } => eprintln!("Requesting analysis (attempt {attempt}/{max_attempts})..."),
        AnalysisProgress::RetryScheduled { delay, reason, .. } => {
            eprintln!("Attempt failed: {reason}. Retrying in {:.1}s.", delay.as_secs_f64());
        }
        AnalysisProgress::LocalFallback { .. } => {
            eprintln!("Analysis service unavailable, using the local summary.");
        }
    }
}

fn print_outcome(outcome: &AnalysisOutcome, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text => {
            if let Some(message) = &outcome.user_message {
                eprintln!("{message}");
            }
            if let Some(kind) = outcome.error_kind {
                eprintln!("error: {kind}");
            }
            if let Some(narrative) = &outcome.narrative {
                println!("{narrative}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentwise_core::ErrorKind;

    #[test]
    fn failed_outcomes_exit_nonzero() {
        assert_eq!(exit_status(&AnalysisOutcome::remote("<p>ok</p>")), 0);
        assert_eq!(
            exit_status(&AnalysisOutcome::local_fallback("local", "degraded")),
            0
        );
        assert_eq!(
            exit_status(&AnalysisOutcome::failure(ErrorKind::Timeout, "timed out")),
            1
        );
    }
}
