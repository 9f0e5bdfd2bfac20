use std::io::Read as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct SanitizeArgs {
    /// HTML file to sanitize. Reads stdin when omitted.
    #[arg(long)]
    pub input: Option<PathBuf>,
}

pub fn run(args: &SanitizeArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let html = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };
    let clean = rentwise_llm::sanitize(&html);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({"html": clean}))?);
        }
        OutputFormat::Text => println!("{clean}"),
    }
    Ok(())
}
