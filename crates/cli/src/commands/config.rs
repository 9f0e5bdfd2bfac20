use crate::OutputFormat;
use crate::config::RentwiseConfig;

/// Print the effective configuration. The API key is never printed.
pub fn run(config: &RentwiseConfig, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => {
            print!("{}", toml::to_string(config)?);
            let key_state = if config.endpoint.api_key.is_some() {
                "set"
            } else {
                "not set"
            };
            println!("# api key: {key_state}");
        }
    }
    Ok(())
}
