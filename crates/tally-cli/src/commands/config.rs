use tally_core::EngineConfig;

use crate::commands::common::{load_config, CliContext};
use crate::error::CliError;

#[derive(Debug, Default)]
pub struct ConfigInitArgs {
    pub api_base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub stuck_after: Option<u32>,
    pub start_offline: Option<bool>,
}

pub fn run_config_show(context: &CliContext) -> Result<(), CliError> {
    let config = load_config(context)?;
    println!("# {}", context.config_path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Merge the given values into the config file, leaving other fields as they were.
pub fn run_config_init(args: ConfigInitArgs, context: &CliContext) -> Result<EngineConfig, CliError> {
    let mut config = EngineConfig::load_from_path(&context.config_path)?;
    if let Some(url) = args.api_base_url {
        config.api_base_url = Some(url);
    }
    if let Some(timeout) = args.timeout_secs {
        config.request_timeout_secs = timeout;
    }
    if let Some(stuck_after) = args.stuck_after {
        config.stuck_after_attempts = stuck_after;
    }
    if let Some(start_offline) = args.start_offline {
        config.start_offline = start_offline;
    }

    config
        .save_to_path(&context.config_path)
        .map_err(|error| CliError::Config(error.to_string()))?;
    println!("{}", context.config_path.display());
    Ok(EngineConfig::load_from_path(&context.config_path)?)
}
