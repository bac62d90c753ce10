//! Command executor for dispatching CLI commands
//!
//! This module provides the main entry point for executing CLI commands
//! after parsing and configuration loading.

use super::handlers::{CheckCommandHandler, KeysCommandHandler, SendCommandHandler};
use super::parser::{Cli, Commands};
use crate::config::settings::Settings;
use crate::error::{PushError, PushResult};
use crate::services::push::SendResult;

/// Execute a CLI command with the given settings
///
/// Prints the command's output to stdout; delivery results are printed as
/// JSON.
///
/// # Returns
/// `true` when the command succeeded, `false` when a delivery result
/// reported failure
///
/// # Errors
/// Returns configuration errors and failures to set up the provider
pub async fn execute_command(cli: &Cli, settings: Settings) -> PushResult<bool> {
    match &cli.command {
        Commands::Keys => {
            println!("{}", KeysCommandHandler.execute()?);
            Ok(true)
        }
        Commands::Check => {
            for line in CheckCommandHandler::new(settings).execute().await? {
                println!("{}", line);
            }
            Ok(true)
        }
        Commands::Send { tokens, message } => {
            let result = SendCommandHandler::new(settings)
                .send_to_devices(tokens, &message.to_message())
                .await?;
            print_result(&result)
        }
        Commands::Topic { name, message } => {
            let result = SendCommandHandler::new(settings)
                .send_to_topic(name, &message.to_message())
                .await?;
            print_result(&result)
        }
        Commands::Subscribe { topic, tokens } => {
            let result = SendCommandHandler::new(settings)
                .subscribe(tokens, topic)
                .await?;
            print_result(&result)
        }
        Commands::Unsubscribe { topic, tokens } => {
            let result = SendCommandHandler::new(settings)
                .unsubscribe(tokens, topic)
                .await?;
            print_result(&result)
        }
    }
}

fn print_result(result: &SendResult) -> PushResult<bool> {
    let json = serde_json::to_string_pretty(result).map_err(|e| PushError::Internal {
        source: e.into(),
    })?;
    println!("{}", json);
    Ok(result.success)
}
