use std::process::ExitCode;

use clap::Parser;
use podpush::cli::{Cli, execute_command, init_logger_from_settings, load_and_merge_config};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings = load_and_merge_config(&cli)?;
    init_logger_from_settings(&settings)?;

    tracing::debug!(
        version = podpush::pkg_version(),
        app = %settings.application.name,
        "Starting podpush"
    );

    let succeeded = execute_command(&cli, settings).await?;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
