/// MEL admin utility
///
/// Parses the verb, resolves configuration from the environment and runs the
/// command against the configured database.

use mel_admin::{Cli, Config};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::parse_or_usage(std::env::args_os(), &mut std::io::stdout()) {
        Ok(cli) => cli,
        Err(code) => return ExitCode::from(code),
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(config.log_level.parse().unwrap_or(tracing::Level::WARN))
        .init();

    match mel_admin::run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
