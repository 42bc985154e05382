mod cli;

use std::process::ExitCode;

use clap::Parser;
use core_logging::{LogFormat, LoggingConfig, init_logging};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let format = if args.log_json { LogFormat::Json } else { LogFormat::Text };
    let logging = LoggingConfig::default()
        .with_level(args.log_level.clone())
        .with_format(format);
    if let Err(e) = init_logging(&logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match cli::execute(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
