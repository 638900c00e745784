use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use live_validator::{
    LiveValidator,
    config::LiveValidatorConfig,
    observability::init_tracing,
    validation::{RequestResponseLiveValidationResult, ValidateOptions},
};
use serde::Serialize;
use serde_json::Value;

/// CLI arguments for the live validator
#[derive(Parser, Debug)]
#[command(version, about = "Validates live HTTP traffic against Swagger contracts", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "live-validator.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Validate recorded request/response pairs
    Validate {
        /// JSON files, each holding one `{liveRequest, liveResponse}` pair
        #[arg(required = true)]
        traffic: Vec<PathBuf>,
    },
    /// Parse and validate the configuration file, then exit
    CheckConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrafficReport<'a> {
    file: String,
    #[serde(flatten)]
    result: &'a RequestResponseLiveValidationResult,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match LiveValidatorConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        Command::CheckConfig => {
            println!("Configuration OK: {}", args.config.display());
            ExitCode::SUCCESS
        }
        Command::Validate { traffic } => {
            if let Err(e) = init_tracing(&config.observability) {
                eprintln!("{e}");
            }
            run_validate(config, traffic).await
        }
    }
}

async fn run_validate(mut config: LiveValidatorConfig, traffic: Vec<PathBuf>) -> ExitCode {
    // A one-shot run compiles on demand instead of in the background.
    config.validator.load_validator_in_background = false;
    let validator = LiveValidator::new(config.validator);
    match validator.initialize().await {
        Ok(summary) => tracing::info!(
            specs = summary.specs_loaded,
            failed = summary.specs_failed,
            operations = summary.operations,
            "Contracts loaded"
        ),
        Err(e) => {
            eprintln!("Failed to discover contracts: {e}");
            return ExitCode::FAILURE;
        }
    }

    let options = ValidateOptions::default();
    let mut all_valid = true;
    for path in traffic {
        let input = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str::<Value>(&contents).unwrap_or_else(|e| {
                tracing::warn!(file = %path.display(), error = %e, "Traffic file is not valid JSON");
                Value::Null
            }),
            Err(e) => {
                eprintln!("Failed to read {}: {e}", path.display());
                all_valid = false;
                continue;
            }
        };

        let result = validator.validate_live_request_response_json(&input, &options).await;
        all_valid &= result.runtime_exception.is_none()
            && result.request_validation_result.is_successful == Some(true)
            && result.response_validation_result.is_successful == Some(true);

        let report = TrafficReport {
            file: path.display().to_string(),
            result: &result,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to render result for {}: {e}", path.display()),
        }
    }

    if all_valid { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
