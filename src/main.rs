use clap::Parser;
use std::process::ExitCode;

use page_scout::{SessionStatus, explore};

mod args;
use args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(::log::LevelFilter::Debug);
    }
    builder.init();

    let output = args.output.clone();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            ::log::error!("invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let want_report = config.generate_report;

    ::log::info!("starting exploration of {}", config.start_url);

    let report = match explore(config).await {
        Ok(report) => report,
        Err(e) => {
            ::log::error!("session failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if want_report {
        match output {
            Some(path) => {
                let json = match report.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        ::log::error!("failed to serialize report: {}", e);
                        return ExitCode::FAILURE;
                    }
                };
                if let Err(e) = std::fs::write(&path, json) {
                    ::log::error!("failed to write report to {}: {}", path, e);
                    return ExitCode::FAILURE;
                }
                ::log::info!("report written to {}", path);
            }
            None => print!("{}", report.to_text()),
        }
    }

    match report.status {
        SessionStatus::Completed | SessionStatus::TimedOut => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
