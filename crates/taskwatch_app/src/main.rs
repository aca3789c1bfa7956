mod app;
mod cli;
mod persistence;
mod render;
mod sink;

use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use taskwatch_logging::track_error;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    taskwatch_logging::initialize(cli.log_destination(), level);

    match app::run(cli).await {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            track_error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
