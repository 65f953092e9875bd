mod cli;
mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use grabber_logging::{grab_debug, grab_warn, LogDestination};
use log::LevelFilter;

use crate::cli::Cli;
use crate::config::{AppConfig, LOG_FILENAME};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let (config, warning) = AppConfig::load(&cli.config);
    init_logging(&cli, &config);
    if let Some(warning) = warning {
        grab_warn!("{}", warning);
    }
    grab_debug!("Using config {:?}", config);

    commands::run(cli, config).await
}

fn init_logging(cli: &Cli, config: &AppConfig) {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let destination = if config.log_to_file {
        LogDestination::Both
    } else {
        LogDestination::Terminal
    };
    grabber_logging::initialize(destination, level, &PathBuf::from(LOG_FILENAME));
}
