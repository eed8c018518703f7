use std::sync::Arc;

use anyhow::Result;
use clap::{ColorChoice, Parser};

use quern::cli::{Cli, Commands, compile, edit, share};
use quern::config::PlayConfig;
use quern::{core, logger};

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = Arc::new(PlayConfig::load(&cli)?);

    match &cli.command {
        Commands::Edit {
            file,
            backend,
            share,
        } => edit::run(config, file, *backend, share.clone()),
        Commands::Compile { file } => compile::run(&config, file),
        Commands::Share { file } => share::run(&config, file),
    }
}
