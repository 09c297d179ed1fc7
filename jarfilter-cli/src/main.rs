mod app;
mod commands;
mod output;

use anyhow::Context;
use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .context("failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    // jarfilter info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("jarfilter", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Filter {
            input,
            output,
            strip,
            delete,
            stub,
            max_passes,
            preserve_timestamps,
            parallel,
        } => commands::filter::run(
            input,
            output,
            &commands::filter::FilterOptions {
                strip,
                delete,
                stub,
                max_passes: *max_passes,
                preserve_timestamps: *preserve_timestamps,
                parallel: *parallel,
            },
            &cli.global,
        ),
        Command::Metafix {
            input,
            output,
            preserve_timestamps,
        } => commands::metafix::run(input, output, *preserve_timestamps, &cli.global),
    }
}
