// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! chartcache CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // -v wins over --log-level; RUST_LOG still applies when neither is given
    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Commands::Version => {
            println!("{} {}", "chartcache".bold().green(), chartcache::VERSION);
            println!("Clinical resource cache with progressive loading");
            Ok(())
        }

        Commands::Load {
            data,
            patient,
            config,
            format,
        } => cli::handle_load(data, patient, config, format),

        Commands::Stats {
            data,
            patient,
            config,
            format,
        } => cli::handle_stats(data, patient, config, format),
    }
}
