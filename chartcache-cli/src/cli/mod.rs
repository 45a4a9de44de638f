// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for chartcache
//!
//! Drives a chart session over an in-memory API loaded from FHIR JSON files,
//! showing the staged load of one patient and the resulting cache behavior.

pub mod commands;
pub mod output;

pub use commands::{Cli, Commands, OutputFormat};

use chartcache::{CacheConfig, ChartSession, InMemoryApi, LoadTier};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use output::ReportFormatter;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn build_runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

fn load_config(path: Option<&Path>) -> Result<CacheConfig, chartcache::cache::ConfigError> {
    match path {
        Some(path) => CacheConfig::from_json_file(path),
        None => Ok(CacheConfig::default()),
    }
}

fn open_session(
    data: &Path,
    config: Option<&Path>,
) -> Result<(Arc<InMemoryApi>, Arc<ChartSession>), Box<dyn std::error::Error>> {
    let config = load_config(config)?;
    let api = Arc::new(InMemoryApi::from_dir(data)?);
    let session = ChartSession::new(api.clone(), config)?;
    Ok((api, session))
}

/// Load one patient tier by tier and print each tier as it arrives
pub fn handle_load(
    data: PathBuf,
    patient: String,
    config: Option<PathBuf>,
    format: OutputFormat,
) -> CliResult {
    let runtime = build_runtime()?;
    runtime.block_on(async {
        let (_api, session) = open_session(&data, config.as_deref())?;
        session.start();

        let context = session.set_current_patient(&patient).await;
        print!("{}", ReportFormatter::format_context(&context, format));

        for tier in [LoadTier::Critical, LoadTier::Important, LoadTier::Optional] {
            let bundle = session.fetch_patient_bundle(&patient, false, tier).await;
            println!("{}", ReportFormatter::format_bundle(tier, &bundle, format));
        }

        session.shutdown();
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Load a patient, replay the load, then report how much the cache absorbed
pub fn handle_stats(
    data: PathBuf,
    patient: String,
    config: Option<PathBuf>,
    format: OutputFormat,
) -> CliResult {
    let runtime = build_runtime()?;
    runtime.block_on(async {
        let (api, session) = open_session(&data, config.as_deref())?;
        session.start();

        session.set_current_patient(&patient).await;
        for _ in 0..2 {
            session
                .fetch_patient_bundle(&patient, false, LoadTier::Full)
                .await;
        }

        println!(
            "{}",
            ReportFormatter::format_stats(
                &session.cache_stats(),
                &session.fetch_states(),
                api.call_count(),
                format,
            )
        );

        session.shutdown();
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
