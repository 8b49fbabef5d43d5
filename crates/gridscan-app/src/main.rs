// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Gridscan: answer-cell extraction for scanned forms.
//
// Entry point. Initialises logging, loads configuration and templates, and
// runs the batch over every page named on the command line.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use gridscan_core::config::{Granularity, ScanConfig};
use gridscan_core::error::Result;
use gridscan_document::{CancelToken, TemplateLibrary};
use tracing_subscriber::EnvFilter;

use services::batch::{BatchOptions, BatchRunner};

/// Extract answer cells from scanned form pages.
#[derive(Parser, Debug)]
#[command(name = "gridscan")]
#[command(version, about, long_about = None)]
struct Args {
    /// Page images, named `.../w<NNN>-scans/<page>.png`
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Directory holding one `<name>.png` per label and size template
    #[arg(short, long, default_value = "templates")]
    templates: PathBuf,

    /// Directory for cell images, sidecars, and manifests
    #[arg(short, long, default_value = "cells")]
    output: PathBuf,

    /// JSON configuration file (missing fields take defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Classify once per row or once per cell
    #[arg(long)]
    granularity: Option<Granularity>,

    /// Write an outline preview per page into this directory
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Write the detected grid per page as JSON into this directory
    #[arg(long)]
    dump_quads: Option<PathBuf>,

    /// Run detection passes on all cores
    #[arg(long)]
    parallel: bool,

    /// Stop at the first page that fails
    #[arg(long)]
    fail_fast: bool,

    /// Save the effective configuration to this file and continue
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    tracing::info!(images = args.images.len(), "Gridscan starting");

    let config = match effective_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("gridscan: {e}");
            return ExitCode::from(2);
        }
    };

    let library = match TemplateLibrary::load(&args.templates) {
        Ok(library) => library,
        Err(e) => {
            eprintln!("gridscan: {e}");
            return ExitCode::from(2);
        }
    };

    let options = BatchOptions {
        output_dir: args.output.clone(),
        overlay_dir: args.overlay.clone(),
        dump_dir: args.dump_quads.clone(),
        fail_fast: args.fail_fast,
    };
    let runner = match BatchRunner::new(&config, &library, options) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("gridscan: {e}");
            return ExitCode::from(2);
        }
    };

    let report = runner.run(&args.images, &CancelToken::new());
    for done in &report.processed {
        println!(
            "{}: {} cells ({} unclassified)",
            done.path.display(),
            done.cells,
            done.unclassified
        );
    }
    for (path, err) in &report.failed {
        eprintln!("gridscan: {}: {err}", path.display());
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Defaults, then the `--config` file, then command-line overrides.
fn effective_config(args: &Args) -> Result<ScanConfig> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    apply_overrides(&mut config, args);
    config.validate()?;

    if let Some(path) = &args.write_config {
        config.save(path)?;
        tracing::info!(path = %path.display(), "Configuration saved");
    }
    Ok(config)
}

fn apply_overrides(config: &mut ScanConfig, args: &Args) {
    if let Some(granularity) = args.granularity {
        config.classifier.granularity = granularity;
    }
    if args.parallel {
        config.detector.parallel_passes = true;
    }
}
