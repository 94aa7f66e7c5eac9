//! Evaluate a trained sequence-to-coverage model on held-out records.

use std::io::Write;

use anyhow::Context;
use clap::Parser;

use seqcov_cli::{EvaluateArgs, run_evaluate};
use seqcov_core::logging::init_logging;

fn main() -> anyhow::Result<()> {
    let args = EvaluateArgs::parse();
    let mut config = args.common.load_config()?;
    args.apply(&mut config.evaluate)?;

    let _guard = init_logging(
        args.common.verbose,
        args.common.quiet,
        Some(&config.evaluate.out_dir),
        "seqcov-evaluate.log",
        &config.logging,
    )?;

    tracing::debug!(settings = ?config.evaluate, "Evaluation settings");
    let report = run_evaluate(&args, &config.evaluate)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    report.print_to(&mut out)?;
    out.flush().context("Failed to flush stdout")?;

    tracing::info!(out_dir = %report.out_dir.display(), "Evaluation complete");
    Ok(())
}
