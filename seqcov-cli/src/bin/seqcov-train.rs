//! Train a sequence-to-coverage model across one or more genomes.

use clap::Parser;

use seqcov_cli::{TrainArgs, run_train};
use seqcov_core::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = TrainArgs::parse();
    let mut config = args.common.load_config()?;
    args.apply(&mut config.train)?;

    let _guard = init_logging(
        args.common.verbose,
        args.common.quiet,
        Some(&config.train.logdir),
        "seqcov-train.log",
        &config.logging,
    )?;

    let outcome = run_train(&args, &config.train).await?;
    tracing::info!(
        epochs = outcome.epochs,
        steps = outcome.steps,
        best_epoch = ?outcome.best_epoch,
        best_loss = ?outcome.best_loss,
        reason = ?outcome.stop_reason,
        "Training finished"
    );
    Ok(())
}
