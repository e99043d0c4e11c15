// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// clap and hands off to Layer 2.
//
//   1. `train`   — trains a model on a pair file
//   2. `predict` — loads a checkpoint and decodes sources
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "seq2seq-rnn",
    version,
    about = "Train a stacked-LSTM encoder-decoder on token id pairs, then decode with it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on pairs in: {}", args.data.display());
    let summary = TrainUseCase::new(args.into()).execute()?;

    println!(
        "Training complete after {} steps. Final train loss {:.4}, lr {:.6}.",
        summary.global_steps, summary.final_train_loss, summary.final_learning_rate
    );
    if let Some(best) = summary.best_val_loss {
        println!("Best validation loss {:.4}.", best);
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::{read_sources, PredictUseCase};

    let sources = read_sources(&args.input)?;
    let use_case = PredictUseCase::new(args.checkpoint_dir, args.backend.into());
    for ids in use_case.execute(&sources)? {
        let line: Vec<String> = ids.iter().map(u32::to_string).collect();
        println!("{}", line.join(" "));
    }
    Ok(())
}
