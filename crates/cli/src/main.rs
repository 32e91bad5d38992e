//! Student Early Warning CLI
//!
//! Scores and explains gradebook/LMS exports offline against a local
//! model directory.

mod commands;
mod config;
mod input;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{explain, model, score};
use std::path::PathBuf;

/// Student Early Warning CLI
#[derive(Parser)]
#[command(name = "ews")]
#[command(author, version, about = "CLI for the Student Early Warning risk scorer", long_about = None)]
pub struct Cli {
    /// Model directory (can also be set via EWS_MODEL_DIR env var)
    #[arg(long, env = "EWS_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Output format (defaults to the config file setting, then table)
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score every record in a JSON-lines export
    Score {
        /// Input file with one JSON record per line, or - for stdin
        input: PathBuf,

        /// Only show results at or above this risk category
        #[arg(long)]
        min_category: Option<score::CategoryFilter>,

        /// Grade band whose model serves records without their own band
        #[arg(long)]
        band: Option<String>,
    },

    /// Explain predictions and suggest interventions
    Explain {
        /// Input file with one JSON record per line, or - for stdin
        input: PathBuf,

        /// Only explain this student
        #[arg(long, short)]
        student: Option<String>,

        /// Risk and protective factors shown per student
        #[arg(long, default_value_t = 5)]
        top_n: usize,

        /// Grade band whose model serves records without their own band
        #[arg(long)]
        band: Option<String>,
    },

    /// Show the models in the model directory
    Model,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = config::Config::load()?;
    let model_dir = settings.resolve_model_dir(cli.model_dir.clone());
    let format = cli.format.unwrap_or_else(|| settings.output_format());

    let ctx = commands::Context {
        model_dir,
        format,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Score {
            input,
            min_category,
            band,
        } => score::score(&ctx, &input, min_category, band.as_deref())?,
        Commands::Explain {
            input,
            student,
            top_n,
            band,
        } => explain::explain(&ctx, &input, student.as_deref(), top_n, band.as_deref())?,
        Commands::Model => model::show_models(&ctx)?,
    }

    Ok(())
}
