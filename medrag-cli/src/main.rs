//! `medrag`: acquire PubMed articles, answer grounded questions, run
//! labeled and per-question evaluations.

mod args;
mod commands;
mod runtime;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::args::{Cli, Commands};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let global = &cli.global;
    match cli.command {
        Commands::Acquire {
            question,
            questions_file,
            output,
            per_question_output,
            max_results,
            no_rewrite,
        } => {
            commands::acquire(
                global,
                question,
                questions_file.as_deref(),
                &output,
                &per_question_output,
                max_results,
                !no_rewrite,
            )
            .await
        }
        Commands::Ask { articles, format, evaluate, question } => {
            commands::ask(global, &articles, format, evaluate, question).await
        }
        Commands::Eval { dataset, articles, limit, log } => {
            commands::eval(global, &dataset, articles.as_deref(), limit, &log).await
        }
        Commands::Score { articles, format } => commands::score(global, &articles, format).await,
        Commands::Chat { question, format, max_results } => {
            commands::chat(global, question, format, max_results).await
        }
    }
}
