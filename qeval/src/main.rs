use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::error::Error as _;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::{error, info, Level};

mod aws;
mod broker;
mod chat;
mod commands;
mod common;
mod error;
mod evaluation;
mod metrics;
mod pipeline;
mod retry;
mod secrets;
mod shaper;
#[cfg(test)]
mod testing;

use commands::{AskCommand, EvaluateCommand};
use common::{EvaluationConfig, TestSet};
use error::{PipelineError, PipelineResult};
use evaluation::{EvaluationRunner, HttpScoringFramework};
use pipeline::{EvaluationOutcome, Pipeline, ScoringStage};

#[derive(Parser)]
#[command(
    name = "qeval",
    about = "Evaluate an Amazon Q Business application against a ground-truth test set",
    version = env!("CARGO_PKG_VERSION"),
    author = "ktruck"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer and score a test set, emitting the scores as metrics
    Evaluate(EvaluateCommand),
    /// Run the identity chain and ask questions, without scoring
    Ask(AskCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let result = match cli.command {
        Commands::Evaluate(cmd) => evaluate(cmd).await.map(serde_json::to_value),
        Commands::Ask(cmd) => ask(cmd).await.map(serde_json::to_value),
    };

    match result {
        Ok(output) => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", output?)?;
            stdout.flush()?;
            Ok(())
        }
        Err(e) => {
            error!(stage = e.stage(), "Evaluation failed: {}", e);
            let mut cause = e.source();
            while let Some(inner) = cause {
                error!(stage = e.stage(), "Caused by: {}", inner);
                cause = inner.source();
            }
            std::process::exit(e.exit_code());
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        cli.log_level
            .parse::<Level>()
            .map_err(|_| anyhow!("invalid log level {:?}", cli.log_level))?
    };

    // stdout carries results and metrics, logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn read_event(path: &str) -> PipelineResult<Value> {
    let raw = if path == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).map_err(|e| {
            PipelineError::configuration(format!("failed to read event from stdin: {}", e))
        })?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(|e| {
            PipelineError::configuration(format!("failed to read event file {}: {}", path, e))
        })?
    };

    serde_json::from_str(&raw)
        .map_err(|e| PipelineError::configuration(format!("event is not valid JSON: {}", e)))
}

fn read_testset(path: &str) -> PipelineResult<TestSet> {
    TestSet::from_event(&read_event(path)?)
}

async fn evaluate(cmd: EvaluateCommand) -> PipelineResult<EvaluationOutcome> {
    let testset = read_testset(&cmd.event)?;
    let config = EvaluationConfig::try_from(&cmd.deployment)?;
    let scoring_config = cmd.scoring.scoring_config(&config.region);

    let framework = HttpScoringFramework::new(&scoring_config.endpoint).map_err(|e| {
        PipelineError::configuration(format!("invalid scoring endpoint: {}", e))
    })?;
    let scoring = ScoringStage {
        runner: EvaluationRunner::new(Arc::new(framework), scoring_config.models),
        metrics: cmd.scoring.metrics.clone(),
        run_config: scoring_config.run,
        namespace: scoring_config.metrics_namespace,
    };

    let collaborators = aws::collaborators(&config).await;
    let pipeline = Pipeline::new(config, collaborators)?;
    info!("Starting evaluation {}", pipeline.invocation_id());

    let mut stdout = io::stdout();
    pipeline.evaluate(&testset, &scoring, &mut stdout).await
}

async fn ask(cmd: AskCommand) -> PipelineResult<common::EvaluationDataset> {
    let config = EvaluationConfig::try_from(&cmd.deployment)?;
    let collaborators = aws::collaborators(&config).await;
    let pipeline = Pipeline::new(config, collaborators)?;
    info!("Asking {} questions", cmd.questions.len());

    pipeline.ask(cmd.questions).await
}
