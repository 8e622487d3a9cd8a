//! Resilience CLI.
//!
//! # Commands
//! - `check-config <path>`: load and validate a config file, print the result as JSON
//! - `simulate`: drive a synthetic flaky operation through the executor and
//!   print the outcome tally and breaker stats as JSON
//!
//! Ctrl-C during `simulate` cancels every in-flight call through its context.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use futures_util::stream::{self, StreamExt};
use rand::Rng;
use serde::Serialize;

use resilience_core::config::{load_config, ResilienceConfig};
use resilience_core::observability::logging;
use resilience_core::resilience::CircuitBreakerStats;
use resilience_core::{Context, Error, ResilienceExecutor};

#[derive(Parser)]
#[command(name = "resilience-cli")]
#[command(about = "Inspect resilience configs and exercise the executor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, validate and print a config file
    CheckConfig {
        path: PathBuf,
    },
    /// Run a synthetic flaky operation through the executor
    Simulate {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short = 'n', long, default_value_t = 100)]
        calls: usize,
        /// Probability in [0, 1] that an attempt fails with a transient error
        #[arg(short, long, default_value_t = 0.3)]
        failure_rate: f64,
        #[arg(short = 'j', long, default_value_t = 8)]
        concurrency: usize,
        #[arg(short, long, default_value = "simulated")]
        operation: String,
        /// Latency of each attempt
        #[arg(short, long, default_value_t = 5)]
        latency_ms: u64,
    },
}

#[derive(Serialize)]
struct SimulationReport {
    operation: String,
    calls: usize,
    succeeded: usize,
    failed: BTreeMap<&'static str, usize>,
    elapsed_ms: u64,
    breakers: Vec<CircuitBreakerStats>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { path } => {
            let config = load_config(&path)?;
            logging::init(&config.observability);
            tracing::info!(path = %path.display(), "Configuration valid");
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Simulate {
            config,
            calls,
            failure_rate,
            concurrency,
            operation,
            latency_ms,
        } => {
            if !(0.0..=1.0).contains(&failure_rate) {
                return Err(format!("failure rate must be within [0, 1], got {failure_rate}").into());
            }
            let config = match config {
                Some(path) => load_config(&path)?,
                None => ResilienceConfig::default(),
            };
            logging::init(&config.observability);

            let report = simulate(
                config,
                &operation,
                calls,
                failure_rate,
                concurrency.max(1),
                Duration::from_millis(latency_ms),
            )
            .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn simulate(
    config: ResilienceConfig,
    operation: &str,
    calls: usize,
    failure_rate: f64,
    concurrency: usize,
    latency: Duration,
) -> SimulationReport {
    let executor = Arc::new(ResilienceExecutor::new(config));
    let (ctx, cancel) = Context::background().with_cancel();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling in-flight calls");
            cancel.cancel();
        }
    });

    tracing::info!(operation, calls, concurrency, failure_rate, "Starting simulation");
    let start = Instant::now();

    let outcomes: Vec<Result<(), Error>> = stream::iter(0..calls)
        .map(|_| {
            let executor = executor.clone();
            let ctx = ctx.clone();
            async move {
                executor
                    .execute_with_resilience(&ctx, operation, |_| {
                        let fails = rand::thread_rng().gen_bool(failure_rate);
                        async move {
                            tokio::time::sleep(latency).await;
                            if fails {
                                Err(Error::transient("injected failure"))
                            } else {
                                Ok(())
                            }
                        }
                    })
                    .await
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut failed = BTreeMap::new();
    let mut succeeded = 0;
    for outcome in &outcomes {
        match outcome {
            Ok(()) => succeeded += 1,
            Err(err) => *failed.entry(err.kind().as_str()).or_insert(0) += 1,
        }
    }

    let elapsed_ms = start.elapsed().as_millis() as u64;
    tracing::info!(succeeded, failed = outcomes.len() - succeeded, elapsed_ms, "Simulation finished");

    SimulationReport {
        operation: operation.to_string(),
        calls,
        succeeded,
        failed,
        elapsed_ms,
        breakers: executor.stats(),
    }
}
