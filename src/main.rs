mod demos;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use stepwise_core::config::StepwiseConfig;
use stepwise_core::event::EventBus;
use stepwise_engine::{RunEngine, RunOptions, TraceLogger};

use crate::demos::Demo;

#[derive(Parser)]
#[command(name = "stepwise", version, about = "Step-graph workflow runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "stepwise.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a built-in demo workflow and print its final state and trace
    Demo {
        /// Which demo to run
        #[arg(value_enum)]
        name: Demo,
        /// Initial state as a JSON object
        #[arg(long)]
        input: Option<String>,
        /// Override the configured iteration limit
        #[arg(long)]
        max_iterations: Option<usize>,
    },
    /// List the steps of a demo workflow
    Steps {
        #[arg(value_enum)]
        name: Demo,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stepwise=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            name,
            input,
            max_iterations,
        } => {
            let config = load_config(&cli.config)?;
            run_demo(&config, name, input, max_iterations).await
        }
        Commands::Steps { name } => {
            let workflow = name.build()?;
            for step in workflow.steps() {
                let marker = if step.name() == workflow.start_step() { "*" } else { " " };
                match step.description() {
                    Some(desc) => println!("{} {:<10} {}", marker, step.name(), desc),
                    None => println!("{} {}", marker, step.name()),
                }
            }
            Ok(())
        }
        Commands::Config => {
            let config = load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "stepwise", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> anyhow::Result<StepwiseConfig> {
    if path.exists() {
        Ok(StepwiseConfig::load(path)?)
    } else {
        debug!(path = %path.display(), "No config file, using defaults");
        Ok(StepwiseConfig::default())
    }
}

async fn run_demo(
    config: &StepwiseConfig,
    demo: Demo,
    input: Option<String>,
    max_iterations: Option<usize>,
) -> anyhow::Result<()> {
    let workflow = demo.build()?;
    let input = match input {
        Some(raw) => serde_json::from_str(&raw)?,
        None => serde_json::json!({}),
    };

    let event_bus = Arc::new(EventBus::new(config.engine.event_capacity));
    let cancel = CancellationToken::new();

    // Spawn TraceLogger if logging is enabled
    let logger = match &config.log {
        Some(log_config) if log_config.enabled => {
            let logger = TraceLogger::new(log_config.resolved_log_dir(), log_config.level);
            info!(dir = %logger.log_dir().display(), level = log_config.level, "TraceLogger enabled");
            Some(logger.spawn(&event_bus, cancel.clone()))
        }
        _ => None,
    };

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    let mut options = RunOptions::new().with_cancel(cancel);
    if let Some(limit) = max_iterations {
        options = options.with_max_iterations(limit);
    }

    let engine = RunEngine::new(workflow)
        .with_emitter(event_bus.clone())
        .with_config(config.engine.clone());
    let result = engine.run_with(input, options).await;

    // Dropping every sender lets the logger drain what was published.
    drop(engine);
    drop(event_bus);
    if let Some(handle) = logger {
        handle.await?;
    }

    let output = result?;
    let report = serde_json::json!({
        "run_id": output.run_id,
        "state": output.state,
        "trace": output.trace.entries(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
