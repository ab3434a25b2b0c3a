//! `verdict` command-line interface.
//!
//! Results go to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use verdict_core::{GuardrailEvaluator, JudgmentFields, Mode, ToolRegistry};
use verdict_runtime::{AnalysisRequest, InMemoryCaseStore, Pipeline, RuntimeConfig, RuntimeError};

#[derive(Parser)]
#[command(name = "verdict")]
#[command(about = "Agentic analysis of free-text input with deterministic guardrails", long_about = None)]
#[command(version)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on one input
    Analyze {
        /// Text to analyze
        input: String,

        /// Additional context for the backend
        #[arg(short, long)]
        context: Option<String>,

        /// analysis or chat
        #[arg(short, long, default_value = "analysis")]
        mode: Mode,

        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Single completion, no tool calling
        #[arg(long)]
        no_tools: bool,

        /// Owning group recorded with the case
        #[arg(long, default_value = "default")]
        group: String,
    },

    /// Run the guardrail checks on a judgment given by hand
    Guardrails {
        /// Reasoning text to check
        text: String,

        #[arg(long, allow_negative_numbers = true)]
        score: Option<i64>,

        #[arg(long)]
        label: Option<String>,

        /// Risk factor; repeat for several
        #[arg(long = "factor")]
        factors: Vec<String>,

        /// Use the validation profile instead of the guardrail profile
        #[arg(long)]
        validation: bool,

        /// Mode the judgment was produced in; chat skips validation
        #[arg(short, long, default_value = "analysis")]
        mode: Mode,

        #[arg(long, default_value_t = verdict_core::guardrails::DEFAULT_MIN_LENGTH)]
        min_length: usize,
    },

    /// Inspect or run the built-in tools
    Tools {
        #[command(subcommand)]
        action: ToolCommands,
    },
}

#[derive(Subcommand)]
enum ToolCommands {
    /// List tools with their descriptions
    List,
    /// Execute one tool with JSON arguments
    Call {
        name: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Analyze {
            input,
            context,
            mode,
            config,
            no_tools,
            group,
        } => analyze(input, context, mode, config, no_tools, group).await,
        Commands::Guardrails {
            text,
            score,
            label,
            factors,
            validation,
            mode,
            min_length,
        } => {
            let fields = JudgmentFields {
                score,
                label: label.as_deref(),
                factors: &factors,
            };
            let outcome = if validation {
                GuardrailEvaluator::validation(min_length).validate(&text, &fields, mode)
            } else {
                GuardrailEvaluator::guardrails(min_length).evaluate(&text, &fields)
            };
            print_json(&outcome)
        }
        Commands::Tools { action } => {
            let registry = ToolRegistry::with_defaults();
            match action {
                ToolCommands::List => {
                    let tools: Vec<Value> = registry
                        .definitions()
                        .into_iter()
                        .map(|d| json!({"name": d.name, "description": d.description}))
                        .collect();
                    print_json(&tools)
                }
                ToolCommands::Call { name, arguments } => {
                    let args: Value = serde_json::from_str(&arguments)
                        .context("Tool arguments must be a JSON object")?;
                    let result = registry.execute_value(&name, &args)?;
                    print_json(&result)
                }
            }
        }
    }
}

async fn analyze(
    input: String,
    context: Option<String>,
    mode: Mode,
    config_path: Option<PathBuf>,
    no_tools: bool,
    group: String,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if no_tools {
        config.agent.use_tools = false;
    }
    debug!(config = ?config, "configuration loaded");

    let store = Arc::new(InMemoryCaseStore::new());
    let pipeline = Pipeline::from_config(&config, store).context("Failed to build pipeline")?;

    let mut request = AnalysisRequest::new(input, mode).with_group(group);
    if let Some(context) = context {
        request = request.with_context(context);
    }

    match pipeline.process(&request).await {
        Ok(result) => print_json(&result),
        Err(RuntimeError::Agent(failure)) => {
            // the trace is still worth having on stdout
            print_json(&json!({ "error": failure.to_string(), "trace": failure.trace }))?;
            bail!("analysis failed: {}", failure.kind)
        }
        Err(err) => Err(err.into()),
    }
}
