//! FlowBench CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use flowbench_flow::{resolve_workflow, RunController, RunEvent};
use flowbench_protocol::{LogEntry, LogLevel, Workflow, WorkflowDocument};
use flowbench_services::{default_config_path, ServiceClient, ServiceConfig};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowbench")]
#[command(about = "FlowBench - run node/edge workflows against remote AI services")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file from Start to End
    Run {
        /// Path to the workflow JSON document
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Service config file (defaults to the user config location)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the remote services base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Print the run report as JSON instead of the log
        #[arg(long)]
        json: bool,
    },

    /// Check that a workflow is executable and print its order
    Validate {
        /// Path to the workflow JSON document
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the JSON Schema of the workflow document
    Schema,

    /// Inspect or create the service configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Config file to read
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write a default config file
    Init {
        /// Destination (defaults to the user config location)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            file,
            config,
            base_url,
            json,
        } => run_workflow(&file, config.as_deref(), base_url, json).await,
        Commands::Validate { file } => validate_workflow(&file),
        Commands::Schema => print_schema(),
        Commands::Config { command } => handle_config(command),
    }
}

async fn run_workflow(
    file: &Path,
    config_path: Option<&Path>,
    base_url: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let workflow = Workflow::load(file)?;

    let mut config = ServiceConfig::load(config_path)?;
    if let Some(base_url) = base_url {
        config.base_url = base_url;
        config.validate()?;
    }

    if !json {
        println!("{}", style("▶ FlowBench Run").bold().cyan());
        println!("  Workflow: {}", file.display());
        println!("  Nodes: {}", workflow.nodes().len());
        println!("  Services: {}", config.base_url);
        println!();
    }

    let client = ServiceClient::new(config)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let controller = RunController::new(Arc::new(client)).with_events(tx);

    let run = tokio::spawn(async move { controller.run(&workflow).await });

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    if json {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Resolving execution order...");

    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::NodeStarted { node_name, .. } => {
                pb.set_message(format!("Running {}...", node_name));
            }
            RunEvent::EntryAppended(entry) if !json => {
                pb.suspend(|| print_entry(&entry));
            }
            RunEvent::StateChanged(state) if state.is_finished() => break,
            _ => {}
        }
    }
    pb.finish_and_clear();

    let report = run.await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!("  Run ID: {}", report.run_id);
        let elapsed = report.finished_at - report.started_at;
        println!("  Duration: {} ms", elapsed.num_milliseconds());
    }

    if report.succeeded() {
        if !json {
            println!("\n{}", style("✅ Flow completed").green().bold());
        }
        Ok(())
    } else {
        if !json {
            println!("\n{}", style("❌ Flow failed").red().bold());
        }
        std::process::exit(1);
    }
}

fn print_entry(entry: &LogEntry) {
    let time = entry.timestamp.format("%H:%M:%S");
    let name = style(&entry.node_name).bold();
    let output = entry.output.replace('\n', "\n    ");
    let output = match entry.level {
        LogLevel::Error => style(output).red(),
        LogLevel::Success => style(output).green(),
        LogLevel::Info => style(output),
    };
    println!("{} {}: {}", style(format!("[{}]", time)).dim(), name, output);
}

fn validate_workflow(file: &Path) -> anyhow::Result<()> {
    println!("{}", style("🔍 Validating workflow...").bold());
    let workflow = Workflow::load(file)?;

    match resolve_workflow(&workflow) {
        Ok(sequence) => {
            println!("  Execution order ({} of {} nodes):", sequence.len(), workflow.nodes().len());
            for (step, node) in sequence.iter().enumerate() {
                println!(
                    "  {}. {} {}",
                    step + 1,
                    style(node.display_label()).bold(),
                    style(format!("({}, id {})", node.kind, node.id)).dim()
                );
            }
            let skipped = workflow.nodes().len() - sequence.len();
            if skipped > 0 {
                println!(
                    "{}",
                    style(format!("  {} node(s) are not on the Start to End path", skipped)).yellow()
                );
            }
            println!("\n{}", style("✅ Workflow is executable").green().bold());
            Ok(())
        }
        Err(e) => {
            println!("{}", style(format!("❌ {}", e)).red().bold());
            std::process::exit(1);
        }
    }
}

fn print_schema() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(WorkflowDocument);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn handle_config(command: ConfigCommands) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Show { config } => {
            let resolved = ServiceConfig::load(config.as_deref())?;
            println!("{}", style("⚙️  Service Configuration").bold());
            print!("{}", resolved.to_toml()?);
            let key_state = if resolved.api_key.is_some() {
                style("set").green()
            } else {
                style("not set").yellow()
            };
            println!("# api key: {}", key_state);
            Ok(())
        }
        ConfigCommands::Init { path, force } => {
            let path = path
                .or_else(default_config_path)
                .ok_or_else(|| anyhow::anyhow!("Could not determine a config directory; pass a path"))?;
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, ServiceConfig::default().to_toml()?)?;
            println!(
                "{}",
                style(format!("✅ Wrote {}", path.display())).green()
            );
            Ok(())
        }
    }
}
