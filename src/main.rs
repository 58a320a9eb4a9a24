use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use warden_core::config::KernelConfig;
use warden_core::graph::ExecutionGraph;
use warden_core::types::{ExecutionContext, KernelEvent};

use warden::Kernel;

#[derive(Parser)]
#[command(name = "warden", version, about = "Governance-gated DAG execution kernel")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "warden.toml", env = "WARDEN_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a graph file and print the report
    Validate {
        /// Graph in JSON interchange format
        graph: PathBuf,
    },
    /// Print the execution stages of a graph
    Plan {
        graph: PathBuf,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a graph through governance, routing and the sandbox executor
    Run {
        graph: PathBuf,
        /// Review, approve and start execution as the configured actor
        #[arg(long)]
        approve: bool,
        #[arg(long, default_value = "default")]
        workspace: String,
        /// Seed passed to generative nodes
        #[arg(long)]
        seed: Option<u64>,
        /// Describe containers without recording prompts in the guardrail ledger
        #[arg(long)]
        dry_run: bool,
        /// Mark the run as a replay of an earlier one
        #[arg(long)]
        replay: bool,
        /// Print the final snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the worker catalog
    Workers,
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
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warden=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "warden", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        KernelConfig::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "No config file found, using defaults");
        KernelConfig::default()
    };
    let kernel = Kernel::new(config)?;

    match cli.command {
        Commands::Validate { graph } => {
            let graph = load_graph(&kernel, &graph)?;
            let report = kernel.validate(&graph);
            if report.is_valid {
                println!("Graph {} is valid ({} nodes)", graph.id, graph.len());
            } else {
                for error in &report.errors {
                    println!("  - {}", error);
                }
                anyhow::bail!("graph {} is invalid ({} errors)", graph.id, report.errors.len());
            }
        }
        Commands::Plan { graph, json } => {
            let graph = load_graph(&kernel, &graph)?;
            let plan = kernel.plan(&graph)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                for (index, stage) in plan.stages.iter().enumerate() {
                    println!("stage {}: {}", index, stage.join(", "));
                }
            }
        }
        Commands::Run {
            graph,
            approve,
            workspace,
            seed,
            dry_run,
            replay,
            json,
        } => {
            let graph = load_graph(&kernel, &graph)?;
            let mut ctx = run_context(&graph, workspace, seed, dry_run, replay);
            ctx.user_id = Some(kernel.config().governance.actor.clone());
            run_graph(&kernel, graph, ctx, approve, json).await?;
        }
        Commands::Workers => {
            for worker in kernel.router().registry().workers() {
                let capabilities: Vec<String> =
                    worker.capabilities.iter().map(|c| c.to_string()).collect();
                println!(
                    "{:<20} {:<18} {:<9} local={:<5} gpu={:<5} [{}]",
                    worker.id,
                    worker.execution_mode,
                    worker.status,
                    worker.resources.is_local,
                    worker.resources.has_gpu,
                    capabilities.join(", ")
                );
            }
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use warden_core::graph::Priority;

    use super::*;

    #[test]
    fn run_flags_parse_into_context() {
        let cli = Cli::try_parse_from([
            "warden", "run", "graph.json", "--approve", "--seed", "9", "--dry-run", "--replay",
        ])
        .unwrap();
        let Commands::Run {
            workspace,
            seed,
            dry_run,
            replay,
            ..
        } = cli.command
        else {
            panic!("expected run command");
        };

        let graph = ExecutionGraph::new("g-cli", "intent", Priority::Normal);
        let ctx = run_context(&graph, workspace, seed, dry_run, replay);
        assert_eq!(ctx.graph_id, "g-cli");
        assert_eq!(ctx.workspace_id, "default");
        assert_eq!(ctx.seed, 9);
        assert!(ctx.dry_run);
        assert!(ctx.is_replay);
    }

    #[test]
    fn run_defaults_to_live_first_run() {
        let cli = Cli::try_parse_from(["warden", "run", "graph.json"]).unwrap();
        let Commands::Run {
            workspace,
            seed,
            dry_run,
            replay,
            ..
        } = cli.command
        else {
            panic!("expected run command");
        };

        let graph = ExecutionGraph::new("g-cli", "intent", Priority::Normal);
        let ctx = run_context(&graph, workspace, seed, dry_run, replay);
        assert_eq!(ctx.seed, 42);
        assert!(!ctx.dry_run);
        assert!(!ctx.is_replay);
    }
}

fn load_graph(kernel: &Kernel, path: &Path) -> anyhow::Result<ExecutionGraph> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading graph {}", path.display()))?;
    Ok(kernel.graphs().deserialize(&content)?)
}

fn run_context(
    graph: &ExecutionGraph,
    workspace: String,
    seed: Option<u64>,
    dry_run: bool,
    replay: bool,
) -> ExecutionContext {
    let mut ctx = ExecutionContext::new(&graph.id, workspace).with_dry_run(dry_run);
    if let Some(seed) = seed {
        ctx = ctx.with_seed(seed);
    }
    if replay {
        ctx = ctx.as_replay();
    }
    ctx
}

async fn run_graph(
    kernel: &Kernel,
    graph: ExecutionGraph,
    ctx: ExecutionContext,
    approve: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut rx = kernel.event_bus().subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                KernelEvent::Governance(event) => {
                    eprintln!("[governance] {} -> {} ({})", event.from, event.to, event.actor);
                }
                KernelEvent::StageStarted { index, nodes, .. } => {
                    eprintln!("[stage {}] {}", index, nodes.join(", "));
                }
                KernelEvent::NodeStarted { node_id, attempt, .. } => {
                    eprintln!("[{}] attempt {}", node_id, attempt);
                }
                KernelEvent::NodeCompleted { node_id, elapsed_ms, .. } => {
                    eprintln!("[{}: ok] {} ms", node_id, elapsed_ms);
                }
                KernelEvent::NodeFailed { node_id, error, .. } => {
                    eprintln!("[{}: ERROR] {}", node_id, error);
                }
                KernelEvent::RunFinished { succeeded, .. } => {
                    eprintln!("[run] {}", if succeeded { "succeeded" } else { "failed" });
                    break;
                }
            }
        }
    });

    if approve {
        kernel.authorize(&graph)?;
    } else {
        printer.abort();
        anyhow::bail!(
            "governance is {}; rerun with --approve to review and start graph {}",
            kernel.governance().state(),
            graph.id
        );
    }

    let result = kernel.execute(graph, ctx).await;
    if result.is_err() {
        printer.abort();
    }
    let snapshot = result?;
    printer.await.ok();

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        for state in snapshot.node_states.values() {
            match &state.error {
                Some(error) => println!("{:<16} {:<10} {}", state.node_id, state.status, error),
                None => println!("{:<16} {}", state.node_id, state.status),
            }
        }
        println!("governance: {}", kernel.governance().state());
    }

    if !snapshot.succeeded() {
        anyhow::bail!("run {} did not succeed", snapshot.context.run_id);
    }
    Ok(())
}
