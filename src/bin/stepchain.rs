use clap::{Parser, Subcommand};
use stepchain::backend::http::HttpBackend;
use stepchain::backend::{ActionPlanReport, StepReport};
use stepchain::config::{VisualizerConfig, load_config_from_yaml};
use stepchain::plan::{Plan, PlanStatus, Step};
use stepchain::runtime::clock::{ManualClock, TokioClock};
use stepchain::runtime::engine::ChainEngine;
use stepchain::runtime::session::{SessionState, SessionSnapshot, FetchRequest};
use stepchain::sequencer::SequencerState;
use std::sync::Arc;
use std::path::PathBuf;
use anyhow::{Result, anyhow};
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch an agent for a query and follow its workflow until it completes
    Run {
        /// Query handed to the agent backend
        #[arg(long, short)]
        query: String,

        /// Backend base URL (overrides the config file)
        #[arg(long)]
        base_url: Option<String>,

        /// Path to a YAML config file
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Layout seed for reproducible positions
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        width: Option<f64>,

        #[arg(long)]
        height: Option<f64>,
    },

    /// Build a chain offline from a synthetic plan
    Simulate {
        /// Number of plan steps
        #[arg(long, short, default_value_t = 5)]
        steps: usize,

        #[arg(long, short)]
        config: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        width: Option<f64>,

        #[arg(long)]
        height: Option<f64>,
    },
}

fn build_config(path: Option<PathBuf>, seed: Option<u64>, width: Option<f64>, height: Option<f64>) -> Result<VisualizerConfig> {
    let mut config = match path {
        Some(p) => load_config_from_yaml(&p.to_string_lossy())?,
        None => VisualizerConfig::default(),
    };
    if seed.is_some() {
        config.seed = seed;
    }
    if let Some(w) = width {
        config.canvas.width = w;
    }
    if let Some(h) = height {
        config.canvas.height = h;
    }
    Ok(config)
}

fn print_snapshot(snapshot: &SessionSnapshot) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}

async fn run(query: String, config: VisualizerConfig) -> Result<()> {
    let backend = Arc::new(HttpBackend::new(&config.backend.base_url));
    info!("Backend: {}", backend.base_url());

    let (engine, handle) = ChainEngine::new(&config, backend, Arc::new(TokioClock::new()));
    let worker = tokio::spawn(engine.run());

    handle.launch(&query).await?;
    info!("Query submitted: {}", query);

    let mut updates = handle.subscribe();
    let mut seen = 0;
    let final_snapshot = loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Err(anyhow!("Engine stopped unexpectedly"));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, shutting down");
                break handle.snapshot();
            }
        }

        let snapshot = updates.borrow_and_update().clone();
        for node in snapshot.nodes.iter().skip(seen) {
            info!(node_id = %node.id, label = %node.label, "New step node");
        }
        seen = snapshot.nodes.len();

        if snapshot.state.is_terminal() {
            break snapshot;
        }
    };

    handle.shutdown().await?;
    worker.await?;

    print_snapshot(&final_snapshot)?;
    match final_snapshot.state {
        SequencerState::Error { message } => Err(anyhow!("Workflow failed: {}", message)),
        _ => Ok(()),
    }
}

fn simulate(steps: usize, config: VisualizerConfig) -> Result<()> {
    let clock = Arc::new(ManualClock::new(0));
    let mut state = SessionState::new(&config, clock.clone());

    let plan = Plan::new(
        (0..steps).map(|i| Step::new(format!("step_{}", i + 1), format!("action {}", i + 1))).collect(),
    );
    state.attach_agent("simulated");

    while !state.sequencer().is_terminal() {
        let Some(due) = state.next_due() else {
            break;
        };
        clock.set(due);

        for request in state.due_fetches() {
            match request {
                FetchRequest::Plan { ticket, .. } => {
                    let report = ActionPlanReport { status: PlanStatus::Ready, plan: Some(plan.clone()) };
                    state.on_plan_fetched(ticket, Ok(report));
                }
                FetchRequest::Step { ticket, step_id, .. } => {
                    let label = plan.position(&step_id)
                        .and_then(|i| plan.get(i))
                        .map(|s| s.name.clone())
                        .unwrap_or_else(|| step_id.clone());
                    state.on_step_fetched(ticket, &step_id, Ok(StepReport::updated(&step_id, &label)));
                }
            }
        }
    }

    info!("Simulated {} nodes", state.graph().len());
    print_snapshot(&state.snapshot())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { query, base_url, config, seed, width, height } => {
            let mut config = build_config(config, seed, width, height)?;
            if let Some(url) = base_url {
                config.backend.base_url = url;
            }
            run(query, config).await?;
        }
        Commands::Simulate { steps, config, seed, width, height } => {
            let config = build_config(config, seed, width, height)?;
            simulate(steps, config)?;
        }
    }

    Ok(())
}
