//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Subcommand;
use lazyfs_core::{Script, Simulation, SimulationConfig, SimulationReport, TracingSink, parse_script};
use lazyfs_sim::{Scenario, WorkloadGenerator, WorkloadProfile};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Simulate a request script
    Run {
        /// Script file; reads stdin when omitted
        input: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a seeded random request script
    Generate {
        /// Random seed
        #[arg(long, default_value = "1")]
        seed: u64,
        /// Number of distinct users
        #[arg(long, default_value = "10")]
        users: u32,
        /// Number of requests
        #[arg(short = 'n', long, default_value = "30")]
        requests: usize,
        /// Latest scheduled second
        #[arg(long, default_value = "10")]
        horizon: u64,
        /// Number of files
        #[arg(long, default_value = "5")]
        files: usize,
        /// Concurrent users allowed per file
        #[arg(long, default_value = "3")]
        max_users: usize,
        /// Seconds a request may wait before giving up
        #[arg(long, default_value = "5")]
        max_wait: u64,
        /// Output file; writes to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a built-in scenario, or list them when no name is given
    Scenario {
        /// Scenario name, or `all`
        name: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of whichever command fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run { input, json } => run_script(input.as_deref(), json).await,
        Commands::Generate {
            seed,
            users,
            requests,
            horizon,
            files,
            max_users,
            max_wait,
            output,
        } => {
            let profile = WorkloadProfile {
                config: SimulationConfig {
                    file_count: files,
                    max_users,
                    max_wait,
                    ..WorkloadProfile::default().config
                },
                users,
                requests,
                horizon,
                ..Default::default()
            };
            generate_script(seed, profile, output.as_deref()).await
        }
        Commands::Scenario { name, json } => match name {
            Some(name) => run_scenarios(&name, json).await,
            None => {
                list_scenarios();
                Ok(())
            }
        },
    }
}

/// Reads and parses a script from `input`, or stdin.
async fn load_script(input: Option<&Path>) -> anyhow::Result<Script> {
    let text = match input {
        Some(path) => fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read stdin")?;
            text
        }
    };

    let script = parse_script(&text)?;
    if !script.rejections.is_empty() {
        warn!(
            rejected = script.rejections.len(),
            "Some requests were skipped"
        );
    }
    Ok(script)
}

async fn run_script(input: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let script = load_script(input).await?;
    let config = script.config.clone().with_env_overrides();

    let simulation = Simulation::new(config, Arc::new(TracingSink))?;
    let report = simulation.run(script.requests).await?;
    print_report(&report, json)
}

async fn generate_script(
    seed: u64,
    profile: WorkloadProfile,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let script = WorkloadGenerator::new(seed, profile).generate();
    let text = script.render();

    match output {
        Some(path) => {
            fs::write(path, text)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(seed, path = %path.display(), "Script written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn list_scenarios() {
    println!("Available scenarios:");
    for scenario in Scenario::all() {
        println!("  {:<20} {}", scenario.name, scenario.description);
    }
}

async fn run_scenarios(name: &str, json: bool) -> anyhow::Result<()> {
    let scenarios = if name == "all" {
        Scenario::all()
    } else {
        vec![Scenario::by_name(name)?]
    };

    let mut failed = Vec::new();
    for scenario in scenarios {
        let run = scenario.run_with_sink(Some(Arc::new(TracingSink))).await?;
        print_report(&run.report, json)?;

        if run.passed() {
            println!("Scenario {}: passed\n", scenario.name);
        } else {
            println!("Scenario {}: FAILED", scenario.name);
            for mismatch in &run.mismatches {
                println!("  - {mismatch}");
            }
            for violation in &run.violations {
                println!("  - {violation}");
            }
            failed.push(scenario.name);
        }
    }

    if !failed.is_empty() {
        bail!("{} scenario(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn print_report(report: &SimulationReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.summary());
    }
    Ok(())
}
