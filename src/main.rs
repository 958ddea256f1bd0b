//! genoflow CLI Entry Point
//!
//! # Usage
//!
//! ```bash
//! # Print the default configuration of a workflow
//! genoflow --workflow metagenomics --get-default-config config.json
//!
//! # Validate everything and print the job plan
//! genoflow --workflow metagenomics --config config.json --dry-run
//!
//! # Render the job graph
//! genoflow --workflow contigs --config config.json --save-workflow-graph graph.dot
//!
//! # Run, forwarding extra arguments to the scheduler
//! genoflow --workflow contigs --config config.json --additional-params --forcerun anvi_run_hmms
//! ```

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::info;

use genoflow::config::default_config;
use genoflow::controller::{
    program_dependencies, ControllerOptions, Outcome, RunMode, WorkflowController,
};
use genoflow::execution::ExternalScheduler;
use genoflow::workflow::definition;
use genoflow::{StageGraph, WorkflowError, WorkflowKind, APP_NAME, VERSION};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "genoflow", version, about = "Resolve and run genomic workflows")]
struct Cli {
    /// Workflow to run (see --list-workflows)
    #[arg(short, long)]
    workflow: Option<String>,

    /// JSON or YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Work directory for outputs and relative paths
    #[arg(short, long, default_value = ".")]
    directory: PathBuf,

    /// Write the default configuration of the workflow to FILE and exit
    #[arg(long, value_name = "FILE")]
    get_default_config: Option<PathBuf>,

    /// List the available workflows and exit
    #[arg(long)]
    list_workflows: bool,

    /// List the programs the enabled stages need and exit
    #[arg(long)]
    list_dependencies: bool,

    /// Validate and print the job plan without running anything
    #[arg(long, conflicts_with = "save_workflow_graph")]
    dry_run: bool,

    /// Write the job graph as Graphviz DOT to FILE instead of running
    #[arg(long, value_name = "FILE")]
    save_workflow_graph: Option<PathBuf>,

    /// Arguments passed through to the scheduler
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    additional_params: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Genomic workflow configuration and graph resolution");
    println!();
}

fn print_workflows() {
    println!("{}", "Available workflows:".bold());
    for kind in WorkflowKind::ALL {
        let def = definition(kind);
        println!("  {:<14} {}", kind.name().green(), def.description);
    }
}

fn print_plan(graph: &StageGraph) {
    println!();
    println!("{}", "Job plan".bold());
    for job in graph.jobs() {
        let mut tags = Vec::new();
        if job.finalized {
            tags.push("finalized".yellow().to_string());
        } else if job.protected {
            tags.push("protected".cyan().to_string());
        }
        println!("  {} [{} threads] {}", job.id.green(), job.threads, tags.join(" "));
        println!("    {}", job.command);
        println!("    log: {}", job.log.display());
    }

    let passed: Vec<_> = graph.passthroughs().collect();
    if !passed.is_empty() {
        println!();
        println!("{}", "Disabled stages".bold());
        for p in passed {
            let target = match (&p.forwarded_from, &p.raw_column) {
                (Some(stage), _) => format!("output forwarded from {}", stage),
                (None, Some(column)) => format!("input column '{}' used directly", column),
                (None, None) => "no consumers".to_string(),
            };
            println!("  {} ({})", p.stage.dimmed(), target);
        }
    }
    println!();
    println!("{} jobs, {} dependencies", graph.job_count(), graph.edge_count());
}

fn parse_workflow(cli: &Cli) -> Result<WorkflowKind, WorkflowError> {
    match &cli.workflow {
        Some(name) => name.parse(),
        None => Err(WorkflowError::MissingKey("--workflow".to_string())),
    }
}

/// Main application entry point.
fn run(cli: Cli) -> Result<(), WorkflowError> {
    if cli.list_workflows {
        print_workflows();
        return Ok(());
    }

    let kind = parse_workflow(&cli)?;

    if let Some(path) = &cli.get_default_config {
        let json = serde_json::to_string_pretty(&default_config(kind))
            .map_err(|e| WorkflowError::InvalidDefinition(e.to_string()))?;
        fs::write(path, json)?;
        println!("Default config for '{}' written to {}", kind, path.display());
        return Ok(());
    }

    if cli.list_dependencies {
        let programs = program_dependencies(kind, cli.config.as_deref())?;
        println!("{}", format!("Programs needed by '{}':", kind).bold());
        for (program, stages) in programs {
            println!("  {:<36} {}", program.green(), stages.join(", "));
        }
        return Ok(());
    }

    print_banner();

    let mode = if cli.dry_run {
        RunMode::DryRun
    } else if let Some(path) = cli.save_workflow_graph.clone() {
        RunMode::Visualize(path)
    } else {
        RunMode::Execute
    };
    if mode == RunMode::DryRun {
        info!("Mode: DRY RUN (nothing will be executed)");
    }

    let options = ControllerOptions {
        kind,
        config_path: cli.config,
        root: cli.directory,
        mode,
        scheduler_args: cli.additional_params,
    };
    let mut controller = WorkflowController::new(options);
    controller.init()?;

    let scheduler = match controller.workflow() {
        Some(workflow) => ExternalScheduler::from_config(workflow.config())?,
        None => {
            return Err(WorkflowError::InvalidDefinition(
                "workflow not initialized".to_string(),
            ))
        }
    };

    match controller.go(&scheduler)? {
        Outcome::Validated(graph) => print_plan(&graph),
        Outcome::Visualized(path) => println!("Workflow graph written to {}", path.display()),
        Outcome::Submitted { jobs } => {
            println!();
            println!("{} ({} jobs)", "Workflow completed successfully".green(), jobs);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            eprintln!("{} {}", "Hint:".yellow(), e.hint());
            ExitCode::from(e.exit_code())
        }
    }
}
