use crate::config::loader::SandboxConfig;
use crate::config::policy::LibraryAccessPolicy;
use crate::config::types::SessionState;
use crate::core::types::Severity;
use crate::core::unit::PluginUnit;
use crate::exec::orchestrator::{CompilationOrchestrator, SessionReport};
use crate::observability::audit;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct UnitArgs {
    /// Fully-qualified name of the entry unit (e.g. contract.MyScript)
    #[arg(long)]
    name: String,
    /// Source file of the entry unit
    #[arg(long)]
    source: PathBuf,
    /// Additional units compiled in the same session (format: name=path)
    #[arg(long = "unit", value_name = "NAME=PATH")]
    units: Vec<String>,
    /// Sandbox configuration (JSON). Defaults to ./scriptbox.json or the
    /// built-in preset.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Emit the session report as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the units and execute the entry unit
    Run {
        #[command(flatten)]
        unit: UnitArgs,
        /// Abandon execution after this many milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },
    /// Compile only and print diagnostics
    Check {
        #[command(flatten)]
        unit: UnitArgs,
    },
    /// Print the effective allowlist
    Policy {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<SandboxConfig> {
    let config = match path {
        Some(path) => SandboxConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SandboxConfig::load_default().context("loading default config")?,
    };
    if let Some(audit_path) = &config.audit_log {
        audit::init_audit_logger(audit_path.clone())
            .with_context(|| format!("opening audit log {}", audit_path.display()))?;
    }
    Ok(config)
}

fn read_unit(name: &str, path: &Path) -> Result<PluginUnit> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading plugin source {}", path.display()))?;
    Ok(PluginUnit::new(name, source)?)
}

fn collect_units(args: &UnitArgs) -> Result<Vec<PluginUnit>> {
    let mut units = vec![read_unit(&args.name, &args.source)?];
    for spec in &args.units {
        let (name, path) = spec
            .split_once('=')
            .with_context(|| format!("unit '{}' is not in NAME=PATH form", spec))?;
        units.push(read_unit(name, Path::new(path))?);
    }
    Ok(units)
}

fn print_report(report: &SessionReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for diagnostic in &report.diagnostics {
        eprintln!("{}", diagnostic);
    }
    let errors = report
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    if errors > 0 {
        eprintln!("{} error(s); nothing was executed", errors);
    }
    for line in &report.output {
        println!("{}", line);
    }
    if let Some(failure) = &report.failure {
        eprintln!("Execution failed: {}", failure);
    }
    eprintln!("Session {}: {}", report.session_id, report.state);
    Ok(())
}

pub fn run() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { unit, deadline_ms } => {
            let config = load_config(unit.config.as_deref())?;
            let orchestrator = CompilationOrchestrator::new(config);
            let units = collect_units(&unit)?;
            let report = match deadline_ms {
                Some(ms) => orchestrator.run_with_deadline(units, Duration::from_millis(ms))?,
                None => orchestrator.run(units)?,
            };
            print_report(&report, unit.json)?;
            if report.state != SessionState::Executed {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Check { unit } => {
            let config = load_config(unit.config.as_deref())?;
            let orchestrator = CompilationOrchestrator::new(config);
            let report = orchestrator.check(collect_units(&unit)?)?;
            print_report(&report, unit.json)?;
            if report.state != SessionState::CompiledOk {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Policy { config } => {
            let config = load_config(config.as_deref())?;
            let validation = config.validate()?;
            for warning in &validation.warnings {
                eprintln!("Warning: {}", warning);
            }
            let policy = LibraryAccessPolicy::from_config(&config);
            println!("contract: {}", policy.contract().qualified_name());
            for (realm, package) in policy.entries() {
                println!("{:<32} {}", realm, package);
            }
            Ok(())
        }
    }
}
