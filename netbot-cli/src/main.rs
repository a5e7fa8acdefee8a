//! netbot CLI - host the circuit-analysis bot and inspect netlists from the command line.

use clap::{Parser, Subcommand, ValueEnum};
use netbot::audit::read_stat_events;
use netbot::engine::{ExternalPlotter, ExternalSolver};
use netbot::transport::console::ConsoleTransport;
use netbot::{
    discover_netlists, serve, AuditStream, Bot, BotConfig, DispatchOutcome, InspectOptions,
    InspectReport, NetbotCore, StatsSummary, UserId,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit code asking the supervisor to start the bot again.
const RESTART_EXIT_CODE: i32 = 3;

#[derive(Parser)]
#[command(name = "netbot")]
#[command(about = "Conversational circuit-analysis bot", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve chat events read as JSON lines from stdin; replies go to stdout
    Serve {
        /// JSON configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Directory holding the session database and plots
        #[arg(long, value_name = "DIR")]
        data_dir: Option<PathBuf>,

        /// Directory holding the audit logs
        #[arg(long, value_name = "DIR")]
        log_dir: Option<PathBuf>,

        /// Administrator user id (repeatable)
        #[arg(long = "admin", value_name = "ID")]
        admins: Vec<i64>,

        /// User id assigned to plain (non-JSON) input lines
        #[arg(long, value_name = "ID", default_value_t = 1)]
        user: i64,
    },

    /// Parse netlists and show how they would be limited
    Inspect {
        /// Netlist file or directory to scan
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Maximum number of non-reference nodes
        #[arg(long)]
        max_nodes: Option<usize>,

        /// Maximum number of samples per analysis
        #[arg(long)]
        max_samples: Option<u64>,
    },

    /// Summarize the stat log
    Stats {
        /// Directory holding the audit logs
        #[arg(long, value_name = "DIR", default_value = "logs")]
        log_dir: PathBuf,

        /// User ids left out of the summary (repeatable)
        #[arg(long = "exclude", value_name = "ID")]
        excluded: Vec<i64>,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Serve {
            config,
            data_dir,
            log_dir,
            admins,
            user,
        } => handle_serve(config.as_deref(), data_dir, log_dir, admins, user),
        Commands::Inspect {
            path,
            format,
            max_nodes,
            max_samples,
        } => {
            let defaults = InspectOptions::default();
            let options = InspectOptions {
                max_nodes: max_nodes.unwrap_or(defaults.max_nodes),
                max_samples: max_samples.unwrap_or(defaults.max_samples),
            };
            handle_inspect(&path, &format, &options)
        }
        Commands::Stats { log_dir, excluded } => handle_stats(&log_dir, &excluded),
    };

    process::exit(exit_code);
}

/// Diagnostics go to stderr; stdout carries the bot's replies.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_serve(
    config: Option<&Path>,
    data_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    admins: Vec<i64>,
    user: i64,
) -> i32 {
    let mut config = match config {
        Some(path) => match BotConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
        None => BotConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = log_dir {
        config.log_dir = dir;
    }
    config.admins.extend(admins);

    match run_serve(config, UserId(user)) {
        Ok(DispatchOutcome::Restart) => {
            info!("exiting for restart");
            RESTART_EXIT_CODE
        }
        Ok(DispatchOutcome::Continue) => 0,
        Err(e) => {
            error!(error = %e, "bot stopped");
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

fn run_serve(config: BotConfig, default_user: UserId) -> anyhow::Result<DispatchOutcome> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve_stdin(config, default_user))
}

async fn serve_stdin(config: BotConfig, default_user: UserId) -> anyhow::Result<DispatchOutcome> {
    let jobs = config.data_dir.join("jobs");
    let solver = Arc::new(ExternalSolver::new(config.solver.clone(), jobs.clone()));
    let plotter = Arc::new(ExternalPlotter::new(config.plotter.clone(), jobs));
    let transport = Arc::new(ConsoleTransport::new(std::io::stdout()));

    let bot = Arc::new(Bot::new(&config, solver, plotter, transport)?);
    info!(solver = %config.solver.program, "serving on stdin");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    Ok(serve(bot, stdin, default_user).await?)
}

fn handle_inspect(path: &Path, format: &OutputFormat, options: &InspectOptions) -> i32 {
    let files = if path.is_dir() {
        match discover_netlists(path) {
            Ok(files) => files,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    } else {
        vec![path.to_path_buf()]
    };

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for file in files {
        match NetbotCore::inspect_file(&file, options) {
            Ok(report) => reports.push(report),
            Err(e) => failures.push((file, e.to_string())),
        }
    }

    match format {
        OutputFormat::Human => output_human(&reports, &failures),
        OutputFormat::Json => output_json(&reports, &failures),
    }

    if failures.is_empty() {
        0
    } else {
        1
    }
}

fn output_human(reports: &[InspectReport], failures: &[(PathBuf, String)]) {
    for report in reports {
        let file = report
            .file
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("\nFile: {}", file);
        println!("{}", "─".repeat(60));
        if let Some(title) = &report.title {
            println!("  Title:    {}", title);
        }
        println!("  Elements: {}", report.elements);
        println!("  Nodes:    {}", report.nodes);
        println!("  Analysis: {}", report.directive);

        if let Some(reason) = &report.rejection {
            println!("\n  REJECTED:");
            for line in reason.lines() {
                println!("    {}", line);
            }
        } else if report.advisory.is_some() {
            println!("  Limited:  {}", report.governed_directive);
        } else {
            println!("  Within limits");
        }
    }

    for (file, reason) in failures {
        println!("\nFile: {}", file.display());
        println!("{}", "─".repeat(60));
        println!("  ERROR: {}", reason);
    }
}

fn output_json(reports: &[InspectReport], failures: &[(PathBuf, String)]) {
    let output = serde_json::json!({
        "reports": reports,
        "errors": failures.iter().map(|(file, reason)| {
            serde_json::json!({
                "file": file.display().to_string(),
                "error": reason,
            })
        }).collect::<Vec<_>>(),
        "summary": {
            "total_files": reports.len() + failures.len(),
            "limited": reports.iter().filter(|r| r.advisory.is_some()).count(),
            "rejected": reports.iter().filter(|r| !r.would_solve()).count(),
            "errors": failures.len(),
        }
    });
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn handle_stats(log_dir: &Path, excluded: &[i64]) -> i32 {
    let path = log_dir.join(AuditStream::Stat.file_name());
    let events = if path.exists() {
        match read_stat_events(&path) {
            Ok(events) => events,
            Err(e) => {
                eprintln!("Error: {}: {}", path.display(), e);
                return 1;
            }
        }
    } else {
        Vec::new()
    };

    let excluded: Vec<UserId> = excluded.iter().copied().map(UserId).collect();
    let summary = StatsSummary::from_events(&events, &excluded);
    print!("{}", summary.to_markdown());
    0
}
