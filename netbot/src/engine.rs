//! Subprocess-backed solver and plot renderer.
//!
//! Each call writes a JSON job file, runs the configured program with the
//! job path appended to its arguments, and reads the outcome back:
//! the solver prints a [`SolvedNetwork`] as JSON on stdout, the plotter
//! writes the PNG named in the job's options. Children are killed when the
//! caller's deadline drops the future.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineCommand;
use crate::netlist::{AnalysisDirective, Netlist};
use crate::plot::{ImageArtifact, PlotError, PlotOptions, PlotRenderer};
use crate::solver::{SolvedNetwork, Solver, SolverFailure};

#[derive(Serialize)]
struct SolveJob<'a> {
    netlist: String,
    directive: &'a AnalysisDirective,
}

#[derive(Serialize)]
struct PlotJob<'a> {
    solved: &'a SolvedNetwork,
    options: &'a PlotOptions,
}

/// Job file removed when dropped.
struct JobFile {
    path: PathBuf,
}

impl JobFile {
    async fn write(dir: &Path, body: &impl Serialize) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("job-{}.json", Uuid::new_v4()));
        let json = serde_json::to_vec(body)?;
        tokio::fs::write(&path, json).await?;
        Ok(Self { path })
    }
}

impl Drop for JobFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "job file not removed");
        }
    }
}

async fn run(command: &EngineCommand, job: &Path) -> std::io::Result<Output> {
    Command::new(&command.program)
        .args(&command.args)
        .arg(job)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
}

fn stderr_excerpt(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut excerpt: String = stderr.trim().chars().take(500).collect();
    if excerpt.is_empty() {
        excerpt = format!("exit status {}", output.status);
    }
    excerpt
}

pub struct ExternalSolver {
    command: EngineCommand,
    work_dir: PathBuf,
}

impl ExternalSolver {
    pub fn new(command: EngineCommand, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl Solver for ExternalSolver {
    fn name(&self) -> &str {
        &self.command.program
    }

    async fn solve(&self, netlist: &Netlist) -> Result<SolvedNetwork, SolverFailure> {
        let job = SolveJob {
            netlist: netlist.to_spice(),
            directive: &netlist.directive,
        };
        let file = JobFile::write(&self.work_dir, &job)
            .await
            .map_err(|e| SolverFailure::Unavailable(format!("job file: {}", e)))?;

        let output = run(&self.command, &file.path)
            .await
            .map_err(|e| SolverFailure::Unavailable(format!("{}: {}", self.command.program, e)))?;

        if !output.status.success() {
            let reason = stderr_excerpt(&output);
            warn!(solver = %self.command.program, %reason, "solver rejected netlist");
            return Err(SolverFailure::Rejected(reason));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| SolverFailure::MalformedOutput(e.to_string()))
    }
}

pub struct ExternalPlotter {
    command: EngineCommand,
    work_dir: PathBuf,
}

impl ExternalPlotter {
    pub fn new(command: EngineCommand, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl PlotRenderer for ExternalPlotter {
    async fn render(
        &self,
        solved: &SolvedNetwork,
        options: &PlotOptions,
    ) -> Result<ImageArtifact, PlotError> {
        if let Some(parent) = options.output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PlotError::Failed(e.to_string()))?;
        }
        let file = JobFile::write(&self.work_dir, &PlotJob { solved, options })
            .await
            .map_err(|e| PlotError::Failed(format!("job file: {}", e)))?;

        let output = run(&self.command, &file.path)
            .await
            .map_err(|e| PlotError::Failed(format!("{}: {}", self.command.program, e)))?;
        if !output.status.success() {
            return Err(PlotError::Failed(stderr_excerpt(&output)));
        }
        if !tokio::fs::try_exists(&options.output).await.unwrap_or(false) {
            return Err(PlotError::Failed(format!(
                "{} produced no image",
                self.command.program
            )));
        }
        Ok(ImageArtifact::new(options.output.clone()))
    }
}
