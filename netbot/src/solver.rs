//! Solver seam
//!
//! The numeric solver is an external collaborator. Everything it returns is
//! described by [`SolvedNetwork`]; every way it can fail is folded into
//! [`SolveError`] at a single point, [`solve_bounded`].

use std::time::Duration;

use async_trait::async_trait;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::netlist::{AnalysisDirective, ElementKind, Netlist, NetlistError};
use crate::plot::PlotError;

/// Potential of one non-reference node, relative to ground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePotential {
    pub node: String,
    pub value: Complex64,
}

/// Voltage and current of one element, passive sign convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchQuantity {
    pub name: String,
    pub kind: ElementKind,
    pub voltage: Complex64,
    pub current: Complex64,
}

impl BranchQuantity {
    /// Complex power `v * conj(i)`; the real part for DC.
    pub fn power(&self) -> Complex64 {
        self.voltage * self.current.conj()
    }
}

/// One swept or time-domain quantity, sampled along `axis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub label: String,
    pub axis: Vec<f64>,
    pub values: Vec<Complex64>,
}

/// Solver output for one orchestration call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolvedNetwork {
    /// The directive actually executed, after any sampling rewrite.
    pub directive: AnalysisDirective,
    pub node_count: usize,
    #[serde(default)]
    pub node_potentials: Vec<NodePotential>,
    #[serde(default)]
    pub branches: Vec<BranchQuantity>,
    /// Waveforms for `.tran` or multi-frequency `.ac`, one per output.
    #[serde(default)]
    pub traces: Vec<Trace>,
}

#[derive(Debug, Error)]
pub enum SolverFailure {
    #[error("solver rejected the netlist: {0}")]
    Rejected(String),
    #[error("solver timed out after {0:?}")]
    Timeout(Duration),
    #[error("solver unavailable: {0}")]
    Unavailable(String),
    #[error("malformed solver output: {0}")]
    MalformedOutput(String),
}

#[derive(Debug, Error)]
pub enum SolveCause {
    #[error(transparent)]
    Parse(#[from] NetlistError),
    #[error(transparent)]
    Solver(#[from] SolverFailure),
    #[error(transparent)]
    Plot(#[from] PlotError),
}

/// Any failure between a stored submission and a rendered result.
///
/// Carries the raw submission for the solver-error stream. The cause is
/// logged but never shown to the user.
#[derive(Debug, Error)]
#[error("analysis failed: {cause}")]
pub struct SolveError {
    pub raw_netlist: String,
    pub cause: SolveCause,
}

impl SolveError {
    pub fn new(raw_netlist: impl Into<String>, cause: impl Into<SolveCause>) -> Self {
        Self {
            raw_netlist: raw_netlist.into(),
            cause: cause.into(),
        }
    }
}

#[async_trait]
pub trait Solver: Send + Sync {
    fn name(&self) -> &str;

    async fn solve(&self, netlist: &Netlist) -> Result<SolvedNetwork, SolverFailure>;
}

/// Run the solver under a deadline.
pub async fn solve_bounded(
    solver: &dyn Solver,
    netlist: &Netlist,
    timeout: Duration,
) -> Result<SolvedNetwork, SolverFailure> {
    match tokio::time::timeout(timeout, solver.solve(netlist)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(solver = solver.name(), ?timeout, "solver deadline exceeded");
            Err(SolverFailure::Timeout(timeout))
        }
    }
}
