//! Sample-count and node-count limits applied before a solve.

use tracing::info;

use crate::netlist::{AnalysisDirective, Netlist};

pub const DEFAULT_MAX_SAMPLES: u64 = 2000;
pub const DEFAULT_MAX_NODES: usize = 40;

const SOLVER_PROJECT: &str = "[SpicePy project](https://github.com/giaccone/SpicePy)";

/// Result of governing a netlist: the netlist to solve, and the advisory to
/// send first when the directive was rewritten.
#[derive(Debug, Clone)]
pub struct Governed {
    pub netlist: Netlist,
    pub advisory: Option<String>,
}

impl Governed {
    pub fn was_rewritten(&self) -> bool {
        self.advisory.is_some()
    }
}

/// Caps the number of samples an analysis may request. Never rejects.
#[derive(Debug, Clone, Copy)]
pub struct SamplingGovernor {
    max_samples: u64,
}

impl Default for SamplingGovernor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SAMPLES)
    }
}

impl SamplingGovernor {
    pub fn new(max_samples: u64) -> Self {
        Self {
            max_samples: max_samples.max(2),
        }
    }

    pub fn max_samples(&self) -> u64 {
        self.max_samples
    }

    pub fn govern(&self, netlist: &Netlist) -> Governed {
        let rewritten = match &netlist.directive {
            AnalysisDirective::OperatingPoint => None,
            AnalysisDirective::TimeDomain { .. } => self.limit_time_domain(netlist),
            AnalysisDirective::FrequencySweep { .. } => self.limit_frequency_sweep(netlist),
        };

        match rewritten {
            Some((directive, requested)) => {
                let limited = netlist.with_directive(directive);
                info!(
                    analysis = %netlist.directive.kind(),
                    requested,
                    limit = self.max_samples,
                    "analysis sample count limited"
                );
                let advisory = self.advisory(netlist, &limited, requested);
                Governed {
                    netlist: limited,
                    advisory: Some(advisory),
                }
            }
            None => Governed {
                netlist: netlist.clone(),
                advisory: None,
            },
        }
    }

    /// `step' = duration / (max - 1)` once `duration / step` exceeds the cap.
    fn limit_time_domain(&self, netlist: &Netlist) -> Option<(AnalysisDirective, u64)> {
        let AnalysisDirective::TimeDomain {
            duration, start, ..
        } = netlist.directive
        else {
            return None;
        };
        let samples = netlist.directive.time_samples()?;
        if samples <= self.max_samples as f64 + 1e-6 {
            return None;
        }
        let step = duration / (self.max_samples - 1) as f64;
        Some((
            AnalysisDirective::TimeDomain {
                step,
                duration,
                start,
            },
            samples.round() as u64,
        ))
    }

    /// Points scaled by `max / actual`, rounded up, then stepped down while
    /// the endpoint of a `dec`/`oct` sweep still pushes the resolved count
    /// over the cap. Single-frequency sweeps are never limited.
    fn limit_frequency_sweep(&self, netlist: &Netlist) -> Option<(AnalysisDirective, u64)> {
        let AnalysisDirective::FrequencySweep { points, span } = netlist.directive else {
            return None;
        };
        let actual = netlist.directive.frequency_points()?;
        if actual <= 1 || actual <= self.max_samples {
            return None;
        }
        let scale = self.max_samples as f64 / actual as f64;
        let mut scaled = ((points as f64 * scale).ceil() as u64).max(1);
        let mut limited = AnalysisDirective::FrequencySweep {
            points: scaled,
            span,
        };
        while scaled > 1 && limited.frequency_points().unwrap_or(0) > self.max_samples {
            scaled -= 1;
            limited = AnalysisDirective::FrequencySweep {
                points: scaled,
                span,
            };
        }
        Some((limited, actual))
    }

    fn advisory(&self, original: &Netlist, limited: &Netlist, requested: u64) -> String {
        let mut mex = format!(
            "Your netlist defines a '{}' analysis with *{}* samples\n",
            original.directive.kind(),
            requested
        );
        mex.push_str("Since this bot runs on a limited hardware shared by many users\n");
        mex.push_str(&format!(
            "The analysis has been limited to *{}* samples:\n",
            self.max_samples
        ));
        mex.push_str(&format!("original analysis: `{}`\n", original.directive_source));
        mex.push_str(&format!("new analysis: `{}`", limited.directive_source));
        mex
    }
}

/// Fixed-format rejection for netlists above the node ceiling, or `None`
/// when the netlist may proceed.
pub fn check_node_limit(netlist: &Netlist, max_nodes: usize) -> Option<String> {
    let nodes = netlist.node_count();
    if nodes <= max_nodes {
        return None;
    }
    let mut mex = format!("Your netlist includes more than {} nodes.\n", max_nodes);
    mex.push_str(&format!(
        "*The maximum allowed number on this bot is {}.*\n",
        max_nodes
    ));
    mex.push_str("Please reduce the number of nodes or take a look to the computational core of this bot ");
    mex.push_str("that does not have this limitation:\n");
    mex.push_str(SOLVER_PROJECT);
    Some(mex)
}
