//! Analysis orchestration
//!
//! `parse → node limit → sampling governor → solve → post-process → audit`.
//!
//! Every failure after the node check comes back as a [`SolveError`] and
//! leaves exactly one entry in the solver-error stream. A successful run
//! yields exactly one [`RenderedResult`] and one stat entry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::audit::AuditLog;
use crate::governor::{check_node_limit, SamplingGovernor, DEFAULT_MAX_NODES};
use crate::netlist::{AnalysisKind, Netlist};
use crate::plot::{artifact_path, ImageArtifact, PlotError, PlotKind, PlotOptions, PlotRenderer};
use crate::render::ResultRenderer;
use crate::session::{ChatId, Preferences, UserId};
use crate::solver::{solve_bounded, SolveError, SolvedNetwork, Solver};
use crate::transport::{TextFormat, Transport, TransportError};

pub const FAILURE_NOTICE: &str =
    "*Something went wrong with your netlist*.\nPlease check the netlist format.";

/// The response to one successful analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedResult {
    Text(String),
    SingleImage(ImageArtifact),
    /// One frequency response per output quantity, in output order.
    ImageSet(Vec<ImageArtifact>),
}

impl RenderedResult {
    pub async fn deliver(&self, chat: ChatId, transport: &dyn Transport) -> Result<(), TransportError> {
        match self {
            RenderedResult::Text(text) => {
                transport.send_text(chat, text, TextFormat::Markdown).await
            }
            RenderedResult::SingleImage(image) => transport.send_image(chat, &image.path).await,
            RenderedResult::ImageSet(images) => {
                for image in images {
                    transport.send_image(chat, &image.path).await?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Orchestration {
    Rendered {
        result: RenderedResult,
        kind: AnalysisKind,
    },
    /// Refused before the solver ran; the text is the user-facing reason.
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_nodes: usize,
    pub plot_dir: PathBuf,
    pub plot_dpi: u32,
    pub solve_timeout: Duration,
    pub plot_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            plot_dir: PathBuf::from("plots"),
            plot_dpi: 150,
            solve_timeout: Duration::from_secs(60),
            plot_timeout: Duration::from_secs(60),
        }
    }
}

/// One submission to analyze on behalf of a user.
#[derive(Debug, Clone)]
pub struct AnalysisRequest<'a> {
    pub chat: ChatId,
    pub user: UserId,
    pub netlist_text: &'a str,
    pub preferences: Preferences,
}

pub struct AnalysisOrchestrator {
    solver: Arc<dyn Solver>,
    plotter: Arc<dyn PlotRenderer>,
    governor: SamplingGovernor,
    audit: Arc<AuditLog>,
    settings: OrchestratorSettings,
}

impl AnalysisOrchestrator {
    pub fn new(
        solver: Arc<dyn Solver>,
        plotter: Arc<dyn PlotRenderer>,
        governor: SamplingGovernor,
        audit: Arc<AuditLog>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            solver,
            plotter,
            governor,
            audit,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run one analysis. An advisory about a rewritten directive is sent on
    /// `transport` before the solve; the result itself is returned for the
    /// caller to deliver.
    pub async fn run(
        &self,
        request: AnalysisRequest<'_>,
        transport: &dyn Transport,
    ) -> Result<Orchestration, SolveError> {
        let outcome = self.pipeline(&request, transport).await;

        match &outcome {
            Ok(Orchestration::Rendered { kind, .. }) => {
                if let Err(e) = self.audit.record_stat(*kind, request.user) {
                    error!(error = %e, "failed to append stat entry");
                }
            }
            Ok(Orchestration::Rejected(_)) => {
                info!(user_id = request.user.0, "netlist rejected before solve");
            }
            Err(err) => {
                warn!(user_id = request.user.0, cause = %err.cause, "analysis failed");
                if let Err(e) = self.audit.record_failure(request.user, &err.raw_netlist) {
                    error!(error = %e, "failed to append solver-error entry");
                }
            }
        }
        outcome
    }

    async fn pipeline(
        &self,
        request: &AnalysisRequest<'_>,
        transport: &dyn Transport,
    ) -> Result<Orchestration, SolveError> {
        let raw = request.netlist_text;
        let netlist = Netlist::parse(raw).map_err(|e| SolveError::new(raw, e))?;

        if let Some(reason) = check_node_limit(&netlist, self.settings.max_nodes) {
            return Ok(Orchestration::Rejected(reason));
        }

        let governed = self.governor.govern(&netlist);
        if let Some(advisory) = &governed.advisory {
            // advisories stand even when the solve later fails
            if let Err(e) = transport
                .send_text(request.chat, advisory, TextFormat::Markdown)
                .await
            {
                warn!(user_id = request.user.0, error = %e, "advisory not delivered");
            }
        }

        let netlist = governed.netlist;
        let kind = netlist.directive.kind();
        debug!(user_id = request.user.0, analysis = %kind, solver = self.solver.name(), "solving");

        let solved = solve_bounded(self.solver.as_ref(), &netlist, self.settings.solve_timeout)
            .await
            .map_err(|e| SolveError::new(raw, e))?;

        let result = self
            .post_process(&netlist, &solved, request)
            .await
            .map_err(|e| SolveError::new(raw, e))?;

        Ok(Orchestration::Rendered { result, kind })
    }

    async fn post_process(
        &self,
        netlist: &Netlist,
        solved: &SolvedNetwork,
        request: &AnalysisRequest<'_>,
    ) -> Result<RenderedResult, PlotError> {
        let kind = netlist.directive.kind();
        match kind {
            AnalysisKind::OperatingPoint => Ok(RenderedResult::Text(ResultRenderer::render(
                kind,
                solved,
                &request.preferences,
            ))),
            AnalysisKind::FrequencySweep if netlist.directive.is_single_frequency() => Ok(
                RenderedResult::Text(ResultRenderer::render(kind, solved, &request.preferences)),
            ),
            AnalysisKind::TimeDomain => {
                let image = self
                    .plot(solved, PlotKind::Transient, request, None)
                    .await?;
                Ok(RenderedResult::SingleImage(image))
            }
            AnalysisKind::FrequencySweep => {
                let outputs = netlist.output_count();
                if outputs == 1 {
                    let image = self.plot(solved, PlotKind::Bode, request, None).await?;
                    return Ok(RenderedResult::SingleImage(image));
                }
                let mut images = Vec::with_capacity(outputs);
                for k in 0..outputs {
                    images.push(self.plot(solved, PlotKind::Bode, request, Some(k)).await?);
                }
                Ok(RenderedResult::ImageSet(images))
            }
        }
    }

    async fn plot(
        &self,
        solved: &SolvedNetwork,
        kind: PlotKind,
        request: &AnalysisRequest<'_>,
        index: Option<usize>,
    ) -> Result<ImageArtifact, PlotError> {
        if solved.traces.is_empty() {
            return Err(PlotError::NoData);
        }
        let options = PlotOptions {
            kind,
            decibel: request.preferences.decibel,
            trace: index,
            dpi: self.settings.plot_dpi,
            output: artifact_path(&self.settings.plot_dir, kind, request.chat, index),
        };
        let timeout = self.settings.plot_timeout;
        tokio::time::timeout(timeout, self.plotter.render(solved, &options))
            .await
            .map_err(|_| PlotError::Timeout(timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{BranchQuantity, SolverFailure, Trace};
    use crate::transport::UserProfile;
    use async_trait::async_trait;
    use num_complex::Complex64;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send_text(&self, _: ChatId, text: &str, _: TextFormat) -> Result<(), TransportError> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(())
        }
        async fn send_image(&self, _: ChatId, _: &Path) -> Result<(), TransportError> {
            Ok(())
        }
        async fn send_document(&self, _: ChatId, _: &Path) -> Result<(), TransportError> {
            Ok(())
        }
        async fn lookup_user(&self, user: UserId) -> Result<UserProfile, TransportError> {
            Err(TransportError::NotFound(user))
        }
    }

    #[derive(Default)]
    struct Echo {
        calls: AtomicUsize,
        /// Reported in place of the submitted directive when set.
        reported: Option<crate::netlist::AnalysisDirective>,
    }

    #[async_trait]
    impl Solver for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn solve(&self, netlist: &Netlist) -> Result<SolvedNetwork, SolverFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SolvedNetwork {
                directive: self
                    .reported
                    .clone()
                    .unwrap_or_else(|| netlist.directive.clone()),
                node_count: netlist.node_count(),
                node_potentials: vec![],
                branches: vec![BranchQuantity {
                    name: "R1".into(),
                    kind: crate::netlist::ElementKind::Resistor,
                    voltage: Complex64::new(1.0, 0.0),
                    current: Complex64::new(1.0, 0.0),
                }],
                traces: vec![Trace {
                    label: "v(1)".into(),
                    axis: vec![0.0, 1.0],
                    values: vec![Complex64::new(0.0, 0.0); 2],
                }],
            })
        }
    }

    struct PathPlotter;

    #[async_trait]
    impl PlotRenderer for PathPlotter {
        async fn render(&self, _: &SolvedNetwork, options: &PlotOptions) -> Result<ImageArtifact, PlotError> {
            Ok(ImageArtifact::new(options.output.clone()))
        }
    }

    fn orchestrator(dir: &TempDir, solver: Arc<Echo>) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(
            solver,
            Arc::new(PathPlotter),
            SamplingGovernor::default(),
            Arc::new(AuditLog::open(dir.path().join("logs")).unwrap()),
            OrchestratorSettings {
                plot_dir: dir.path().join("plots"),
                ..OrchestratorSettings::default()
            },
        )
    }

    fn request(text: &str) -> AnalysisRequest<'_> {
        AnalysisRequest {
            chat: ChatId(8),
            user: UserId(8),
            netlist_text: text,
            preferences: Preferences::default(),
        }
    }

    #[tokio::test]
    async fn test_op_renders_text() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir, Arc::new(Echo::default()));
        let out = orch
            .run(request("V1 1 0 1\nR1 1 0 1\n.op\n"), &Recorder::default())
            .await
            .unwrap();
        match out {
            Orchestration::Rendered { result: RenderedResult::Text(text), kind } => {
                assert_eq!(kind, AnalysisKind::OperatingPoint);
                assert!(text.contains("*branch quantities*"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_op_notation_ignores_reported_directive() {
        let dir = TempDir::new().unwrap();
        let solver = Echo {
            reported: Some(crate::netlist::AnalysisDirective::parse(".ac lin 1 50 50").unwrap()),
            ..Echo::default()
        };
        let orch = orchestrator(&dir, Arc::new(solver));
        let mut req = request("V1 1 0 1\nR1 1 0 1\n.op\n");
        req.preferences.polar = true;
        let out = orch.run(req, &Recorder::default()).await.unwrap();
        let Orchestration::Rendered { result: RenderedResult::Text(text), .. } = out else {
            panic!("expected text");
        };
        assert!(!text.contains('°'));
        assert!(text.contains("p = "));
    }

    #[tokio::test]
    async fn test_multi_output_ac_yields_ordered_image_set() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir, Arc::new(Echo::default()));
        let out = orch
            .run(
                request("V1 1 0 1\nR1 1 2 1k\nC1 2 0 1u\n.tf v(2) V1 i(R1) V1\n.ac dec 10 1 1k\n"),
                &Recorder::default(),
            )
            .await
            .unwrap();
        let Orchestration::Rendered { result: RenderedResult::ImageSet(images), .. } = out else {
            panic!("expected an image set");
        };
        assert_eq!(images.len(), 2);
        assert!(images[0].path.ends_with("bode_plot_8_0.png"));
        assert!(images[1].path.ends_with("bode_plot_8_1.png"));
    }

    #[tokio::test]
    async fn test_parse_failure_is_solve_error() {
        let dir = TempDir::new().unwrap();
        let solver = Arc::new(Echo::default());
        let orch = orchestrator(&dir, solver.clone());
        let err = orch
            .run(request("V1 1 0 1\nR1 1 0 1\n.ac dec\n"), &Recorder::default())
            .await
            .unwrap_err();
        assert!(err.raw_netlist.contains(".ac dec"));
        assert_eq!(solver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_advisory_sent_before_solve() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir, Arc::new(Echo::default()));
        let transport = Recorder::default();
        let out = orch
            .run(request("V1 1 0 1\nR1 1 0 1\n.tran 1u 1\n"), &transport)
            .await
            .unwrap();
        assert!(matches!(
            out,
            Orchestration::Rendered { result: RenderedResult::SingleImage(_), .. }
        ));
        let texts = transport.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("new analysis: `.tran"));
    }
}
