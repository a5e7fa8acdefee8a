//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use netbot::netlist::AnalysisKind;
use netbot::plot::{ImageArtifact, PlotError, PlotOptions, PlotRenderer};
use netbot::solver::{BranchQuantity, NodePotential, SolverFailure, Trace};
use netbot::transport::UserProfile;
use netbot::{
    Bot, BotConfig, ChatId, Inbound, InboundEvent, Netlist, SolvedNetwork, Solver, TextFormat,
    Transport, TransportError, UserId,
};
use num_complex::Complex64;
use tempfile::TempDir;

pub const ADMIN: i64 = 1;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat: ChatId,
        text: String,
        format: TextFormat,
    },
    Image {
        chat: ChatId,
        path: PathBuf,
    },
    Document {
        chat: ChatId,
        path: PathBuf,
    },
}

impl Sent {
    pub fn text(&self) -> Option<&str> {
        match self {
            Sent::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn chat(&self) -> ChatId {
        match self {
            Sent::Text { chat, .. } | Sent::Image { chat, .. } | Sent::Document { chat, .. } => {
                *chat
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    blocked: HashSet<ChatId>,
    profiles: HashMap<UserId, UserProfile>,
    failing_documents: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocking(mut self, chat: i64) -> Self {
        self.blocked.insert(ChatId(chat));
        self
    }

    /// Document uploads fail with an I/O error.
    pub fn failing_documents(mut self) -> Self {
        self.failing_documents = true;
        self
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profiles.insert(profile.id, profile);
        self
    }

    /// Everything sent so far, draining the record.
    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn snapshot(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<(), TransportError> {
        if self.blocked.contains(&chat) {
            return Err(TransportError::Blocked(chat));
        }
        self.sent.lock().unwrap().push(Sent::Text {
            chat,
            text: text.to_string(),
            format,
        });
        Ok(())
    }

    async fn send_image(&self, chat: ChatId, path: &Path) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(Sent::Image {
            chat,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn send_document(&self, chat: ChatId, path: &Path) -> Result<(), TransportError> {
        if self.failing_documents {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "upload refused",
            )));
        }
        self.sent.lock().unwrap().push(Sent::Document {
            chat,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn lookup_user(&self, user: UserId) -> Result<UserProfile, TransportError> {
        self.profiles
            .get(&user)
            .cloned()
            .ok_or(TransportError::NotFound(user))
    }
}

/// Deterministic stand-in for the numeric solver: every node sits at a
/// fixed potential and every branch carries a fixed current.
#[derive(Default)]
pub struct ScriptedSolver {
    calls: AtomicUsize,
    pub executed: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
}

impl ScriptedSolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every later solve is rejected with `reason`.
    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock().unwrap() = Some(reason.to_string());
    }
}

#[async_trait]
impl Solver for ScriptedSolver {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn solve(&self, netlist: &Netlist) -> Result<SolvedNetwork, SolverFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.executed
            .lock()
            .unwrap()
            .push(netlist.directive_source.clone());
        if let Some(reason) = self.failure.lock().unwrap().clone() {
            return Err(SolverFailure::Rejected(reason));
        }

        let complex = netlist.directive.kind() != AnalysisKind::OperatingPoint;
        let value = |k: usize| {
            let k = k as f64 + 1.0;
            if complex {
                Complex64::new(k, k)
            } else {
                Complex64::new(k, 0.0)
            }
        };

        let node_potentials = netlist
            .node_names()
            .into_iter()
            .enumerate()
            .map(|(k, node)| NodePotential {
                node: node.to_string(),
                value: value(k),
            })
            .collect();
        let branches = netlist
            .elements
            .iter()
            .enumerate()
            .map(|(k, e)| BranchQuantity {
                name: e.name.clone(),
                kind: e.kind,
                voltage: value(k),
                current: value(k) * 0.001,
            })
            .collect();
        let traces = (0..netlist.output_count())
            .map(|k| Trace {
                label: format!("out{}", k),
                axis: vec![0.0, 1.0, 2.0],
                values: vec![value(k); 3],
            })
            .collect();

        Ok(SolvedNetwork {
            directive: netlist.directive.clone(),
            node_count: netlist.node_count(),
            node_potentials,
            branches,
            traces,
        })
    }
}

#[derive(Default)]
pub struct CountingPlotter {
    calls: AtomicUsize,
    pub options: Mutex<Vec<PlotOptions>>,
}

impl CountingPlotter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlotRenderer for CountingPlotter {
    async fn render(
        &self,
        _solved: &SolvedNetwork,
        options: &PlotOptions,
    ) -> Result<ImageArtifact, PlotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.options.lock().unwrap().push(options.clone());
        Ok(ImageArtifact::new(options.output.clone()))
    }
}

pub struct Harness {
    pub bot: Arc<Bot>,
    pub transport: Arc<RecordingTransport>,
    pub solver: Arc<ScriptedSolver>,
    pub plotter: Arc<CountingPlotter>,
    pub config: BotConfig,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_transport(RecordingTransport::new())
    }

    pub fn with_transport(transport: RecordingTransport) -> Self {
        let dir = TempDir::new().unwrap();
        let config = BotConfig {
            admins: vec![ADMIN],
            data_dir: dir.path().join("users"),
            log_dir: dir.path().join("logs"),
            ..BotConfig::default()
        };
        Self::build(config, transport, dir)
    }

    pub fn build(config: BotConfig, transport: RecordingTransport, dir: TempDir) -> Self {
        let transport = Arc::new(transport);
        let solver = Arc::new(ScriptedSolver::default());
        let plotter = Arc::new(CountingPlotter::default());
        let bot = Bot::new(&config, solver.clone(), plotter.clone(), transport.clone()).unwrap();
        Self {
            bot: Arc::new(bot),
            transport,
            solver,
            plotter,
            config,
            dir,
        }
    }

    pub async fn command(&self, user: i64, name: &str) -> netbot::DispatchOutcome {
        let mut parts = name.split_whitespace();
        let name = parts.next().unwrap_or_default().to_string();
        let args = parts.map(str::to_string).collect();
        self.bot
            .handle(Inbound::private(user, InboundEvent::Command { name, args }))
            .await
    }

    pub async fn text(&self, user: i64, text: &str) {
        self.bot
            .handle(Inbound::private(
                user,
                InboundEvent::Text {
                    text: text.to_string(),
                },
            ))
            .await;
    }

    pub async fn document(&self, user: i64, content: &str) {
        self.bot
            .handle(Inbound::private(
                user,
                InboundEvent::Document {
                    file_name: Some("netlist.net".into()),
                    content: content.to_string(),
                },
            ))
            .await;
    }
}

/// Series resistor ladder with `nodes` non-reference nodes.
pub fn ladder(nodes: usize) -> String {
    let mut text = String::from("V1 1 0 1\n");
    for n in 1..nodes {
        text.push_str(&format!("R{} {} {} 1k\n", n, n, n + 1));
    }
    text.push_str(&format!("RL {} 0 1k\n.op\n", nodes));
    text
}
