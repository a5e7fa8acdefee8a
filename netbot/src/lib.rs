//! netbot - conversational front-end for circuit analysis
//!
//! Users submit SPICE-style netlists through a chat transport; the bot
//! keeps per-user display preferences, bounds the requested analysis to a
//! shared sample budget, runs an external solver and answers with either a
//! text report or plots.
//!
//! # Quick Start
//!
//! ```no_run
//! use netbot::{InspectOptions, NetbotCore};
//! use std::path::Path;
//!
//! let report = NetbotCore::inspect_file(
//!     Path::new("rc_filter.net"),
//!     &InspectOptions::default(),
//! ).unwrap();
//!
//! println!("{} nodes, analysis {}", report.nodes, report.governed_directive);
//! if let Some(advisory) = &report.advisory {
//!     println!("{}", advisory);
//! }
//! ```
//!
//! # Components
//!
//! - **ConfigStore**: per-user preferences and the netlist-capture flag
//! - **NetlistIngestion**: canonical submissions from files or messages
//! - **SamplingGovernor**: sample and node limits, with advisories
//! - **AnalysisOrchestrator**: solve, post-process, audit
//! - **ResultRenderer**: branch and node-potential text blocks
//! - **AuditLog**: stat, solver-error and other-error streams
//! - **AccessControl**: group filter and administrator allow-list

pub mod access;
pub mod audit;
pub mod commands;
pub mod config;
pub mod core;
pub mod db;
pub mod dispatch;
pub mod engine;
pub mod governor;
pub mod ingest;
pub mod netlist;
pub mod orchestrator;
pub mod plot;
pub mod render;
pub mod session;
pub mod solver;
pub mod store;
pub mod transport;
pub mod units;

// Re-export main types
pub use access::{AccessDenied, AllowList, GroupFilter, Guard, GuardChain};
pub use audit::{AuditLog, AuditStream, StatsSummary};
pub use config::{BotConfig, EngineCommand};
pub use crate::core::{discover_netlists, InspectOptions, InspectReport, NetbotCore, NetbotError};
pub use dispatch::{serve, Bot, DispatchOutcome, SessionRouter};
pub use governor::SamplingGovernor;
pub use ingest::{NetlistIngestion, NetlistSubmission};
pub use netlist::{AnalysisDirective, AnalysisKind, Netlist, NetlistError};
pub use orchestrator::{AnalysisOrchestrator, Orchestration, RenderedResult};
pub use render::ResultRenderer;
pub use session::{ChatId, Preferences, UserId};
pub use solver::{SolveError, SolvedNetwork, Solver};
pub use store::ConfigStore;
pub use transport::{Inbound, InboundEvent, TextFormat, Transport, TransportError};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        AnalysisKind, Bot, BotConfig, ChatId, DispatchOutcome, Inbound, InboundEvent, NetbotError,
        Netlist, Preferences, RenderedResult, TextFormat, Transport, UserId,
    };
}
