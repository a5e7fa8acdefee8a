//! Core error type and the offline inspection API shared by the bot and CLI.
//! No transport or solver dependencies.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::db::DatabaseError;
use crate::governor::{check_node_limit, SamplingGovernor, DEFAULT_MAX_NODES, DEFAULT_MAX_SAMPLES};
use crate::ingest::normalize;
use crate::netlist::{Netlist, NetlistError};
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum NetbotError {
    #[error("Parse error: {0}")]
    Parse(#[from] NetlistError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Limits applied when inspecting a netlist offline.
#[derive(Clone, Debug)]
pub struct InspectOptions {
    pub max_nodes: usize,
    pub max_samples: u64,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

/// What the bot would do with a netlist, short of solving it.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub file: Option<PathBuf>,
    pub title: Option<String>,
    pub elements: usize,
    pub nodes: usize,
    pub directive: String,
    pub analysis: String,
    /// Directive after sampling limits; equal to `directive` when untouched.
    pub governed_directive: String,
    pub advisory: Option<String>,
    /// Set when the node ceiling would stop the analysis.
    pub rejection: Option<String>,
}

impl InspectReport {
    pub fn would_solve(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Recursively discover netlist files (`.net`, `.cir`, `.sp`, `.spice`).
pub fn discover_netlists(dir: &Path) -> Result<Vec<PathBuf>, NetbotError> {
    let mut files = Vec::new();
    walk_dir(dir, &mut files, 0)?;
    files.sort();
    Ok(files)
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>, depth: usize) -> Result<(), NetbotError> {
    if depth > 20 {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with('.') || name == "target" {
                continue;
            }
            walk_dir(&path, files, depth + 1)?;
        } else if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
            if matches!(ext, "net" | "cir" | "sp" | "spice") {
                files.push(path);
            }
        }
    }
    Ok(())
}

pub struct NetbotCore;

impl NetbotCore {
    pub fn inspect_file(path: &Path, options: &InspectOptions) -> Result<InspectReport, NetbotError> {
        let bytes = std::fs::read(path)?;
        let mut report = Self::inspect_text(&String::from_utf8_lossy(&bytes), options)?;
        report.file = Some(path.to_path_buf());
        Ok(report)
    }

    pub fn inspect_text(text: &str, options: &InspectOptions) -> Result<InspectReport, NetbotError> {
        let netlist = Netlist::parse(&normalize(text))?;
        let rejection = check_node_limit(&netlist, options.max_nodes);
        let governed = SamplingGovernor::new(options.max_samples).govern(&netlist);

        Ok(InspectReport {
            file: None,
            title: netlist.title.clone(),
            elements: netlist.elements.len(),
            nodes: netlist.node_count(),
            directive: netlist.directive_source.clone(),
            analysis: netlist.directive.kind().to_string(),
            governed_directive: governed.netlist.directive_source.clone(),
            advisory: governed.advisory,
            rejection,
        })
    }
}
