//! Plot seam. Drawing is delegated; this module only names the artifacts
//! and the options a renderer receives.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::ChatId;
use crate::solver::SolvedNetwork;

/// Reference to a rendered image on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageArtifact {
    pub path: PathBuf,
}

impl ImageArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    /// Time-domain waveform of every trace.
    Transient,
    /// Magnitude/phase frequency response.
    Bode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotOptions {
    pub kind: PlotKind,
    pub decibel: bool,
    /// Restrict the plot to one output; `None` draws every trace.
    pub trace: Option<usize>,
    pub dpi: u32,
    pub output: PathBuf,
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("nothing to plot")]
    NoData,
    #[error("plot renderer timed out after {0:?}")]
    Timeout(Duration),
    #[error("plot renderer failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait PlotRenderer: Send + Sync {
    async fn render(
        &self,
        solved: &SolvedNetwork,
        options: &PlotOptions,
    ) -> Result<ImageArtifact, PlotError>;
}

/// Per-user artifact location: `tran_plot_<id>.png`, `bode_plot_<id>.png`,
/// or `bode_plot_<id>_<k>.png` for output `k` (0-based) of several.
pub fn artifact_path(dir: &Path, kind: PlotKind, chat: ChatId, index: Option<usize>) -> PathBuf {
    let stem = match kind {
        PlotKind::Transient => "tran_plot",
        PlotKind::Bode => "bode_plot",
    };
    let name = match index {
        Some(k) => format!("{}_{}_{}.png", stem, chat, k),
        None => format!("{}_{}.png", stem, chat),
    };
    dir.join(name)
}
