//! Bot configuration, read from a JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::NetbotError;
use crate::governor::{DEFAULT_MAX_NODES, DEFAULT_MAX_SAMPLES};
use crate::session::UserId;

/// An external program the bot runs for solving or plotting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EngineCommand {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub admins: Vec<i64>,
    /// Session database and plot artifacts.
    pub data_dir: PathBuf,
    /// The three audit streams.
    pub log_dir: PathBuf,
    pub max_nodes: usize,
    pub max_samples: u64,
    /// File holding the text sent by the broadcast commands.
    pub broadcast_message: Option<PathBuf>,
    pub solver: EngineCommand,
    pub plotter: EngineCommand,
    pub plot_dpi: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            admins: Vec::new(),
            data_dir: PathBuf::from("users"),
            log_dir: PathBuf::from("logs"),
            max_nodes: DEFAULT_MAX_NODES,
            max_samples: DEFAULT_MAX_SAMPLES,
            broadcast_message: None,
            solver: EngineCommand::new("netbot-solver"),
            plotter: EngineCommand::new("netbot-plotter"),
            plot_dpi: 150,
        }
    }
}

impl BotConfig {
    pub fn load(path: &Path) -> Result<Self, NetbotError> {
        let text = std::fs::read_to_string(path)?;
        let config: BotConfig = serde_json::from_str(&text)
            .map_err(|e| NetbotError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NetbotError> {
        if self.max_nodes == 0 {
            return Err(NetbotError::Config("max_nodes must be positive".into()));
        }
        if self.max_samples < 2 {
            return Err(NetbotError::Config("max_samples must be at least 2".into()));
        }
        for (name, engine) in [("solver", &self.solver), ("plotter", &self.plotter)] {
            if engine.timeout_secs == 0 {
                return Err(NetbotError::Config(format!("{} timeout must be positive", name)));
            }
        }
        if self.plot_dpi == 0 {
            return Err(NetbotError::Config("plot_dpi must be positive".into()));
        }
        Ok(())
    }

    pub fn admin_ids(&self) -> Vec<UserId> {
        self.admins.iter().copied().map(UserId).collect()
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("netbot.db")
    }

    pub fn plot_dir(&self) -> PathBuf {
        self.data_dir.join("plots")
    }
}
