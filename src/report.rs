use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::command::{CommandKind, Status};
use crate::format::{Format, Framework};

/// Fixed report filename under the workdir root.
pub const STATUS_FILENAME: &str = "status.json";

/// Outcome of one command, as persisted in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReport {
    pub name: String,
    pub kind: CommandKind,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_format: Option<Format>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub requested: bool,
}

/// The audit record of one pipeline run: every command's terminal status,
/// timing, and artifact, in insertion order. Persisted after each command
/// terminates so an interrupted run still leaves a usable partial report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub model_name: String,
    pub framework: Framework,
    pub commands: Vec<CommandReport>,
}

impl RunReport {
    pub fn new(model_name: impl Into<String>, framework: Framework) -> Self {
        Self {
            model_name: model_name.into(),
            framework,
            commands: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: CommandReport) {
        self.commands.push(entry);
    }

    pub fn save(&self, workdir: &Path) -> Result<()> {
        let path = workdir.join(STATUS_FILENAME);
        let json = serde_json::to_string_pretty(self).context("failed to serialize run report")?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    pub fn load(workdir: &Path) -> Result<Self> {
        let path = workdir.join(STATUS_FILENAME);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed report at {}", path.display()))
    }

    /// Requested commands that ended FAIL; auto-inserted prerequisites do
    /// not count toward the user's outcome.
    pub fn requested_failures(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| c.requested && c.status == Status::Fail)
            .count()
    }
}
