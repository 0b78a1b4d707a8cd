//! Run and cleanup reports

use crate::step::StepState;
use serde::{Deserialize, Serialize};

/// How the forward pass of a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Every step returned continue
    Completed,
    /// A step halted the pipeline
    Halted,
    /// The build was interrupted
    Cancelled,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Completed => write!(f, "completed"),
            RunState::Halted => write!(f, "halted"),
            RunState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of one compensating action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupEntry {
    /// Step whose cleanup ran
    pub step: String,

    /// Whether the cleanup finished without errors
    pub success: bool,

    /// Error message if it failed
    pub error: Option<String>,
}

/// Outcome of the unwind, in the order the cleanups ran
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub entries: Vec<CleanupEntry>,
}

impl CleanupReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.success)
    }

    pub fn add_success(&mut self, step: impl Into<String>) {
        self.entries.push(CleanupEntry {
            step: step.into(),
            success: true,
            error: None,
        });
    }

    pub fn add_failure(&mut self, step: impl Into<String>, error: String) {
        self.entries.push(CleanupEntry {
            step: step.into(),
            success: false,
            error: Some(error),
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &CleanupEntry> {
        self.entries.iter().filter(|e| !e.success)
    }
}

/// Everything the runner observed during one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// How the forward pass ended
    pub state: RunState,

    /// Final state of every step, in pipeline order
    pub steps: Vec<(String, StepState)>,

    /// Compensating actions, most recent step first
    pub cleanup: CleanupReport,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Names of the steps whose forward action was invoked
    pub fn executed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|(_, state)| state.has_run())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let failures = self.cleanup.failures().count();
        write!(
            f,
            "{} after {} of {} steps in {}ms ({} cleanup failure(s))",
            self.state,
            self.executed_steps().len(),
            self.steps.len(),
            self.duration_ms,
            failures
        )
    }
}
