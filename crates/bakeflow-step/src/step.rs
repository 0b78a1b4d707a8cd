//! Step contract

use crate::state::{ERROR, StateBag};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Verdict returned by [`Step::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Proceed with the next step
    Continue,
    /// Stop the pipeline; the error is in the state bag under [`ERROR`]
    Halt,
    /// The build was interrupted while this step ran
    Cancelled,
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepAction::Continue => write!(f, "continue"),
            StepAction::Halt => write!(f, "halt"),
            StepAction::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle of a single step inside one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    NotStarted,
    Running,
    Continue,
    Halted,
    Cancelled,
}

impl StepState {
    /// Whether `run` was invoked, and therefore `cleanup` is owed.
    pub fn has_run(&self) -> bool {
        !matches!(self, StepState::NotStarted)
    }
}

impl From<StepAction> for StepState {
    fn from(action: StepAction) -> Self {
        match action {
            StepAction::Continue => StepState::Continue,
            StepAction::Halt => StepState::Halted,
            StepAction::Cancelled => StepState::Cancelled,
        }
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepState::NotStarted => write!(f, "not-started"),
            StepState::Running => write!(f, "running"),
            StepState::Continue => write!(f, "continue"),
            StepState::Halted => write!(f, "halted"),
            StepState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A unit of pipeline work with a forward action and a compensating cleanup.
///
/// Collaborators are bound at construction; a step keeps no state of its own
/// between builds. Everything a later step or the cleanup needs goes through
/// the [`StateBag`].
#[async_trait]
pub trait Step: Send + Sync {
    /// Step name for logs and reports
    fn name(&self) -> &str;

    /// State keys this step reads in `run`. Checked by
    /// [`crate::Runner::validate`] against what earlier steps provide.
    fn reads(&self) -> &[&'static str] {
        &[]
    }

    /// State keys this step writes in `run`.
    fn writes(&self) -> &[&'static str] {
        &[]
    }

    /// Forward action.
    async fn run(&self, cancel: &CancellationToken, state: &mut StateBag) -> StepAction;

    /// Compensating action. Called once after the pipeline stops, for every
    /// step whose `run` was invoked, whatever its verdict. Must tolerate
    /// missing outputs and degrade to a no-op.
    async fn cleanup(&self, _state: &mut StateBag) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Record `error` as the reason the pipeline stops and return
/// [`StepAction::Halt`].
pub fn halt(state: &mut StateBag, error: impl Into<anyhow::Error>) -> StepAction {
    let error = error.into();
    tracing::error!("{:#}", error);
    state.put(ERROR, error);
    StepAction::Halt
}
