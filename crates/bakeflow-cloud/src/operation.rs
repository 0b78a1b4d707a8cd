//! Long-running operation handles and their states

use crate::error_response::ErrorResponse;
use bakeflow_step::PollStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provisioning state reported by an operation status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    Succeeded,
    Failed,
    Canceled,
    Deleted,
    /// Any non-terminal state (`InProgress`, `Accepted`, `Running`, ...)
    InProgress(String),
}

impl OperationState {
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "succeeded" => OperationState::Succeeded,
            "failed" => OperationState::Failed,
            "canceled" | "cancelled" => OperationState::Canceled,
            "deleted" => OperationState::Deleted,
            _ => OperationState::InProgress(status.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationState::InProgress(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationState::Succeeded)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationState::Succeeded => write!(f, "Succeeded"),
            OperationState::Failed => write!(f, "Failed"),
            OperationState::Canceled => write!(f, "Canceled"),
            OperationState::Deleted => write!(f, "Deleted"),
            OperationState::InProgress(s) => write!(f, "{}", s),
        }
    }
}

/// One observation of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    pub state: OperationState,
    pub error: Option<ErrorResponse>,
}

impl OperationStatus {
    pub fn new(state: OperationState) -> Self {
        Self { state, error: None }
    }

    pub fn succeeded() -> Self {
        Self::new(OperationState::Succeeded)
    }

    pub fn failed(error: ErrorResponse) -> Self {
        Self {
            state: OperationState::Failed,
            error: Some(error),
        }
    }
}

impl PollStatus for OperationStatus {
    fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// How the status of a pending operation is observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollKind {
    /// `Azure-AsyncOperation` header: the body carries a `status` field.
    AsyncOperation(String),
    /// `Location` header: 202 while running, 200/204 when done.
    Location(String),
    /// The request finished synchronously.
    Completed,
}

/// Handle returned by every `begin_*` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    /// Human-readable description used in logs and errors
    pub description: String,
    pub poll: PollKind,
}

impl PendingOperation {
    pub fn new(description: impl Into<String>, poll: PollKind) -> Self {
        Self {
            description: description.into(),
            poll,
        }
    }

    /// An operation that already finished when the request returned.
    pub fn completed(description: impl Into<String>) -> Self {
        Self::new(description, PollKind::Completed)
    }

    pub fn is_completed(&self) -> bool {
        self.poll == PollKind::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state() {
        assert_eq!(OperationState::parse("Succeeded"), OperationState::Succeeded);
        assert_eq!(OperationState::parse("failed"), OperationState::Failed);
        assert_eq!(OperationState::parse("Canceled"), OperationState::Canceled);
        assert_eq!(
            OperationState::parse("Accepted"),
            OperationState::InProgress("Accepted".to_string())
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(OperationStatus::succeeded().is_terminal());
        assert!(OperationStatus::new(OperationState::Deleted).is_terminal());
        assert!(!OperationStatus::new(OperationState::parse("Running")).is_terminal());
    }
}
