//! Cloud provider error types

use crate::error_response::ErrorResponse;
use crate::operation::OperationState;
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error (HTTP {status}): {}", with_details(.message, .response))]
    Api {
        status: u16,
        message: String,
        response: Option<ErrorResponse>,
    },

    #[error("{operation} finished in state {state}{}", with_details("", .error))]
    OperationFailed {
        operation: String,
        state: OperationState,
        error: Option<ErrorResponse>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed resource id: {0}")]
    MalformedResourceId(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the provider answered 404 for the addressed resource.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CloudError::ResourceNotFound(_) | CloudError::Api { status: 404, .. }
        )
    }

    /// The structured provider payload attached to this error, if any.
    pub fn error_response(&self) -> Option<&ErrorResponse> {
        match self {
            CloudError::Api { response, .. } => response.as_ref(),
            CloudError::OperationFailed { error, .. } => error.as_ref(),
            _ => None,
        }
    }
}

fn with_details(message: &str, response: &Option<ErrorResponse>) -> String {
    match response {
        Some(r) if !r.is_empty() => {
            if message.is_empty() {
                format!("\n{}", r.format().trim_end())
            } else {
                format!("{}\n{}", message, r.format().trim_end())
            }
        }
        _ => message.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
