//! Azure provider error types

use bakeflow_cloud::{CloudError, ErrorResponse};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: String,
        url: String,
        status: u16,
        response: Option<ErrorResponse>,
    },

    #[error("No storage account is configured; {0} needs one")]
    StorageAccountNotConfigured(&'static str),

    #[error("Missing field '{field}' in {context}")]
    MissingField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl From<AzureError> for CloudError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::CloudError(inner) => inner,
            AzureError::Status {
                status: 401 | 403,
                response,
                ..
            } => CloudError::AuthenticationFailed(
                response
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "the access token was rejected".to_string()),
            ),
            AzureError::Status {
                method,
                url,
                status,
                response,
            } => CloudError::Api {
                status,
                message: format!("{} {}", method, url),
                response,
            },
            AzureError::Http(e) => CloudError::Transport(e.to_string()),
            AzureError::JsonError(e) => CloudError::Json(e),
            AzureError::StorageAccountNotConfigured(_) | AzureError::InvalidUrl(_) => {
                CloudError::InvalidConfig(err.to_string())
            }
            AzureError::MissingField { .. } => CloudError::UnexpectedResponse(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;
