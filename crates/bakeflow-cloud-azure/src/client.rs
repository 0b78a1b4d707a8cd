//! Resource Manager HTTP client
//!
//! Thin wrapper around `reqwest` that adds bearer authentication, the
//! api-version query parameter and long-running-operation handles. Every
//! failed response is parsed for a provider error document.

use crate::error::{AzureError, Result};
use bakeflow_cloud::{ErrorResponse, OperationState, OperationStatus, PendingOperation, PollKind};
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Environment variable limiting how much of each body is logged
pub const LOG_MAX_LEN_ENV: &str = "BAKEFLOW_LOG_AZURE_MAXLEN";
const DEFAULT_LOG_MAX_LEN: usize = 2048;

pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
    access_token: String,
    log_max_len: usize,
}

impl ArmClient {
    pub fn new(endpoint: &str, access_token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("bakeflow/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let log_max_len = std::env::var(LOG_MAX_LEN_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_LOG_MAX_LEN);

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            log_max_len,
        })
    }

    /// Unauthenticated client for data-plane calls signed by SAS
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URL for a resource path
    pub fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.endpoint, path, api_version)
    }

    fn truncate<'a>(&self, body: &'a str) -> &'a str {
        if body.len() <= self.log_max_len {
            return body;
        }
        let mut end = self.log_max_len;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        &body[..end]
    }

    /// Send a request and return status, headers and body text. Non-success
    /// statuses are returned as `AzureError::Status` unless listed in
    /// `accept`.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        accept: &[StatusCode],
    ) -> Result<(StatusCode, HeaderMap, String)> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            tracing::debug!("{} {} {}", method, url, self.truncate(&body.to_string()));
            request = request.json(body);
        } else {
            tracing::debug!("{} {}", method, url);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;
        tracing::debug!("{} {} -> {} {}", method, url, status, self.truncate(&text));

        if status.is_success() || accept.contains(&status) {
            return Ok((status, headers, text));
        }

        Err(AzureError::Status {
            method: method.to_string(),
            url: url.split('?').next().unwrap_or(url).to_string(),
            status: status.as_u16(),
            response: ErrorResponse::parse(&text),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, api_version: &str) -> Result<T> {
        let (_, _, text) = self
            .send(Method::GET, &self.url(path, api_version), None, &[])
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// GET that maps 404 to `None`
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
    ) -> Result<Option<T>> {
        let (status, _, text) = self
            .send(
                Method::GET,
                &self.url(path, api_version),
                None,
                &[StatusCode::NOT_FOUND],
            )
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Issue a write and return a handle for its completion.
    pub async fn begin(
        &self,
        method: Method,
        path: &str,
        api_version: &str,
        body: Option<&serde_json::Value>,
        description: impl Into<String>,
    ) -> Result<PendingOperation> {
        let (status, headers, _) = self
            .send(method, &self.url(path, api_version), body, &[])
            .await?;
        Ok(pending_from_headers(description.into(), status, &headers))
    }

    /// Check a pending operation once.
    pub async fn status(&self, operation: &PendingOperation) -> Result<OperationStatus> {
        match &operation.poll {
            PollKind::Completed => Ok(OperationStatus::succeeded()),
            PollKind::AsyncOperation(url) => {
                let (_, _, text) = self.send(Method::GET, url, None, &[]).await?;
                parse_async_status(&text)
            }
            PollKind::Location(url) => {
                let (status, _, _) = self.send(Method::GET, url, None, &[]).await?;
                if status == StatusCode::ACCEPTED {
                    Ok(OperationStatus::new(OperationState::InProgress(
                        "Accepted".to_string(),
                    )))
                } else {
                    Ok(OperationStatus::succeeded())
                }
            }
        }
    }

    /// Final body of a finished operation.
    pub async fn output(&self, operation: &PendingOperation) -> Result<Option<serde_json::Value>> {
        let url = match &operation.poll {
            PollKind::Completed => return Ok(None),
            PollKind::AsyncOperation(url) | PollKind::Location(url) => url,
        };
        let (_, _, text) = self.send(Method::GET, url, None, &[]).await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}

/// Choose how to observe an accepted write from its response headers.
pub fn pending_from_headers(
    description: String,
    status: StatusCode,
    headers: &HeaderMap,
) -> PendingOperation {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    if let Some(url) = header(ASYNC_OPERATION_HEADER) {
        return PendingOperation::new(description, PollKind::AsyncOperation(url));
    }
    if status == StatusCode::ACCEPTED {
        if let Some(url) = header(LOCATION.as_str()) {
            return PendingOperation::new(description, PollKind::Location(url));
        }
    }
    PendingOperation::completed(description)
}

/// Parse an `Azure-AsyncOperation` status document.
pub fn parse_async_status(body: &str) -> Result<OperationStatus> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let state = value
        .get("status")
        .and_then(|s| s.as_str())
        .ok_or_else(|| AzureError::MissingField {
            field: "status",
            context: "async operation status".to_string(),
        })?;

    let error = value
        .get("error")
        .and_then(|e| serde_json::from_value::<ErrorResponse>(e.clone()).ok())
        .filter(|e| !e.is_empty());

    Ok(OperationStatus {
        state: OperationState::parse(state),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_async_operation_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Azure-AsyncOperation",
            HeaderValue::from_static("https://management.azure.com/op/1"),
        );
        headers.insert(LOCATION, HeaderValue::from_static("https://management.azure.com/loc/1"));

        let op = pending_from_headers("delete".into(), StatusCode::ACCEPTED, &headers);
        assert_eq!(
            op.poll,
            PollKind::AsyncOperation("https://management.azure.com/op/1".into())
        );
    }

    #[test]
    fn test_location_header_on_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("https://management.azure.com/loc/1"));

        let op = pending_from_headers("delete".into(), StatusCode::ACCEPTED, &headers);
        assert_eq!(op.poll, PollKind::Location("https://management.azure.com/loc/1".into()));
    }

    #[test]
    fn test_synchronous_completion() {
        let op = pending_from_headers("create".into(), StatusCode::OK, &HeaderMap::new());
        assert!(op.is_completed());
    }

    #[test]
    fn test_parse_async_status() {
        let status = parse_async_status(r#"{"status": "InProgress"}"#).unwrap();
        assert!(!status.state.is_terminal());

        let status = parse_async_status(
            r#"{"status": "Failed", "error": {"code": "DeploymentFailed", "message": "boom"}}"#,
        )
        .unwrap();
        assert_eq!(status.state, OperationState::Failed);
        assert_eq!(status.error.unwrap().code, "DeploymentFailed");

        assert!(parse_async_status(r#"{"name": "x"}"#).is_err());
    }

    #[test]
    fn test_url_and_truncate() {
        let client = ArmClient::new("https://management.azure.com/", "token").unwrap();
        assert_eq!(
            client.url("/subscriptions/s", "2022-12-01"),
            "https://management.azure.com/subscriptions/s?api-version=2022-12-01"
        );

        let long = "é".repeat(DEFAULT_LOG_MAX_LEN);
        assert!(client.truncate(&long).len() <= DEFAULT_LOG_MAX_LEN);
    }
}
