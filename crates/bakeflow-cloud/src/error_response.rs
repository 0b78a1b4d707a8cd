//! Provider error payloads
//!
//! Resource Manager reports failures as `{"error": {code, message, details}}`.
//! When a nested operation fails, the provider often puts a whole JSON-encoded
//! error document into a detail's `message`. The formatter unrolls those
//! nested documents so nothing is lost when the error reaches the operator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A provider error with its nested details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub details: Vec<ErrorResponse>,
}

#[derive(Deserialize)]
struct Envelope {
    error: ErrorResponse,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            target: None,
            details: Vec::new(),
        }
    }

    /// Parse a response body. Returns `None` for anything that is not an error
    /// document, including malformed JSON; this never fails.
    pub fn parse(body: &str) -> Option<Self> {
        let body = body.trim();
        if !body.starts_with('{') {
            return None;
        }

        if let Ok(envelope) = serde_json::from_str::<Envelope>(body) {
            if !envelope.error.is_empty() {
                return Some(envelope.error);
            }
        }

        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(bare) if !bare.is_empty() => Some(bare),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty() && self.message.is_empty() && self.details.is_empty()
    }

    /// Render the whole tree, one `ERROR:` line per node, children indented
    /// under their parent.
    pub fn format(&self) -> String {
        let mut buf = String::new();
        write_tree(self, &mut buf, "");
        buf
    }
}

fn write_tree(error: &ErrorResponse, buf: &mut String, indent: &str) {
    if error.is_empty() {
        return;
    }

    buf.push_str(&format!(
        "ERROR: {}-> {} : {}\n",
        indent, error.code, error.message
    ));

    let nested = format!("{}  ", indent);
    for detail in &error.details {
        match ErrorResponse::parse(&detail.message) {
            Some(inner) => {
                buf.push_str(&format!("ERROR: {}-> {}\n", nested, detail.code));
                write_tree(&inner, buf, &nested);
                for sibling in &detail.details {
                    write_tree(sibling, buf, &nested);
                }
            }
            None => write_tree(detail, buf, &nested),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format().trim_end())
    }
}
