//! Step engine error types

use std::fmt;
use thiserror::Error;

/// Errors raised by the runner itself (as opposed to errors raised by steps,
/// which travel through the state bag).
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("step '{step}' reads state key '{key}' which no earlier step provides")]
    MissingKey { step: String, key: &'static str },

    #[error("runner has no steps")]
    Empty,
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Collects independent failures so that one failed compensating action does
/// not prevent the next one from being attempted.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<anyhow::Error>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: impl Into<anyhow::Error>) {
        self.errors.push(error.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }

    /// `Ok(())` when nothing was collected, otherwise the collector itself.
    pub fn into_result(self) -> anyhow::Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::Error::new(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "{:#}", self.errors[0]),
            n => {
                writeln!(f, "{} errors occurred:", n)?;
                for (i, err) in self.errors.iter().enumerate() {
                    if i + 1 == n {
                        write!(f, "  * {:#}", err)?;
                    } else {
                        writeln!(f, "  * {:#}", err)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultiError {}
