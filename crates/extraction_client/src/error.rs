use std::fmt;

use thiserror::Error;

/// Failure to create a job. No job state exists when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct SubmitError {
    pub kind: SubmitErrorKind,
    pub detail: String,
}

impl SubmitError {
    pub(crate) fn new(kind: SubmitErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitErrorKind {
    InvalidUrl,
    Network,
    Timeout,
    HttpStatus(u16),
    MalformedBody,
}

impl fmt::Display for SubmitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitErrorKind::InvalidUrl => write!(f, "invalid url"),
            SubmitErrorKind::Network => write!(f, "network error"),
            SubmitErrorKind::Timeout => write!(f, "timeout"),
            SubmitErrorKind::HttpStatus(code) => write!(f, "http status {code}"),
            SubmitErrorKind::MalformedBody => write!(f, "malformed response body"),
        }
    }
}

/// Transport faults while observing a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("socket error: {0}")]
    Socket(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed message: {0}")]
    Malformed(String),
}
