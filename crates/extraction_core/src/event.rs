use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ExtractionResult;

/// One observation about a job, as delivered by a progress channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Queued {
        message: String,
    },
    Running {
        phase: u32,
        /// Always within `0..=100`.
        percentage: u8,
        message: String,
    },
    PartialResult {
        stage: String,
        payload: serde_json::Value,
    },
    Complete {
        result: ExtractionResult,
    },
    Failed {
        reason: FailureReason,
    },
}

impl ProgressEvent {
    pub fn running(phase: u32, percentage: u32, message: impl Into<String>) -> Self {
        ProgressEvent::Running {
            phase,
            percentage: percentage.min(100) as u8,
            message: message.into(),
        }
    }

    pub fn failed(reason: FailureReason) -> Self {
        ProgressEvent::Failed { reason }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The subscription deadline passed without a terminal event.
    Timeout,
    /// The backend reported the job as failed.
    Backend(String),
    /// The progress transport broke and could not be recovered.
    Channel(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::Backend(message) => write!(f, "{message}"),
            FailureReason::Channel(message) => write!(f, "channel error: {message}"),
        }
    }
}
