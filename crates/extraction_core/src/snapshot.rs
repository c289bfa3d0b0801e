use extraction_logging::extraction_debug;

use crate::{apply, ExtractionResult, FailureReason, JobHandle, JobId, ProgressEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::TimedOut | JobState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressPoint {
    pub phase: u32,
    pub percentage: u8,
    pub message: String,
}

/// Everything the UI needs to render one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    job_id: JobId,
    state: JobState,
    result: ExtractionResult,
    progress: Vec<ProgressPoint>,
    last_message: Option<String>,
    stages: Vec<String>,
}

impl JobSnapshot {
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Pending,
            result: ExtractionResult::default(),
            progress: Vec::new(),
            last_message: None,
            stages: Vec::new(),
        }
    }

    pub fn for_handle(handle: &JobHandle) -> Self {
        Self::new(handle.job_id())
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn result(&self) -> &ExtractionResult {
        &self.result
    }

    /// Every reported progress point in arrival order, regressions included.
    pub fn progress(&self) -> &[ProgressPoint] {
        &self.progress
    }

    pub fn percentage(&self) -> Option<u8> {
        self.progress.last().map(|point| point.percentage)
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    /// Partial result stages seen, in arrival order.
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Move a live job to `Cancelled`. Terminal snapshots are returned as is.
    pub fn cancelled(mut self) -> Self {
        if !self.state.is_terminal() {
            self.state = JobState::Cancelled;
        }
        self
    }
}

/// Pure update function: folds a progress event into a snapshot.
///
/// Terminal states are absorbing; events arriving afterwards are ignored.
pub fn update(mut snapshot: JobSnapshot, event: &ProgressEvent) -> JobSnapshot {
    if snapshot.state.is_terminal() {
        extraction_debug!(
            "Ignoring event for job {} in terminal state {:?}",
            snapshot.job_id,
            snapshot.state
        );
        return snapshot;
    }

    let result = std::mem::take(&mut snapshot.result);
    snapshot.result = apply(event, result);

    match event {
        ProgressEvent::Queued { message } => {
            snapshot.last_message = Some(message.clone());
        }
        ProgressEvent::Running {
            phase,
            percentage,
            message,
        } => {
            snapshot.state = JobState::Running;
            snapshot.progress.push(ProgressPoint {
                phase: *phase,
                percentage: *percentage,
                message: message.clone(),
            });
            if !message.is_empty() {
                snapshot.last_message = Some(message.clone());
            }
        }
        ProgressEvent::PartialResult { stage, .. } => {
            snapshot.state = JobState::Running;
            snapshot.stages.push(stage.clone());
        }
        ProgressEvent::Complete { .. } => {
            snapshot.state = JobState::Completed;
        }
        ProgressEvent::Failed { reason } => {
            snapshot.state = match reason {
                FailureReason::Timeout => JobState::TimedOut,
                FailureReason::Backend(_) | FailureReason::Channel(_) => JobState::Failed,
            };
            snapshot.last_message = Some(reason.to_string());
        }
    }

    snapshot
}
