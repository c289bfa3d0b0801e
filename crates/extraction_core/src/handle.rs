use chrono::{DateTime, Utc};

use crate::ExtractionResult;

pub type JobId = String;

/// Identifies one submitted extraction job.
///
/// Immutable once created. A handle produced from a synchronous submission
/// also carries the finished result so that progress can be reported without
/// another round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    job_id: JobId,
    submitted_at: DateTime<Utc>,
    embedded: Option<ExtractionResult>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<JobId>, submitted_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            submitted_at,
            embedded: None,
        }
    }

    pub fn with_embedded_result(mut self, result: ExtractionResult) -> Self {
        self.embedded = Some(result);
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn embedded_result(&self) -> Option<&ExtractionResult> {
        self.embedded.as_ref()
    }

    pub fn is_synchronous(&self) -> bool {
        self.embedded.is_some()
    }
}
