use std::sync::Arc;

use chrono::Utc;
use extraction_core::JobHandle;
use extraction_logging::extraction_info;
use uuid::Uuid;

use crate::backend::{resolve_artifacts, Backend};
use crate::wire::SubmitResponse;
use crate::{SubmitError, SubmitErrorKind};

/// Submits extraction jobs and normalises the backend's answer into a handle.
#[derive(Clone)]
pub struct JobClient {
    backend: Arc<dyn Backend>,
}

impl JobClient {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Submit `url` for extraction. Only transport validity of the URL is
    /// checked here; no retries are attempted.
    pub async fn submit(&self, url: &str, fingerprint: &str) -> Result<JobHandle, SubmitError> {
        validate_transport_url(url)?;

        let response = self.backend.submit(url, fingerprint).await?;
        let submitted_at = Utc::now();
        match response {
            SubmitResponse::Accepted { job_id } => {
                extraction_info!("Job {} accepted for {}", job_id, url);
                Ok(JobHandle::new(job_id, submitted_at))
            }
            SubmitResponse::Completed { job_id, result } => {
                let job_id = job_id.unwrap_or_else(local_job_id);
                extraction_info!("Job {} completed synchronously for {}", job_id, url);
                let fragment = resolve_artifacts(self.backend.as_ref(), result).await;
                Ok(JobHandle::new(job_id, submitted_at).with_embedded_result(fragment.into_result()))
            }
        }
    }
}

fn validate_transport_url(url: &str) -> Result<(), SubmitError> {
    let parsed = url::Url::parse(url)
        .map_err(|err| SubmitError::new(SubmitErrorKind::InvalidUrl, err.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(()),
        "http" | "https" => Err(SubmitError::new(SubmitErrorKind::InvalidUrl, "missing host")),
        scheme => Err(SubmitError::new(
            SubmitErrorKind::InvalidUrl,
            format!("unsupported scheme {scheme}"),
        )),
    }
}

fn local_job_id() -> String {
    format!("local-{}", Uuid::new_v4())
}
