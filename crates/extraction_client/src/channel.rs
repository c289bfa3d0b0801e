//! Progress observation for one job at a time.
//!
//! A subscription runs a single task that talks to the backend (polling or a
//! push socket) and forwards typed events through a bounded queue. The task
//! stops at the first terminal event, on cancellation, or after the deadline
//! handling has emitted the synthetic timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use extraction_core::{
    ExtractionResult, FailureReason, JobHandle, JobId, ProgressEvent, ResultFragment, ResultTier,
};
use extraction_logging::{extraction_debug, extraction_info, extraction_warn};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::backend::{resolve_artifacts, Backend};
use crate::push::PushConnector;
use crate::wire::{decode_push, PushFrame, StatusBody};
use crate::{ChannelConfig, ChannelMode, PushClosePolicy, MAX_DEADLINE};

/// Stage name used for the result fetched after the deadline has passed.
pub const TIMEOUT_PARTIAL_STAGE: &str = "timeout_partial";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone)]
pub struct ProgressChannel {
    backend: Arc<dyn Backend>,
    push: Option<Arc<dyn PushConnector>>,
    config: ChannelConfig,
}

impl ProgressChannel {
    pub fn new(backend: Arc<dyn Backend>, config: ChannelConfig) -> Self {
        Self {
            backend,
            push: None,
            config,
        }
    }

    pub fn with_push(mut self, connector: Arc<dyn PushConnector>) -> Self {
        self.push = Some(connector);
        self
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Start observing `handle`. Must be called inside a tokio runtime.
    ///
    /// Each call starts an independent subscription; callers that need one
    /// subscription per job keep the returned value (see `ExtractionClient`).
    pub fn subscribe(&self, handle: &JobHandle) -> Subscription {
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let cancel = CancellationToken::new();
        let task = SubscriptionTask {
            job_id: handle.job_id().to_string(),
            embedded: handle.embedded_result().cloned(),
            backend: self.backend.clone(),
            push: self.push.clone(),
            config: self.config.clone(),
            deadline: Instant::now() + self.config.deadline.min(MAX_DEADLINE),
            cancel: cancel.clone(),
            emitter: Emitter::new(tx, cancel.clone(), self.config.dedupe_running),
            tracker: ProgressTracker::default(),
        };
        let join = tokio::spawn(task.run());

        Subscription {
            job_id: handle.job_id().to_string(),
            rx,
            cancel,
            task: Some(join),
        }
    }
}

/// A finite, non-restartable sequence of progress events for one job.
///
/// Dropping a subscription cancels it.
pub struct Subscription {
    job_id: JobId,
    rx: mpsc::Receiver<ProgressEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Next event, or `None` once the sequence ended or was cancelled.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        let cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            return None;
        }
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            event = self.rx.recv() => event,
        };
        // Anything that raced with a cancel request is discarded.
        event.filter(|_| !cancel.is_cancelled())
    }

    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            extraction_debug!("Cancelling subscription for job {}", self.job_id);
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the background task to exit.
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum LoopOutcome {
    Terminal,
    Cancelled,
    Deadline,
    Closed(String),
}

struct SubscriptionTask {
    job_id: JobId,
    embedded: Option<ExtractionResult>,
    backend: Arc<dyn Backend>,
    push: Option<Arc<dyn PushConnector>>,
    config: ChannelConfig,
    deadline: Instant,
    cancel: CancellationToken,
    emitter: Emitter,
    tracker: ProgressTracker,
}

impl SubscriptionTask {
    async fn run(mut self) {
        if let Some(result) = self.embedded.take() {
            extraction_debug!("Job {} already complete, skipping transport", self.job_id);
            self.emitter.emit(ProgressEvent::Complete { result }).await;
            return;
        }

        let outcome = match self.config.mode {
            ChannelMode::Poll => self.poll_loop().await,
            ChannelMode::Push => match self.push_loop().await {
                LoopOutcome::Closed(reason) if self.config.fallback_to_poll => {
                    extraction_warn!(
                        "Push channel for job {} failed ({}), falling back to polling",
                        self.job_id,
                        reason
                    );
                    self.poll_loop().await
                }
                outcome => outcome,
            },
        };

        match outcome {
            LoopOutcome::Terminal | LoopOutcome::Cancelled => {}
            LoopOutcome::Deadline => self.finish_after_deadline().await,
            LoopOutcome::Closed(reason) => match self.config.push_close {
                PushClosePolicy::Fail => {
                    self.emitter
                        .emit(ProgressEvent::failed(FailureReason::Channel(reason)))
                        .await;
                }
                PushClosePolicy::End => {
                    extraction_info!(
                        "Progress stream for job {} ended without a result: {}",
                        self.job_id,
                        reason
                    );
                }
            },
        }
    }

    async fn poll_loop(&mut self) -> LoopOutcome {
        let mut last_partial: Option<serde_json::Value> = None;
        loop {
            let status = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return LoopOutcome::Cancelled,
                _ = sleep_until(self.deadline) => return LoopOutcome::Deadline,
                status = self.backend.status(&self.job_id) => status,
            };

            let event = match status {
                Ok(StatusBody::Queued { message }) => Some(ProgressEvent::Queued { message }),
                Ok(StatusBody::Running {
                    phase,
                    percentage,
                    message,
                }) => Some(self.tracker.running(phase, percentage, message)),
                Ok(StatusBody::Failed { reason }) => {
                    let event = ProgressEvent::failed(FailureReason::Backend(reason));
                    return self.emit_terminal(event).await;
                }
                Ok(StatusBody::Ready(wire)) => {
                    let resolving = resolve_artifacts(self.backend.as_ref(), wire);
                    let fragment = match self.within_deadline(resolving).await {
                        Ok(fragment) => fragment,
                        Err(outcome) => return outcome,
                    };
                    if self.config.await_intelligent && !fragment.is_intelligent_tier() {
                        if fragment.is_empty() {
                            extraction_debug!("Job {} reported an empty result", self.job_id);
                            None
                        } else {
                            let (stage, payload) = partial_payload(fragment);
                            if last_partial.as_ref() == Some(&payload) {
                                None
                            } else {
                                last_partial = Some(payload.clone());
                                Some(ProgressEvent::PartialResult { stage, payload })
                            }
                        }
                    } else {
                        let enriching = self.enrich(fragment.into_result());
                        let result = match self.within_deadline(enriching).await {
                            Ok(result) => result,
                            Err(outcome) => return outcome,
                        };
                        return self.emit_terminal(ProgressEvent::Complete { result }).await;
                    }
                }
                Err(err) => {
                    extraction_warn!("Status poll for job {} failed: {}", self.job_id, err);
                    None
                }
            };

            if let Some(event) = event {
                if !self.emitter.emit(event).await {
                    return LoopOutcome::Cancelled;
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return LoopOutcome::Cancelled,
                _ = sleep_until(self.deadline) => return LoopOutcome::Deadline,
                _ = sleep(self.config.poll_interval.max(MIN_POLL_INTERVAL)) => {}
            }
        }
    }

    async fn push_loop(&mut self) -> LoopOutcome {
        let Some(connector) = self.push.clone() else {
            return LoopOutcome::Closed("push transport not configured".to_string());
        };

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return LoopOutcome::Cancelled,
            _ = sleep_until(self.deadline) => return LoopOutcome::Deadline,
            connected = connector.connect(&self.job_id) => connected,
        };
        let mut frames = match connected {
            Ok(frames) => frames,
            Err(err) => return LoopOutcome::Closed(err.to_string()),
        };

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return LoopOutcome::Cancelled,
                _ = sleep_until(self.deadline) => return LoopOutcome::Deadline,
                frame = frames.next() => frame,
            };

            let text = match frame {
                None => return LoopOutcome::Closed("socket closed before completion".into()),
                Some(Err(err)) => return LoopOutcome::Closed(err.to_string()),
                Some(Ok(text)) => text,
            };

            let event = match decode_push(&text) {
                Ok(PushFrame::Queued { message }) => ProgressEvent::Queued { message },
                Ok(PushFrame::Progress {
                    phase,
                    percentage,
                    message,
                }) => self.tracker.running(phase, percentage, message),
                Ok(PushFrame::Partial { stage, payload }) => {
                    ProgressEvent::PartialResult { stage, payload }
                }
                Ok(PushFrame::Error { message }) => {
                    let event = ProgressEvent::failed(FailureReason::Backend(message));
                    return self.emit_terminal(event).await;
                }
                Ok(PushFrame::Complete { result }) => {
                    let task: &Self = self;
                    let finishing = async move {
                        let result = match result {
                            Some(wire) => resolve_artifacts(task.backend.as_ref(), wire)
                                .await
                                .into_result(),
                            None => task.fetch_final_result().await,
                        };
                        task.enrich(result).await
                    };
                    let result = match self.within_deadline(finishing).await {
                        Ok(result) => result,
                        Err(outcome) => return outcome,
                    };
                    return self.emit_terminal(ProgressEvent::Complete { result }).await;
                }
                Err(err) => {
                    extraction_warn!("Skipping push frame for job {}: {}", self.job_id, err);
                    continue;
                }
            };

            if !self.emitter.emit(event).await {
                return LoopOutcome::Cancelled;
            }
        }
    }

    async fn emit_terminal(&mut self, event: ProgressEvent) -> LoopOutcome {
        if self.emitter.emit(event).await {
            LoopOutcome::Terminal
        } else {
            LoopOutcome::Cancelled
        }
    }

    /// Run network work that must not outlive a cancel request or the deadline.
    async fn within_deadline<T>(&self, work: impl Future<Output = T>) -> Result<T, LoopOutcome> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LoopOutcome::Cancelled),
            _ = sleep_until(self.deadline) => Err(LoopOutcome::Deadline),
            value = work => Ok(value),
        }
    }

    /// One best-effort look for a partial result, then the synthetic timeout.
    async fn finish_after_deadline(&mut self) {
        extraction_warn!(
            "Job {} reached its deadline, attempting a final fetch",
            self.job_id
        );
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            fetched = self.fetch_result() => fetched,
        };

        if let Some(fragment) = fetched.filter(|fragment| !fragment.is_empty()) {
            let (_, payload) = partial_payload(fragment);
            let event = ProgressEvent::PartialResult {
                stage: TIMEOUT_PARTIAL_STAGE.to_string(),
                payload,
            };
            if !self.emitter.emit(event).await {
                return;
            }
        }
        self.emitter
            .emit(ProgressEvent::failed(FailureReason::Timeout))
            .await;
    }

    /// Result for a completion signal that did not carry one.
    async fn fetch_final_result(&self) -> ExtractionResult {
        self.fetch_result()
            .await
            .map(ResultFragment::into_result)
            .unwrap_or_default()
    }

    /// Status fetch plus artifact resolution, bounded by `final_fetch_timeout`.
    async fn fetch_result(&self) -> Option<ResultFragment> {
        let fetch = async {
            match self.backend.status(&self.job_id).await {
                Ok(StatusBody::Ready(wire)) => {
                    Some(resolve_artifacts(self.backend.as_ref(), wire).await)
                }
                Ok(other) => {
                    extraction_warn!("Status for job {} has no result yet: {:?}", self.job_id, other);
                    None
                }
                Err(err) => {
                    extraction_warn!("Result fetch for job {} failed: {}", self.job_id, err);
                    None
                }
            }
        };
        match timeout(self.config.final_fetch_timeout, fetch).await {
            Ok(fragment) => fragment,
            Err(_) => {
                extraction_warn!("Result fetch for job {} timed out", self.job_id);
                None
            }
        }
    }

    async fn enrich(&self, mut result: ExtractionResult) -> ExtractionResult {
        if self.config.fetch_raw_html && result.raw_html.is_none() {
            result.raw_html = self.backend.raw_html(&self.job_id).await;
        }
        result
    }
}

/// Turns a non-final result into a `PartialResult` stage and payload.
fn partial_payload(fragment: ResultFragment) -> (String, serde_json::Value) {
    let stage = match fragment.tier() {
        Some(ResultTier::IntelligentExtraction) => "intelligent_extraction_ready",
        Some(ResultTier::BasicExtraction) => "basic_extraction_ready",
        Some(ResultTier::CleanedHtml) => "cleaned_html_ready",
        Some(ResultTier::RawHtml) | None => "raw_html_ready",
    };
    let result = fragment.into_result();
    let payload = serde_json::to_value(&result).unwrap_or(serde_json::Value::Null);
    (stage.to_string(), payload)
}

/// Fills phase and percentage from the previous report when a message omits them.
#[derive(Debug, Default)]
struct ProgressTracker {
    phase: u32,
    percentage: u32,
}

impl ProgressTracker {
    fn running(&mut self, phase: Option<u32>, percentage: Option<u32>, message: String) -> ProgressEvent {
        if let Some(phase) = phase {
            self.phase = phase;
        }
        if let Some(percentage) = percentage {
            self.percentage = percentage;
        }
        ProgressEvent::running(self.phase, self.percentage, message)
    }
}

struct Emitter {
    tx: mpsc::Sender<ProgressEvent>,
    cancel: CancellationToken,
    dedupe_running: bool,
    last_running: Option<ProgressEvent>,
}

impl Emitter {
    fn new(tx: mpsc::Sender<ProgressEvent>, cancel: CancellationToken, dedupe_running: bool) -> Self {
        Self {
            tx,
            cancel,
            dedupe_running,
            last_running: None,
        }
    }

    /// Returns `false` once nobody is listening any more.
    async fn emit(&mut self, event: ProgressEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if matches!(event, ProgressEvent::Running { .. }) {
            if self.dedupe_running && self.last_running.as_ref() == Some(&event) {
                return true;
            }
            self.last_running = Some(event.clone());
        } else {
            self.last_running = None;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }
}
