#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use extraction_client::wire::{StatusBody, SubmitResponse, WireResult};
use extraction_client::{
    Backend, ChannelError, ClientConfig, FrameStream, ProgressEvent, PushConnector, SubmitError,
};
use extraction_core::ResultFragment;
use futures_util::StreamExt;
use tokio::sync::Notify;

/// Scripted backend: status answers are served in order, then `fallback`
/// repeats forever.
pub struct FakeBackend {
    submits: Mutex<VecDeque<Result<SubmitResponse, SubmitError>>>,
    statuses: Mutex<VecDeque<StatusBody>>,
    fallback: StatusBody,
    gate: Option<(usize, Arc<Notify>)>,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(statuses: Vec<StatusBody>, fallback: StatusBody) -> Self {
        Self {
            submits: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(statuses.into()),
            fallback,
            gate: None,
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_submits(self, submits: Vec<Result<SubmitResponse, SubmitError>>) -> Self {
        *self.submits.lock().unwrap() = submits.into();
        self
    }

    /// Status call number `call` (1-based) and later wait for `gate`.
    pub fn gated_from(mut self, call: usize, gate: Arc<Notify>) -> Self {
        self.gate = Some((call, gate));
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Backend for FakeBackend {
    async fn submit(&self, _url: &str, _fingerprint: &str) -> Result<SubmitResponse, SubmitError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| accepted("job-1"))
    }

    async fn status(&self, _job_id: &str) -> Result<StatusBody, ChannelError> {
        let call = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((from, gate)) = &self.gate {
            if call >= *from {
                gate.notified().await;
            }
        }
        let next = self.statuses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    async fn raw_html(&self, _job_id: &str) -> Option<String> {
        None
    }

    async fn artifact(&self, _uri: &str) -> Result<String, ChannelError> {
        Err(ChannelError::HttpStatus(404))
    }
}

/// Push connector replaying fixed frames, then ending the stream.
pub struct ScriptedConnector {
    frames: Vec<String>,
}

impl ScriptedConnector {
    pub fn new(frames: &[&str]) -> Self {
        Self {
            frames: frames.iter().map(|frame| frame.to_string()).collect(),
        }
    }
}

#[async_trait::async_trait]
impl PushConnector for ScriptedConnector {
    async fn connect(&self, _job_id: &str) -> Result<FrameStream, ChannelError> {
        Ok(futures_util::stream::iter(self.frames.clone().into_iter().map(Ok)).boxed())
    }
}

pub fn accepted(job_id: &str) -> Result<SubmitResponse, SubmitError> {
    Ok(SubmitResponse::Accepted {
        job_id: job_id.to_string(),
    })
}

pub fn running(phase: u32, percentage: u32, message: &str) -> StatusBody {
    StatusBody::Running {
        phase: Some(phase),
        percentage: Some(percentage),
        message: message.to_string(),
    }
}

pub fn ready(fragment: ResultFragment) -> StatusBody {
    StatusBody::Ready(WireResult {
        fragment,
        artifacts: Default::default(),
    })
}

pub fn cleaned(html: &str) -> ResultFragment {
    ResultFragment {
        cleaned_html: Some(html.to_string()),
        ..ResultFragment::default()
    }
}

pub fn fast_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.channel.poll_interval = Duration::from_millis(5);
    config.channel.fetch_raw_html = false;
    config
}

pub type EventLog = Arc<Mutex<Vec<ProgressEvent>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Poll `condition` for up to two seconds.
pub async fn wait_for(condition: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
