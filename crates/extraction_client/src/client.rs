use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use extraction_core::{update, FailureReason, JobHandle, JobId, JobSnapshot, ProgressEvent};
use extraction_logging::{extraction_debug, extraction_info, extraction_warn};
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, HttpBackend};
use crate::channel::{ProgressChannel, Subscription};
use crate::fingerprint::{fingerprint, ClientEnvironment};
use crate::job_client::JobClient;
use crate::push::{PushConnector, WebSocketConnector};
use crate::timer::{ElapsedSink, TimerReporter};
use crate::{ClientConfig, ConfigError, SubmitError};

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;
pub type ElapsedCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Entry point for a UI: start jobs, observe them, read snapshots, cancel.
///
/// Each job owns exactly one progress subscription and one timer. Every
/// started job reaches a terminal event unless it is cancelled first.
#[derive(Clone)]
pub struct ExtractionClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    job_client: JobClient,
    channel: ProgressChannel,
    timer_tick: Duration,
    environment: Mutex<ClientEnvironment>,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
}

struct JobEntry {
    handle: JobHandle,
    snapshot: JobSnapshot,
    history: Vec<ProgressEvent>,
    callbacks: Vec<ProgressCallback>,
    elapsed_callbacks: Arc<Mutex<Vec<ElapsedCallback>>>,
    timer: Arc<TimerReporter>,
    subscription: Option<CancellationToken>,
    /// Serialises callback invocation for this job.
    delivery: Arc<Mutex<()>>,
}

impl ExtractionClient {
    /// Client talking HTTP and websockets to the configured backend.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&config)?);
        let push: Arc<dyn PushConnector> = Arc::new(WebSocketConnector::new(&config.backend)?);
        Ok(Self::with_transport(config, backend, Some(push)))
    }

    pub fn with_transport(
        config: ClientConfig,
        backend: Arc<dyn Backend>,
        push: Option<Arc<dyn PushConnector>>,
    ) -> Self {
        let mut channel = ProgressChannel::new(backend.clone(), config.channel.clone());
        if let Some(push) = push {
            channel = channel.with_push(push);
        }
        Self {
            inner: Arc::new(ClientInner {
                job_client: JobClient::new(backend),
                channel,
                timer_tick: config.timer_tick,
                environment: Mutex::new(ClientEnvironment::detect()),
                jobs: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Replace the environment used for submission fingerprints.
    pub fn set_environment(&self, environment: ClientEnvironment) {
        *lock(&self.inner.environment) = environment;
    }

    /// Submit `url`, start the job timer and subscribe to progress.
    ///
    /// If the backend answers with a job id that is already tracked, the
    /// existing job (and its subscription) is reused.
    pub async fn start_job(&self, url: &str) -> Result<JobHandle, SubmitError> {
        let fingerprint = fingerprint(&lock(&self.inner.environment));
        let handle = match self.inner.job_client.submit(url, &fingerprint).await {
            Ok(handle) => handle,
            Err(err) => {
                extraction_warn!("Submission of {} failed: {}", url, err);
                return Err(err);
            }
        };
        let handle = self.inner.register(handle);
        self.subscribe(&handle);
        Ok(handle)
    }

    /// Start the progress subscription for `handle`.
    ///
    /// Returns `false` when nothing new was started: the job is unknown,
    /// already terminal, or already has a subscription (which is reused).
    pub fn subscribe(&self, handle: &JobHandle) -> bool {
        let subscription = {
            let mut jobs = lock(&self.inner.jobs);
            let Some(entry) = jobs.get_mut(handle.job_id()) else {
                extraction_warn!("Subscribe for unknown job {}", handle.job_id());
                return false;
            };
            if entry.snapshot.state().is_terminal() {
                return false;
            }
            if entry.subscription.is_some() {
                extraction_debug!("Reusing subscription for job {}", handle.job_id());
                return false;
            }
            let subscription = self.inner.channel.subscribe(&entry.handle);
            entry.subscription = Some(subscription.cancellation_token());
            subscription
        };
        tokio::spawn(drive(self.inner.clone(), subscription));
        true
    }

    /// Register a progress callback. Events already delivered for the job are
    /// replayed to it first, in order.
    ///
    /// Callbacks may call back into the client, except to register further
    /// callbacks for the same job.
    pub fn on_progress<F>(&self, handle: &JobHandle, callback: F) -> bool
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        let callback: ProgressCallback = Arc::new(callback);
        let Some(delivery) = self.inner.delivery_gate(handle.job_id()) else {
            return false;
        };
        let _gate = lock(&delivery);
        let history = {
            let mut jobs = lock(&self.inner.jobs);
            let Some(entry) = jobs.get_mut(handle.job_id()) else {
                return false;
            };
            entry.callbacks.push(callback.clone());
            entry.history.clone()
        };
        for event in &history {
            callback(event);
        }
        true
    }

    /// Register a callback for the job timer's periodic elapsed-seconds ticks.
    pub fn on_elapsed<F>(&self, handle: &JobHandle, callback: F) -> bool
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let jobs = lock(&self.inner.jobs);
        match jobs.get(handle.job_id()) {
            Some(entry) => {
                lock(&entry.elapsed_callbacks).push(Arc::new(callback));
                true
            }
            None => false,
        }
    }

    pub fn get_snapshot(&self, handle: &JobHandle) -> Option<JobSnapshot> {
        lock(&self.inner.jobs)
            .get(handle.job_id())
            .map(|entry| entry.snapshot.clone())
    }

    pub fn elapsed_seconds(&self, handle: &JobHandle) -> Option<u64> {
        lock(&self.inner.jobs)
            .get(handle.job_id())
            .map(|entry| entry.timer.elapsed_seconds())
    }

    /// Cancel the job's subscription and timer. No further events reach the
    /// callbacks afterwards. Returns `true` if the job was still live.
    pub fn cancel(&self, handle: &JobHandle) -> bool {
        let mut jobs = lock(&self.inner.jobs);
        let Some(entry) = jobs.get_mut(handle.job_id()) else {
            return false;
        };
        if let Some(token) = &entry.subscription {
            token.cancel();
        }
        entry.timer.stop();
        let was_live = !entry.snapshot.state().is_terminal();
        let snapshot = std::mem::replace(&mut entry.snapshot, JobSnapshot::new(handle.job_id()));
        entry.snapshot = snapshot.cancelled();
        if was_live {
            extraction_info!("Job {} cancelled", handle.job_id());
        }
        was_live
    }

    /// Forget a job, cancelling it if it is still live.
    pub fn release(&self, handle: &JobHandle) -> Option<JobSnapshot> {
        self.cancel(handle);
        lock(&self.inner.jobs)
            .remove(handle.job_id())
            .map(|entry| entry.snapshot)
    }

    pub fn job_count(&self) -> usize {
        lock(&self.inner.jobs).len()
    }
}

impl ClientInner {
    fn register(&self, handle: JobHandle) -> JobHandle {
        let mut jobs = lock(&self.jobs);
        if let Some(existing) = jobs.get(handle.job_id()) {
            extraction_info!("Job {} already tracked, reusing it", handle.job_id());
            return existing.handle.clone();
        }

        let elapsed_callbacks: Arc<Mutex<Vec<ElapsedCallback>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_callbacks = elapsed_callbacks.clone();
        let sink: ElapsedSink = Arc::new(move |seconds: u64| {
            let callbacks = lock(&sink_callbacks).clone();
            for callback in callbacks {
                callback(seconds);
            }
        });
        let timer = Arc::new(TimerReporter::with_sink(self.timer_tick, sink));
        timer.start();

        jobs.insert(
            handle.job_id().to_string(),
            JobEntry {
                handle: handle.clone(),
                snapshot: JobSnapshot::for_handle(&handle),
                history: Vec::new(),
                callbacks: Vec::new(),
                elapsed_callbacks,
                timer,
                subscription: None,
                delivery: Arc::new(Mutex::new(())),
            },
        );
        handle
    }

    fn delivery_gate(&self, job_id: &str) -> Option<Arc<Mutex<()>>> {
        lock(&self.jobs)
            .get(job_id)
            .map(|entry| entry.delivery.clone())
    }

    fn deliver(&self, job_id: &str, token: &CancellationToken, event: ProgressEvent) {
        let Some(delivery) = self.delivery_gate(job_id) else {
            return;
        };
        let _gate = lock(&delivery);
        let callbacks = {
            let mut jobs = lock(&self.jobs);
            let Some(entry) = jobs.get_mut(job_id) else {
                return;
            };
            if token.is_cancelled() {
                return;
            }
            let snapshot = std::mem::replace(&mut entry.snapshot, JobSnapshot::new(job_id));
            entry.snapshot = update(snapshot, &event);
            if entry.snapshot.state().is_terminal() && entry.timer.stop() {
                extraction_info!(
                    "Job {} finished as {:?} after {}s",
                    job_id,
                    entry.snapshot.state(),
                    entry.timer.elapsed_seconds()
                );
            }
            entry.history.push(event.clone());
            entry.callbacks.clone()
        };

        for callback in callbacks {
            if token.is_cancelled() {
                break;
            }
            callback(&event);
        }
    }
}

async fn drive(inner: Arc<ClientInner>, mut subscription: Subscription) {
    let job_id = subscription.job_id().to_string();
    let token = subscription.cancellation_token();
    let mut saw_terminal = false;

    while let Some(event) = subscription.next().await {
        saw_terminal = event.is_terminal();
        inner.deliver(&job_id, &token, event);
        if saw_terminal {
            break;
        }
    }

    if !saw_terminal && !token.is_cancelled() {
        extraction_warn!("Progress for job {} ended without a terminal event", job_id);
        let event = ProgressEvent::failed(FailureReason::Channel(
            "progress stream ended".to_string(),
        ));
        inner.deliver(&job_id, &token, event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
