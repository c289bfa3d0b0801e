use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use extraction_logging::extraction_debug;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Receives the elapsed whole seconds on every tick.
pub type ElapsedSink = Arc<dyn Fn(u64) + Send + Sync>;

/// Wall-clock elapsed time for one job.
///
/// `start` arms a periodic tick that reports to the sink; `stop` is idempotent
/// and freezes the reading. Dropping the reporter stops the tick.
pub struct TimerReporter {
    tick: Duration,
    sink: Option<ElapsedSink>,
    inner: Mutex<TimerState>,
}

#[derive(Default)]
struct TimerState {
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    ticker: Option<CancellationToken>,
}

impl TimerReporter {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            sink: None,
            inner: Mutex::new(TimerState::default()),
        }
    }

    pub fn with_sink(tick: Duration, sink: ElapsedSink) -> Self {
        Self {
            tick,
            sink: Some(sink),
            inner: Mutex::new(TimerState::default()),
        }
    }

    /// Returns `false` if the timer was already started; it is never restarted.
    pub fn start(&self) -> bool {
        let mut state = self.lock();
        if state.started_at.is_some() {
            extraction_debug!("Timer already started, ignoring start");
            return false;
        }
        let started_at = Instant::now();
        state.started_at = Some(started_at);

        if let Some(sink) = self.sink.clone() {
            if tokio::runtime::Handle::try_current().is_ok() {
                let token = CancellationToken::new();
                tokio::spawn(tick_loop(self.tick, started_at, sink, token.clone()));
                state.ticker = Some(token);
            } else {
                extraction_debug!("No runtime available, timer runs without display ticks");
            }
        }
        true
    }

    /// Returns `true` only for the call that actually stopped the timer.
    pub fn stop(&self) -> bool {
        let mut state = self.lock();
        if state.started_at.is_none() || state.stopped_at.is_some() {
            return false;
        }
        state.stopped_at = Some(Instant::now());
        if let Some(ticker) = state.ticker.take() {
            ticker.cancel();
        }
        true
    }

    pub fn is_running(&self) -> bool {
        let state = self.lock();
        state.started_at.is_some() && state.stopped_at.is_none()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        let state = self.lock();
        match (state.started_at, state.stopped_at) {
            (Some(start), Some(stop)) => stop.duration_since(start).as_secs(),
            (Some(start), None) => start.elapsed().as_secs(),
            (None, _) => 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TimerReporter {
    fn drop(&mut self) {
        if let Some(ticker) = self.lock().ticker.take() {
            ticker.cancel();
        }
    }
}

async fn tick_loop(tick: Duration, started_at: Instant, sink: ElapsedSink, token: CancellationToken) {
    let mut ticks = interval(tick.max(Duration::from_millis(1)));
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticks.tick() => sink(started_at.elapsed().as_secs()),
        }
    }
}

/// Formats seconds as `M:SS`, e.g. `1:05` or `12:30`.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
