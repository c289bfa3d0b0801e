use std::sync::{Arc, Mutex};
use std::time::Duration;

use extraction_client::{format_elapsed, ElapsedSink, TimerReporter};
use pretty_assertions::assert_eq;

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_freezes_the_reading() {
    let timer = TimerReporter::new(Duration::from_secs(1));
    assert!(timer.start());
    assert!(!timer.start(), "second start is a no-op");

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(timer.elapsed_seconds(), 5);
    assert!(timer.is_running());

    assert!(timer.stop());
    assert!(!timer.stop());
    assert!(!timer.is_running());

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(timer.elapsed_seconds(), 5);
}

#[tokio::test(start_paused = true)]
async fn sink_receives_ticks_until_stopped() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let sink: ElapsedSink = Arc::new(move |seconds: u64| recorder.lock().unwrap().push(seconds));
    let timer = TimerReporter::with_sink(Duration::from_secs(1), sink);

    timer.start();
    tokio::time::sleep(Duration::from_millis(3500)).await;
    timer.stop();
    let ticks_at_stop = seen.lock().unwrap().clone();
    assert_eq!(ticks_at_stop.last(), Some(&3));
    assert!(ticks_at_stop.windows(2).all(|pair| pair[0] <= pair[1]));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*seen.lock().unwrap(), ticks_at_stop);
}

#[test]
fn unstarted_timer_reads_zero_and_cannot_stop() {
    let timer = TimerReporter::new(Duration::from_secs(1));
    assert_eq!(timer.elapsed_seconds(), 0);
    assert!(!timer.stop());
    assert!(!timer.is_running());
}

#[test]
fn timer_without_runtime_still_measures() {
    let timer = TimerReporter::with_sink(Duration::from_secs(1), Arc::new(|_: u64| {}));
    assert!(timer.start());
    assert!(timer.stop());
    assert_eq!(timer.elapsed_seconds(), 0);
}

#[test]
fn elapsed_is_formatted_as_minutes_and_seconds() {
    assert_eq!(format_elapsed(0), "0:00");
    assert_eq!(format_elapsed(65), "1:05");
    assert_eq!(format_elapsed(750), "12:30");
}
