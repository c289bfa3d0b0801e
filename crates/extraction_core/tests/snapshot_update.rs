use std::sync::Once;

use chrono::Utc;
use extraction_core::{
    update, ExtractionResult, FailureReason, JobHandle, JobSnapshot, JobState, ProgressEvent,
    ProgressPoint,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(extraction_logging::initialize_for_tests);
}

fn fold(snapshot: JobSnapshot, events: &[ProgressEvent]) -> JobSnapshot {
    events.iter().fold(snapshot, update)
}

#[test]
fn queued_keeps_pending_and_running_advances() {
    init_logging();
    let snapshot = JobSnapshot::new("abc");
    let snapshot = update(
        snapshot,
        &ProgressEvent::Queued {
            message: "waiting for worker".into(),
        },
    );
    assert_eq!(snapshot.state(), JobState::Pending);
    assert_eq!(snapshot.last_message(), Some("waiting for worker"));

    let snapshot = update(snapshot, &ProgressEvent::running(1, 20, "fetching"));
    assert_eq!(snapshot.state(), JobState::Running);
    assert_eq!(snapshot.percentage(), Some(20));
}

#[test]
fn progress_history_shows_regressions() {
    init_logging();
    let snapshot = fold(
        JobSnapshot::new("abc"),
        &[
            ProgressEvent::running(2, 50, ""),
            ProgressEvent::running(1, 10, ""),
            ProgressEvent::Complete {
                result: ExtractionResult::default(),
            },
        ],
    );

    assert_eq!(snapshot.state(), JobState::Completed);
    let percentages: Vec<u8> = snapshot.progress().iter().map(|p| p.percentage).collect();
    assert_eq!(percentages, vec![50, 10]);
    assert_eq!(
        snapshot.progress()[1],
        ProgressPoint {
            phase: 1,
            percentage: 10,
            message: String::new(),
        }
    );
}

#[test]
fn terminal_state_is_absorbing() {
    init_logging();
    let snapshot = fold(
        JobSnapshot::new("abc"),
        &[
            ProgressEvent::PartialResult {
                stage: "cleaned_html_ready".into(),
                payload: json!({"cleaned_html": "<p>x</p>"}),
            },
            ProgressEvent::failed(FailureReason::Timeout),
            ProgressEvent::Complete {
                result: ExtractionResult {
                    raw_html: Some("<html/>".into()),
                    ..ExtractionResult::default()
                },
            },
            ProgressEvent::running(3, 90, "late"),
        ],
    );

    assert_eq!(snapshot.state(), JobState::TimedOut);
    assert_eq!(snapshot.result().cleaned_html.as_deref(), Some("<p>x</p>"));
    assert_eq!(snapshot.result().raw_html, None);
    assert_eq!(snapshot.result().failure, Some(FailureReason::Timeout));
    assert_eq!(snapshot.last_message(), Some("timeout"));
    assert_eq!(snapshot.stages(), ["cleaned_html_ready".to_string()]);
    assert!(snapshot.progress().is_empty());
}

#[test]
fn backend_failure_maps_to_failed_state() {
    init_logging();
    let snapshot = update(
        JobSnapshot::new("abc"),
        &ProgressEvent::failed(FailureReason::Backend("boom".into())),
    );
    assert_eq!(snapshot.state(), JobState::Failed);
    assert_eq!(snapshot.last_message(), Some("boom"));
}

#[test]
fn cancel_only_affects_live_jobs() {
    init_logging();
    let live = update(JobSnapshot::new("a"), &ProgressEvent::running(1, 5, "x"));
    assert_eq!(live.cancelled().state(), JobState::Cancelled);

    let done = update(
        JobSnapshot::new("b"),
        &ProgressEvent::Complete {
            result: ExtractionResult::default(),
        },
    );
    assert_eq!(done.cancelled().state(), JobState::Completed);
}

#[test]
fn handle_exposes_embedded_result() {
    let result = ExtractionResult {
        cleaned_html: Some("<p>done</p>".into()),
        ..ExtractionResult::default()
    };
    let handle = JobHandle::new("sync-1", Utc::now()).with_embedded_result(result.clone());

    assert!(handle.is_synchronous());
    assert_eq!(handle.embedded_result(), Some(&result));
    assert_eq!(JobSnapshot::for_handle(&handle).job_id(), "sync-1");
}
