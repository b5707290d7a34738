//! Multi-file queue tests.

mod common;

use std::path::{Path, PathBuf};

use common::{EventLog, RecordingCompositor};
use snapsheet::{
    CancellationToken, Compositor, Session, SessionEvent, SnapError, SnapOptions, SyntheticSource,
    run_bound, run_each,
};

/// Files named `short*` are 300 ms long, `mid*` files 5 s; the rest last
/// `millis`.
fn opener(
    millis: i64,
) -> impl FnMut(&Path, &SnapOptions) -> Result<Session<SyntheticSource>, SnapError> {
    move |path: &Path, options: &SnapOptions| {
        let name = path.display().to_string();
        let length = if name.starts_with("short") {
            300
        } else if name.starts_with("mid") {
            5_000
        } else {
            millis
        };
        Session::from_source(SyntheticSource::builder(length).build(), name, options)
    }
}

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

// ── run_each ───────────────────────────────────────────────────────

#[test]
fn each_file_gets_its_own_compositor() {
    let options = SnapOptions::new().with_grid(3, 2);
    let mut built = Vec::new();
    let report = run_each(
        &paths(&["a.mp4", "b.mp4"]),
        &options,
        opener(60_000),
        |path| {
            built.push(path.to_path_buf());
            Ok(Box::new(RecordingCompositor::default()) as Box<dyn Compositor>)
        },
    )
    .expect("Failed to run queue");

    assert_eq!(report.runs.len(), 2);
    assert!(report.skipped.is_empty());
    assert!(!report.cancelled);
    assert_eq!(report.runs[0].label, "a.mp4");
    assert_eq!(report.runs[1].label, "b.mp4");
    assert!(report.runs.iter().all(|run| run.taken == 6));
    assert_eq!(built, paths(&["a.mp4", "b.mp4"]));
}

#[test]
fn fatal_files_are_skipped() {
    let log = EventLog::new();
    let options = SnapOptions::new()
        .with_grid(3, 2)
        .with_listener(log.clone());
    let report = run_each(
        &paths(&["a.mp4", "short.mp4", "b.mp4"]),
        &options,
        opener(60_000),
        |_| Ok(Box::new(RecordingCompositor::default()) as Box<dyn Compositor>),
    )
    .expect("Failed to run queue");

    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, PathBuf::from("short.mp4"));
    assert!(report.skipped[0].error.contains("below"));

    let skipped = log
        .events()
        .into_iter()
        .filter(|event| matches!(event, SessionEvent::FileSkipped { .. }))
        .count();
    assert_eq!(skipped, 1);
}

#[test]
fn files_without_room_for_shots_are_skipped() {
    let log = EventLog::new();
    let options = SnapOptions::new()
        .with_grid(3, 0)
        .with_time_step(10_000)
        .with_listener(log.clone());
    let report = run_each(
        &paths(&["a.mp4", "mid.mp4", "b.mp4"]),
        &options,
        opener(60_000),
        |_| Ok(Box::new(RecordingCompositor::default()) as Box<dyn Compositor>),
    )
    .expect("Failed to run queue");

    let labels: Vec<&str> = report.runs.iter().map(|run| run.label.as_str()).collect();
    assert_eq!(labels, ["a.mp4", "b.mp4"]);
    assert!(report.runs.iter().all(|run| run.taken == 5));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, PathBuf::from("mid.mp4"));
    assert!(report.skipped[0].error.contains("No shots fit"));

    let skipped: Vec<PathBuf> = log
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::FileSkipped { path, .. } => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, paths(&["mid.mp4"]));
}

#[test]
fn other_errors_end_the_queue() {
    let options = SnapOptions::new().with_grid(3, 2);
    let result = run_each(
        &paths(&["a.mp4"]),
        &options,
        |_: &Path, _: &SnapOptions| -> Result<Session<SyntheticSource>, SnapError> {
            Err(SnapError::Seek("index is unreadable".to_string()))
        },
        |_| Ok(Box::new(RecordingCompositor::default()) as Box<dyn Compositor>),
    );
    assert!(matches!(result, Err(SnapError::Seek(_))));
}

#[test]
fn cancelled_queues_stop_early() {
    let token = CancellationToken::new();
    token.cancel();
    let options = SnapOptions::new()
        .with_grid(3, 2)
        .with_cancellation(token);
    let report = run_each(
        &paths(&["a.mp4", "b.mp4"]),
        &options,
        opener(60_000),
        |_| Ok(Box::new(RecordingCompositor::default()) as Box<dyn Compositor>),
    )
    .expect("Failed to run queue");
    assert!(report.cancelled);
    assert!(report.runs.is_empty());
}

// ── run_bound ──────────────────────────────────────────────────────

#[test]
fn bound_files_share_one_canvas() {
    let options = SnapOptions::new().with_grid(3, 2);
    let mut sink = RecordingCompositor::default();
    let report = run_bound(
        &paths(&["part1.mp4", "part2.mp4"]),
        &options,
        "concert",
        opener(30_000),
        &mut sink,
    )
    .expect("Failed to bind files");

    assert_eq!(report.duration_ms, 60_000);
    assert_eq!(report.taken, 6);
    assert_eq!(report.planned, 6);
    let offsets: Vec<i64> = report.parts.iter().map(|part| part.offset_ms).collect();
    assert_eq!(offsets, vec![0, 30_000]);
    assert!(report.parts.iter().all(|part| part.acquisition.taken == 3));

    assert_eq!(sink.begins, 1);
    assert_eq!(sink.slots, vec![0, 1, 2, 3, 4, 5]);
    let canvas = sink.canvas.expect("Failed to begin the canvas");
    assert_eq!(canvas.label, "concert");
    assert_eq!(canvas.shots, 6);
    assert_eq!(canvas.duration_ms, 60_000);
    let summary = sink.summary.expect("Failed to finish the canvas");
    assert_eq!(summary.taken, 6);
}

#[test]
fn bound_offsets_skip_broken_files() {
    let options = SnapOptions::new().with_grid(3, 2);
    let mut sink = RecordingCompositor::default();
    let report = run_bound(
        &paths(&["part1.mp4", "short.mp4", "part2.mp4"]),
        &options,
        "concert",
        opener(30_000),
        &mut sink,
    )
    .expect("Failed to bind files");

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.parts.len(), 2);
    assert_eq!(report.parts[1].path, PathBuf::from("part2.mp4"));
    assert_eq!(report.parts[1].offset_ms, 30_000);
    assert_eq!(report.taken, 6);
}

#[test]
fn bound_shots_run_on_the_bound_clock() {
    let log = EventLog::new();
    let options = SnapOptions::new()
        .with_grid(3, 2)
        .with_listener(log.clone());
    let mut sink = RecordingCompositor::default();
    run_bound(
        &paths(&["part1.mp4", "part2.mp4"]),
        &options,
        "concert",
        opener(30_000),
        &mut sink,
    )
    .expect("Failed to bind files");

    // Shot times are reported on the bound clock.
    let shots = log.shot_times();
    assert_eq!(shots.len(), 6);
    assert!(shots.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(shots[3] > 30_000);
    assert!((shots[5] - 51_426).abs() <= 40);
}

#[test]
fn nothing_to_bind_is_an_error() {
    let options = SnapOptions::new().with_grid(3, 2);
    let error = run_bound(
        &paths(&["short1.mp4", "short2.mp4"]),
        &options,
        "nothing",
        opener(30_000),
        &mut RecordingCompositor::default(),
    )
    .expect_err("Failed to reject a queue without usable files");
    assert!(matches!(error, SnapError::InvalidOptions(_)));
}

#[test]
fn keyframe_rips_cannot_be_bound() {
    let options = SnapOptions::new().with_time_step(-1);
    let error = run_bound(
        &paths(&["part1.mp4", "part2.mp4"]),
        &options,
        "rip",
        opener(30_000),
        &mut RecordingCompositor::default(),
    )
    .expect_err("Failed to reject a bound keyframe rip");
    assert!(matches!(error, SnapError::InvalidOptions(_)));
}
