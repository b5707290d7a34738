//! Session lifecycle and compositor tests.

mod common;

use std::path::Path;

use common::{EventLog, RecordingCompositor, TICKS_PER_MS, standard_source};
use snapsheet::{
    ContactSheet, DEFAULT_EXTENSION, DEFAULT_SUFFIX, FrameFiles, FrameGeometry, Session,
    SessionState, SnapError, SnapOptions, Strategy, StrategyMode, SyntheticSource, output_path,
};

fn open(options: &SnapOptions) -> Session<SyntheticSource> {
    Session::from_source(standard_source(), "clip", options).expect("Failed to open session")
}

// ── Lifecycle ──────────────────────────────────────────────────────

#[test]
fn session_walks_through_its_states() {
    let mut session = open(&SnapOptions::new().with_grid(3, 2));
    assert_eq!(session.state(), SessionState::DurationResolved);
    assert_eq!(session.label(), "clip");

    let mut plan = session.plan();
    assert_eq!(plan.len(), 6);
    let mut sink = RecordingCompositor::default();

    let error = session
        .acquire(&mut plan, &mut sink)
        .expect_err("Failed to reject acquiring before connecting");
    assert!(matches!(error, SnapError::InvalidState { .. }));

    let (width, height) = session.thumbnail_size();
    session.connect(width, height).expect("Failed to connect");
    assert_eq!(session.state(), SessionState::Connected);

    let report = session
        .acquire(&mut plan, &mut sink)
        .expect("Failed to acquire");
    assert_eq!(report.taken, 6);
    assert_eq!(session.state(), SessionState::Ended);
    session.close();
}

#[test]
fn located_sessions_resolve_before_connecting() {
    let log = EventLog::new();
    let options = SnapOptions::new()
        .with_grid(3, 2)
        .with_listener(log.clone());
    let mut session =
        Session::locate(standard_source(), "clip", &options).expect("Failed to locate stream");
    assert_eq!(session.state(), SessionState::Opened);
    assert!(log.events().is_empty());

    let error = session
        .connect(160, 90)
        .expect_err("Failed to reject connecting before resolving");
    assert!(matches!(
        error,
        SnapError::InvalidState {
            expected: "duration-resolved",
            found: "opened",
        }
    ));

    session.resolve().expect("Failed to resolve duration");
    assert_eq!(session.state(), SessionState::DurationResolved);
    assert_eq!(session.duration().millis, 60_000);
    assert_eq!(session.plan().len(), 6);
    assert!(session.resolve().is_err());
}

#[test]
fn sessions_run_once() {
    let mut session = open(&SnapOptions::new().with_grid(3, 2));
    session
        .run(&mut RecordingCompositor::default())
        .expect("Failed to run session");
    let error = session
        .run(&mut RecordingCompositor::default())
        .expect_err("Failed to reject a second run");
    assert!(matches!(
        error,
        SnapError::InvalidState {
            expected: "duration-resolved",
            ..
        }
    ));
}

#[test]
fn zero_sized_thumbnails_are_rejected() {
    let mut session = open(&SnapOptions::new().with_grid(3, 2));
    let error = session
        .connect(0, 120)
        .expect_err("Failed to reject a zero width");
    assert!(matches!(error, SnapError::Scaler(_)));
    assert_eq!(session.state(), SessionState::DurationResolved);
}

#[test]
fn empty_plans_are_rejected() {
    let options = SnapOptions::new()
        .with_grid(3, 0)
        .with_time_step(120_000)
        .with_strategy(StrategyMode::Force(Strategy::Scan));
    let mut session = open(&options);
    let error = session
        .run(&mut RecordingCompositor::default())
        .expect_err("Failed to reject a plan without shots");
    assert!(matches!(error, SnapError::NoShotsFit { .. }));
    assert!(error.is_fatal_per_file());
}

#[test]
fn ranges_past_the_end_are_not_keyframe_rips() {
    let options = SnapOptions::new().with_grid(4, 4).with_range(59_990, None);
    let mut session = open(&options);
    assert_eq!(session.strategy(), Strategy::Skim);
    assert!(!session.layout().is_keyframe_rip());

    let error = session
        .run(&mut RecordingCompositor::default())
        .expect_err("Failed to reject a range without room for shots");
    assert!(matches!(error, SnapError::NoShotsFit { .. }));
}

#[test]
fn first_run_counters_match_the_acquisition() {
    let mut session = open(&SnapOptions::new().with_grid(3, 2));
    let report = session
        .run(&mut RecordingCompositor::default())
        .expect("Failed to run session");
    assert_eq!(report.counters, report.acquisition);
    assert_eq!(session.counters(), report.counters);
    assert!(report.counters.packets_read > 0);
}

#[test]
fn listener_sees_begin_and_end() {
    let log = EventLog::new();
    let options = SnapOptions::new()
        .with_grid(3, 2)
        .with_listener(log.clone());
    let mut session = open(&options);
    session
        .run(&mut RecordingCompositor::default())
        .expect("Failed to run session");

    assert_eq!(*log.begins.lock().unwrap(), vec![("clip".to_string(), Some(6))]);
    assert_eq!(*log.ends.lock().unwrap(), vec![("clip".to_string(), 6)]);

    let progress = log.progress.lock().unwrap();
    let last = progress.last().expect("Failed to record progress");
    assert_eq!(last.current, 6);
    assert_eq!(last.total, Some(6));
    assert_eq!(last.percentage, Some(100.0));
}

// ── Stream selection ───────────────────────────────────────────────

#[test]
fn non_video_stream_requests_fall_back_to_the_best_video() {
    let source = SyntheticSource::builder(60_000).with_audio(true).build();
    let options = SnapOptions::new().with_grid(3, 2).with_stream_index(1);
    let session = Session::from_source(source, "clip", &options).expect("Failed to open session");
    assert_eq!(session.stream().index, 0);
}

#[test]
fn non_zero_start_times_bias_the_targets() {
    let source = SyntheticSource::builder(60_000)
        .with_start_time(10_000 * TICKS_PER_MS)
        .build();
    let log = EventLog::new();
    let options = SnapOptions::new()
        .with_grid(5, 2)
        .with_listener(log.clone());
    let mut session =
        Session::from_source(source, "clip", &options).expect("Failed to open session");

    let plan = session.plan();
    assert_eq!(plan.points()[0].millis, 5_454);
    assert_eq!(
        plan.points()[0].timestamp,
        (10_000 + 5_454) * TICKS_PER_MS
    );

    let report = session
        .run(&mut RecordingCompositor::default())
        .expect("Failed to run session");
    assert_eq!(report.taken, 10);
    assert!(log.shot_times().iter().all(|&ms| ms < 60_000));
}

// ── Geometry and captions ──────────────────────────────────────────

#[test]
fn geometry_sets_the_thumbnail_size() {
    let geometry = FrameGeometry {
        width: Some(100),
        height: None,
        scale_percent: 50,
    };
    let options = SnapOptions::new().with_grid(3, 2).with_geometry(geometry);
    let mut session = open(&options);
    assert_eq!(session.thumbnail_size(), (100, 75));

    let mut sink = RecordingCompositor::default();
    session.run(&mut sink).expect("Failed to run session");
    assert!(sink.sizes.iter().all(|&size| size == (100, 75)));
    let canvas = sink.canvas.expect("Failed to begin the canvas");
    assert_eq!((canvas.thumbnail_width, canvas.thumbnail_height), (100, 75));
    assert_eq!((canvas.columns, canvas.rows, canvas.shots), (3, 2, 6));
}

#[test]
fn timestamps_are_captioned_with_the_frame_time() {
    let options = SnapOptions::new().with_grid(5, 2).with_timestamps(true);
    let mut session = open(&options);
    let mut sink = RecordingCompositor::default();
    session.run(&mut sink).expect("Failed to run session");

    assert_eq!(sink.captions.len(), 10);
    assert_eq!(sink.captions[0], (0, "0:00:05".to_string()));
    assert_eq!(sink.captions[9].0, 9);
}

#[test]
fn captions_are_off_by_default() {
    let mut session = open(&SnapOptions::new().with_grid(3, 2));
    let mut sink = RecordingCompositor::default();
    session.run(&mut sink).expect("Failed to run session");
    assert!(sink.captions.is_empty());
}

// ── Output ─────────────────────────────────────────────────────────

#[test]
fn contact_sheet_is_saved() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = dir.path().join("clip_thumb.png");
    let options = SnapOptions::new().with_grid(5, 2).with_timestamps(true);
    let mut session = open(&options);
    let mut sheet = ContactSheet::new(&output);

    let report = session.run(&mut sheet).expect("Failed to run session");
    assert_eq!(report.taken, 10);
    assert!(output.exists());
    assert_eq!(sheet.canvas_size(), Some((816, 244)));
    assert_eq!(sheet.captions().len(), 10);

    let saved = image::open(&output).expect("Failed to read the sheet back");
    assert_eq!((saved.width(), saved.height()), (816, 244));
}

#[test]
fn contact_sheet_without_shots_saves_nothing() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = dir.path().join("empty.png");
    let source = SyntheticSource::builder(60_000)
        .with_corruption_from(0)
        .build();
    let options = SnapOptions::new()
        .with_grid(3, 2)
        .with_strategy(StrategyMode::Force(Strategy::Safe));
    let mut session =
        Session::from_source(source, "clip", &options).expect("Failed to open session");
    let mut sheet = ContactSheet::new(&output);

    let report = session.run(&mut sheet).expect("Failed to run session");
    assert_eq!(report.taken, 0);
    assert!(report.partial);
    assert!(!output.exists());
    assert_eq!(sheet.canvas_size(), None);
}

#[test]
fn frame_files_are_written_per_shot() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let options = SnapOptions::new().with_separate(4);
    let mut session = open(&options);
    let mut files = FrameFiles::new(dir.path().join("frames"), "clip").with_extension("png");

    let report = session.run(&mut files).expect("Failed to run session");
    assert_eq!(report.taken, 4);
    assert_eq!(files.written().len(), 4);
    assert!(files.written().iter().all(|path| path.exists()));
    assert_eq!(
        files.written()[0],
        dir.path().join("frames").join("clip-000.png")
    );
}

#[test]
fn output_paths_follow_the_input_stem() {
    let beside = output_path(
        Path::new("videos/holiday.mkv"),
        None,
        DEFAULT_SUFFIX,
        DEFAULT_EXTENSION,
    );
    assert_eq!(beside, Path::new("videos/holiday_thumb.jpg"));

    let elsewhere = output_path(
        Path::new("videos/holiday.mkv"),
        Some(Path::new("sheets")),
        "-grid",
        "png",
    );
    assert_eq!(elsewhere, Path::new("sheets/holiday-grid.png"));
}
