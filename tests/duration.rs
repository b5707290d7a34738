//! Duration resolution tests.

mod common;

use common::{EventLog, TICKS_PER_MS, standard_source};
use snapsheet::duration::{
    full_scan, header_duration_ms, resolve_duration, scan_statistics, tail_scan,
};
use snapsheet::{
    DurationEstimate, DurationMethod, DurationMode, KeyframeCadence, MediaSource, SeekBehavior,
    Session, SessionEvent, SnapError, SnapOptions, StreamInfo, SyntheticSource,
};

fn video_stream(source: &SyntheticSource) -> StreamInfo {
    source
        .container()
        .select_video(None)
        .cloned()
        .expect("Failed to find the video stream")
}

fn resolve(source: &mut SyntheticSource, options: &SnapOptions) -> DurationEstimate {
    let stream = video_stream(source);
    let mut cadence = KeyframeCadence::new();
    resolve_duration(source, &stream, options, &mut cadence).expect("Failed to resolve duration")
}

// ── Header ─────────────────────────────────────────────────────────

#[test]
fn header_duration_prefers_the_stream() {
    let source = SyntheticSource::builder(60_000).build();
    let stream = video_stream(&source);
    assert_eq!(header_duration_ms(source.container(), &stream), Some(60_000));
}

#[test]
fn missing_header_duration_is_none() {
    let source = SyntheticSource::builder(60_000)
        .with_header_duration(None)
        .build();
    let stream = video_stream(&source);
    assert_eq!(header_duration_ms(source.container(), &stream), None);
}

#[test]
fn forced_header_mode_trusts_the_header() {
    let mut source = SyntheticSource::builder(60_000)
        .with_header_duration(Some(90_000))
        .build();
    let options = SnapOptions::new().with_duration_mode(DurationMode::Header);
    let estimate = resolve(&mut source, &options);
    assert_eq!(estimate.method, DurationMethod::Header);
    assert_eq!(estimate.millis, 90_000);
    assert_eq!(source.counters().packets_read, 0);
}

#[test]
fn forced_header_mode_scans_without_a_header() {
    let mut source = SyntheticSource::builder(60_000)
        .with_header_duration(None)
        .build();
    let options = SnapOptions::new().with_duration_mode(DurationMode::Header);
    let estimate = resolve(&mut source, &options);
    assert_eq!(estimate.method, DurationMethod::FullScan);
    assert_eq!(estimate.millis, 59_960);
}

// ── Auto ───────────────────────────────────────────────────────────

#[test]
fn auto_accepts_a_plausible_header() {
    for header in [62_000, 70_000] {
        let mut source = SyntheticSource::builder(60_000)
            .with_header_duration(Some(header))
            .build();
        let options = SnapOptions::new().with_grid(3, 3);
        let estimate = resolve(&mut source, &options);
        assert_eq!(estimate.method, DurationMethod::Header, "header {header}");
        assert_eq!(estimate.millis, header);
        let bitrate = estimate
            .bitrate_estimate_ms
            .expect("Failed to sample the bitrate");
        assert!((bitrate - 59_800).abs() < 100, "bitrate estimate {bitrate}");
    }
}

#[test]
fn auto_tail_scans_when_the_header_disagrees() {
    let mut source = SyntheticSource::builder(60_000)
        .with_header_duration(Some(90_000))
        .build();
    let estimate = resolve(&mut source, &SnapOptions::new().with_grid(3, 3));
    assert_eq!(estimate.method, DurationMethod::TailScan);
    assert_eq!(estimate.millis, 59_960);
    assert_eq!(estimate.header_ms, Some(90_000));
}

#[test]
fn auto_tail_scans_without_a_header() {
    let mut source = SyntheticSource::builder(60_000)
        .with_header_duration(None)
        .build();
    let estimate = resolve(&mut source, &SnapOptions::new().with_grid(3, 3));
    assert_eq!(estimate.method, DurationMethod::TailScan);
    assert_eq!(estimate.millis, 59_960);
}

#[test]
fn auto_scans_when_shots_outnumber_keyframes() {
    // 16 shots against roughly 30 keyframes exceeds the default ratio.
    let mut source = standard_source();
    let estimate = resolve(&mut source, &SnapOptions::new().with_grid(4, 4));
    assert_eq!(estimate.method, DurationMethod::TailScan);
    assert_eq!(estimate.millis, 59_960);

    let mut source = standard_source();
    let estimate = resolve(&mut source, &SnapOptions::new().with_grid(7, 2));
    assert_eq!(estimate.method, DurationMethod::Header);
}

#[test]
fn auto_scans_small_files_fully() {
    let mut source = SyntheticSource::builder(30_000)
        .with_header_duration(Some(60_000))
        .build();
    let estimate = resolve(&mut source, &SnapOptions::new().with_grid(3, 3));
    assert_eq!(estimate.method, DurationMethod::FullScan);
    assert_eq!(estimate.millis, 29_960);
}

#[test]
fn auto_measures_short_streams_from_the_sample() {
    let mut source = SyntheticSource::builder(5_000).build();
    let estimate = resolve(&mut source, &SnapOptions::new());
    assert_eq!(estimate.method, DurationMethod::FullScan);
    assert_eq!(estimate.millis, 4_960);
    assert_eq!(estimate.bitrate_estimate_ms, None);
}

#[test]
fn resolution_leaves_the_source_rewound() {
    let mut source = SyntheticSource::builder(60_000)
        .with_header_duration(None)
        .build();
    let _ = resolve(&mut source, &SnapOptions::new());
    let packet = source
        .read_packet()
        .expect("Failed to read packet")
        .expect("Failed to find a packet after rewinding");
    assert_eq!(packet.timestamp(), Some(0));
}

#[test]
fn sampled_keyframes_seed_the_cadence() {
    let mut source = SyntheticSource::builder(60_000).build();
    let stream = video_stream(&source);
    let mut cadence = KeyframeCadence::new();
    let options = SnapOptions::new().with_grid(3, 3);
    resolve_duration(&mut source, &stream, &options, &mut cadence)
        .expect("Failed to resolve duration");
    assert_eq!(cadence.max_gap(), 2_000 * TICKS_PER_MS);
    assert_eq!(cadence.window_count(), 0);
}

// ── Scans ──────────────────────────────────────────────────────────

#[test]
fn full_scan_follows_a_timestamp_rewind() {
    let mut source = SyntheticSource::builder(60_000)
        .with_timestamp_rewind(30_000)
        .build();
    let stream = video_stream(&source);
    let mut cadence = KeyframeCadence::new();
    let millis = full_scan(&mut source, &stream, &mut cadence).expect("Failed to scan");
    assert_eq!(millis, Some(59_920));
    // Rebased keyframes keep the regular cadence across the rewind.
    assert_eq!(cadence.max_gap(), 2_000 * TICKS_PER_MS);

    let statistics = scan_statistics(&mut source, &stream).expect("Failed to collect statistics");
    assert_eq!(statistics.stream(0).map(|entry| entry.rewinds), Some(1));
}

#[test]
fn tail_scan_reads_only_the_end() {
    let mut source = standard_source();
    let stream = video_stream(&source);
    let mut cadence = KeyframeCadence::new();
    let millis = tail_scan(&mut source, &stream, &mut cadence).expect("Failed to scan");
    assert_eq!(millis, Some(59_960));
    assert!(source.counters().packets_read < 200);
}

#[test]
fn tail_scan_gives_up_when_seeking_fails() {
    let mut source = SyntheticSource::builder(60_000)
        .with_seek_behavior(SeekBehavior::Unsupported)
        .build();
    let stream = video_stream(&source);
    let mut cadence = KeyframeCadence::new();
    let millis = tail_scan(&mut source, &stream, &mut cadence).expect("Failed to scan");
    assert_eq!(millis, None);
}

#[test]
fn statistics_cover_every_stream() {
    let mut source = SyntheticSource::builder(60_000).with_audio(true).build();
    let stream = video_stream(&source);
    let statistics = scan_statistics(&mut source, &stream).expect("Failed to collect statistics");

    let video = statistics.stream(0).expect("Failed to find video statistics");
    assert_eq!(video.packets, 1_500);
    assert_eq!(video.keyframes, 30);
    assert_eq!(video.bytes, 1_500 * 4_096);
    assert_eq!(video.rewinds, 0);

    let audio = statistics.stream(1).expect("Failed to find audio statistics");
    assert_eq!(audio.packets, 1_500);
    assert_eq!(statistics.total_packets(), 3_000);
}

// ── Session integration ────────────────────────────────────────────

#[test]
fn session_reports_the_resolved_duration() {
    let log = EventLog::new();
    let options = SnapOptions::new()
        .with_grid(3, 3)
        .with_listener(log.clone());
    let session =
        Session::from_source(standard_source(), "clip", &options).expect("Failed to open session");
    assert_eq!(session.duration().millis, 60_000);
    assert_eq!(session.duration().method, DurationMethod::Header);

    let resolved = log.events().into_iter().find_map(|event| match event {
        SessionEvent::DurationResolved { millis, method } => Some((millis, method)),
        _ => None,
    });
    assert_eq!(resolved, Some((60_000, DurationMethod::Header)));
}

#[test]
fn too_short_streams_are_rejected() {
    let source = SyntheticSource::builder(200).build();
    let error = Session::from_source(source, "blip", &SnapOptions::new())
        .err()
        .expect("Failed to reject a 200 ms stream");
    assert!(matches!(
        error,
        SnapError::DurationTooShort {
            millis: 160,
            minimum: 500
        }
    ));
    assert!(error.is_fatal_per_file());
}
