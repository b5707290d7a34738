//! Timestamp arithmetic, shot planning and keyframe cadence tests.

use snapsheet::conversion::{format_timestamp, ratio, rescale, resolve_ratio};
use snapsheet::frame_ring::best_fit;
use snapsheet::plan::{shots_for_step, step_for_shots};
use snapsheet::strategy::select;
use snapsheet::{
    DecodedFrameRecord, FrameRing, KeyframeCadence, Seekability, ShotLayout, SnapOptions, SnapPlan,
    SnapPlanner, Strategy, StrategyMode, TimeBase,
};

// ── TimeBase ───────────────────────────────────────────────────────

#[test]
fn mpeg_clock_converts_both_ways() {
    let time_base = TimeBase::new(1, 90_000);
    assert_eq!(time_base.from_millis(1_000), 90_000);
    assert_eq!(time_base.to_millis(90_000), 1_000);
    assert_eq!(time_base.to_system(90_000), 1_000_000);
    assert_eq!(time_base.from_system(1_000_000), 90_000);
    assert_eq!(time_base.ticks_per_milli(), 90);
}

#[test]
fn fine_time_base_round_trips_exactly() {
    let time_base = TimeBase::new(1, 90_000);
    for millis in [0, 1, 40, 999, 123_456, 3_600_000] {
        assert_eq!(time_base.to_millis(time_base.from_millis(millis)), millis);
    }
}

#[test]
fn coarse_time_base_round_trips_within_one_unit() {
    let frames = TimeBase::new(1, 25);
    let unit = frames.to_millis(1);
    assert_eq!(unit, 40);
    for millis in (0..2_000).step_by(7) {
        let back = frames.to_millis(frames.from_millis(millis));
        assert!(
            (back - millis).abs() <= unit,
            "{millis} ms came back as {back} ms"
        );
    }
}

#[test]
fn rescale_rounds_half_away_from_zero() {
    assert_eq!(rescale(3, 1, 2), 2);
    assert_eq!(rescale(-3, 1, 2), -2);
    assert_eq!(rescale(1, 1, 3), 0);
    assert_eq!(rescale(2, 1, 3), 1);
}

#[test]
fn rescale_saturates() {
    assert_eq!(rescale(i64::MAX, 2, 1), i64::MAX);
    assert_eq!(rescale(i64::MIN, 2, 1), i64::MIN);
}

#[test]
#[should_panic]
fn zero_time_base_is_rejected() {
    let _ = TimeBase::new(0, 1);
}

#[test]
fn timestamps_format_as_clock_time() {
    assert_eq!(format_timestamp(3_723_456, true), "1:02:03,456");
    assert_eq!(format_timestamp(59_999, false), "0:00:59");
    assert_eq!(format_timestamp(-5, false), "0:00:00");
}

#[test]
fn ratio_values_resolve_against_reference() {
    assert_eq!(resolve_ratio(ratio(25), 200), 50);
    assert_eq!(resolve_ratio(8, 200), 8);
    assert_eq!(resolve_ratio(-3, 200), 0);
}

// ── ShotLayout ─────────────────────────────────────────────────────

#[test]
fn grid_spreads_shots_evenly() {
    let layout = ShotLayout::resolve(&SnapOptions::new().with_grid(2, 3), 70_000);
    assert_eq!(layout.shots, 6);
    assert_eq!(layout.step_ms, 10_000);
    assert!(!layout.is_keyframe_rip());
}

#[test]
fn grid_rows_follow_time_step() {
    let options = SnapOptions::new().with_grid(4, 0).with_time_step(10_000);
    let layout = ShotLayout::resolve(&options, 60_000);
    assert_eq!(layout.shots, 5);
    assert_eq!(layout.rows, 2);
    assert_eq!(layout.step_ms, 10_000);
}

#[test]
fn separate_shots_use_rows_as_count() {
    let layout = ShotLayout::resolve(&SnapOptions::new().with_separate(5), 60_000);
    assert_eq!(layout.columns, 0);
    assert_eq!(layout.shots, 5);
    assert_eq!(layout.step_ms, 10_000);
}

#[test]
fn first_and_last_frames_widen_the_step() {
    assert_eq!(step_for_shots(60_000, 5, true, true), 15_000);
    assert_eq!(step_for_shots(60_000, 5, false, false), 10_000);
    assert_eq!(shots_for_step(60_000, 15_000, true, true), 5);
    assert_eq!(shots_for_step(60_000, 0, true, true), 0);
}

#[test]
fn negative_step_means_keyframe_rip() {
    let layout = ShotLayout::resolve(&SnapOptions::new().with_time_step(-1), 60_000);
    assert!(layout.is_keyframe_rip());
    assert_eq!(layout.shots, 0);
}

#[test]
fn derived_steps_never_rip_keyframes() {
    let options = SnapOptions::new().with_grid(4, 4).with_range(59_990, None);
    let layout = ShotLayout::resolve(&options, 10);
    assert_eq!(layout.shots, 16);
    assert_eq!(layout.step_ms, 1);
    assert!(!layout.is_keyframe_rip());
    assert_eq!(
        select(StrategyMode::Auto, &layout, Seekability::Free),
        Strategy::Skim
    );

    let past_the_end = ShotLayout::resolve(&options, -30);
    assert_eq!(past_the_end.step_ms, 1);
    assert!(!past_the_end.is_keyframe_rip());
}

// ── SnapPlanner / SnapPlan ─────────────────────────────────────────

#[test]
fn plan_is_strictly_increasing_and_inside_the_range() {
    let time_base = TimeBase::new(1, 90_000);
    for (columns, rows, duration) in [(4, 4, 60_000), (5, 7, 3_600_000), (3, 1, 1_000)] {
        let options = SnapOptions::new().with_grid(columns, rows);
        let layout = ShotLayout::resolve(&options, duration);
        let planner = SnapPlanner::new(&layout, &options, duration);
        let plan = SnapPlan::single(&planner, time_base, 0, duration);

        assert_eq!(plan.len(), (columns * rows) as usize);
        for pair in plan.points().windows(2) {
            assert!(pair[0].millis < pair[1].millis);
            assert!(pair[0].timestamp < pair[1].timestamp);
            assert_eq!(pair[0].slot + 1, pair[1].slot);
        }
        assert!(plan.points().iter().all(|point| point.millis <= duration));
    }
}

#[test]
fn plan_includes_both_ends_when_asked() {
    let options = SnapOptions::new()
        .with_grid(5, 1)
        .with_first_frame(true)
        .with_last_frame(true);
    let layout = ShotLayout::resolve(&options, 60_000);
    let planner = SnapPlanner::new(&layout, &options, 60_000);
    let plan = SnapPlan::single(&planner, TimeBase::MILLISECONDS, 0, 60_000);
    let millis: Vec<i64> = plan.points().iter().map(|point| point.millis).collect();
    assert_eq!(millis, vec![0, 15_000, 30_000, 45_000, 60_000]);
}

#[test]
fn plan_honours_time_range_and_start_bias() {
    let options = SnapOptions::new()
        .with_grid(3, 1)
        .with_range(10_000, Some(40_000));
    let layout = ShotLayout::resolve(&options, 30_000);
    assert_eq!(layout.step_ms, 7_500);

    let planner = SnapPlanner::new(&layout, &options, 60_000);
    assert_eq!(planner.range_end_ms(), 40_000);
    let plan = SnapPlan::single(&planner, TimeBase::new(1, 90_000), 900, 60_000);
    let points = plan.points();
    assert_eq!(points.len(), 3);
    assert_eq!(points[0].millis, 17_500);
    assert_eq!(points[0].timestamp, 17_500 * 90 + 900);
    assert_eq!(points[2].millis, 32_500);
}

#[test]
fn bound_files_split_points_at_their_boundaries() {
    let options = SnapOptions::new().with_separate(0).with_time_step(10_000);
    let layout = ShotLayout::resolve(&options, 60_000);
    let planner = SnapPlanner::new(&layout, &options, 60_000);
    let time_base = TimeBase::new(1, 90_000);

    let first = SnapPlan::for_file(&planner, time_base, 0, 0, 30_000);
    let second = SnapPlan::for_file(&planner, time_base, 0, 30_000, 30_000);

    let first_ms: Vec<i64> = first.points().iter().map(|point| point.millis).collect();
    let second_ms: Vec<i64> = second.points().iter().map(|point| point.millis).collect();
    assert_eq!(first_ms, vec![10_000, 20_000, 30_000]);
    assert_eq!(second_ms, vec![40_000, 50_000]);
    assert_eq!(second.points()[0].timestamp, 10_000 * 90);
    assert_eq!(second.points()[0].slot, 3);
}

#[test]
fn plan_cursor_tracks_taken_and_skipped_points() {
    let options = SnapOptions::new().with_grid(3, 1);
    let layout = ShotLayout::resolve(&options, 40_000);
    let planner = SnapPlanner::new(&layout, &options, 40_000);
    let mut plan = SnapPlan::single(&planner, TimeBase::MILLISECONDS, 0, 40_000);

    plan.complete();
    plan.skip();
    assert_eq!(plan.cursor(), 2);
    assert_eq!(plan.taken(), 1);
    assert!(!plan.is_exhausted());
    plan.complete();
    plan.complete();
    assert!(plan.is_exhausted());
    assert_eq!(plan.taken(), 2);

    plan.set_hint(1, 4_000);
    assert_eq!(plan.hint(1), Some(4_000));
    assert_eq!(plan.hint(7), None);
}

// ── KeyframeCadence ────────────────────────────────────────────────

#[test]
fn cadence_max_gap_never_shrinks() {
    let mut cadence = KeyframeCadence::new();
    let mut previous = 0;
    for dts in [0, 2_000, 4_000, 7_000, 8_000, 9_000] {
        cadence.credit(dts);
        assert!(cadence.max_gap() >= previous);
        previous = cadence.max_gap();
    }
    assert_eq!(cadence.max_gap(), 3_000);
    assert_eq!(cadence.total_count(), 6);
    assert_eq!(cadence.average_gap(), Some(1_800));
}

#[test]
fn cadence_reset_clears_window_only() {
    let mut cadence = KeyframeCadence::new();
    for dts in [0, 2_000, 4_000, 7_000] {
        cadence.credit(dts);
    }
    cadence.reset();
    assert_eq!(cadence.window_count(), 0);
    assert_eq!(cadence.window_max_gap(), 0);
    assert_eq!(cadence.first_dts(), None);
    assert_eq!(cadence.max_gap(), 3_000);

    // The first keyframe after a reset opens a window without a gap.
    cadence.credit(100_000);
    assert_eq!(cadence.window_max_gap(), 0);
    assert_eq!(cadence.max_gap(), 3_000);
    assert_eq!(cadence.last_dts(), Some(100_000));
}

#[test]
fn cadence_distance_is_raw_until_a_gap_is_known() {
    let mut cadence = KeyframeCadence::new();
    assert_eq!(cadence.distance_in_gaps(0, 9_000), 9_000);
    cadence.credit(0);
    cadence.credit(3_000);
    assert_eq!(cadence.distance_in_gaps(0, 9_000), 3);
    assert_eq!(cadence.distance_in_gaps(9_000, 0), 3);
}

// ── FrameRing ──────────────────────────────────────────────────────

fn record(timestamp: i64) -> DecodedFrameRecord<i64> {
    DecodedFrameRecord {
        picture: timestamp,
        timestamp,
        position: None,
        is_keyframe: false,
        packets_since_key: 0,
        bytes_since_key: 0,
    }
}

#[test]
fn best_fit_prefers_the_nearest_valid_candidate() {
    assert_eq!(best_fit(100, 90, 130), Some(0));
    assert_eq!(best_fit(100, 60, 120), Some(1));
    assert_eq!(best_fit(100, 90, 110), Some(0));
    assert_eq!(best_fit(100, -1, 500), Some(1));
    assert_eq!(best_fit(100, 500, -1), Some(0));
    assert_eq!(best_fit(100, -1, -1), None);
}

#[test]
fn ring_keeps_the_two_latest_frames() {
    let mut ring = FrameRing::new();
    assert!(ring.is_empty());
    assert!(ring.nearest_to(10).is_none());

    ring.push(record(0));
    ring.push(record(40));
    ring.push(record(80));
    assert_eq!(ring.len(), 2);
    assert_eq!(ring.latest().map(|r| r.timestamp), Some(80));
    assert_eq!(ring.nearest_to(50).map(|r| r.timestamp), Some(40));
    assert_eq!(ring.nearest_to(0).map(|r| r.timestamp), Some(40));

    ring.clear();
    assert!(ring.latest().is_none());
}
