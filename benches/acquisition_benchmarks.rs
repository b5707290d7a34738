//! Benchmarks for duration resolution, seek probing and acquisition.
//!
//! Run with: cargo bench
//!
//! Synthetic sources need no fixtures. The FFmpeg benchmarks run only when
//! `tests/fixtures/sample_video.mp4` exists.

use criterion::{BenchmarkId, Criterion};
use image::RgbImage;
use snapsheet::duration::resolve_duration;
use snapsheet::probe::probe_seekability;
use snapsheet::{
    CanvasSpec, Compositor, ContactSheet, DurationMode, KeyframeCadence, MediaSource, RunSummary,
    SeekBehavior, Session, SnapError, SnapOptions, Strategy, StrategyMode, SyntheticSource,
    Thresholds,
};

#[cfg(feature = "ffmpeg")]
const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

/// Ten minutes at 25 fps, a keyframe every two seconds.
fn long_source() -> SyntheticSource {
    SyntheticSource::builder(600_000).build()
}

/// Discards every shot.
struct Discard;

impl Compositor for Discard {
    fn begin(&mut self, _canvas: &CanvasSpec) -> Result<(), SnapError> {
        Ok(())
    }

    fn place(&mut self, _slot: u32, _image: &RgbImage) -> Result<(), SnapError> {
        Ok(())
    }

    fn end(&mut self, _summary: &RunSummary) -> Result<(), SnapError> {
        Ok(())
    }
}

fn benchmark_strategies(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("acquire 4x5 grid");
    for strategy in [
        Strategy::Skim,
        Strategy::Scan,
        Strategy::TwoPass,
        Strategy::Safe,
    ] {
        let options = SnapOptions::new()
            .with_grid(4, 5)
            .with_strategy(StrategyMode::Force(strategy));
        group.bench_with_input(
            BenchmarkId::from_parameter(strategy),
            &options,
            |bencher, options| {
                bencher.iter(|| {
                    let mut session = Session::from_source(long_source(), "bench", options)
                        .expect("Failed to open session");
                    session.run(&mut Discard).expect("Failed to run session")
                });
            },
        );
    }
    group.finish();

    criterion.bench_function("keyframe rip (300 keyframes)", |bencher| {
        let options = SnapOptions::new().with_time_step(-1);
        bencher.iter(|| {
            let mut session = Session::from_source(long_source(), "bench", &options)
                .expect("Failed to open session");
            session.run(&mut Discard).expect("Failed to run session")
        });
    });
}

fn benchmark_duration(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("resolve duration");
    for mode in [
        DurationMode::Header,
        DurationMode::Auto,
        DurationMode::TailScan,
        DurationMode::FullScan,
    ] {
        let options = SnapOptions::new()
            .with_grid(3, 3)
            .with_duration_mode(mode);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{mode:?}")),
            &options,
            |bencher, options| {
                let mut source = long_source();
                let stream = source
                    .container()
                    .select_video(None)
                    .cloned()
                    .expect("Failed to find the video stream");
                bencher.iter(|| {
                    let mut cadence = KeyframeCadence::new();
                    resolve_duration(&mut source, &stream, options, &mut cadence)
                        .expect("Failed to resolve duration")
                });
            },
        );
    }
    group.finish();
}

fn benchmark_probe(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("probe seekability");
    for (name, behavior) in [
        ("free", SeekBehavior::Free),
        ("forward-only", SeekBehavior::ForwardOnly),
        ("unsupported", SeekBehavior::Unsupported),
    ] {
        group.bench_function(name, |bencher| {
            let mut source = SyntheticSource::builder(600_000)
                .with_seek_behavior(behavior)
                .build();
            let stream = source
                .container()
                .select_video(None)
                .cloned()
                .expect("Failed to find the video stream");
            let thresholds = Thresholds::default();
            bencher.iter(|| {
                let mut cadence = KeyframeCadence::new();
                probe_seekability(&mut source, &stream, 600_000, &thresholds, &mut cadence)
                    .expect("Failed to probe seeking")
            });
        });
    }
    group.finish();
}

fn benchmark_contact_sheet(criterion: &mut Criterion) {
    let canvas = CanvasSpec {
        label: "bench".to_string(),
        columns: 4,
        rows: 5,
        shots: 20,
        thumbnail_width: 320,
        thumbnail_height: 180,
        duration_ms: 600_000,
    };
    let shot = RgbImage::from_pixel(320, 180, image::Rgb([40, 80, 120]));

    criterion.bench_function("render 4x5 contact sheet", |bencher| {
        let mut sheet = ContactSheet::new("unused.jpg");
        sheet.begin(&canvas).expect("Failed to begin canvas");
        for slot in 0..20 {
            sheet.place(slot, &shot).expect("Failed to place shot");
        }
        bencher.iter(|| sheet.render());
    });
}

#[cfg(feature = "ffmpeg")]
fn benchmark_ffmpeg(criterion: &mut Criterion) {
    if !std::path::Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping FFmpeg benchmarks: fixture not found");
        return;
    }
    snapsheet::set_ffmpeg_log_level(snapsheet::FfmpegLogLevel::Error);

    criterion.bench_function("ffmpeg 4x4 sheet (auto)", |bencher| {
        let options = SnapOptions::new();
        bencher.iter(|| {
            let mut session =
                Session::open(SAMPLE_VIDEO, &options).expect("Failed to open fixture");
            session.run(&mut Discard).expect("Failed to run session")
        });
    });
}

#[cfg(not(feature = "ffmpeg"))]
fn benchmark_ffmpeg(_criterion: &mut Criterion) {}

criterion::criterion_group!(
    benches,
    benchmark_strategies,
    benchmark_duration,
    benchmark_probe,
    benchmark_contact_sheet,
    benchmark_ffmpeg,
);
criterion::criterion_main!(benches);
