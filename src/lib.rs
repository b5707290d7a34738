//! # snapsheet
//!
//! Contact sheets and thumbnails from video files.
//!
//! `snapsheet` picks a set of evenly spaced moments from a video and
//! acquires one decoded frame per moment while doing as little work as the
//! file allows. How it gets there depends on what the file turns out to be:
//!
//! - the **duration** comes from the container header, or from a tail or
//!   full scan when the header looks wrong;
//! - a short **seek probe** decides whether seeking can be trusted;
//! - an acquisition **strategy** then either seeks near each target
//!   ([`Strategy::Skim`]), reads linearly decoding only near targets
//!   ([`Strategy::Scan`], [`Strategy::TwoPass`]), decodes everything
//!   ([`Strategy::Safe`]), or takes one shot per keyframe
//!   ([`Strategy::KeyframeRip`]).
//!
//! Shots are handed to a [`Compositor`]: [`ContactSheet`] tiles them into
//! one image, [`FrameFiles`] writes each to its own file.
//!
//! ## Quick Start
//!
//! ```no_run
//! use snapsheet::{ContactSheet, Session, SnapOptions, output_path};
//!
//! let options = SnapOptions::new().with_grid(4, 5).with_timestamps(true);
//! let mut session = Session::open("input.mp4", &options)?;
//! let mut sheet = ContactSheet::new(output_path(
//!     "input.mp4".as_ref(),
//!     None,
//!     snapsheet::DEFAULT_SUFFIX,
//!     snapsheet::DEFAULT_EXTENSION,
//! ));
//! let report = session.run(&mut sheet)?;
//! println!("{} of {} shots with {}", report.taken, report.planned, report.strategy);
//! # Ok::<(), snapsheet::SnapError>(())
//! ```
//!
//! ## Without FFmpeg
//!
//! Everything except [`FfmpegSource`] and [`Session::open`] works against
//! any [`MediaSource`]. [`SyntheticSource`] generates a deterministic
//! packet stream with configurable defects (bad headers, broken seeking,
//! corrupt tails, decoder latency) and is what the test suite runs on.
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` | FFmpeg-backed [`FfmpegSource`] and the `snapsheet` binary (default) |
//!
//! ## Requirements
//!
//! With the `ffmpeg` feature, FFmpeg development libraries must be
//! installed on your system.

pub mod compositor;
pub mod config;
pub mod conversion;
pub mod duration;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_source;
pub mod frame_ring;
pub mod keyframe;
pub mod plan;
pub mod probe;
pub mod progress;
pub mod queue;
pub mod session;
pub mod source;
pub mod strategy;
pub mod synthetic;

pub use compositor::{
    CanvasSpec, Compositor, ContactSheet, DEFAULT_EXTENSION, DEFAULT_SUFFIX, FrameFiles,
    RunSummary, output_path,
};
pub use config::{FrameGeometry, SkimBias, SnapOptions, StrategyMode, Thresholds};
pub use conversion::TimeBase;
pub use duration::{DurationEstimate, DurationMethod, DurationMode, ScanStatistics};
pub use error::SnapError;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg_source::FfmpegSource;
pub use frame_ring::{DecodedFrameRecord, FrameRing};
pub use keyframe::KeyframeCadence;
pub use plan::{ShotLayout, SnapPlan, SnapPlanner, SnapPoint};
pub use probe::{ProbeReport, Seekability};
pub use progress::{CancellationToken, ProgressInfo, SessionEvent, SnapshotListener};
pub use queue::{BoundPart, BoundReport, QueueReport, SkippedFile, run_bound, run_each};
pub use session::{AcquisitionReport, RunReport, Session, SessionCounters, SessionState};
pub use source::{
    ContainerInfo, DecodeStatus, Decoded, MediaSource, Packet, SeekTarget, StreamInfo, StreamKind,
};
pub use strategy::Strategy;
pub use synthetic::{SeekBehavior, SyntheticCounters, SyntheticPicture, SyntheticSource};
