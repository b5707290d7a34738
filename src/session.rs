//! Snapshot sessions.
//!
//! A [`Session`] owns one open media file through its [`MediaSource`] and
//! walks it through a fixed lifecycle:
//!
//! ```text
//! Opened -> DurationResolved -> Connected -> Acquiring -> Ended -> Closed
//! ```
//!
//! Locating selects the video stream and opens the decoder; resolving then
//! fixes the duration and (for automatic strategy selection) probes
//! seekability. [`Session::from_source`] does both.
//! [`Session::run`] then plans the shots, connects the scaler and drives the
//! selected strategy into a [`Compositor`].
//!
//! # Example
//!
//! ```
//! use snapsheet::{Compositor, CanvasSpec, RunSummary, Session, SnapError, SnapOptions, SyntheticSource};
//!
//! struct Count(usize);
//!
//! impl Compositor for Count {
//!     fn begin(&mut self, _canvas: &CanvasSpec) -> Result<(), SnapError> { Ok(()) }
//!     fn place(&mut self, _slot: u32, _image: &image::RgbImage) -> Result<(), SnapError> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//!     fn end(&mut self, _summary: &RunSummary) -> Result<(), SnapError> { Ok(()) }
//! }
//!
//! let source = SyntheticSource::builder(60_000).build();
//! let options = SnapOptions::new().with_grid(3, 2);
//! let mut session = Session::from_source(source, "clip", &options)?;
//! let mut sink = Count(0);
//! let report = session.run(&mut sink)?;
//! assert_eq!(report.taken, 6);
//! assert_eq!(sink.0, 6);
//! # Ok::<(), SnapError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::Sub;
#[cfg(feature = "ffmpeg")]
use std::path::Path;

use log::{debug, info};

use crate::compositor::{CanvasSpec, Compositor, RunSummary};
use crate::config::{SnapOptions, StrategyMode};
use crate::duration::{DurationEstimate, DurationMethod, resolve_duration};
use crate::error::SnapError;
#[cfg(feature = "ffmpeg")]
use crate::ffmpeg_source::FfmpegSource;
use crate::frame_ring::FrameRing;
use crate::keyframe::KeyframeCadence;
use crate::plan::{ShotLayout, SnapPlan, SnapPlanner};
use crate::probe::{Seekability, probe_seekability};
use crate::progress::{ProgressTracker, SessionEvent};
use crate::source::{MediaSource, StreamInfo};
use crate::strategy::{Acquisition, Outcome, Strategy, select};

/// Lifecycle position of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Stream selected and decoder open.
    Opened,
    /// Duration known.
    DurationResolved,
    /// Scaler connected.
    Connected,
    /// A strategy is running.
    Acquiring,
    /// Acquisition finished.
    Ended,
    /// Resources released.
    Closed,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Opened => "opened",
            SessionState::DurationResolved => "duration-resolved",
            SessionState::Connected => "connected",
            SessionState::Acquiring => "acquiring",
            SessionState::Ended => "ended",
            SessionState::Closed => "closed",
        }
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Work counted by a session's acquisitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    /// Packets read, all streams.
    pub packets_read: u64,
    /// Video packets read.
    pub video_packets: u64,
    /// Video packets flagged as keyframes.
    pub keyframe_packets: u64,
    /// Packets sent to the decoder.
    pub decodes: u64,
    /// Packets the decoder rejected.
    pub decode_errors: u64,
    /// Seeks attempted.
    pub seeks: u64,
    /// Seeks the source rejected.
    pub seek_failures: u64,
    /// Returns to the first packet.
    pub rewinds: u64,
    /// Packets flagged as keyframes that decoded as ordinary frames.
    pub false_keyframes: u64,
}

impl Sub for SessionCounters {
    type Output = SessionCounters;

    fn sub(self, earlier: SessionCounters) -> SessionCounters {
        SessionCounters {
            packets_read: self.packets_read - earlier.packets_read,
            video_packets: self.video_packets - earlier.video_packets,
            keyframe_packets: self.keyframe_packets - earlier.keyframe_packets,
            decodes: self.decodes - earlier.decodes,
            decode_errors: self.decode_errors - earlier.decode_errors,
            seeks: self.seeks - earlier.seeks,
            seek_failures: self.seek_failures - earlier.seek_failures,
            rewinds: self.rewinds - earlier.rewinds,
            false_keyframes: self.false_keyframes - earlier.false_keyframes,
        }
    }
}

/// Outcome of one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionReport {
    /// Shots placed.
    pub taken: usize,
    /// Shots planned (for keyframe rip: shots placed).
    pub planned: usize,
    /// Strategy that finished the run.
    pub strategy: Strategy,
    /// Whether the seek strategy was abandoned midway.
    pub demoted: bool,
    /// Whether fewer shots than planned were taken.
    pub partial: bool,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// Work done during this acquisition only.
    pub counters: SessionCounters,
}

/// Outcome of [`Session::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Label of the file.
    pub label: String,
    /// Shots placed.
    pub taken: usize,
    /// Shots planned.
    pub planned: usize,
    /// Strategy that finished the run.
    pub strategy: Strategy,
    /// Probed seekability.
    pub seekability: Seekability,
    /// Resolved duration.
    pub duration: DurationEstimate,
    /// Work done by every acquisition of the session.
    pub counters: SessionCounters,
    /// Work done by this run's acquisition.
    pub acquisition: SessionCounters,
    /// Whether the seek strategy was abandoned midway.
    pub demoted: bool,
    /// Whether fewer shots than planned were taken.
    pub partial: bool,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

/// One open media file; see the [module documentation](self).
pub struct Session<S: MediaSource> {
    pub(crate) source: S,
    pub(crate) label: String,
    pub(crate) options: SnapOptions,
    pub(crate) stream: StreamInfo,
    pub(crate) duration: DurationEstimate,
    pub(crate) seekability: Seekability,
    pub(crate) layout: ShotLayout,
    pub(crate) cadence: KeyframeCadence,
    pub(crate) ring: FrameRing<S::Picture>,
    pub(crate) counters: SessionCounters,
    state: SessionState,
    thumbnail: Option<(u32, u32)>,
}

#[cfg(feature = "ffmpeg")]
impl Session<FfmpegSource> {
    /// Open a media file with FFmpeg.
    ///
    /// # Errors
    ///
    /// Returns [`SnapError::FileOpen`], [`SnapError::NoVideoStream`],
    /// [`SnapError::CodecOpen`] or [`SnapError::DurationTooShort`] when the
    /// file cannot be used.
    pub fn open<P: AsRef<Path>>(path: P, options: &SnapOptions) -> Result<Self, SnapError> {
        let path = path.as_ref();
        let source = FfmpegSource::open(path)?;
        Self::from_source(source, path.display().to_string(), options)
    }
}

impl<S: MediaSource> Session<S> {
    /// Open a session over any [`MediaSource`] and resolve its duration.
    pub fn from_source(
        source: S,
        label: impl Into<String>,
        options: &SnapOptions,
    ) -> Result<Self, SnapError> {
        let mut session = Self::locate(source, label, options)?;
        session.resolve()?;
        Ok(session)
    }

    /// Select the video stream and open its decoder.
    ///
    /// The session is left [`SessionState::Opened`]; the duration, layout
    /// and seekability stay placeholders until [`Session::resolve`].
    pub fn locate(
        mut source: S,
        label: impl Into<String>,
        options: &SnapOptions,
    ) -> Result<Self, SnapError> {
        let label = label.into();
        let stream = source
            .container()
            .select_video(options.stream_index)
            .cloned()
            .ok_or(SnapError::NoVideoStream)?;
        debug!(
            "Opening {label}: video stream {} ({}x{}, {})",
            stream.index, stream.width, stream.height, stream.codec
        );
        source.open_decoder(stream.index)?;

        Ok(Self {
            source,
            label,
            options: options.clone(),
            stream,
            duration: DurationEstimate {
                millis: 0,
                method: DurationMethod::Header,
                header_ms: None,
                bitrate_estimate_ms: None,
            },
            seekability: Seekability::Unknown,
            layout: ShotLayout::resolve(options, 0),
            cadence: KeyframeCadence::new(),
            ring: FrameRing::new(),
            counters: SessionCounters::default(),
            state: SessionState::Opened,
            thumbnail: None,
        })
    }

    /// Resolve the duration, the shot layout and (for automatic strategy
    /// selection) seekability.
    ///
    /// # Errors
    ///
    /// Returns [`SnapError::DurationTooShort`] when the file is shorter than
    /// the configured minimum.
    pub fn resolve(&mut self) -> Result<(), SnapError> {
        self.expect_state(SessionState::Opened)?;
        let options = &self.options;
        let duration = resolve_duration(
            &mut self.source,
            &self.stream,
            options,
            &mut self.cadence,
        )?;
        let minimum = options.thresholds.min_duration_ms;
        if duration.millis < minimum {
            return Err(SnapError::DurationTooShort {
                millis: duration.millis,
                minimum,
            });
        }
        options.listener.on_event(&SessionEvent::DurationResolved {
            millis: duration.millis,
            method: duration.method,
        });

        let range_end = options
            .time_to_ms
            .map_or(duration.millis, |to| to.min(duration.millis));
        self.layout = ShotLayout::resolve(options, range_end - options.time_from_ms);

        if options.strategy == StrategyMode::Auto && !self.layout.is_keyframe_rip() {
            let report = probe_seekability(
                &mut self.source,
                &self.stream,
                duration.millis,
                &options.thresholds,
                &mut self.cadence,
            )?;
            options
                .listener
                .on_event(&SessionEvent::SeekabilityDetected(report.seekability));
            self.seekability = report.seekability;
        }
        self.duration = duration;
        self.state = SessionState::DurationResolved;
        Ok(())
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), SnapError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SnapError::InvalidState {
                expected: expected.name(),
                found: self.state.name(),
            })
        }
    }

    /// Thumbnail size the configured geometry gives for this stream.
    pub fn thumbnail_size(&self) -> (u32, u32) {
        self.options
            .geometry
            .resolve(self.stream.width, self.stream.height)
    }

    /// Connect the scaler, producing `width` x `height` thumbnails.
    pub fn connect(&mut self, width: u32, height: u32) -> Result<(), SnapError> {
        self.expect_state(SessionState::DurationResolved)?;
        if width == 0 || height == 0 {
            return Err(SnapError::Scaler(format!(
                "cannot scale to {width}x{height}"
            )));
        }
        self.source.connect_scaler(width, height)?;
        self.thumbnail = Some((width, height));
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Adopt the layout of a bound range in place of this file's own.
    pub(crate) fn rebind(&mut self, layout: ShotLayout) {
        self.layout = layout;
    }

    /// Plan this file on its own.
    pub fn plan(&self) -> SnapPlan {
        let planner = SnapPlanner::new(&self.layout, &self.options, self.duration.millis);
        SnapPlan::single(
            &planner,
            self.stream.time_base,
            self.stream.start_time.unwrap_or(0),
            self.duration.millis,
        )
    }

    /// Plan this file as the part of a bound range starting at `offset_ms`.
    pub fn plan_bound(&self, planner: &SnapPlanner, offset_ms: i64) -> SnapPlan {
        SnapPlan::for_file(
            planner,
            self.stream.time_base,
            self.stream.start_time.unwrap_or(0),
            offset_ms,
            self.duration.millis,
        )
    }

    /// The strategy [`acquire`](Session::acquire) will start with.
    pub fn strategy(&self) -> Strategy {
        select(self.options.strategy, &self.layout, self.seekability)
    }

    /// The canvas this session fills on its own.
    pub fn canvas_spec(&self) -> CanvasSpec {
        let (thumbnail_width, thumbnail_height) =
            self.thumbnail.unwrap_or_else(|| self.thumbnail_size());
        let shots = if self.strategy() == Strategy::KeyframeRip {
            self.options.keyframe_limit.unwrap_or(0) as u32
        } else {
            self.layout.shots
        };
        CanvasSpec {
            label: self.label.clone(),
            columns: self.layout.columns,
            rows: self.layout.rows,
            shots,
            thumbnail_width,
            thumbnail_height,
            duration_ms: self.duration.millis,
        }
    }

    /// Acquire the targets of `plan` into `compositor`.
    ///
    /// The compositor must already have been started with
    /// [`Compositor::begin`]. A partial result emits
    /// [`SessionEvent::PartialResult`] once; cancellation ends the
    /// acquisition normally with the shots taken so far.
    pub fn acquire(
        &mut self,
        plan: &mut SnapPlan,
        compositor: &mut dyn Compositor,
    ) -> Result<AcquisitionReport, SnapError> {
        self.expect_state(SessionState::Connected)?;
        let strategy = self.strategy();
        if self.layout.is_keyframe_rip() && strategy != Strategy::KeyframeRip {
            return Err(SnapError::InvalidOptions(format!(
                "a negative time step needs the keyframe-rip strategy, not {strategy}"
            )));
        }

        self.state = SessionState::Acquiring;
        let before = self.counters;
        let listener = self.options.listener.clone();
        let total = match strategy {
            Strategy::KeyframeRip => self.options.keyframe_limit,
            _ => Some(plan.len() as u64),
        };

        let tracker = ProgressTracker::new(listener.clone(), total);
        let mut acquisition = Acquisition::new(self, plan, compositor, tracker);
        let result = acquisition.run(strategy);
        let placed = acquisition.placed;
        self.state = SessionState::Ended;
        let (outcome, finished_with) = result?;

        let planned = match strategy {
            Strategy::KeyframeRip => placed,
            _ => plan.len(),
        };
        let cancelled = outcome == Outcome::Cancelled;
        let partial = !cancelled && placed < planned;
        if partial {
            listener.on_event(&SessionEvent::PartialResult {
                taken: placed,
                planned,
            });
        }

        let report = AcquisitionReport {
            taken: placed,
            planned,
            strategy: finished_with,
            demoted: finished_with != strategy,
            partial,
            cancelled,
            counters: self.counters - before,
        };
        info!(
            "{}: {} of {} shots with {} ({} packets, {} decodes, {} seeks)",
            self.label,
            report.taken,
            report.planned,
            report.strategy,
            report.counters.packets_read,
            report.counters.decodes,
            report.counters.seeks
        );
        Ok(report)
    }

    /// Plan, connect and acquire this file into its own canvas.
    pub fn run(&mut self, compositor: &mut dyn Compositor) -> Result<RunReport, SnapError> {
        let mut plan = self.plan();
        if !self.layout.is_keyframe_rip() && plan.is_empty() {
            return Err(SnapError::NoShotsFit {
                millis: self.duration.millis,
            });
        }
        let (width, height) = self.thumbnail_size();
        self.connect(width, height)?;

        let canvas = self.canvas_spec();
        let listener = self.options.listener.clone();
        listener.on_begin(&self.label, Some(canvas.shots as u64).filter(|&s| s > 0));
        compositor.begin(&canvas)?;

        let acquired = self.acquire(&mut plan, compositor)?;
        compositor.end(&RunSummary {
            label: self.label.clone(),
            taken: acquired.taken,
            planned: acquired.planned,
            cancelled: acquired.cancelled,
        })?;
        listener.on_end(&self.label, acquired.taken as u64);

        Ok(RunReport {
            label: self.label.clone(),
            taken: acquired.taken,
            planned: acquired.planned,
            strategy: acquired.strategy,
            seekability: self.seekability,
            duration: self.duration,
            counters: self.counters,
            acquisition: acquired.counters,
            demoted: acquired.demoted,
            partial: acquired.partial,
            cancelled: acquired.cancelled,
        })
    }

    /// Release the source, decoder and scaler.
    pub fn close(mut self) {
        self.state = SessionState::Closed;
        debug!("Closing {}", self.label);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Label given at open time.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The selected video stream.
    pub fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    /// The resolved duration.
    pub fn duration(&self) -> &DurationEstimate {
        &self.duration
    }

    /// The probed seekability.
    pub fn seekability(&self) -> Seekability {
        self.seekability
    }

    /// The resolved shot layout.
    pub fn layout(&self) -> &ShotLayout {
        &self.layout
    }

    /// Keyframe cadence seen so far.
    pub fn cadence(&self) -> &KeyframeCadence {
        &self.cadence
    }

    /// Work counted by all acquisitions so far.
    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the underlying source.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}
