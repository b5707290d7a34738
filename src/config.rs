//! Snapshot configuration.
//!
//! [`SnapOptions`] is a builder that threads layout, timing, strategy,
//! threshold, listener and cancellation settings through a session without
//! polluting every function signature.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use snapsheet::{CancellationToken, DurationMode, SnapOptions, Strategy, StrategyMode};
//!
//! let token = CancellationToken::new();
//! let options = SnapOptions::new()
//!     .with_grid(4, 5)
//!     .with_first_frame(true)
//!     .with_strategy(StrategyMode::Force(Strategy::TwoPass))
//!     .with_duration_mode(DurationMode::FullScan)
//!     .with_cancellation(token.clone());
//! assert_eq!(options.columns, 4);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::duration::DurationMode;
use crate::progress::{CancellationToken, NoOpListener, SnapshotListener};
use crate::strategy::Strategy;

/// Relative duration disagreement that triggers a scan.
pub const DEFAULT_DURATION_ERROR_RATIO: f64 = 0.20;
/// Fraction of estimated keyframes the shot count may reach before the
/// header duration is distrusted.
pub const DEFAULT_KEYFRAME_RATIO: f64 = 0.5;
/// Largest relative seek landing error still considered a working seek.
pub const DEFAULT_SEEK_ERROR_TOLERANCE: f64 = 0.30;
/// Shortest acceptable clip.
pub const DEFAULT_MIN_DURATION_MS: i64 = 500;
/// Files at or below this size are always fully scanned.
pub const DEFAULT_TAIL_SCAN_MIN_BYTES: u64 = 4 * 1024 * 1024;
/// Time steps below this force accurate mode.
pub const DEFAULT_KEY_STEP_GATE_MS: i64 = 10_000;
/// Forward (and backward) seek probes.
pub const DEFAULT_PROBE_COUNT: u32 = 3;
/// Media time read before probing seeks.
pub const DEFAULT_PROBE_SAMPLE_MS: i64 = 1_000;
/// Media time sampled for the bitrate duration estimate.
pub const DEFAULT_BITRATE_SAMPLE_MS: i64 = 10_000;
/// How many keyframe gaps a skim seek may land from its request.
pub const DEFAULT_SKIM_LANDING_GAPS: i64 = 2;

/// Heuristic thresholds used by duration estimation, probing and
/// strategies. Every field defaults to the matching `DEFAULT_*` constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// See [`DEFAULT_DURATION_ERROR_RATIO`].
    pub duration_error_ratio: f64,
    /// See [`DEFAULT_KEYFRAME_RATIO`].
    pub keyframe_ratio: f64,
    /// See [`DEFAULT_SEEK_ERROR_TOLERANCE`].
    pub seek_error_tolerance: f64,
    /// See [`DEFAULT_MIN_DURATION_MS`].
    pub min_duration_ms: i64,
    /// See [`DEFAULT_TAIL_SCAN_MIN_BYTES`].
    pub tail_scan_min_bytes: u64,
    /// See [`DEFAULT_KEY_STEP_GATE_MS`].
    pub key_step_gate_ms: i64,
    /// See [`DEFAULT_PROBE_COUNT`].
    pub probe_count: u32,
    /// See [`DEFAULT_PROBE_SAMPLE_MS`].
    pub probe_sample_ms: i64,
    /// See [`DEFAULT_BITRATE_SAMPLE_MS`].
    pub bitrate_sample_ms: i64,
    /// See [`DEFAULT_SKIM_LANDING_GAPS`].
    pub skim_landing_gaps: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            duration_error_ratio: DEFAULT_DURATION_ERROR_RATIO,
            keyframe_ratio: DEFAULT_KEYFRAME_RATIO,
            seek_error_tolerance: DEFAULT_SEEK_ERROR_TOLERANCE,
            min_duration_ms: DEFAULT_MIN_DURATION_MS,
            tail_scan_min_bytes: DEFAULT_TAIL_SCAN_MIN_BYTES,
            key_step_gate_ms: DEFAULT_KEY_STEP_GATE_MS,
            probe_count: DEFAULT_PROBE_COUNT,
            probe_sample_ms: DEFAULT_PROBE_SAMPLE_MS,
            bitrate_sample_ms: DEFAULT_BITRATE_SAMPLE_MS,
            skim_landing_gaps: DEFAULT_SKIM_LANDING_GAPS,
        }
    }
}

/// How far before a target the skim strategy seeks.
///
/// Seeking a little early lets the decoder settle on a keyframe before the
/// target instead of landing past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkimBias {
    /// A multiple of the largest keyframe gap seen so far.
    KeyframeGaps(u32),
    /// A fixed amount of media time.
    Millis(i64),
    /// Seek straight to the target.
    None,
}

impl Default for SkimBias {
    fn default() -> Self {
        SkimBias::KeyframeGaps(1)
    }
}

/// Whether to pick the acquisition strategy automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyMode {
    /// Choose from the time step and the probed seekability.
    #[default]
    Auto,
    /// Always use this strategy.
    Force(Strategy),
}

/// Thumbnail size settings.
///
/// Setting one dimension computes the other from the source aspect ratio;
/// with no dimension set the source is scaled by `scale_percent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameGeometry {
    /// Target width.
    pub width: Option<u32>,
    /// Target height.
    pub height: Option<u32>,
    /// Scale factor in percent used when no dimension is set.
    pub scale_percent: u32,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            scale_percent: 50,
        }
    }
}

impl FrameGeometry {
    /// Resolve the thumbnail dimensions given the source size.
    ///
    /// Returns `(width, height)`, each at least 1.
    pub fn resolve(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        let (width, height) = match (self.width, self.height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) if source_width > 0 => {
                let ratio = w as f64 / source_width as f64;
                (w, (source_height as f64 * ratio).round() as u32)
            }
            (None, Some(h)) if source_height > 0 => {
                let ratio = h as f64 / source_height as f64;
                ((source_width as f64 * ratio).round() as u32, h)
            }
            (Some(w), None) => (w, source_height),
            (None, Some(h)) => (source_width, h),
            (None, None) => (
                source_width * self.scale_percent / 100,
                source_height * self.scale_percent / 100,
            ),
        };
        (width.max(1), height.max(1))
    }
}

/// Configuration for a snapshot run.
///
/// All fields have defaults matching a 4x4 contact sheet with automatic
/// strategy and duration selection.
#[derive(Clone)]
pub struct SnapOptions {
    /// Grid columns; 0 selects separate-file mode.
    pub columns: u32,
    /// Grid rows, or the shot count in separate-file mode; 0 derives it.
    pub rows: u32,
    /// Milliseconds between shots; 0 derives it, negative rips keyframes.
    pub time_step_ms: i64,
    /// Start of the sampled range in milliseconds.
    pub time_from_ms: i64,
    /// End of the sampled range in milliseconds.
    pub time_to_ms: Option<i64>,
    /// Take a shot at the very start of the range.
    pub first_frame: bool,
    /// Take a shot at the very end of the range.
    pub last_frame: bool,
    /// Decode up to each target instead of settling for a nearby keyframe.
    pub accurate: bool,
    /// Burn the media timestamp into each shot.
    pub timestamps: bool,
    /// Strategy selection.
    pub strategy: StrategyMode,
    /// Duration resolution policy.
    pub duration_mode: DurationMode,
    /// Preferred video stream.
    pub stream_index: Option<usize>,
    /// Thumbnail size.
    pub geometry: FrameGeometry,
    /// Heuristic thresholds.
    pub thresholds: Thresholds,
    /// Skim seek bias.
    pub skim_bias: SkimBias,
    /// Cap on keyframe-rip shots.
    pub keyframe_limit: Option<u64>,
    pub(crate) listener: Arc<dyn SnapshotListener>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for SnapOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SnapOptions")
            .field("columns", &self.columns)
            .field("rows", &self.rows)
            .field("time_step_ms", &self.time_step_ms)
            .field("time_from_ms", &self.time_from_ms)
            .field("time_to_ms", &self.time_to_ms)
            .field("first_frame", &self.first_frame)
            .field("last_frame", &self.last_frame)
            .field("accurate", &self.accurate)
            .field("strategy", &self.strategy)
            .field("duration_mode", &self.duration_mode)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            columns: 4,
            rows: 4,
            time_step_ms: 0,
            time_from_ms: 0,
            time_to_ms: None,
            first_frame: false,
            last_frame: false,
            accurate: false,
            timestamps: false,
            strategy: StrategyMode::Auto,
            duration_mode: DurationMode::Auto,
            stream_index: None,
            geometry: FrameGeometry::default(),
            thresholds: Thresholds::default(),
            skim_bias: SkimBias::default(),
            keyframe_limit: None,
            listener: Arc::new(NoOpListener),
            cancellation: None,
        }
    }

    /// Lay shots out on a `columns` x `rows` grid. A `rows` of 0 derives
    /// the row count from the time step.
    #[must_use]
    pub fn with_grid(mut self, columns: u32, rows: u32) -> Self {
        self.columns = columns;
        self.rows = rows;
        self
    }

    /// Take `count` shots saved separately instead of a grid. A `count` of
    /// 0 derives it from the time step.
    #[must_use]
    pub fn with_separate(mut self, count: u32) -> Self {
        self.columns = 0;
        self.rows = count;
        self
    }

    /// Milliseconds between shots.
    #[must_use]
    pub fn with_time_step(mut self, millis: i64) -> Self {
        self.time_step_ms = millis;
        self
    }

    /// Restrict shots to `[from, to]` milliseconds.
    #[must_use]
    pub fn with_range(mut self, from_ms: i64, to_ms: Option<i64>) -> Self {
        self.time_from_ms = from_ms.max(0);
        self.time_to_ms = to_ms;
        self
    }

    /// Include a shot at the start of the range.
    #[must_use]
    pub fn with_first_frame(mut self, enabled: bool) -> Self {
        self.first_frame = enabled;
        self
    }

    /// Include a shot at the end of the range.
    #[must_use]
    pub fn with_last_frame(mut self, enabled: bool) -> Self {
        self.last_frame = enabled;
        self
    }

    /// Decode up to each target timestamp.
    #[must_use]
    pub fn with_accurate(mut self, enabled: bool) -> Self {
        self.accurate = enabled;
        self
    }

    /// Burn media timestamps into shots.
    #[must_use]
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Choose or force the acquisition strategy.
    #[must_use]
    pub fn with_strategy(mut self, mode: StrategyMode) -> Self {
        self.strategy = mode;
        self
    }

    /// Choose how the duration is resolved.
    #[must_use]
    pub fn with_duration_mode(mut self, mode: DurationMode) -> Self {
        self.duration_mode = mode;
        self
    }

    /// Prefer a specific video stream.
    #[must_use]
    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = Some(index);
        self
    }

    /// Set thumbnail geometry.
    #[must_use]
    pub fn with_geometry(mut self, geometry: FrameGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Override heuristic thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the skim seek bias.
    #[must_use]
    pub fn with_skim_bias(mut self, bias: SkimBias) -> Self {
        self.skim_bias = bias;
        self
    }

    /// Cap the number of keyframe-rip shots.
    #[must_use]
    pub fn with_keyframe_limit(mut self, limit: u64) -> Self {
        self.keyframe_limit = Some(limit);
        self
    }

    /// Attach a listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn SnapshotListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled, acquisition stops before the next
    /// packet and the run finalizes with the shots taken so far.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Whether cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// The attached listener.
    pub fn listener(&self) -> &Arc<dyn SnapshotListener> {
        &self.listener
    }
}
