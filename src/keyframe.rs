//! Keyframe cadence tracking.
//!
//! Codecs only allow efficient random access at keyframes, so the distance
//! between keyframes decides how far a strategy may skip or seek without
//! overshooting a target. [`KeyframeCadence`] watches keyframe timestamps as
//! they stream past and keeps the largest gap it has seen.
//!
//! # Example
//!
//! ```
//! use snapsheet::KeyframeCadence;
//!
//! let mut cadence = KeyframeCadence::new();
//! for dts in [0, 2_000, 4_000, 7_000] {
//!     cadence.credit(dts);
//! }
//! assert_eq!(cadence.max_gap(), 3_000);
//! assert_eq!(cadence.distance_in_gaps(0, 9_000), 3);
//! ```

/// Running keyframe gap statistics for one session.
///
/// Two scopes are tracked. The *window* covers keyframes credited since the
/// last [`reset`](KeyframeCadence::reset) and is restarted whenever a seek
/// breaks locality. The *all-time* figures (maximum gap, total count, summed
/// span) survive resets, so the maximum gap never decreases during a
/// session and a whole-file average stays available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyframeCadence {
    first_dts: Option<i64>,
    last_dts: Option<i64>,
    window_count: u64,
    window_max_gap: i64,
    max_gap: i64,
    total_count: u64,
    total_gaps: u64,
    total_span: i64,
}

impl KeyframeCadence {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a keyframe timestamp (native units).
    pub fn credit(&mut self, dts: i64) {
        if let Some(last) = self.last_dts {
            let gap = dts.saturating_sub(last).saturating_abs();
            self.window_max_gap = self.window_max_gap.max(gap);
            self.max_gap = self.max_gap.max(gap);
            self.total_gaps += 1;
            self.total_span = self.total_span.saturating_add(gap);
        } else {
            self.first_dts = Some(dts);
        }
        self.last_dts = Some(dts);
        self.window_count += 1;
        self.total_count += 1;
    }

    /// Start a fresh measurement window after a seek.
    pub fn reset(&mut self) {
        self.first_dts = None;
        self.last_dts = None;
        self.window_count = 0;
        self.window_max_gap = 0;
    }

    /// How many maximum-size keyframe gaps separate `a` and `b`.
    ///
    /// Before any gap has been observed the raw distance is returned, which
    /// makes every target look far away and keeps callers conservative.
    pub fn distance_in_gaps(&self, a: i64, b: i64) -> i64 {
        let distance = a.saturating_sub(b).saturating_abs();
        if self.max_gap > 0 {
            distance / self.max_gap
        } else {
            distance
        }
    }

    /// Largest gap seen in the session (native units, 0 if unknown).
    pub fn max_gap(&self) -> i64 {
        self.max_gap
    }

    /// Largest gap seen in the current window.
    pub fn window_max_gap(&self) -> i64 {
        self.window_max_gap
    }

    /// Keyframes credited in the current window.
    pub fn window_count(&self) -> u64 {
        self.window_count
    }

    /// First keyframe of the current window.
    pub fn first_dts(&self) -> Option<i64> {
        self.first_dts
    }

    /// Most recent keyframe of the current window.
    pub fn last_dts(&self) -> Option<i64> {
        self.last_dts
    }

    /// Keyframes credited over the whole session.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Mean of every gap credited in the session, if any.
    pub fn average_gap(&self) -> Option<i64> {
        if self.total_gaps == 0 {
            None
        } else {
            Some(self.total_span / self.total_gaps as i64)
        }
    }
}
