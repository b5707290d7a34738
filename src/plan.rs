//! Snap point planning.
//!
//! Turns the layout settings of [`SnapOptions`] and a resolved duration into
//! a shot count, a time step, and finally the ordered list of target
//! timestamps a strategy works through.
//!
//! # Example
//!
//! ```
//! use snapsheet::{ShotLayout, SnapOptions, SnapPlan, SnapPlanner, TimeBase};
//!
//! let options = SnapOptions::new().with_grid(2, 3);
//! let layout = ShotLayout::resolve(&options, 70_000);
//! assert_eq!((layout.shots, layout.step_ms), (6, 10_000));
//!
//! let planner = SnapPlanner::new(&layout, &options, 70_000);
//! let plan = SnapPlan::single(&planner, TimeBase::MILLISECONDS, 0, 70_000);
//! let millis: Vec<i64> = plan.points().iter().map(|point| point.millis).collect();
//! assert_eq!(millis, [10_000, 20_000, 30_000, 40_000, 50_000, 60_000]);
//! ```

use crate::config::SnapOptions;
use crate::conversion::TimeBase;

/// Rows used when neither rows nor a time step is given for a grid.
pub const DEFAULT_GRID_ROWS: u32 = 4;

/// Shot count and time step resolved from the layout settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotLayout {
    /// Grid columns; 0 in separate-file mode.
    pub columns: u32,
    /// Grid rows, or the shot count in separate-file mode.
    pub rows: u32,
    /// Total shots.
    pub shots: u32,
    /// Milliseconds between shots; non-positive means keyframe rip.
    pub step_ms: i64,
}

impl ShotLayout {
    /// Resolve shots and step for a range lasting `during_ms`.
    pub fn resolve(options: &SnapOptions, during_ms: i64) -> Self {
        let first = options.first_frame;
        let last = options.last_frame;
        let columns = options.columns;
        let mut rows = options.rows;
        let mut step = options.time_step_ms;

        if step < 0 {
            return Self {
                columns,
                rows,
                shots: 0,
                step_ms: step,
            };
        }

        let shots = if columns > 0 {
            if rows == 0 && step == 0 {
                rows = DEFAULT_GRID_ROWS;
            }
            if rows == 0 {
                let shots = shots_for_step(during_ms, step, first, last);
                rows = shots.div_ceil(columns);
                shots
            } else {
                let shots = columns * rows;
                if step == 0 {
                    step = derived_step(during_ms, shots, first, last);
                }
                shots
            }
        } else if rows > 0 {
            if step == 0 {
                step = derived_step(during_ms, rows, first, last);
            }
            rows
        } else if step > 0 {
            let shots = shots_for_step(during_ms, step, first, last);
            rows = shots;
            shots
        } else {
            0
        };

        Self {
            columns,
            rows,
            shots,
            step_ms: step,
        }
    }

    /// Whether the layout calls for one shot per keyframe.
    pub fn is_keyframe_rip(&self) -> bool {
        self.step_ms <= 0
    }
}

/// A step computed from a shot count. Only an explicit step may rip
/// keyframes, so a range too short for the shots still gets a positive
/// step and the planner drops the points that fall outside it.
fn derived_step(during_ms: i64, shots: u32, first: bool, last: bool) -> i64 {
    step_for_shots(during_ms, shots, first, last).max(1)
}

/// Shots that fit in `during_ms` at `step_ms` apart.
pub fn shots_for_step(during_ms: i64, step_ms: i64, first: bool, last: bool) -> u32 {
    if step_ms <= 0 {
        return 0;
    }
    let shots = during_ms / step_ms - 1 + first as i64 + last as i64;
    shots.clamp(0, u32::MAX as i64) as u32
}

/// Step that spreads `shots` evenly over `during_ms`.
pub fn step_for_shots(during_ms: i64, shots: u32, first: bool, last: bool) -> i64 {
    let slots = (shots as i64 + 1 - first as i64 - last as i64).max(1);
    during_ms / slots
}

/// Generates target times for a (possibly multi-file) range.
///
/// Times are global milliseconds. For a single file they coincide with
/// the file's own clock; for a bound set of files they run across the
/// concatenation and each file claims the points inside its window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapPlanner {
    time_from_ms: i64,
    step_ms: i64,
    shots: u32,
    first_frame: bool,
    range_end_ms: i64,
}

impl SnapPlanner {
    /// Build a planner for a layout over `total_ms` of media.
    pub fn new(layout: &ShotLayout, options: &SnapOptions, total_ms: i64) -> Self {
        let range_end_ms = options
            .time_to_ms
            .map_or(total_ms, |to| to.min(total_ms));
        Self {
            time_from_ms: options.time_from_ms,
            step_ms: layout.step_ms,
            shots: layout.shots,
            first_frame: options.first_frame,
            range_end_ms,
        }
    }

    /// Global time of shot `index`, or `None` past the last shot or the
    /// end of the range.
    pub fn snap_point(&self, index: u32) -> Option<i64> {
        if index >= self.shots || self.step_ms <= 0 {
            return None;
        }
        let ordinal = index as i64 + if self.first_frame { 0 } else { 1 };
        let millis = self.time_from_ms + self.step_ms * ordinal;
        (millis <= self.range_end_ms).then_some(millis)
    }

    /// Planned shot count.
    pub fn shots(&self) -> u32 {
        self.shots
    }

    /// Milliseconds between shots.
    pub fn step_ms(&self) -> i64 {
        self.step_ms
    }

    /// End of the sampled range.
    pub fn range_end_ms(&self) -> i64 {
        self.range_end_ms
    }
}

/// One target of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapPoint {
    /// Canvas cell (or output file number) of the shot.
    pub slot: u32,
    /// Global media time in milliseconds.
    pub millis: i64,
    /// Target in the stream's native units.
    pub timestamp: i64,
}

/// The ordered targets for one file plus acquisition progress through them.
#[derive(Debug, Clone, Default)]
pub struct SnapPlan {
    points: Vec<SnapPoint>,
    hints: Vec<Option<i64>>,
    cursor: usize,
    taken: usize,
}

impl SnapPlan {
    /// Plan a file that is not bound to any other.
    pub fn single(
        planner: &SnapPlanner,
        time_base: TimeBase,
        start_bias: i64,
        duration_ms: i64,
    ) -> Self {
        Self::for_file(planner, time_base, start_bias, 0, duration_ms)
    }

    /// Plan the part of a bound range covered by one file.
    ///
    /// The file occupies `[offset_ms, offset_ms + duration_ms]` of the
    /// global range; a point exactly on a boundary belongs to the earlier
    /// file. Native targets are `from_millis(millis - offset) + start_bias`.
    pub fn for_file(
        planner: &SnapPlanner,
        time_base: TimeBase,
        start_bias: i64,
        offset_ms: i64,
        duration_ms: i64,
    ) -> Self {
        let end_ms = offset_ms + duration_ms;
        let points: Vec<SnapPoint> = (0..planner.shots())
            .map_while(|slot| planner.snap_point(slot).map(|millis| (slot, millis)))
            .filter(|&(_, millis)| {
                millis <= end_ms && (millis > offset_ms || (offset_ms == 0 && millis == 0))
            })
            .map(|(slot, millis)| SnapPoint {
                slot,
                millis,
                timestamp: time_base.from_millis(millis - offset_ms) + start_bias,
            })
            .collect();
        let hints = vec![None; points.len()];
        Self {
            points,
            hints,
            cursor: 0,
            taken: 0,
        }
    }

    /// All points in order.
    pub fn points(&self) -> &[SnapPoint] {
        &self.points
    }

    /// The next point to acquire.
    pub fn current(&self) -> Option<&SnapPoint> {
        self.points.get(self.cursor)
    }

    /// Index of the next point to acquire.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Mark the current point as taken and move on.
    pub fn complete(&mut self) {
        if self.cursor < self.points.len() {
            self.cursor += 1;
            self.taken += 1;
        }
    }

    /// Give up on the current point and move on.
    pub fn skip(&mut self) {
        if self.cursor < self.points.len() {
            self.cursor += 1;
        }
    }

    /// Whether every point has been taken or skipped.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.points.len()
    }

    /// Points taken so far.
    pub fn taken(&self) -> usize {
        self.taken
    }

    /// Points planned.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the plan has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keyframe timestamp preceding point `index`, from a first pass.
    pub fn hint(&self, index: usize) -> Option<i64> {
        self.hints.get(index).copied().flatten()
    }

    /// Record the keyframe preceding point `index`.
    pub fn set_hint(&mut self, index: usize, keyframe: i64) {
        if let Some(hint) = self.hints.get_mut(index) {
            *hint = Some(keyframe);
        }
    }
}
