//! Timestamp arithmetic.
//!
//! Conversions between a stream's native time base, milliseconds, and the
//! 1/1 000 000 "system" base that containers use for durations and start
//! times. Every conversion goes through [`rescale`], which multiplies and
//! divides in 128-bit integers so large timestamps never lose precision to
//! floating point.
//!
//! The module also resolves the "ratio-or-absolute" integers used by canvas
//! settings: a value with [`RATIO_FLAG`] set means "percent of a reference
//! size" instead of an absolute pixel count.

/// Ticks per second of the system time base (microseconds).
pub const SYSTEM_TIME_BASE: i64 = 1_000_000;

/// High bit marking an encoded integer as a percentage of a reference size.
pub const RATIO_FLAG: i32 = 0x4000_0000;

/// A rational time base: one native tick lasts `numerator / denominator`
/// seconds.
///
/// # Example
///
/// ```
/// use snapsheet::TimeBase;
///
/// let mpeg = TimeBase::new(1, 90_000);
/// assert_eq!(mpeg.to_millis(90_000), 1_000);
/// assert_eq!(mpeg.from_millis(40), 3_600);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBase {
    /// Seconds numerator.
    pub numerator: i32,
    /// Seconds denominator.
    pub denominator: i32,
}

impl TimeBase {
    /// Millisecond time base (1/1000).
    pub const MILLISECONDS: TimeBase = TimeBase {
        numerator: 1,
        denominator: 1_000,
    };

    /// Create a time base.
    ///
    /// # Panics
    ///
    /// Panics if either term is zero; such a time base cannot convert in
    /// both directions.
    pub fn new(numerator: i32, denominator: i32) -> Self {
        assert!(
            numerator != 0 && denominator != 0,
            "time base {numerator}/{denominator} has a zero term"
        );
        Self {
            numerator,
            denominator,
        }
    }

    /// Native ticks to milliseconds.
    pub fn to_millis(self, native: i64) -> i64 {
        rescale(
            native,
            self.numerator as i64 * 1_000,
            self.denominator as i64,
        )
    }

    /// Milliseconds to native ticks.
    pub fn from_millis(self, millis: i64) -> i64 {
        rescale(
            millis,
            self.denominator as i64,
            self.numerator as i64 * 1_000,
        )
    }

    /// Native ticks to system (microsecond) ticks.
    pub fn to_system(self, native: i64) -> i64 {
        rescale(
            native,
            self.numerator as i64 * SYSTEM_TIME_BASE,
            self.denominator as i64,
        )
    }

    /// System (microsecond) ticks to native ticks.
    pub fn from_system(self, system: i64) -> i64 {
        rescale(
            system,
            self.denominator as i64,
            self.numerator as i64 * SYSTEM_TIME_BASE,
        )
    }

    /// How many native ticks one millisecond spans, rounded up to at least 1.
    pub fn ticks_per_milli(self) -> i64 {
        self.from_millis(1).max(1)
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Rational> for TimeBase {
    fn from(rational: ffmpeg_next::Rational) -> Self {
        if rational.numerator() == 0 || rational.denominator() == 0 {
            // Broken headers report 0/0; fall back to the MPEG clock.
            return TimeBase::new(1, 90_000);
        }
        TimeBase::new(rational.numerator(), rational.denominator())
    }
}

/// Compute `value * multiplier / divisor`, rounding half away from zero.
///
/// The product is formed in 128 bits; the result saturates at the `i64`
/// range.
///
/// # Panics
///
/// Panics if `divisor` is zero.
pub fn rescale(value: i64, multiplier: i64, divisor: i64) -> i64 {
    assert!(divisor != 0, "rescale by a zero divisor");
    let product = value as i128 * multiplier as i128;
    let divisor = divisor as i128;
    let half = divisor.abs() / 2;
    let rounded = if (product < 0) != (divisor < 0) {
        (product - half) / divisor
    } else {
        (product + half) / divisor
    };
    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Encode `percent` as a ratio value for [`resolve_ratio`].
pub fn ratio(percent: i32) -> i32 {
    (percent & !RATIO_FLAG) | RATIO_FLAG
}

/// Resolve a ratio-or-absolute value against `reference`.
///
/// Flagged values yield `percent * reference / 100`; positive plain values
/// are returned as-is; anything else resolves to 0.
///
/// # Example
///
/// ```
/// use snapsheet::conversion::{ratio, resolve_ratio};
///
/// assert_eq!(resolve_ratio(ratio(5), 320), 16);
/// assert_eq!(resolve_ratio(12, 320), 12);
/// assert_eq!(resolve_ratio(-3, 320), 0);
/// ```
pub fn resolve_ratio(value: i32, reference: i32) -> i32 {
    if value & RATIO_FLAG != 0 {
        ((value & !RATIO_FLAG) as i64 * reference as i64 / 100) as i32
    } else if value > 0 {
        value
    } else {
        0
    }
}

/// Format milliseconds as `H:MM:SS` or, with `with_millis`, `H:MM:SS,mmm`.
///
/// Negative input is clamped to zero.
pub fn format_timestamp(millis: i64, with_millis: bool) -> String {
    let millis = millis.max(0);
    let hours = millis / 3_600_000;
    let minutes = millis % 3_600_000 / 60_000;
    let seconds = millis % 60_000 / 1_000;
    if with_millis {
        format!("{hours}:{minutes:02}:{seconds:02},{:03}", millis % 1_000)
    } else {
        format!("{hours}:{minutes:02}:{seconds:02}")
    }
}
