//! Seekability probing.
//!
//! Containers advertise seeking they cannot deliver: raw streams, damaged
//! indexes and some transport streams accept a seek and land somewhere
//! else entirely. Before relying on seeks, a few are tried and the landing
//! error is measured against where a linear byte-to-time model says the
//! target should be.

use std::fmt::{Display, Formatter, Result as FmtResult};

use log::{debug, info};

use crate::config::Thresholds;
use crate::error::SnapError;
use crate::keyframe::KeyframeCadence;
use crate::source::{MediaSource, SeekTarget, StreamInfo};

/// How well a stream honours seek requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Seekability {
    /// Not probed, or the file is too short to probe.
    #[default]
    Unknown,
    /// Seeks do not land near their target.
    None,
    /// Only forward seeks land near their target.
    ForwardOnly,
    /// Seeks work in both directions.
    Free,
}

impl Display for Seekability {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let text = match self {
            Seekability::Unknown => "unknown",
            Seekability::None => "none",
            Seekability::ForwardOnly => "forward-only",
            Seekability::Free => "free",
        };
        f.write_str(text)
    }
}

/// What the probe measured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    /// The verdict.
    pub seekability: Seekability,
    /// Relative landing error of each forward probe.
    pub forward_errors: Vec<f64>,
    /// Relative landing error of each backward probe.
    pub backward_errors: Vec<f64>,
    /// Native timestamp units per byte over the sampled keyframes.
    pub ticks_per_byte: Option<f64>,
}

/// Landing error recorded for failed seeks and seeks past the end.
const FAILED_PROBE_ERROR: f64 = 1.0;

/// Sample window grows by this factor when it covers too little of the file.
const SAMPLE_EXTENSION: i64 = 10;

#[derive(Debug, Clone, Copy)]
struct Keypoint {
    timestamp: i64,
    position: u64,
}

/// Read forward to the first keyframe at least `sample_ms` past the first
/// keyframe, extending the window once when it ends in the first tenth of
/// the file.
fn sample_keyframes<S: MediaSource>(
    source: &mut S,
    stream: &StreamInfo,
    sample_ms: i64,
    cadence: &mut KeyframeCadence,
) -> Result<Option<(Keypoint, Keypoint)>, SnapError> {
    let file_size = source.container().file_size;
    let mut window = stream.time_base.from_millis(sample_ms);
    let mut extended = false;
    let mut first: Option<Keypoint> = None;

    while let Some(packet) = source.read_packet()? {
        if packet.stream_index != stream.index || !packet.is_keyframe {
            continue;
        }
        let (Some(timestamp), Some(position)) = (packet.timestamp(), packet.position) else {
            continue;
        };
        cadence.credit(timestamp);
        let keypoint = Keypoint {
            timestamp,
            position,
        };
        let Some(origin) = first else {
            first = Some(keypoint);
            continue;
        };
        if timestamp - origin.timestamp < window {
            continue;
        }
        if !extended && position < file_size / 10 {
            extended = true;
            window *= SAMPLE_EXTENSION;
            continue;
        }
        return Ok(Some((origin, keypoint)));
    }
    Ok(None)
}

/// Seek to `target` and return where the next video packet landed.
fn landing<S: MediaSource>(
    source: &mut S,
    stream: &StreamInfo,
    target: i64,
    backward: bool,
) -> Result<Option<i64>, SnapError> {
    if let Err(error) = source.seek(SeekTarget::Timestamp {
        stream_index: stream.index,
        timestamp: target,
        backward,
    }) {
        debug!("Probe seek to {target} failed: {error}");
        return Ok(None);
    }
    while let Some(packet) = source.read_packet()? {
        if packet.stream_index == stream.index
            && let Some(timestamp) = packet.timestamp()
        {
            return Ok(Some(timestamp));
        }
    }
    Ok(None)
}

fn relative_error(landed: Option<i64>, target: i64, origin: i64) -> f64 {
    match landed {
        Some(landed) => {
            let span = (target - origin).unsigned_abs().max(1) as f64;
            landed.abs_diff(target) as f64 / span
        }
        None => FAILED_PROBE_ERROR,
    }
}

fn minimum(errors: &[f64]) -> f64 {
    errors.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Classify how well `stream` can be sought.
///
/// `duration_ms` bounds the probe targets. Seek failures are measured, not
/// propagated; only read errors abort. The source is rewound and the
/// cadence window reset before returning.
pub fn probe_seekability<S: MediaSource>(
    source: &mut S,
    stream: &StreamInfo,
    duration_ms: i64,
    thresholds: &Thresholds,
    cadence: &mut KeyframeCadence,
) -> Result<ProbeReport, SnapError> {
    source.rewind()?;
    cadence.reset();
    let report = run_probes(source, stream, duration_ms, thresholds, cadence);
    source.rewind()?;
    cadence.reset();

    let report = report?;
    info!(
        "Seekability {} (forward {:?}, backward {:?})",
        report.seekability, report.forward_errors, report.backward_errors
    );
    Ok(report)
}

fn run_probes<S: MediaSource>(
    source: &mut S,
    stream: &StreamInfo,
    duration_ms: i64,
    thresholds: &Thresholds,
    cadence: &mut KeyframeCadence,
) -> Result<ProbeReport, SnapError> {
    let Some((origin, sample_end)) =
        sample_keyframes(source, stream, thresholds.probe_sample_ms, cadence)?
    else {
        debug!("Stream too short to probe seeking");
        return Ok(ProbeReport::default());
    };

    let bytes = sample_end.position.saturating_sub(origin.position).max(1);
    let ticks_per_byte = (sample_end.timestamp - origin.timestamp) as f64 / bytes as f64;
    let file_size = source.container().file_size;
    let probes = thresholds.probe_count.max(1) as i64;
    let stride = file_size.saturating_sub(sample_end.position) as f64 / (probes + 1) as f64;
    let tick_stride = (ticks_per_byte * stride) as i64;
    let stream_start = stream.start_time.unwrap_or(0);
    let stream_end = stream_start + stream.time_base.from_millis(duration_ms);

    let mut report = ProbeReport {
        ticks_per_byte: Some(ticks_per_byte),
        ..ProbeReport::default()
    };

    let mut position = sample_end.timestamp;
    let mut last_landing = None;
    for step in 1..=probes {
        let target = (sample_end.timestamp + tick_stride * step).min(stream_end);
        let landed = landing(source, stream, target, false)?;
        report.forward_errors.push(relative_error(landed, target, position));
        if let Some(landed) = landed {
            position = landed;
            last_landing = Some(landed);
        }
    }

    if minimum(&report.forward_errors) > thresholds.seek_error_tolerance {
        report.seekability = Seekability::None;
        return Ok(report);
    }

    let from = last_landing.unwrap_or(position);
    position = from;
    for step in 1..=probes {
        let target = (from - tick_stride * step).max(stream_start);
        let landed = landing(source, stream, target, true)?;
        report.backward_errors.push(relative_error(landed, target, position));
        if let Some(landed) = landed {
            position = landed;
        }
    }

    report.seekability = if minimum(&report.backward_errors) > thresholds.seek_error_tolerance {
        Seekability::ForwardOnly
    } else {
        Seekability::Free
    };
    Ok(report)
}
