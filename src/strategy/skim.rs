//! Seek-driven acquisition for freely seekable streams.

use log::{debug, info};

use crate::config::SkimBias;
use crate::error::SnapError;
use crate::plan::SnapPoint;
use crate::source::MediaSource;
use crate::strategy::{Acquisition, Cue, Outcome, Read};

/// Targets closer than this many keyframe gaps are reached by reading on.
const LINEAR_REACH_GAPS: i64 = 2;

enum Landing {
    Usable,
    Implausible,
    End,
    Cancelled,
}

/// Skim to each target.
///
/// Far targets are reached by a backward-flagged seek to a little before
/// the target, near ones by reading on. Any seek that is rejected, lands
/// behind the previous position, or lands too far from where it was aimed
/// returns [`Outcome::Demoted`].
pub(super) fn run<S: MediaSource>(
    acquisition: &mut Acquisition<'_, S>,
) -> Result<Outcome, SnapError> {
    let cue = if acquisition.accurate {
        Cue::FromKeyframe
    } else {
        Cue::Keyframes
    };
    let mut sought: Option<usize> = None;

    loop {
        let Some(point) = acquisition.plan.current().copied() else {
            return Ok(Outcome::Finished);
        };
        let cursor = acquisition.plan.cursor();

        if sought != Some(cursor) && worth_seeking(acquisition, point.timestamp) {
            sought = Some(cursor);
            match seek_near(acquisition, &point)? {
                Landing::Usable => continue,
                Landing::Implausible => return Ok(Outcome::Demoted),
                Landing::End => {
                    acquisition.finish_stream(cue)?;
                    return Ok(Outcome::EndOfStream);
                }
                Landing::Cancelled => return Ok(Outcome::Cancelled),
            }
        }

        match acquisition.read_video()? {
            Read::Packet(packet) => acquisition.consume(packet, cue)?,
            Read::End => {
                acquisition.finish_stream(cue)?;
                return Ok(Outcome::EndOfStream);
            }
            Read::Cancelled => return Ok(Outcome::Cancelled),
        }

        if acquisition.plan.is_exhausted() {
            return Ok(Outcome::Finished);
        }
    }
}

fn worth_seeking<S: MediaSource>(acquisition: &Acquisition<'_, S>, target: i64) -> bool {
    let position = acquisition
        .position
        .unwrap_or_else(|| acquisition.stream_start());
    target > position
        && acquisition
            .session
            .cadence
            .distance_in_gaps(position, target)
            >= LINEAR_REACH_GAPS
}

fn seek_near<S: MediaSource>(
    acquisition: &mut Acquisition<'_, S>,
    point: &SnapPoint,
) -> Result<Landing, SnapError> {
    let gap = acquisition.gap();
    let bias = match acquisition.session.options.skim_bias {
        SkimBias::KeyframeGaps(gaps) => gap.saturating_mul(gaps as i64),
        SkimBias::Millis(millis) => acquisition.session.stream.time_base.from_millis(millis),
        SkimBias::None => 0,
    };
    let aim = (point.timestamp - bias).max(acquisition.stream_start());
    let origin = acquisition.position;

    debug!("Seeking to {aim} for target {}", point.timestamp);
    if !acquisition.seek(aim)? {
        return Ok(Landing::Implausible);
    }

    let packet = match acquisition.read_video()? {
        Read::Packet(packet) => packet,
        Read::End => return Ok(Landing::End),
        Read::Cancelled => return Ok(Landing::Cancelled),
    };
    let landed = packet.timestamp();
    acquisition.unread(packet);

    let Some(landed) = landed else {
        return Ok(Landing::Usable);
    };
    let limit = if gap > 0 {
        gap.saturating_mul(acquisition.session.options.thresholds.skim_landing_gaps)
    } else {
        acquisition.step() * 3 / 10
    };

    if origin.is_some_and(|origin| landed < origin) {
        info!("Seek to {aim} landed at {landed}, behind the previous position");
        return Ok(Landing::Implausible);
    }
    if landed.abs_diff(aim) > limit.max(0) as u64 {
        info!("Seek to {aim} landed at {landed}, more than {limit} away");
        return Ok(Landing::Implausible);
    }
    Ok(Landing::Usable)
}
