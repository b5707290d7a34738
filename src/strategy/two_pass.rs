//! Keyframe discovery followed by targeted decoding.

use log::debug;

use crate::error::SnapError;
use crate::source::MediaSource;
use crate::strategy::{Acquisition, Cue, Outcome, Read, linear};

/// Two linear passes.
///
/// The first pass decodes nothing and records, for every remaining target,
/// the last keyframe at or before it. After a rewind the second pass
/// decodes from exactly those keyframes up to their targets.
pub(super) fn run<S: MediaSource>(
    acquisition: &mut Acquisition<'_, S>,
) -> Result<Outcome, SnapError> {
    if acquisition.position.is_some() {
        acquisition.rewind()?;
    }

    let targets: Vec<i64> = acquisition
        .plan
        .points()
        .iter()
        .map(|point| point.timestamp)
        .collect();
    let mut index = acquisition.plan.cursor();
    let mut last_key: Option<i64> = None;

    while index < targets.len() {
        let packet = match acquisition.read_video()? {
            Read::Packet(packet) => packet,
            Read::End => break,
            Read::Cancelled => return Ok(Outcome::Cancelled),
        };
        let Some(timestamp) = packet.timestamp().filter(|_| packet.is_keyframe) else {
            continue;
        };
        while index < targets.len() && targets[index] < timestamp {
            if let Some(key) = last_key {
                acquisition.plan.set_hint(index, key);
            }
            index += 1;
        }
        last_key = Some(timestamp);
    }
    if let Some(key) = last_key {
        for remaining in index..targets.len() {
            acquisition.plan.set_hint(remaining, key);
        }
    }
    debug!("First pass located keyframes for {} targets", targets.len());

    acquisition.rewind()?;
    linear(acquisition, Cue::FromKeyframe)
}
