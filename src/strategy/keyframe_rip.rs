//! One shot per keyframe.

use crate::error::SnapError;
use crate::source::MediaSource;
use crate::strategy::{Acquisition, Outcome, Read};

/// Decode every keyframe inside the configured range and place each one in
/// the next slot, up to the keyframe limit.
pub(super) fn run<S: MediaSource>(
    acquisition: &mut Acquisition<'_, S>,
) -> Result<Outcome, SnapError> {
    let start = acquisition.stream_start();
    let time_base = acquisition.session.stream.time_base;
    let from = start + time_base.from_millis(acquisition.session.options.time_from_ms);
    let to = acquisition
        .session
        .options
        .time_to_ms
        .map(|millis| start + time_base.from_millis(millis));
    let limit = acquisition.session.options.keyframe_limit;
    let full = |placed: usize| limit.is_some_and(|limit| placed as u64 >= limit);

    loop {
        if full(acquisition.placed) {
            return Ok(Outcome::Finished);
        }
        let packet = match acquisition.read_video()? {
            Read::Packet(packet) => packet,
            Read::End => break,
            Read::Cancelled => return Ok(Outcome::Cancelled),
        };
        let Some(timestamp) = packet.timestamp().filter(|_| packet.is_keyframe) else {
            continue;
        };
        if timestamp < from {
            continue;
        }
        if to.is_some_and(|to| timestamp > to) {
            break;
        }
        if acquisition.decode(&packet)?.is_some() {
            acquisition.place_latest_keyframe()?;
        }
    }

    acquisition.drain_with(|acquisition, reached| {
        if !full(acquisition.placed) && reached >= from && to.is_none_or(|to| reached <= to) {
            acquisition.place_latest_keyframe()?;
        }
        Ok(())
    })?;
    Ok(Outcome::EndOfStream)
}
