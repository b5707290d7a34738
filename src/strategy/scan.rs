//! Linear acquisition without seeking.

use crate::error::SnapError;
use crate::source::MediaSource;
use crate::strategy::{Acquisition, Cue, Outcome, linear};

/// Read from the current position and decode only around targets.
///
/// In accurate mode decoding starts at the keyframe within one gap before
/// each target and runs until a frame reaches it; otherwise only keyframes
/// near the target are decoded and the nearest one wins.
pub(super) fn run<S: MediaSource>(
    acquisition: &mut Acquisition<'_, S>,
) -> Result<Outcome, SnapError> {
    let cue = if acquisition.accurate {
        Cue::FromKeyframe
    } else {
        Cue::Keyframes
    };
    linear(acquisition, cue)
}
