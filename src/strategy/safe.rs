//! Linear acquisition that decodes every frame.

use log::info;

use crate::error::SnapError;
use crate::source::MediaSource;
use crate::strategy::{Acquisition, Cue, Outcome, linear};

/// Decode every frame after the first keyframe.
///
/// Continues from the current read position when the next target is still
/// ahead of it, otherwise starts over from the beginning.
pub(super) fn run<S: MediaSource>(
    acquisition: &mut Acquisition<'_, S>,
) -> Result<Outcome, SnapError> {
    let next = acquisition.plan.current().map(|point| point.timestamp);
    if let (Some(position), Some(target)) = (acquisition.position, next)
        && target < position
    {
        info!("Next target {target} is behind position {position}, rewinding");
        acquisition.rewind()?;
    }
    linear(acquisition, Cue::Everything)
}
