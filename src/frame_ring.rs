//! Two-slot decoded frame buffer.
//!
//! Decoders are pipelined: the picture returned for a packet can belong to
//! an earlier packet, and the picture for the target timestamp may only
//! appear one call later. Keeping the two most recent pictures and choosing
//! the one nearest the target corrects for that latency without adding
//! artificial delay.

/// One decoded picture and where it came from.
#[derive(Debug, Clone)]
pub struct DecodedFrameRecord<P> {
    /// The decoded picture, still in the source's native format.
    pub picture: P,
    /// Native timestamp of the picture.
    pub timestamp: i64,
    /// Byte offset of the packet that carried it, when known.
    pub position: Option<u64>,
    /// Whether the decoder reports the picture as a keyframe.
    pub is_keyframe: bool,
    /// Video packets read since the last keyframe packet.
    pub packets_since_key: u32,
    /// Video payload bytes read since the last keyframe packet.
    pub bytes_since_key: u64,
}

/// Fixed two-slot ring of [`DecodedFrameRecord`]s, overwritten round-robin.
#[derive(Debug)]
pub struct FrameRing<P> {
    slots: [Option<DecodedFrameRecord<P>>; 2],
    next: usize,
}

impl<P> Default for FrameRing<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> FrameRing<P> {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self {
            slots: [None, None],
            next: 0,
        }
    }

    /// Store a record, replacing the older of the two slots.
    pub fn push(&mut self, record: DecodedFrameRecord<P>) {
        self.slots[self.next] = Some(record);
        self.next ^= 1;
    }

    /// The record closest to `target`, see [`best_fit`].
    pub fn nearest_to(&self, target: i64) -> Option<&DecodedFrameRecord<P>> {
        let stamp =
            |slot: &Option<DecodedFrameRecord<P>>| slot.as_ref().map_or(-1, |r| r.timestamp);
        best_fit(target, stamp(&self.slots[0]), stamp(&self.slots[1]))
            .and_then(|index| self.slots[index].as_ref())
    }

    /// The most recently pushed record.
    pub fn latest(&self) -> Option<&DecodedFrameRecord<P>> {
        self.slots[self.next ^ 1].as_ref()
    }

    /// Forget both records, e.g. after a seek.
    pub fn clear(&mut self) {
        self.slots = [None, None];
        self.next = 0;
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether neither slot holds a record.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pick the candidate timestamp nearest `target`.
///
/// Negative timestamps mark empty or invalid slots. Returns the index (0 or
/// 1) of the chosen candidate, the only valid one if just one is valid, or
/// `None` when neither is. Ties go to slot 0.
///
/// # Example
///
/// ```
/// use snapsheet::frame_ring::best_fit;
///
/// assert_eq!(best_fit(100, 90, 130), Some(0));
/// assert_eq!(best_fit(100, -1, 500), Some(1));
/// assert_eq!(best_fit(100, -1, -1), None);
/// ```
pub fn best_fit(target: i64, first: i64, second: i64) -> Option<usize> {
    match (first >= 0, second >= 0) {
        (false, false) => None,
        (true, false) => Some(0),
        (false, true) => Some(1),
        (true, true) => {
            let first_distance = first.abs_diff(target);
            let second_distance = second.abs_diff(target);
            if first_distance <= second_distance {
                Some(0)
            } else {
                Some(1)
            }
        }
    }
}
