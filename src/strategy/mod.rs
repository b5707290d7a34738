//! Frame acquisition strategies.
//!
//! A strategy walks a [`SnapPlan`] and obtains one decoded frame per target
//! while reading, decoding and seeking as little as the stream allows:
//!
//! - [`Strategy::Skim`] seeks ahead when the next target is far away. It
//!   needs streams that seek freely and falls back to `Safe` as soon as a
//!   seek lands somewhere implausible.
//! - [`Strategy::Scan`] reads linearly and decodes only near targets.
//! - [`Strategy::TwoPass`] first records the keyframe preceding every
//!   target without decoding, then decodes from exactly those keyframes.
//! - [`Strategy::Safe`] decodes everything; slow but immune to bad
//!   keyframe flags and broken indexes.
//! - [`Strategy::KeyframeRip`] ignores the plan and takes one shot per
//!   keyframe.
//!
//! All of them share the machinery in [`Acquisition`]: counted packet
//! reads, decoding into the two-slot [`FrameRing`](crate::FrameRing),
//! best-fit selection and handing shots to the compositor.

mod keyframe_rip;
mod safe;
mod scan;
mod skim;
mod two_pass;

use std::collections::VecDeque;
use std::fmt::{Display, Formatter, Result as FmtResult};

use log::{debug, trace, warn};

use crate::compositor::Compositor;
use crate::config::StrategyMode;
use crate::conversion::format_timestamp;
use crate::duration::Timeline;
use crate::error::SnapError;
use crate::frame_ring::DecodedFrameRecord;
use crate::plan::{ShotLayout, SnapPlan, SnapPoint};
use crate::probe::Seekability;
use crate::progress::{ProgressTracker, SessionEvent};
use crate::session::Session;
use crate::source::{DecodeStatus, Decoded, MediaSource, Packet, SeekTarget};

/// A frame acquisition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Seek near each distant target.
    Skim,
    /// Linear read, decode near targets.
    Scan,
    /// Keyframe discovery pass, then a decode pass.
    TwoPass,
    /// Linear read, decode everything.
    Safe,
    /// One shot per keyframe.
    KeyframeRip,
}

impl Display for Strategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Strategy::Skim => "skim",
            Strategy::Scan => "scan",
            Strategy::TwoPass => "two-pass",
            Strategy::Safe => "safe",
            Strategy::KeyframeRip => "keyframe-rip",
        };
        f.write_str(name)
    }
}

/// Pick the strategy for a run.
///
/// A forced strategy always wins. Otherwise a non-positive time step rips
/// keyframes, freely seekable streams are skimmed, and everything else is
/// scanned.
pub fn select(mode: StrategyMode, layout: &ShotLayout, seekability: Seekability) -> Strategy {
    match mode {
        StrategyMode::Force(strategy) => strategy,
        StrategyMode::Auto if layout.is_keyframe_rip() => Strategy::KeyframeRip,
        StrategyMode::Auto if seekability == Seekability::Free => Strategy::Skim,
        StrategyMode::Auto => Strategy::Scan,
    }
}

/// How a strategy run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Every target was handled.
    Finished,
    /// The stream ended first.
    EndOfStream,
    /// The cancellation token fired.
    Cancelled,
    /// Seeking proved unreliable; the caller should continue with `Safe`.
    Demoted,
}

/// Raw timestamps remembered for mapping decoder output onto the rebased
/// timeline.
const RECENT_TIMESTAMPS: usize = 64;

/// Result of one packet read.
pub(crate) enum Read {
    Packet(Packet),
    End,
    Cancelled,
}

/// Which packets a linear pass decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cue {
    /// Every packet after the first keyframe.
    Everything,
    /// Keyframes within one gap of the target.
    Keyframes,
    /// Every packet from a keyframe shortly before the target up to it.
    FromKeyframe,
}

/// Shared state of one acquisition run over one session.
pub(crate) struct Acquisition<'a, S: MediaSource> {
    pub(crate) session: &'a mut Session<S>,
    pub(crate) plan: &'a mut SnapPlan,
    compositor: &'a mut dyn Compositor,
    tracker: ProgressTracker,
    pub(crate) accurate: bool,
    /// Rebased timestamp of the last video packet read.
    pub(crate) position: Option<i64>,
    timeline: Timeline,
    /// Offset from raw to rebased timestamps at the read position.
    shift: i64,
    recent: VecDeque<(i64, i64)>,
    /// Timestamp of the frame behind the last placed shot.
    last_placed: Option<i64>,
    pending: Option<Packet>,
    keyed: bool,
    decoding: bool,
    packets_since_key: u32,
    bytes_since_key: u64,
    last_flagged_key: Option<i64>,
    pub(crate) placed: usize,
}

impl<'a, S: MediaSource> Acquisition<'a, S> {
    pub(crate) fn new(
        session: &'a mut Session<S>,
        plan: &'a mut SnapPlan,
        compositor: &'a mut dyn Compositor,
        tracker: ProgressTracker,
    ) -> Self {
        let layout = session.layout;
        let thresholds = &session.options.thresholds;
        let accurate = session.options.accurate
            || (layout.step_ms > 0 && layout.step_ms < thresholds.key_step_gate_ms);
        let origin = session.stream.start_time.unwrap_or(0);
        Self {
            session,
            plan,
            compositor,
            tracker,
            accurate,
            position: None,
            timeline: Timeline::with_origin(Some(origin)),
            shift: 0,
            recent: VecDeque::with_capacity(RECENT_TIMESTAMPS),
            last_placed: None,
            pending: None,
            keyed: false,
            decoding: false,
            packets_since_key: 0,
            bytes_since_key: 0,
            last_flagged_key: None,
            placed: 0,
        }
    }

    /// Run `strategy`, continuing with `Safe` if it gets demoted.
    pub(crate) fn run(&mut self, strategy: Strategy) -> Result<(Outcome, Strategy), SnapError> {
        debug!(
            "Acquiring {} targets with {strategy} (accurate: {})",
            self.plan.len(),
            self.accurate
        );
        let outcome = match strategy {
            Strategy::Skim => skim::run(self)?,
            Strategy::Scan => scan::run(self)?,
            Strategy::TwoPass => two_pass::run(self)?,
            Strategy::Safe => safe::run(self)?,
            Strategy::KeyframeRip => keyframe_rip::run(self)?,
        };
        if outcome != Outcome::Demoted {
            return Ok((outcome, strategy));
        }

        warn!("Seeking is unreliable, continuing without it");
        self.tracker.event(SessionEvent::StrategyDemoted {
            from: strategy,
            to: Strategy::Safe,
        });
        Ok((safe::run(self)?, Strategy::Safe))
    }

    /// Largest keyframe gap seen, native units.
    pub(crate) fn gap(&self) -> i64 {
        self.session.cadence.max_gap()
    }

    /// Time step in native units.
    pub(crate) fn step(&self) -> i64 {
        self.session
            .stream
            .time_base
            .from_millis(self.session.layout.step_ms.max(0))
    }

    /// Native timestamp of the stream start.
    pub(crate) fn stream_start(&self) -> i64 {
        self.session.stream.start_time.unwrap_or(0)
    }

    /// Read the next video packet, skipping other streams.
    pub(crate) fn read_video(&mut self) -> Result<Read, SnapError> {
        if let Some(packet) = self.pending.take() {
            return Ok(Read::Packet(packet));
        }
        loop {
            if self.session.options.is_cancelled() {
                debug!("Acquisition cancelled");
                return Ok(Read::Cancelled);
            }
            let Some(packet) = self.session.source.read_packet()? else {
                return Ok(Read::End);
            };
            let counters = &mut self.session.counters;
            counters.packets_read += 1;
            if packet.stream_index != self.session.stream.index {
                continue;
            }
            counters.video_packets += 1;
            let packet = self.rebase(packet);

            if packet.is_keyframe {
                self.session.counters.keyframe_packets += 1;
                self.packets_since_key = 0;
                self.bytes_since_key = 0;
                if let Some(timestamp) = packet.timestamp() {
                    self.session.cadence.credit(timestamp);
                    self.last_flagged_key = Some(timestamp);
                }
            } else {
                self.packets_since_key += 1;
                self.bytes_since_key += packet.size;
            }
            if let Some(timestamp) = packet.timestamp() {
                self.position = Some(timestamp);
            }
            return Ok(Read::Packet(packet));
        }
    }

    /// Move a video packet onto the rebased timeline, where timestamps
    /// never run backwards and snap targets are planned.
    fn rebase(&mut self, mut packet: Packet) -> Packet {
        let Some(raw) = packet.timestamp() else {
            return packet;
        };
        let (relative, rewound) = self.timeline.follow(raw);
        let rebased = self.stream_start() + relative;
        if rewound {
            debug!("Timestamps rewound at {raw}, continuing from {rebased}");
        }
        self.shift = rebased - raw;
        if self.recent.len() == RECENT_TIMESTAMPS {
            self.recent.pop_front();
        }
        self.recent.push_back((raw, self.shift));
        if let Some(pts) = packet.pts
            && pts != raw
        {
            if self.recent.len() == RECENT_TIMESTAMPS {
                self.recent.pop_front();
            }
            self.recent.push_back((pts, self.shift));
        }

        packet.pts = packet.pts.map(|pts| pts + self.shift);
        packet.dts = packet.dts.map(|dts| dts + self.shift);
        packet
    }

    /// Rebased timestamp of a raw decoder timestamp.
    fn rebased(&self, raw: i64) -> i64 {
        let shift = self
            .recent
            .iter()
            .rev()
            .find(|(seen, _)| *seen == raw)
            .map_or(self.shift, |(_, shift)| *shift);
        raw + shift
    }

    /// Put a packet back so the next [`read_video`](Self::read_video)
    /// returns it again. The source still holds it as its last read.
    pub(crate) fn unread(&mut self, packet: Packet) {
        self.pending = Some(packet);
    }

    /// Decode the last packet read into the frame ring.
    ///
    /// Returns the timestamp of the picture that came out, if any. Decode
    /// failures are counted and swallowed.
    pub(crate) fn decode(&mut self, packet: &Packet) -> Result<Option<i64>, SnapError> {
        self.session.counters.decodes += 1;
        match self.session.source.decode() {
            Ok(DecodeStatus::Frame(decoded)) => Ok(self.store(decoded, Some(packet))),
            Ok(DecodeStatus::Pending) => Ok(None),
            Err(error) => {
                self.session.counters.decode_errors += 1;
                debug!(
                    "Skipping undecodable packet at {:?}: {error}",
                    packet.timestamp()
                );
                Ok(None)
            }
        }
    }

    fn store(&mut self, decoded: Decoded<S::Picture>, packet: Option<&Packet>) -> Option<i64> {
        let timestamp = match decoded.timestamp {
            Some(raw) => self.rebased(raw),
            None => packet.and_then(Packet::timestamp)?,
        };
        if !decoded.is_keyframe && self.last_flagged_key == Some(timestamp) {
            self.session.counters.false_keyframes += 1;
            debug!("Packet at {timestamp} is flagged as a keyframe but does not decode as one");
        }
        self.session.ring.push(DecodedFrameRecord {
            picture: decoded.picture,
            timestamp,
            position: packet.and_then(|p| p.position),
            is_keyframe: decoded.is_keyframe,
            packets_since_key: self.packets_since_key,
            bytes_since_key: self.bytes_since_key,
        });
        Some(timestamp)
    }

    /// Seek to the keyframe at or before the rebased `timestamp`.
    ///
    /// Returns `false` when the source rejected the seek.
    pub(crate) fn seek(&mut self, timestamp: i64) -> Result<bool, SnapError> {
        self.session.counters.seeks += 1;
        let target = SeekTarget::Timestamp {
            stream_index: self.session.stream.index,
            timestamp: timestamp - self.shift,
            backward: true,
        };
        match self.session.source.seek(target) {
            Ok(()) => {
                self.reset_decode_state();
                self.timeline.resync();
                Ok(true)
            }
            Err(error) => {
                self.session.counters.seek_failures += 1;
                warn!("Seek to {timestamp} failed: {error}");
                Ok(false)
            }
        }
    }

    /// Return to the first packet.
    pub(crate) fn rewind(&mut self) -> Result<(), SnapError> {
        self.session.counters.rewinds += 1;
        self.session.source.rewind()?;
        self.reset_decode_state();
        self.position = None;
        self.timeline = Timeline::with_origin(Some(self.stream_start()));
        self.shift = 0;
        Ok(())
    }

    fn reset_decode_state(&mut self) {
        self.session.ring.clear();
        self.session.cadence.reset();
        self.pending = None;
        self.recent.clear();
        self.keyed = false;
        self.decoding = false;
        self.packets_since_key = 0;
        self.bytes_since_key = 0;
    }

    fn near_target(&self, timestamp: i64, target: i64) -> bool {
        let gap = self.gap();
        gap == 0 || timestamp >= target - gap
    }

    fn starts_run(&self, timestamp: i64, point: &SnapPoint) -> bool {
        match self.plan.hint(self.plan.cursor()) {
            Some(hint) => timestamp >= hint,
            None => self.near_target(timestamp, point.timestamp),
        }
    }

    fn keeps_running(&self, reached: i64) -> bool {
        let Some(next) = self.plan.current() else {
            return false;
        };
        match self.plan.hint(self.plan.cursor()) {
            Some(hint) => hint <= reached,
            None => {
                let gap = self.gap();
                gap == 0 || next.timestamp - reached <= gap
            }
        }
    }

    /// Feed one packet of a linear pass.
    pub(crate) fn consume(&mut self, packet: Packet, cue: Cue) -> Result<(), SnapError> {
        let Some(point) = self.plan.current().copied() else {
            return Ok(());
        };
        let timestamp = packet.timestamp();
        let wanted = match cue {
            Cue::Everything => {
                self.keyed |= packet.is_keyframe;
                self.keyed
            }
            Cue::Keyframes => {
                packet.is_keyframe
                    && timestamp.is_some_and(|ts| self.near_target(ts, point.timestamp))
            }
            Cue::FromKeyframe => {
                if !self.decoding
                    && packet.is_keyframe
                    && timestamp.is_some_and(|ts| self.starts_run(ts, &point))
                {
                    trace!("Decoding from keyframe {timestamp:?} towards {}", point.timestamp);
                    self.decoding = true;
                }
                self.decoding
            }
        };
        if !wanted {
            return Ok(());
        }

        if let Some(reached) = self.decode(&packet)? {
            let cursor = self.plan.cursor();
            self.settle(reached)?;
            if cue == Cue::FromKeyframe && self.plan.cursor() != cursor {
                self.decoding = self.keeps_running(reached);
            }
        }
        Ok(())
    }

    /// Take every pending target a decoded frame at `reached` has caught up
    /// with.
    pub(crate) fn settle(&mut self, reached: i64) -> Result<(), SnapError> {
        while let Some(point) = self.plan.current().copied() {
            if point.timestamp > reached {
                break;
            }
            self.snap_update(point)?;
        }
        Ok(())
    }

    /// Place the frame nearest `point`, or skip the point when no frame is
    /// close enough.
    fn snap_update(&mut self, point: SnapPoint) -> Result<bool, SnapError> {
        let gap = self.gap();
        let tolerance = if gap > 0 { gap.saturating_mul(2) } else { i64::MAX };
        let session = &mut *self.session;

        let Some(record) = session.ring.nearest_to(point.timestamp) else {
            debug!("No decoded frame for target {}", point.timestamp);
            self.plan.skip();
            return Ok(false);
        };
        if record.timestamp.abs_diff(point.timestamp) > tolerance as u64 {
            debug!(
                "Frame at {} is too far from target {}",
                record.timestamp, point.timestamp
            );
            self.plan.skip();
            return Ok(false);
        }

        let image = session.source.scale(&record.picture)?;
        let frame_ms =
            point.millis + session.stream.time_base.to_millis(record.timestamp - point.timestamp);
        trace!(
            "Shot {} at {} ms from frame {}",
            point.slot, frame_ms, record.timestamp
        );

        self.compositor.place(point.slot, &image)?;
        if session.options.timestamps {
            self.compositor
                .burn_in(point.slot, &format_timestamp(frame_ms, false))?;
        }
        self.plan.complete();
        self.placed += 1;
        self.last_placed = Some(record.timestamp);
        self.tracker.advance(Some(frame_ms));
        Ok(true)
    }

    /// Place the most recent decoded frame in the next free slot.
    ///
    /// Used when there is no plan; frames the decoder does not confirm as
    /// keyframes are ignored.
    pub(crate) fn place_latest_keyframe(&mut self) -> Result<bool, SnapError> {
        let session = &mut *self.session;
        let Some(record) = session.ring.latest() else {
            return Ok(false);
        };
        if !record.is_keyframe {
            return Ok(false);
        }
        let start = session.stream.start_time.unwrap_or(0);
        let frame_ms = session.stream.time_base.to_millis(record.timestamp - start);
        let slot = self.placed as u32;
        let image = session.source.scale(&record.picture)?;

        self.compositor.place(slot, &image)?;
        if session.options.timestamps {
            self.compositor
                .burn_in(slot, &format_timestamp(frame_ms, false))?;
        }
        self.placed += 1;
        self.tracker.advance(Some(frame_ms));
        Ok(true)
    }

    /// Flush the decoder, storing each remaining picture in the ring and
    /// handing its timestamp to `each`.
    pub(crate) fn drain_with<F>(&mut self, mut each: F) -> Result<(), SnapError>
    where
        F: FnMut(&mut Self, i64) -> Result<(), SnapError>,
    {
        let drained = match self.session.source.drain() {
            Ok(drained) => drained,
            Err(error) => {
                warn!("Failed to drain the decoder: {error}");
                return Ok(());
            }
        };
        for decoded in drained {
            if let Some(reached) = self.store(decoded, None) {
                each(self, reached)?;
            }
        }
        Ok(())
    }

    /// Handle the end of the stream: drain the decoder, then satisfy
    /// targets beyond the last packet with the last decoded frame when it
    /// is within one keyframe gap. That frame fills one target at most.
    pub(crate) fn finish_stream(&mut self, cue: Cue) -> Result<(), SnapError> {
        self.drain_with(|acquisition, reached| acquisition.settle(reached))?;

        let reach = match self.gap() {
            0 => self.step(),
            gap => gap,
        };
        while let Some(point) = self.plan.current().copied() {
            let Some(latest) = self.session.ring.latest().map(|record| record.timestamp) else {
                break;
            };
            if self.last_placed == Some(latest) {
                break;
            }
            let beyond = self.position.is_some_and(|last| point.timestamp > last)
                && point.timestamp - latest <= reach;
            let nearest_key =
                cue == Cue::Keyframes && latest.abs_diff(point.timestamp) <= reach as u64;
            if !(beyond || nearest_key) {
                break;
            }
            self.snap_update(point)?;
        }

        if !self.plan.is_exhausted() {
            debug!(
                "Stream ended with {} of {} targets taken",
                self.plan.taken(),
                self.plan.len()
            );
        }
        Ok(())
    }
}

/// Read to the end, feeding every packet to [`Acquisition::consume`].
pub(crate) fn linear<S: MediaSource>(
    acquisition: &mut Acquisition<'_, S>,
    cue: Cue,
) -> Result<Outcome, SnapError> {
    loop {
        if acquisition.plan.is_exhausted() {
            return Ok(Outcome::Finished);
        }
        match acquisition.read_video()? {
            Read::Packet(packet) => acquisition.consume(packet, cue)?,
            Read::End => {
                acquisition.finish_stream(cue)?;
                return Ok(Outcome::EndOfStream);
            }
            Read::Cancelled => return Ok(Outcome::Cancelled),
        }
    }
}
