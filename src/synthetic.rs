//! Deterministic in-memory media source.
//!
//! [`SyntheticSource`] fabricates a constant-rate video stream (optionally
//! interleaved with audio) with a configurable keyframe cadence, container
//! header, decoder latency and seek behaviour. It implements
//! [`MediaSource`], so every acquisition strategy can be exercised without
//! FFmpeg or media fixtures, and its counters show exactly how many reads,
//! decodes and seeks a run cost.
//!
//! # Example
//!
//! ```
//! use snapsheet::{MediaSource, SeekBehavior, SyntheticSource};
//!
//! let source = SyntheticSource::builder(60_000)
//!     .with_keyframe_interval(2_000)
//!     .with_seek_behavior(SeekBehavior::ForwardOnly)
//!     .build();
//! assert_eq!(source.video_packet_count(), 1_500);
//! assert_eq!(source.container().duration_us, Some(60_000_000));
//! ```

use std::collections::VecDeque;

use image::{Rgb, RgbImage};

use crate::conversion::TimeBase;
use crate::error::SnapError;
use crate::source::{
    ContainerInfo, DecodeStatus, Decoded, MediaSource, Packet, SeekTarget, StreamInfo, StreamKind,
};

const VIDEO_STREAM: usize = 0;
const AUDIO_STREAM: usize = 1;
const HEADER_BYTES: u64 = 4_096;
const AUDIO_PACKET_BYTES: u64 = 512;

/// How a [`SyntheticSource`] responds to seek requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekBehavior {
    /// Seeks land on the requested keyframe or byte.
    #[default]
    Free,
    /// Forward seeks work; seeks behind the read position are ignored.
    ForwardOnly,
    /// Every seek fails with [`SnapError::Seek`].
    Unsupported,
    /// The first `after` seeks work, later ones land at the start.
    Erratic {
        /// Number of seeks that behave correctly.
        after: u32,
    },
}

/// Work done by a [`SyntheticSource`] so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyntheticCounters {
    /// Packets returned by `read_packet`, all streams.
    pub packets_read: u64,
    /// Calls to `decode`.
    pub decodes: u64,
    /// Calls to `seek`, successful or not.
    pub seeks: u64,
    /// Calls to `rewind`.
    pub rewinds: u64,
}

/// The picture type produced by [`SyntheticSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticPicture {
    /// Native timestamp of the frame.
    pub timestamp: i64,
}

/// Builder for [`SyntheticSource`].
#[derive(Debug, Clone)]
pub struct SyntheticSourceBuilder {
    duration_ms: i64,
    frame_interval_ms: i64,
    keyframe_interval_ms: i64,
    time_base: TimeBase,
    start_time: i64,
    packet_size: u64,
    header_duration_ms: Option<Option<i64>>,
    audio: bool,
    decoder_delay: usize,
    corrupt_from_ms: Option<i64>,
    false_keyframe_interval_ms: Option<i64>,
    timestamp_rewind_ms: Option<i64>,
    seek_behavior: SeekBehavior,
    width: u32,
    height: u32,
}

impl SyntheticSourceBuilder {
    fn new(duration_ms: i64) -> Self {
        Self {
            duration_ms,
            frame_interval_ms: 40,
            keyframe_interval_ms: 2_000,
            time_base: TimeBase::new(1, 90_000),
            start_time: 0,
            packet_size: 4_096,
            header_duration_ms: None,
            audio: false,
            decoder_delay: 0,
            corrupt_from_ms: None,
            false_keyframe_interval_ms: None,
            timestamp_rewind_ms: None,
            seek_behavior: SeekBehavior::Free,
            width: 320,
            height: 240,
        }
    }

    /// Milliseconds between frames (default 40, i.e. 25 fps).
    #[must_use]
    pub fn with_frame_interval(mut self, millis: i64) -> Self {
        self.frame_interval_ms = millis.max(1);
        self
    }

    /// Milliseconds between keyframes (default 2000).
    #[must_use]
    pub fn with_keyframe_interval(mut self, millis: i64) -> Self {
        self.keyframe_interval_ms = millis.max(1);
        self
    }

    /// Native time base of the video stream (default 1/90000).
    #[must_use]
    pub fn with_time_base(mut self, time_base: TimeBase) -> Self {
        self.time_base = time_base;
        self
    }

    /// Timestamp of the first frame in native units (default 0).
    #[must_use]
    pub fn with_start_time(mut self, native: i64) -> Self {
        self.start_time = native;
        self
    }

    /// Bytes per video packet (default 4096).
    #[must_use]
    pub fn with_packet_size(mut self, bytes: u64) -> Self {
        self.packet_size = bytes.max(1);
        self
    }

    /// Duration the container header declares. `None` omits it; the
    /// default declares the true duration.
    #[must_use]
    pub fn with_header_duration(mut self, millis: Option<i64>) -> Self {
        self.header_duration_ms = Some(millis);
        self
    }

    /// Interleave an audio packet after every video packet.
    #[must_use]
    pub fn with_audio(mut self, audio: bool) -> Self {
        self.audio = audio;
        self
    }

    /// Pictures come out this many packets after their own packet.
    #[must_use]
    pub fn with_decoder_delay(mut self, packets: usize) -> Self {
        self.decoder_delay = packets;
        self
    }

    /// Every video packet at or after `millis` fails to decode.
    #[must_use]
    pub fn with_corruption_from(mut self, millis: i64) -> Self {
        self.corrupt_from_ms = Some(millis);
        self
    }

    /// Flag non-keyframe packets on multiples of `millis` as keyframes.
    #[must_use]
    pub fn with_false_keyframes(mut self, millis: i64) -> Self {
        self.false_keyframe_interval_ms = Some(millis.max(1));
        self
    }

    /// Restart timestamps from the start time once `millis` of content
    /// has played, as concatenated or broken streams do.
    #[must_use]
    pub fn with_timestamp_rewind(mut self, millis: i64) -> Self {
        self.timestamp_rewind_ms = Some(millis);
        self
    }

    /// How seek requests are answered (default [`SeekBehavior::Free`]).
    #[must_use]
    pub fn with_seek_behavior(mut self, behavior: SeekBehavior) -> Self {
        self.seek_behavior = behavior;
        self
    }

    /// Declared frame size (default 320x240).
    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Lay out the packets and build the source.
    pub fn build(self) -> SyntheticSource {
        let audio_base = TimeBase::new(1, 48_000);
        let mut packets = Vec::new();
        let mut real_keys = Vec::new();
        let mut position = HEADER_BYTES;
        let mut frame_count = 0u64;
        let mut millis = 0i64;

        while millis < self.duration_ms {
            let content_ms = match self.timestamp_rewind_ms {
                Some(rewind) if millis >= rewind => millis - rewind,
                _ => millis,
            };
            let timestamp = self.start_time + self.time_base.from_millis(content_ms);
            let real_key = millis % self.keyframe_interval_ms == 0;
            let flagged = real_key
                || self
                    .false_keyframe_interval_ms
                    .is_some_and(|interval| millis % interval == 0);

            packets.push(Packet {
                stream_index: VIDEO_STREAM,
                pts: Some(timestamp),
                dts: Some(timestamp),
                position: Some(position),
                size: self.packet_size,
                is_keyframe: flagged,
            });
            real_keys.push(real_key);
            position += self.packet_size;
            frame_count += 1;

            if self.audio {
                let audio_timestamp = audio_base.from_millis(content_ms);
                packets.push(Packet {
                    stream_index: AUDIO_STREAM,
                    pts: Some(audio_timestamp),
                    dts: Some(audio_timestamp),
                    position: Some(position),
                    size: AUDIO_PACKET_BYTES,
                    is_keyframe: true,
                });
                real_keys.push(false);
                position += AUDIO_PACKET_BYTES;
            }

            millis += self.frame_interval_ms;
        }

        let header_ms = self.header_duration_ms.unwrap_or(Some(self.duration_ms));
        let mut streams = vec![StreamInfo {
            index: VIDEO_STREAM,
            kind: StreamKind::Video,
            time_base: self.time_base,
            start_time: Some(self.start_time),
            duration: header_ms.map(|ms| self.time_base.from_millis(ms)),
            frame_count,
            width: self.width,
            height: self.height,
            codec: "synthetic".to_string(),
            frame_rate: Some(1_000.0 / self.frame_interval_ms as f64),
        }];
        if self.audio {
            streams.push(StreamInfo {
                index: AUDIO_STREAM,
                kind: StreamKind::Audio,
                time_base: audio_base,
                start_time: Some(0),
                duration: header_ms.map(|ms| audio_base.from_millis(ms)),
                frame_count: 0,
                width: 0,
                height: 0,
                codec: "pcm".to_string(),
                frame_rate: None,
            });
        }

        let container = ContainerInfo {
            format: "synthetic".to_string(),
            duration_us: header_ms.map(|ms| ms * 1_000),
            start_time_us: Some(self.time_base.to_system(self.start_time)),
            bit_rate: 0,
            file_size: position,
            streams,
            best_video: Some(VIDEO_STREAM),
        };

        SyntheticSource {
            container,
            packets,
            real_keys,
            corrupt_from: self
                .corrupt_from_ms
                .map(|ms| self.start_time + self.time_base.from_millis(ms)),
            decoder_delay: self.decoder_delay,
            seek_behavior: self.seek_behavior,
            cursor: 0,
            last_read: None,
            decoder_open: false,
            keyed: false,
            queue: VecDeque::new(),
            scaler: None,
            counters: SyntheticCounters::default(),
        }
    }
}

/// A fabricated media file; see the [module documentation](self).
#[derive(Debug)]
pub struct SyntheticSource {
    container: ContainerInfo,
    packets: Vec<Packet>,
    real_keys: Vec<bool>,
    corrupt_from: Option<i64>,
    decoder_delay: usize,
    seek_behavior: SeekBehavior,
    cursor: usize,
    last_read: Option<usize>,
    decoder_open: bool,
    keyed: bool,
    queue: VecDeque<Decoded<SyntheticPicture>>,
    scaler: Option<(u32, u32)>,
    counters: SyntheticCounters,
}

impl SyntheticSource {
    /// Start building a source whose video lasts `duration_ms`.
    pub fn builder(duration_ms: i64) -> SyntheticSourceBuilder {
        SyntheticSourceBuilder::new(duration_ms)
    }

    /// Work counters accumulated so far.
    pub fn counters(&self) -> SyntheticCounters {
        self.counters
    }

    /// Total packets of all streams.
    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    /// Number of video packets.
    pub fn video_packet_count(&self) -> usize {
        self.packets
            .iter()
            .filter(|packet| packet.stream_index == VIDEO_STREAM)
            .count()
    }

    /// Timestamps of the true keyframes, native units.
    pub fn keyframe_timestamps(&self) -> Vec<i64> {
        self.packets
            .iter()
            .zip(&self.real_keys)
            .filter(|(_, real)| **real)
            .filter_map(|(packet, _)| packet.timestamp())
            .collect()
    }

    fn flush_decoder(&mut self) {
        self.queue.clear();
        self.keyed = false;
        self.last_read = None;
    }

    fn keyframe_index(&self, timestamp: i64, backward: bool) -> usize {
        let keys = self
            .packets
            .iter()
            .enumerate()
            .filter(|(_, packet)| packet.stream_index == VIDEO_STREAM && packet.is_keyframe);
        if backward {
            let mut chosen = None;
            for (index, packet) in keys {
                match packet.timestamp() {
                    Some(ts) if ts <= timestamp => chosen = Some(index),
                    _ if chosen.is_none() => {
                        chosen = Some(index);
                        break;
                    }
                    _ => break,
                }
            }
            chosen.unwrap_or(self.packets.len())
        } else {
            keys.filter(|(_, packet)| packet.timestamp().is_some_and(|ts| ts >= timestamp))
                .map(|(index, _)| index)
                .next()
                .unwrap_or(self.packets.len())
        }
    }

    fn byte_index(&self, offset: u64) -> usize {
        self.packets
            .iter()
            .position(|packet| packet.position.is_some_and(|pos| pos >= offset))
            .unwrap_or(self.packets.len())
    }
}

impl MediaSource for SyntheticSource {
    type Picture = SyntheticPicture;

    fn container(&self) -> &ContainerInfo {
        &self.container
    }

    fn open_decoder(&mut self, stream_index: usize) -> Result<(), SnapError> {
        match self.container.stream(stream_index) {
            Some(stream) if stream.kind == StreamKind::Video => {
                self.decoder_open = true;
                Ok(())
            }
            _ => Err(SnapError::CodecOpen(format!(
                "stream {stream_index} is not a video stream"
            ))),
        }
    }

    fn connect_scaler(&mut self, width: u32, height: u32) -> Result<(), SnapError> {
        if !self.decoder_open {
            return Err(SnapError::Scaler("decoder is not open".to_string()));
        }
        if width == 0 || height == 0 {
            return Err(SnapError::Scaler(format!(
                "invalid output size {width}x{height}"
            )));
        }
        self.scaler = Some((width, height));
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, SnapError> {
        let Some(packet) = self.packets.get(self.cursor).copied() else {
            self.last_read = None;
            return Ok(None);
        };
        self.last_read = Some(self.cursor);
        self.cursor += 1;
        self.counters.packets_read += 1;
        Ok(Some(packet))
    }

    fn decode(&mut self) -> Result<DecodeStatus<SyntheticPicture>, SnapError> {
        if !self.decoder_open {
            return Err(SnapError::Decode("decoder is not open".to_string()));
        }
        let index = self
            .last_read
            .take()
            .ok_or_else(|| SnapError::Decode("no packet to decode".to_string()))?;
        let packet = self.packets[index];
        if packet.stream_index != VIDEO_STREAM {
            return Ok(DecodeStatus::Pending);
        }
        self.counters.decodes += 1;

        let timestamp = packet.timestamp().unwrap_or_default();
        if self.corrupt_from.is_some_and(|from| timestamp >= from) {
            return Err(SnapError::Decode(format!(
                "corrupt packet at timestamp {timestamp}"
            )));
        }

        let real_key = self.real_keys[index];
        if !real_key && !self.keyed {
            return Ok(DecodeStatus::Pending);
        }
        self.keyed = true;
        self.queue.push_back(Decoded {
            timestamp: Some(timestamp),
            is_keyframe: real_key,
            picture: SyntheticPicture { timestamp },
        });

        if self.queue.len() > self.decoder_delay {
            Ok(self
                .queue
                .pop_front()
                .map_or(DecodeStatus::Pending, DecodeStatus::Frame))
        } else {
            Ok(DecodeStatus::Pending)
        }
    }

    fn drain(&mut self) -> Result<Vec<Decoded<SyntheticPicture>>, SnapError> {
        let drained = self.queue.drain(..).collect();
        self.keyed = false;
        Ok(drained)
    }

    fn seek(&mut self, target: SeekTarget) -> Result<(), SnapError> {
        self.counters.seeks += 1;
        let landing = match self.seek_behavior {
            SeekBehavior::Unsupported => {
                return Err(SnapError::Seek("stream does not support seeking".to_string()));
            }
            SeekBehavior::Erratic { after } if self.counters.seeks > after as u64 => 0,
            _ => match target {
                SeekTarget::Timestamp {
                    stream_index,
                    timestamp,
                    backward,
                } => {
                    if stream_index != VIDEO_STREAM {
                        return Err(SnapError::Seek(format!(
                            "stream {stream_index} has no index"
                        )));
                    }
                    self.keyframe_index(timestamp, backward)
                }
                SeekTarget::Byte(offset) => self.byte_index(offset),
            },
        };

        if self.seek_behavior == SeekBehavior::ForwardOnly && landing < self.cursor {
            log::trace!("Ignoring backward seek to packet {landing}");
            return Ok(());
        }
        self.cursor = landing;
        self.flush_decoder();
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), SnapError> {
        self.counters.rewinds += 1;
        self.cursor = 0;
        self.flush_decoder();
        Ok(())
    }

    fn scale(&mut self, picture: &SyntheticPicture) -> Result<RgbImage, SnapError> {
        let (width, height) = self
            .scaler
            .ok_or_else(|| SnapError::Scaler("scaler is not connected".to_string()))?;
        let shade = picture.timestamp.rem_euclid(65_536) as u16;
        let pixel = Rgb([(shade >> 8) as u8, shade as u8, 0x80]);
        Ok(RgbImage::from_pixel(width, height, pixel))
    }
}
