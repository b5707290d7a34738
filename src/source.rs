//! The demux/decode seam.
//!
//! [`MediaSource`] is everything the acquisition engine needs from a codec
//! library: container facts, packet reads, decode, seek and pixel
//! conversion. The engine never touches a codec API directly, which lets the
//! same strategies run against FFmpeg
//! ([`FfmpegSource`](crate::FfmpegSource)) and against the deterministic
//! [`SyntheticSource`](crate::SyntheticSource).

use image::RgbImage;

use crate::conversion::TimeBase;
use crate::error::SnapError;

/// The kind of elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// A video stream.
    Video,
    /// An audio stream.
    Audio,
    /// A subtitle stream.
    Subtitle,
    /// Data, attachments and anything else.
    Other,
}

/// Facts about one stream as reported by the container.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Stream index within the container.
    pub index: usize,
    /// Stream kind.
    pub kind: StreamKind,
    /// Native time base of the stream's timestamps.
    pub time_base: TimeBase,
    /// First timestamp (native units), if the container declares one.
    pub start_time: Option<i64>,
    /// Declared duration (native units), if any.
    pub duration: Option<i64>,
    /// Declared frame count, 0 when unknown.
    pub frame_count: u64,
    /// Frame width in pixels (video only).
    pub width: u32,
    /// Frame height in pixels (video only).
    pub height: u32,
    /// Codec name.
    pub codec: String,
    /// Average frame rate, if known.
    pub frame_rate: Option<f64>,
}

/// Facts about the container as a whole.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Short container format name.
    pub format: String,
    /// Declared duration in system units (microseconds).
    pub duration_us: Option<i64>,
    /// Declared start time in system units.
    pub start_time_us: Option<i64>,
    /// Declared overall bit rate in bits per second, 0 when unknown.
    pub bit_rate: u64,
    /// File size in bytes.
    pub file_size: u64,
    /// All streams, indexed by stream index.
    pub streams: Vec<StreamInfo>,
    /// The container's preferred video stream, if it names one.
    pub best_video: Option<usize>,
}

impl ContainerInfo {
    /// Look up a stream by index.
    pub fn stream(&self, index: usize) -> Option<&StreamInfo> {
        self.streams.iter().find(|stream| stream.index == index)
    }

    /// Choose the video stream to acquire from.
    ///
    /// An explicit index wins when it names a video stream; otherwise the
    /// container's preferred video stream, otherwise the video stream
    /// declaring the most frames.
    pub fn select_video(&self, requested: Option<usize>) -> Option<&StreamInfo> {
        let is_video = |stream: &&StreamInfo| stream.kind == StreamKind::Video;
        requested
            .and_then(|index| self.stream(index))
            .filter(is_video)
            .or_else(|| self.best_video.and_then(|index| self.stream(index)).filter(is_video))
            .or_else(|| {
                self.streams
                    .iter()
                    .filter(is_video)
                    .max_by_key(|stream| stream.frame_count)
            })
    }
}

/// One demuxed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    /// Stream the packet belongs to.
    pub stream_index: usize,
    /// Presentation timestamp, native units.
    pub pts: Option<i64>,
    /// Decoding timestamp, native units.
    pub dts: Option<i64>,
    /// Byte offset in the file, when known.
    pub position: Option<u64>,
    /// Payload size in bytes.
    pub size: u64,
    /// Whether the container flags this packet as a keyframe.
    pub is_keyframe: bool,
}

impl Packet {
    /// The timestamp used for ordering: DTS, falling back to PTS.
    pub fn timestamp(&self) -> Option<i64> {
        self.dts.or(self.pts)
    }
}

/// Where to move the read position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    /// Seek to a keyframe near `timestamp` in `stream_index`.
    ///
    /// With `backward` the keyframe at or before the timestamp is chosen,
    /// otherwise the one at or after it.
    Timestamp {
        /// Stream whose time base `timestamp` is expressed in.
        stream_index: usize,
        /// Target in native units.
        timestamp: i64,
        /// Prefer the keyframe before the target.
        backward: bool,
    },
    /// Seek to a byte offset.
    Byte(u64),
}

/// A decoded picture with the metadata the decoder attached to it.
#[derive(Debug, Clone)]
pub struct Decoded<P> {
    /// Best-effort timestamp of the picture, native units.
    pub timestamp: Option<i64>,
    /// Whether the decoder considers the picture a keyframe.
    pub is_keyframe: bool,
    /// The picture itself.
    pub picture: P,
}

/// Outcome of feeding one packet to the decoder.
#[derive(Debug, Clone)]
pub enum DecodeStatus<P> {
    /// A picture is ready.
    Frame(Decoded<P>),
    /// The decoder accepted the packet but has nothing to emit yet.
    Pending,
}

/// A demuxer plus video decoder plus scaler.
///
/// Methods are called in lifecycle order: [`open_decoder`] once, then
/// [`connect_scaler`] once, then any mix of reads, decodes and seeks.
/// Every method may fail with a [`SnapError`]; decode failures of single
/// packets are recoverable and the caller skips the packet.
///
/// [`open_decoder`]: MediaSource::open_decoder
/// [`connect_scaler`]: MediaSource::connect_scaler
pub trait MediaSource {
    /// The source's native decoded picture type.
    type Picture;

    /// Container and stream facts.
    fn container(&self) -> &ContainerInfo;

    /// Open the decoder for `stream_index`.
    fn open_decoder(&mut self, stream_index: usize) -> Result<(), SnapError>;

    /// Prepare conversion of decoded pictures to `width` x `height` RGB.
    fn connect_scaler(&mut self, width: u32, height: u32) -> Result<(), SnapError>;

    /// Read the next packet of any stream; `None` at end of stream.
    fn read_packet(&mut self) -> Result<Option<Packet>, SnapError>;

    /// Decode the packet most recently returned by
    /// [`read_packet`](MediaSource::read_packet).
    fn decode(&mut self) -> Result<DecodeStatus<Self::Picture>, SnapError>;

    /// Signal end of input and collect every picture still buffered in
    /// the decoder.
    fn drain(&mut self) -> Result<Vec<Decoded<Self::Picture>>, SnapError>;

    /// Move the read position and flush the decoder.
    fn seek(&mut self, target: SeekTarget) -> Result<(), SnapError>;

    /// Return to the first packet and flush the decoder.
    fn rewind(&mut self) -> Result<(), SnapError>;

    /// Convert a picture to RGB at the connected size.
    fn scale(&mut self, picture: &Self::Picture) -> Result<RgbImage, SnapError>;
}
