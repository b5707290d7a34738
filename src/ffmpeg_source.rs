//! [`MediaSource`] backed by FFmpeg.
//!
//! Packets are read with `av_read_frame`, decoded with the send/receive
//! API and converted to RGB24 by a software scaler. Seeks go through
//! `av_seek_frame` so they can be aimed at one stream, flagged backward, or
//! expressed in bytes; the decoder is flushed after every seek and rewind.

use std::{collections::VecDeque, path::Path};

use ffmpeg_next::{
    Error as FfmpegError, Packet as FfmpegPacket,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::error::EAGAIN,
};
use image::RgbImage;
use log::{debug, warn};

use crate::conversion::TimeBase;
use crate::error::SnapError;
use crate::source::{
    ContainerInfo, DecodeStatus, Decoded, MediaSource, Packet, SeekTarget, StreamInfo, StreamKind,
};

/// Consecutive unreadable packets tolerated before giving up on the file.
const MAX_READ_ERRORS: u32 = 64;

/// A media file opened with FFmpeg.
///
/// # Example
///
/// ```no_run
/// use snapsheet::{FfmpegSource, MediaSource, SnapError};
///
/// let source = FfmpegSource::open("input.mp4")?;
/// println!("{} streams", source.container().streams.len());
/// # Ok::<(), SnapError>(())
/// ```
pub struct FfmpegSource {
    input: Input,
    container: ContainerInfo,
    decoder: Option<VideoDecoder>,
    video_index: Option<usize>,
    scaler: Option<ScalingContext>,
    target: (u32, u32),
    last: Option<FfmpegPacket>,
    backlog: VecDeque<VideoFrame>,
}

impl FfmpegSource {
    /// Open `path` and read its stream layout.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SnapError> {
        let path = path.as_ref();
        debug!("Opening media file: {}", path.display());

        ffmpeg_next::init().map_err(|error| SnapError::FileOpen {
            path: path.to_path_buf(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;
        let input = ffmpeg_next::format::input(&path).map_err(|error| SnapError::FileOpen {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
        let file_size = std::fs::metadata(path)?.len();
        let container = describe(&input, file_size)?;

        Ok(Self {
            input,
            container,
            decoder: None,
            video_index: None,
            scaler: None,
            target: (0, 0),
            last: None,
            backlog: VecDeque::new(),
        })
    }

    fn decoder(&mut self) -> Result<&mut VideoDecoder, SnapError> {
        self.decoder
            .as_mut()
            .ok_or_else(|| SnapError::CodecOpen("decoder is not open".to_string()))
    }

    fn seek_raw(&mut self, stream: i32, timestamp: i64, flags: i32) -> Result<(), SnapError> {
        // SAFETY: the context pointer is valid for the lifetime of `input`,
        // and av_seek_frame does not retain it.
        let result = unsafe {
            ffmpeg_sys_next::av_seek_frame(self.input.as_mut_ptr(), stream, timestamp, flags)
        };
        if result < 0 {
            return Err(SnapError::Seek(FfmpegError::from(result).to_string()));
        }
        Ok(())
    }

    fn reset_decoder(&mut self) {
        self.last = None;
        self.backlog.clear();
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
        }
    }

    fn receive(&mut self) -> Option<VideoFrame> {
        if let Some(frame) = self.backlog.pop_front() {
            return Some(frame);
        }
        let decoder = self.decoder.as_mut()?;
        let mut frame = VideoFrame::empty();
        decoder.receive_frame(&mut frame).ok().map(|()| frame)
    }
}

fn decoded(frame: VideoFrame) -> Decoded<VideoFrame> {
    Decoded {
        timestamp: frame.timestamp().or_else(|| frame.pts()),
        is_keyframe: frame.is_key(),
        picture: frame,
    }
}

fn optional_timestamp(value: i64) -> Option<i64> {
    (value != ffmpeg_sys_next::AV_NOPTS_VALUE).then_some(value)
}

fn describe(input: &Input, file_size: u64) -> Result<ContainerInfo, SnapError> {
    let mut streams = Vec::new();
    for stream in input.streams() {
        let parameters = stream.parameters();
        let kind = match parameters.medium() {
            Type::Video => StreamKind::Video,
            Type::Audio => StreamKind::Audio,
            Type::Subtitle => StreamKind::Subtitle,
            _ => StreamKind::Other,
        };
        let (width, height, codec) = if kind == StreamKind::Video {
            let context = CodecContext::from_parameters(parameters)
                .map_err(|error| SnapError::StreamInfo(error.to_string()))?;
            match context.decoder().video() {
                Ok(video) => (video.width(), video.height(), video.id().name().to_string()),
                Err(error) => {
                    warn!("Cannot inspect video stream {}: {error}", stream.index());
                    (0, 0, "unknown".to_string())
                }
            }
        } else {
            (0, 0, String::new())
        };
        let rate = stream.avg_frame_rate();
        let frame_rate = (rate.numerator() > 0 && rate.denominator() > 0)
            .then(|| rate.numerator() as f64 / rate.denominator() as f64);

        streams.push(StreamInfo {
            index: stream.index(),
            kind,
            time_base: TimeBase::from(stream.time_base()),
            start_time: optional_timestamp(stream.start_time()),
            duration: optional_timestamp(stream.duration()).filter(|&d| d > 0),
            frame_count: stream.frames().max(0) as u64,
            width,
            height,
            codec,
            frame_rate,
        });
    }

    // SAFETY: the context pointer is valid while `input` is borrowed.
    let start_time = unsafe { (*input.as_ptr()).start_time };
    Ok(ContainerInfo {
        format: input.format().name().to_string(),
        duration_us: Some(input.duration()).filter(|&d| d > 0),
        start_time_us: optional_timestamp(start_time),
        bit_rate: input.bit_rate().max(0) as u64,
        file_size,
        streams,
        best_video: input.streams().best(Type::Video).map(|stream| stream.index()),
    })
}

/// Copy an RGB24 frame into a tightly packed buffer, dropping row padding.
fn frame_to_buffer(frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = frame.stride(0);
    let row = width as usize * 3;
    let data = frame.data(0);
    if stride == row {
        return data[..row * height as usize].to_vec();
    }
    let mut buffer = Vec::with_capacity(row * height as usize);
    for line in 0..height as usize {
        let start = line * stride;
        buffer.extend_from_slice(&data[start..start + row]);
    }
    buffer
}

impl MediaSource for FfmpegSource {
    type Picture = VideoFrame;

    fn container(&self) -> &ContainerInfo {
        &self.container
    }

    fn open_decoder(&mut self, stream_index: usize) -> Result<(), SnapError> {
        let stream = self
            .input
            .stream(stream_index)
            .ok_or(SnapError::NoVideoStream)?;
        let context = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| SnapError::CodecOpen(error.to_string()))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|error| SnapError::CodecOpen(error.to_string()))?;
        self.decoder = Some(decoder);
        self.video_index = Some(stream_index);
        Ok(())
    }

    fn connect_scaler(&mut self, width: u32, height: u32) -> Result<(), SnapError> {
        let decoder = self.decoder()?;
        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| SnapError::Scaler(error.to_string()))?;
        self.scaler = Some(scaler);
        self.target = (width, height);
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, SnapError> {
        let mut errors = 0;
        loop {
            let mut packet = FfmpegPacket::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    let read = Packet {
                        stream_index: packet.stream(),
                        pts: packet.pts(),
                        dts: packet.dts(),
                        position: u64::try_from(packet.position()).ok(),
                        size: packet.size() as u64,
                        is_keyframe: packet.is_key(),
                    };
                    self.last = Some(packet);
                    return Ok(Some(read));
                }
                Err(FfmpegError::Eof) => return Ok(None),
                Err(error) => {
                    errors += 1;
                    if errors >= MAX_READ_ERRORS {
                        return Err(error.into());
                    }
                    debug!("Skipping unreadable packet: {error}");
                }
            }
        }
    }

    fn decode(&mut self) -> Result<DecodeStatus<VideoFrame>, SnapError> {
        let packet = self
            .last
            .take()
            .filter(|packet| Some(packet.stream()) == self.video_index)
            .ok_or_else(|| SnapError::Decode("no video packet to decode".to_string()))?;

        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| SnapError::CodecOpen("decoder is not open".to_string()))?;
        loop {
            match decoder.send_packet(&packet) {
                Ok(()) => break,
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => {
                    // The decoder is full; park one frame and try again.
                    let mut frame = VideoFrame::empty();
                    if decoder.receive_frame(&mut frame).is_err() {
                        return Err(SnapError::Decode("decoder refused input".to_string()));
                    }
                    self.backlog.push_back(frame);
                }
                Err(error) => return Err(SnapError::Decode(error.to_string())),
            }
        }

        Ok(match self.receive() {
            Some(frame) => DecodeStatus::Frame(decoded(frame)),
            None => DecodeStatus::Pending,
        })
    }

    fn drain(&mut self) -> Result<Vec<Decoded<VideoFrame>>, SnapError> {
        let mut drained: Vec<Decoded<VideoFrame>> = self.backlog.drain(..).map(decoded).collect();
        let decoder = self.decoder()?;
        decoder
            .send_eof()
            .map_err(|error| SnapError::Decode(error.to_string()))?;
        let mut frame = VideoFrame::empty();
        while decoder.receive_frame(&mut frame).is_ok() {
            drained.push(decoded(std::mem::replace(&mut frame, VideoFrame::empty())));
        }
        decoder.flush();
        Ok(drained)
    }

    fn seek(&mut self, target: SeekTarget) -> Result<(), SnapError> {
        match target {
            SeekTarget::Timestamp {
                stream_index,
                timestamp,
                backward,
            } => {
                let flags = if backward {
                    ffmpeg_sys_next::AVSEEK_FLAG_BACKWARD as i32
                } else {
                    0
                };
                self.seek_raw(stream_index as i32, timestamp, flags)?;
            }
            SeekTarget::Byte(offset) => {
                let offset = i64::try_from(offset)
                    .map_err(|_| SnapError::Seek(format!("byte offset {offset} out of range")))?;
                self.seek_raw(-1, offset, ffmpeg_sys_next::AVSEEK_FLAG_BYTE as i32)?;
            }
        }
        self.reset_decoder();
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), SnapError> {
        let stream = self.video_index.unwrap_or(0);
        let start = self
            .container
            .stream(stream)
            .and_then(|info| info.start_time)
            .unwrap_or(0);
        let backward = ffmpeg_sys_next::AVSEEK_FLAG_BACKWARD as i32;
        if let Err(error) = self.seek_raw(stream as i32, start, backward) {
            debug!("Timestamp rewind failed ({error}), rewinding by bytes");
            self.seek_raw(-1, 0, ffmpeg_sys_next::AVSEEK_FLAG_BYTE as i32)?;
        }
        self.reset_decoder();
        Ok(())
    }

    fn scale(&mut self, picture: &VideoFrame) -> Result<RgbImage, SnapError> {
        let (width, height) = self.target;
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| SnapError::Scaler("scaler is not connected".to_string()))?;

        let input = scaler.input();
        let changed = input.format != picture.format()
            || input.width != picture.width()
            || input.height != picture.height();
        if changed {
            // The stream changed resolution or pixel format midway.
            *scaler = ScalingContext::get(
                picture.format(),
                picture.width(),
                picture.height(),
                Pixel::RGB24,
                width,
                height,
                ScalingFlags::BILINEAR,
            )
            .map_err(|error| SnapError::Scaler(error.to_string()))?;
        }

        let mut rgb = VideoFrame::empty();
        scaler
            .run(picture, &mut rgb)
            .map_err(|error| SnapError::Scaler(error.to_string()))?;
        let buffer = frame_to_buffer(&rgb, width, height);
        RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            SnapError::Scaler(format!("scaled frame does not fill {width}x{height}"))
        })
    }
}
