//! Duration estimation.
//!
//! Container headers lie: streamed captures, concatenated files and broken
//! muxers report durations that are missing or wildly off. Because snap
//! points are spread over the duration, a bad value puts every shot in the
//! wrong place. [`resolve_duration`] starts from the header and escalates to
//! scanning packets when a quick bitrate sample disagrees with it.
//!
//! Scans survive timestamp rewinds (timestamps that jump backwards, as in
//! concatenated streams) by rebasing: every rewind adds the last timestamp
//! seen to a running base.

use std::fmt::{Display, Formatter, Result as FmtResult};

use log::{debug, info, warn};

use crate::config::SnapOptions;
use crate::error::SnapError;
use crate::keyframe::KeyframeCadence;
use crate::plan::ShotLayout;
use crate::source::{ContainerInfo, MediaSource, SeekTarget, StreamInfo};

/// How the duration should be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationMode {
    /// Trust the header unless a bitrate sample contradicts it.
    #[default]
    Auto,
    /// Use the header; scan only if the header has no duration.
    Header,
    /// Read every packet.
    FullScan,
    /// Read the last tenth of a large file, falling back to a full scan.
    TailScan,
}

/// How a [`DurationEstimate`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationMethod {
    /// Container or stream header.
    Header,
    /// Every packet was read.
    FullScan,
    /// The end of the file was read.
    TailScan,
}

impl Display for DurationMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            DurationMethod::Header => "header",
            DurationMethod::FullScan => "full scan",
            DurationMethod::TailScan => "tail scan",
        })
    }
}

/// A resolved duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationEstimate {
    /// Duration relative to the stream start, in milliseconds.
    pub millis: i64,
    /// How `millis` was obtained.
    pub method: DurationMethod,
    /// What the header declared, if anything.
    pub header_ms: Option<i64>,
    /// File size divided by the sampled byte rate, if a sample was taken.
    pub bitrate_estimate_ms: Option<i64>,
}

/// Packet statistics of one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStatistics {
    /// Stream index.
    pub index: usize,
    /// Packets read.
    pub packets: u64,
    /// Packets flagged as keyframes.
    pub keyframes: u64,
    /// Payload bytes.
    pub bytes: u64,
    /// Times the timestamps jumped backwards.
    pub rewinds: u64,
    /// Largest rebased timestamp relative to the stream origin, native
    /// units.
    pub span: Option<i64>,
}

/// Packet statistics for a whole scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStatistics {
    /// Per-stream figures, indexed like the container's streams.
    pub streams: Vec<StreamStatistics>,
}

impl ScanStatistics {
    /// Packets of all streams.
    pub fn total_packets(&self) -> u64 {
        self.streams.iter().map(|stream| stream.packets).sum()
    }

    /// Figures for one stream.
    pub fn stream(&self, index: usize) -> Option<&StreamStatistics> {
        self.streams.iter().find(|stream| stream.index == index)
    }
}

/// Rebasing timestamp follower for one stream.
#[derive(Debug, Default)]
pub(crate) struct Timeline {
    origin: Option<i64>,
    base: i64,
    previous: Option<i64>,
}

impl Timeline {
    pub(crate) fn with_origin(origin: Option<i64>) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    /// Returns the rebased relative timestamp and whether a rewind was
    /// detected.
    pub(crate) fn follow(&mut self, timestamp: i64) -> (i64, bool) {
        let origin = *self.origin.get_or_insert(timestamp);
        let relative = timestamp - origin;
        let mut rewound = false;
        if let Some(previous) = self.previous
            && relative < previous
        {
            self.base += previous;
            rewound = true;
        }
        self.previous = Some(relative);
        (self.base + relative, rewound)
    }

    /// Forget the last timestamp after a jump in the read position, so
    /// landing behind it is not mistaken for a rewind.
    pub(crate) fn resync(&mut self) {
        self.previous = None;
    }
}

/// The container's own idea of the stream duration, in milliseconds.
pub fn header_duration_ms(container: &ContainerInfo, stream: &StreamInfo) -> Option<i64> {
    stream
        .duration
        .filter(|&d| d > 0)
        .map(|d| stream.time_base.to_millis(d))
        .or_else(|| {
            container
                .duration_us
                .filter(|&d| d > 0)
                .map(|d| d / 1_000)
        })
}

/// Read from the current position to the end of the stream.
///
/// Keyframes of `stream` are credited to `cadence` at their rebased
/// timestamps so a rewind never shows up as a giant gap.
fn scan_to_end<S: MediaSource>(
    source: &mut S,
    stream: &StreamInfo,
    cadence: &mut KeyframeCadence,
) -> Result<ScanStatistics, SnapError> {
    let mut statistics = ScanStatistics {
        streams: source
            .container()
            .streams
            .iter()
            .map(|info| StreamStatistics {
                index: info.index,
                ..StreamStatistics::default()
            })
            .collect(),
    };
    let mut timelines: Vec<Timeline> = source
        .container()
        .streams
        .iter()
        .map(|info| Timeline::with_origin(info.start_time))
        .collect();

    while let Some(packet) = source.read_packet()? {
        let Some(position) = statistics
            .streams
            .iter()
            .position(|entry| entry.index == packet.stream_index)
        else {
            continue;
        };
        let entry = &mut statistics.streams[position];
        entry.packets += 1;
        entry.bytes += packet.size;
        if packet.is_keyframe {
            entry.keyframes += 1;
        }

        let Some(timestamp) = packet.timestamp() else {
            continue;
        };
        let (rebased, rewound) = timelines[position].follow(timestamp);
        if rewound {
            entry.rewinds += 1;
            debug!(
                "Timestamp rewind in stream {} at {timestamp}",
                packet.stream_index
            );
        }
        entry.span = Some(entry.span.map_or(rebased, |span| span.max(rebased)));

        if packet.stream_index == stream.index && packet.is_keyframe {
            cadence.credit(stream.start_time.unwrap_or(0) + rebased);
        }
    }

    Ok(statistics)
}

fn video_span_ms(statistics: &ScanStatistics, stream: &StreamInfo) -> Option<i64> {
    statistics
        .stream(stream.index)
        .and_then(|entry| entry.span)
        .map(|span| stream.time_base.to_millis(span))
}

/// Read every packet from the start and measure the video span.
pub fn full_scan<S: MediaSource>(
    source: &mut S,
    stream: &StreamInfo,
    cadence: &mut KeyframeCadence,
) -> Result<Option<i64>, SnapError> {
    source.rewind()?;
    cadence.reset();
    let statistics = scan_to_end(source, stream, cadence)?;
    let millis = video_span_ms(&statistics, stream);
    debug!("Full scan measured {millis:?} ms");
    Ok(millis)
}

/// Byte-seek to 90 % of the file and measure the video span from there.
///
/// Returns `Ok(None)` when the seek fails or no timestamp follows it.
pub fn tail_scan<S: MediaSource>(
    source: &mut S,
    stream: &StreamInfo,
    cadence: &mut KeyframeCadence,
) -> Result<Option<i64>, SnapError> {
    let offset = source.container().file_size / 10 * 9;
    if let Err(error) = source.seek(SeekTarget::Byte(offset)) {
        warn!("Tail scan seek to byte {offset} failed: {error}");
        return Ok(None);
    }
    cadence.reset();
    let statistics = scan_to_end(source, stream, cadence)?;
    let millis = video_span_ms(&statistics, stream);
    debug!("Tail scan from byte {offset} measured {millis:?} ms");
    Ok(millis)
}

/// Full-file packet statistics for every stream.
///
/// The source is rewound before and after.
pub fn scan_statistics<S: MediaSource>(
    source: &mut S,
    stream: &StreamInfo,
) -> Result<ScanStatistics, SnapError> {
    let mut cadence = KeyframeCadence::new();
    source.rewind()?;
    let statistics = scan_to_end(source, stream, &mut cadence)?;
    source.rewind()?;
    Ok(statistics)
}

/// Byte and keyframe rates over the start of the file.
#[derive(Debug, Clone, Copy)]
struct BitrateSample {
    bytes_per_ms: f64,
    keyframes_per_ms: f64,
    span_ms: i64,
    reached_end: bool,
}

fn sample_bitrate<S: MediaSource>(
    source: &mut S,
    stream: &StreamInfo,
    sample_ms: i64,
    cadence: &mut KeyframeCadence,
) -> Result<Option<BitrateSample>, SnapError> {
    source.rewind()?;
    cadence.reset();

    let mut timeline = Timeline::with_origin(stream.start_time);
    let mut bytes = 0u64;
    let mut keyframes = 0u64;
    let mut span: Option<i64> = None;
    let mut reached_end = true;

    while let Some(packet) = source.read_packet()? {
        bytes += packet.size;
        if packet.stream_index != stream.index {
            continue;
        }
        let Some(timestamp) = packet.timestamp() else {
            continue;
        };
        let (rebased, _) = timeline.follow(timestamp);
        let millis = stream.time_base.to_millis(rebased);
        if millis >= sample_ms {
            reached_end = false;
            break;
        }
        if packet.is_keyframe {
            keyframes += 1;
            cadence.credit(stream.start_time.unwrap_or(0) + rebased);
        }
        span = Some(span.map_or(millis, |s| s.max(millis)));
    }

    let Some(span_ms) = span else {
        return Ok(None);
    };
    let window = if reached_end { span_ms } else { sample_ms }.max(1) as f64;
    Ok(Some(BitrateSample {
        bytes_per_ms: bytes as f64 / window,
        keyframes_per_ms: keyframes as f64 / window,
        span_ms,
        reached_end,
    }))
}

/// Scan with the tail method when the file is large enough, else fully.
fn escalate<S: MediaSource>(
    source: &mut S,
    stream: &StreamInfo,
    options: &SnapOptions,
    cadence: &mut KeyframeCadence,
    reference_ms: Option<i64>,
) -> Result<(Option<i64>, DurationMethod), SnapError> {
    let file_size = source.container().file_size;
    if file_size > options.thresholds.tail_scan_min_bytes {
        if let Some(millis) = tail_scan(source, stream, cadence)? {
            let plausible = reference_ms.is_none_or(|reference| millis >= reference / 2);
            if plausible {
                return Ok((Some(millis), DurationMethod::TailScan));
            }
            info!("Tail scan result {millis} ms is implausible, scanning the whole file");
        }
    }
    Ok((full_scan(source, stream, cadence)?, DurationMethod::FullScan))
}

/// Resolve the duration of `stream` according to `options.duration_mode`.
///
/// Keyframes read along the way are credited to `cadence`. The source is
/// rewound and the cadence window reset before returning. A stream with no
/// timestamps at all resolves to 0 ms and is left for the caller to reject.
pub fn resolve_duration<S: MediaSource>(
    source: &mut S,
    stream: &StreamInfo,
    options: &SnapOptions,
    cadence: &mut KeyframeCadence,
) -> Result<DurationEstimate, SnapError> {
    let header_ms = header_duration_ms(source.container(), stream);
    let mut bitrate_estimate_ms = None;

    let (millis, method) = match options.duration_mode {
        DurationMode::Header => match header_ms {
            Some(millis) => (Some(millis), DurationMethod::Header),
            None => (full_scan(source, stream, cadence)?, DurationMethod::FullScan),
        },
        DurationMode::FullScan => (full_scan(source, stream, cadence)?, DurationMethod::FullScan),
        DurationMode::TailScan => escalate(source, stream, options, cadence, header_ms)?,
        DurationMode::Auto => {
            let thresholds = &options.thresholds;
            match sample_bitrate(source, stream, thresholds.bitrate_sample_ms, cadence)? {
                Some(sample) if sample.reached_end => {
                    debug!("Bitrate sample covered the whole stream");
                    (Some(sample.span_ms), DurationMethod::FullScan)
                }
                Some(sample) => {
                    let file_size = source.container().file_size;
                    let estimate =
                        (file_size as f64 / sample.bytes_per_ms.max(f64::EPSILON)) as i64;
                    bitrate_estimate_ms = Some(estimate);

                    let planned = header_ms.unwrap_or(estimate) - options.time_from_ms;
                    let shots = ShotLayout::resolve(options, planned).shots as f64;
                    let keyframes = estimate as f64 * sample.keyframes_per_ms;

                    let reason = match header_ms {
                        None => Some("header has no duration".to_string()),
                        Some(header)
                            if estimate > 0
                                && (header - estimate).abs() as f64 / estimate as f64
                                    > thresholds.duration_error_ratio =>
                        {
                            Some(format!("header {header} ms disagrees with bitrate {estimate} ms"))
                        }
                        Some(_) if shots > thresholds.keyframe_ratio * keyframes => Some(format!(
                            "{shots} shots against about {keyframes:.0} keyframes"
                        )),
                        Some(_) => None,
                    };

                    match reason {
                        Some(reason) => {
                            info!("Scanning for duration: {reason}");
                            escalate(source, stream, options, cadence, Some(estimate))?
                        }
                        None => (header_ms, DurationMethod::Header),
                    }
                }
                None => match header_ms {
                    Some(millis) => (Some(millis), DurationMethod::Header),
                    None => (full_scan(source, stream, cadence)?, DurationMethod::FullScan),
                },
            }
        }
    };

    source.rewind()?;
    cadence.reset();

    let estimate = DurationEstimate {
        millis: millis.unwrap_or(0),
        method,
        header_ms,
        bitrate_estimate_ms,
    };
    info!(
        "Duration resolved to {} ms via {:?}",
        estimate.millis, estimate.method
    );
    Ok(estimate)
}
