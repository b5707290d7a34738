//! Error types for the `snapsheet` crate.
//!
//! This module defines [`SnapError`], the unified error type returned by all
//! fallible operations in the crate. Errors carry enough context (file
//! paths, stream indices, upstream messages) to be reported through the
//! notification channel without additional logging at the call site.

use std::{io::Error as IoError, path::PathBuf};

#[cfg(feature = "ffmpeg")]
use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `snapsheet` operations.
///
/// Only a handful of variants abort a file: see
/// [`is_fatal_per_file`](SnapError::is_fatal_per_file). Per-packet decode
/// failures never surface here; the acquisition strategies count and skip
/// them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SnapError {
    /// The media file could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`crate::Session::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// Stream information could not be read from the container.
    #[error("Failed to read stream information: {0}")]
    StreamInfo(String),

    /// The file does not contain a decodable video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// The video decoder could not be opened.
    #[error("Failed to open video decoder: {0}")]
    CodecOpen(String),

    /// The resolved duration is too short for a video clip.
    #[error("Duration of {millis} ms is below the {minimum} ms minimum")]
    DurationTooShort {
        /// Resolved duration in milliseconds.
        millis: i64,
        /// Configured minimum in milliseconds.
        minimum: i64,
    },

    /// The pixel-format converter could not be created or run.
    #[error("Scaler error: {0}")]
    Scaler(String),

    /// A seek request was rejected by the container.
    #[error("Seek failed: {0}")]
    Seek(String),

    /// A packet could not be decoded.
    #[error("Failed to decode video packet: {0}")]
    Decode(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while composing or saving output.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    /// Options that cannot produce any output.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// The layout places no shot inside the file's range.
    #[error("No shots fit into {millis} ms")]
    NoShotsFit {
        /// Resolved duration in milliseconds.
        millis: i64,
    },

    /// A session operation was called in the wrong lifecycle state.
    #[error("Session is {found}, expected {expected}")]
    InvalidState {
        /// State the operation requires.
        expected: &'static str,
        /// State the session was in.
        found: &'static str,
    },
}

impl SnapError {
    /// Whether this error ends processing of the current file.
    ///
    /// Fatal-per-file errors are reported and the file is skipped; a queue
    /// of files carries on with the next one.
    pub fn is_fatal_per_file(&self) -> bool {
        matches!(
            self,
            SnapError::FileOpen { .. }
                | SnapError::StreamInfo(_)
                | SnapError::NoVideoStream
                | SnapError::CodecOpen(_)
                | SnapError::DurationTooShort { .. }
                | SnapError::NoShotsFit { .. }
        )
    }
}

#[cfg(feature = "ffmpeg")]
impl From<FfmpegError> for SnapError {
    fn from(error: FfmpegError) -> Self {
        SnapError::Ffmpeg(error.to_string())
    }
}
