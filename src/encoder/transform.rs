// SPDX-License-Identifier: GPL-3.0-only

//! Media transform abstraction
//!
//! A transform is a push/pull processing element: raw samples go in, processed
//! samples come out, with explicit back-pressure and drain signalling. The
//! H.264 encoder and the fallback format converter both sit behind this trait
//! so the session logic is independent of the underlying media stack.

use super::types::PixelFormat;
use crate::errors::TransformError;

/// Payload carried by a negotiated media type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    /// Uncompressed video in one of the raw layouts
    Raw(PixelFormat),
    /// Compressed H.264 elementary stream
    H264,
}

impl std::fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaFormat::Raw(p) => write!(f, "{}", p),
            MediaFormat::H264 => f.write_str("H264"),
        }
    }
}

/// Full description of a stream on one side of a transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub format: MediaFormat,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    /// Keyframe spacing in frames; only meaningful on compressed types
    pub keyframe_interval: u32,
    /// Average bitrate in bits per second; only meaningful on compressed types
    pub avg_bitrate: u32,
    /// Ticks per second used for sample timestamps and durations
    pub time_base: i64,
}

impl MediaType {
    /// A raw video type with no compression attributes
    pub fn raw(format: PixelFormat, width: u32, height: u32, fps: u32, time_base: i64) -> Self {
        Self {
            format: MediaFormat::Raw(format),
            width,
            height,
            fps_num: fps,
            fps_den: 1,
            keyframe_interval: 0,
            avg_bitrate: 0,
            time_base,
        }
    }
}

/// One sample moving through a transform
///
/// On the push side `data` is the raw frame; on the pull side the transform
/// writes the processed payload into `data`, reusing its capacity.
#[derive(Debug, Default)]
pub struct Sample {
    pub data: Vec<u8>,
    pub size: usize,
    /// Presentation timestamp in the media type's time base
    pub timestamp: i64,
    /// Presentation duration in the media type's time base
    pub duration: i64,
    pub key_frame: bool,
    /// Per-sample constant quantizer hint, 0 when unset
    pub quality: u32,
}

/// Result of pushing a sample into a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    /// The sample was consumed
    Accepted,
    /// The transform is full; pull output, then push the same sample again
    NotAccepting,
}

/// Result of pulling a sample from a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStatus {
    /// One processed sample was written into the caller's `Sample`
    Produced,
    /// No output available; push more input (or, after a drain, end of stream)
    NeedMoreInput,
}

/// Push/pull media transform with explicit type negotiation
///
/// Output type must be set before the input type; implementations reject
/// unsupported input types with [`TransformError::Unsupported`], which the
/// negotiator uses to probe format support.
pub trait VideoTransform {
    /// Configure the downstream (produced) media type
    fn set_output_type(&mut self, ty: &MediaType) -> Result<(), TransformError>;

    /// Configure the upstream (consumed) media type
    fn set_input_type(&mut self, ty: &MediaType) -> Result<(), TransformError>;

    /// Offer one raw sample to the transform
    fn push(&mut self, sample: &Sample) -> Result<PushStatus, TransformError>;

    /// Request one processed sample from the transform
    fn pull(&mut self, out: &mut Sample) -> Result<PullStatus, TransformError>;

    /// Signal end of stream and flush internally queued samples
    ///
    /// After this, `pull` keeps producing until the queue is empty and then
    /// returns `NeedMoreInput` permanently.
    fn begin_drain(&mut self) -> Result<(), TransformError>;
}
