// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the video encoding pipeline

use crate::errors::EncodeError;
use std::sync::Arc;

/// Raw pixel layouts accepted at the encoder boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 32-bit BGRA, single plane, 4 bytes per pixel
    Bgra,
    /// Semi-planar YUV 4:2:0: full-resolution luma plane followed by one
    /// interleaved half-resolution chroma plane
    Nv12,
    /// Planar YUV 4:2:0: luma plane followed by two separate quarter-size
    /// chroma planes
    I420,
}

impl PixelFormat {
    /// Total byte size of one frame at the given dimensions
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Bgra => pixels * 4,
            PixelFormat::Nv12 | PixelFormat::I420 => pixels * 3 / 2,
        }
    }

    /// GStreamer caps format string for this layout
    pub fn gst_format(&self) -> &'static str {
        match self {
            PixelFormat::Bgra => "BGRA",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::I420 => "I420",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.gst_format())
    }
}

/// Normalized crop rectangle, ratios in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Default for CropRect {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            right: 1.0,
            bottom: 1.0,
        }
    }
}

impl CropRect {
    /// Validate ordering and range, rejecting degenerate rectangles
    pub fn validate(&self) -> Result<(), EncodeError> {
        let in_range =
            |v: f32| (0.0..=1.0).contains(&v);
        if !in_range(self.left) || !in_range(self.top) || !in_range(self.right) || !in_range(self.bottom)
        {
            return Err(EncodeError::Config(format!(
                "crop ratios out of [0, 1]: {:?}",
                self
            )));
        }
        if self.right <= self.left || self.bottom <= self.top {
            return Err(EncodeError::Config(format!(
                "crop rectangle must satisfy left < right and top < bottom: {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Horizontal extent of the crop (right - left)
    pub fn extent_x(&self) -> f32 {
        self.right - self.left
    }

    /// Vertical extent of the crop (bottom - top)
    pub fn extent_y(&self) -> f32 {
        self.bottom - self.top
    }

    /// True when the rectangle covers (within tolerance) the whole frame
    pub fn is_full_frame(&self, epsilon: f32) -> bool {
        (self.extent_x() - 1.0).abs() <= epsilon && (self.extent_y() - 1.0).abs() <= epsilon
    }
}

/// One input frame submitted to `encode()`
///
/// Frames are caller-owned and read-only for the duration of the call; the
/// pipeline never retains a reference past it. `Eos` carries no pixels and
/// switches the session into its drain phase.
pub enum InputFrame<'a> {
    /// Frame resident in GPU memory
    Texture {
        texture: Arc<wgpu::Texture>,
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    /// Frame resident in CPU memory
    Memory {
        data: &'a [u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    /// No new frame: drain the encoder
    Eos,
}

impl InputFrame<'_> {
    pub fn format(&self) -> Option<PixelFormat> {
        match self {
            InputFrame::Texture { format, .. } | InputFrame::Memory { format, .. } => Some(*format),
            InputFrame::Eos => None,
        }
    }
}

/// One compressed unit returned by `encode()`
///
/// The caller owns the unit; the session grows `data` on first use and
/// overwrites it on every successful call, so contents are only valid until
/// the next `encode()` on the same unit.
#[derive(Debug, Default, Clone)]
pub struct EncodedUnit {
    /// Compressed payload; only the first `size` bytes are meaningful
    pub data: Vec<u8>,
    /// Length of the valid payload in bytes
    pub size: usize,
    /// Presentation duration in time-base ticks
    pub duration: i64,
    /// Presentation timestamp in time-base ticks
    pub timestamp: i64,
    /// True when this unit starts a clean decoding point
    pub key_frame: bool,
}

impl EncodedUnit {
    /// The valid payload slice
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.size]
    }
}

/// Result of one `encode()` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStatus {
    /// One compressed unit was produced into the caller's output
    Success,
    /// The transform needs more input before it can produce output
    MoreInput,
    /// Drain complete; no further units will ever be produced
    Eof,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_rect_validation() {
        assert!(CropRect::default().validate().is_ok());
        let inverted = CropRect {
            left: 0.8,
            top: 0.0,
            right: 0.2,
            bottom: 1.0,
        };
        assert!(inverted.validate().is_err());
        let out_of_range = CropRect {
            left: -0.1,
            top: 0.0,
            right: 1.0,
            bottom: 1.0,
        };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_crop_rect_full_frame() {
        assert!(CropRect::default().is_full_frame(0.01));
        let nearly_full = CropRect {
            left: 0.0,
            top: 0.0,
            right: 0.995,
            bottom: 1.0,
        };
        assert!(nearly_full.is_full_frame(0.01));
        let half = CropRect {
            left: 0.0,
            top: 0.0,
            right: 0.5,
            bottom: 1.0,
        };
        assert!(!half.is_full_frame(0.01));
    }

    #[test]
    fn test_frame_sizes() {
        assert_eq!(PixelFormat::Bgra.frame_size(16, 16), 16 * 16 * 4);
        assert_eq!(PixelFormat::Nv12.frame_size(16, 16), 16 * 16 * 3 / 2);
        assert_eq!(PixelFormat::I420.frame_size(16, 16), 16 * 16 * 3 / 2);
    }
}
