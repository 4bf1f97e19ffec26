// SPDX-License-Identifier: GPL-3.0-only

//! Format and resolution negotiation with the encoder transform

use super::transform::{MediaFormat, MediaType, VideoTransform};
use super::types::{CropRect, PixelFormat};
use crate::constants::{align_up, BITRATE_PER_PIXEL, HEIGHT_ALIGN, KEYFRAME_INTERVAL_SECS, WIDTH_ALIGN};
use crate::errors::{EncodeError, TransformError};
use tracing::{debug, info};

/// Geometry and formats agreed with the encoder for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedLayout {
    /// Cropped source dimensions, before scaling
    pub frame_width: u32,
    pub frame_height: u32,
    /// Dimensions the encoder consumes and emits
    pub encode_width: u32,
    pub encode_height: u32,
    pub fps: u32,
    pub time_base: i64,
    /// Raw layout the encoder accepted on its input
    pub input_format: PixelFormat,
}

impl NegotiatedLayout {
    /// True when cropping plus scaling leave the source untouched
    pub fn is_passthrough(&self, src_width: u32, src_height: u32) -> bool {
        self.frame_width == src_width
            && self.frame_height == src_height
            && self.encode_width == src_width
            && self.encode_height == src_height
    }
}

/// Compute the aligned frame and encode dimensions for a source size
pub fn compute_dimensions(
    width: u32,
    height: u32,
    crop: &CropRect,
    scale_ratio: f32,
) -> (u32, u32, u32, u32) {
    let frame_w = align_up((width as f32 * crop.extent_x()) as u32, WIDTH_ALIGN);
    let frame_h = align_up((height as f32 * crop.extent_y()) as u32, HEIGHT_ALIGN);
    let encode_w = align_up((frame_w as f32 * scale_ratio) as u32, WIDTH_ALIGN);
    let encode_h = align_up((frame_h as f32 * scale_ratio) as u32, HEIGHT_ALIGN);
    (frame_w, frame_h, encode_w, encode_h)
}

/// Agree output and input media types with the encoder transform
///
/// The compressed output type is fixed first, then raw input layouts are
/// offered hardware-friendliest first. An `Unsupported` rejection moves on to
/// the next candidate; any other failure aborts. When no candidate is
/// accepted the transform is left unusable and the caller must discard it.
pub fn negotiate(
    transform: &mut dyn VideoTransform,
    width: u32,
    height: u32,
    fps: u32,
    crop: &CropRect,
    scale_ratio: f32,
    time_base: i64,
) -> Result<NegotiatedLayout, EncodeError> {
    crop.validate()?;
    if !(scale_ratio > 0.0) || !scale_ratio.is_finite() {
        return Err(EncodeError::Config(format!(
            "scale ratio must be positive, got {}",
            scale_ratio
        )));
    }
    if width == 0 || height == 0 || fps == 0 {
        return Err(EncodeError::Config(format!(
            "invalid source geometry {}x{}@{}",
            width, height, fps
        )));
    }

    let (frame_w, frame_h, encode_w, encode_h) = compute_dimensions(width, height, crop, scale_ratio);

    let output = MediaType {
        format: MediaFormat::H264,
        width: encode_w,
        height: encode_h,
        fps_num: fps,
        fps_den: 1,
        keyframe_interval: fps * KEYFRAME_INTERVAL_SECS,
        avg_bitrate: encode_w * encode_h * BITRATE_PER_PIXEL,
        time_base,
    };
    transform
        .set_output_type(&output)
        .map_err(|e| EncodeError::Negotiation(format!("output type {} rejected: {}", output.format, e)))?;

    for candidate in [PixelFormat::Nv12, PixelFormat::I420] {
        let input = MediaType::raw(candidate, encode_w, encode_h, fps, time_base);
        match transform.set_input_type(&input) {
            Ok(()) => {
                info!(
                    input = %candidate,
                    frame_width = frame_w,
                    frame_height = frame_h,
                    encode_width = encode_w,
                    encode_height = encode_h,
                    fps,
                    "Negotiated encoder media types"
                );
                return Ok(NegotiatedLayout {
                    frame_width: frame_w,
                    frame_height: frame_h,
                    encode_width: encode_w,
                    encode_height: encode_h,
                    fps,
                    time_base,
                    input_format: candidate,
                });
            }
            Err(TransformError::Unsupported(reason)) => {
                debug!(input = %candidate, reason, "Input layout rejected, trying next");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(EncodeError::Negotiation(
        "encoder accepted neither NV12 nor I420 input".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::transform::{PullStatus, PushStatus, Sample};
    use crate::constants::MPEG_TIME_BASE;

    struct PickyTransform {
        accepts: Vec<PixelFormat>,
        output: Option<MediaType>,
        input: Option<MediaType>,
    }

    impl PickyTransform {
        fn new(accepts: Vec<PixelFormat>) -> Self {
            Self {
                accepts,
                output: None,
                input: None,
            }
        }
    }

    impl VideoTransform for PickyTransform {
        fn set_output_type(&mut self, ty: &MediaType) -> Result<(), TransformError> {
            self.output = Some(ty.clone());
            Ok(())
        }

        fn set_input_type(&mut self, ty: &MediaType) -> Result<(), TransformError> {
            match ty.format {
                MediaFormat::Raw(p) if self.accepts.contains(&p) => {
                    self.input = Some(ty.clone());
                    Ok(())
                }
                other => Err(TransformError::Unsupported(other.to_string())),
            }
        }

        fn push(&mut self, _sample: &Sample) -> Result<PushStatus, TransformError> {
            Ok(PushStatus::Accepted)
        }

        fn pull(&mut self, _out: &mut Sample) -> Result<PullStatus, TransformError> {
            Ok(PullStatus::NeedMoreInput)
        }

        fn begin_drain(&mut self) -> Result<(), TransformError> {
            Ok(())
        }
    }

    #[test]
    fn test_dimensions_full_frame_identity() {
        let (fw, fh, ew, eh) = compute_dimensions(1920, 1080, &CropRect::default(), 1.0);
        assert_eq!((fw, fh), (1920, 1080));
        assert_eq!((ew, eh), (1920, 1080));
    }

    #[test]
    fn test_dimensions_are_aligned() {
        let crop = CropRect {
            left: 0.0,
            top: 0.0,
            right: 0.33,
            bottom: 0.71,
        };
        let (fw, fh, ew, eh) = compute_dimensions(1920, 1080, &crop, 0.7);
        assert_eq!(fw % 16, 0);
        assert_eq!(fh % 2, 0);
        assert_eq!(ew % 16, 0);
        assert_eq!(eh % 2, 0);
    }

    #[test]
    fn test_prefers_nv12() {
        let mut t = PickyTransform::new(vec![PixelFormat::Nv12, PixelFormat::I420]);
        let layout = negotiate(&mut t, 1280, 720, 30, &CropRect::default(), 1.0, MPEG_TIME_BASE)
            .unwrap();
        assert_eq!(layout.input_format, PixelFormat::Nv12);
        let out = t.output.unwrap();
        assert_eq!(out.keyframe_interval, 150);
        assert_eq!(out.avg_bitrate, 1280 * 720 * 100);
        let input = t.input.unwrap();
        assert_eq!(input.format, MediaFormat::Raw(PixelFormat::Nv12));
        assert_eq!((input.width, input.height), (1280, 720));
    }

    #[test]
    fn test_falls_back_to_i420() {
        let mut t = PickyTransform::new(vec![PixelFormat::I420]);
        let layout = negotiate(&mut t, 1280, 720, 30, &CropRect::default(), 1.0, MPEG_TIME_BASE)
            .unwrap();
        assert_eq!(layout.input_format, PixelFormat::I420);
    }

    #[test]
    fn test_fails_when_nothing_accepted() {
        let mut t = PickyTransform::new(vec![]);
        let err = negotiate(&mut t, 1280, 720, 30, &CropRect::default(), 1.0, MPEG_TIME_BASE)
            .unwrap_err();
        assert!(matches!(err, EncodeError::Negotiation(_)));
    }

    #[test]
    fn test_rejects_bad_scale() {
        let mut t = PickyTransform::new(vec![PixelFormat::Nv12]);
        for bad in [0.0, -1.0, f32::NAN] {
            let err = negotiate(&mut t, 1280, 720, 30, &CropRect::default(), bad, MPEG_TIME_BASE)
                .unwrap_err();
            assert!(matches!(err, EncodeError::Config(_)));
        }
    }

    #[test]
    fn test_rejects_inverted_crop() {
        let mut t = PickyTransform::new(vec![PixelFormat::Nv12]);
        let crop = CropRect {
            left: 0.9,
            top: 0.0,
            right: 0.1,
            bottom: 1.0,
        };
        assert!(negotiate(&mut t, 1280, 720, 30, &crop, 1.0, MPEG_TIME_BASE).is_err());
    }
}
