// SPDX-License-Identifier: GPL-3.0-only

//! Pull-based video capture wrapper
//!
//! Wraps a camera device or screen source in a small pipeline that delivers
//! BGRA frames on demand, the layout the encoding session consumes directly.

use super::types::{CapturedFrame, DeviceKind, FrameData, MediaDevice};
use crate::encoder::PixelFormat;
use crate::errors::CaptureError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use tracing::{debug, info, warn};

/// Live video capture delivering BGRA frames
pub struct VideoCapture {
    pipeline: gst::Pipeline,
    appsink: AppSink,
}

impl VideoCapture {
    /// Build and start a capture pipeline for the given device
    pub fn open(device: &MediaDevice) -> Result<Self, CaptureError> {
        gst::init().map_err(|e| CaptureError::Backend(format!("GStreamer init failed: {}", e)))?;

        let source = match device.kind {
            DeviceKind::Camera => device
                .device
                .as_ref()
                .ok_or_else(|| CaptureError::NoDevice("camera has no device handle".into()))?
                .create_element(None)
                .map_err(|e| {
                    CaptureError::Pipeline(format!("failed to create camera source: {}", e))
                })?,
            DeviceKind::Monitor => Self::screen_source()?,
            other => {
                return Err(CaptureError::Pipeline(format!(
                    "{} is not a video device",
                    other
                )))
            }
        };

        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| CaptureError::Pipeline(format!("failed to create videoconvert: {}", e)))?;

        let appsink = gst::ElementFactory::make("appsink")
            .build()
            .map_err(|e| CaptureError::Pipeline(format!("failed to create appsink: {}", e)))?
            .downcast::<AppSink>()
            .map_err(|_| CaptureError::Pipeline("failed to downcast to AppSink".into()))?;
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", PixelFormat::Bgra.gst_format())
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_sync(false);
        appsink.set_drop(true);
        appsink.set_max_buffers(4);

        let pipeline = gst::Pipeline::new();
        pipeline
            .add_many([&source, &convert, appsink.upcast_ref()])
            .map_err(|e| CaptureError::Pipeline(format!("failed to add elements: {}", e)))?;
        gst::Element::link_many([&source, &convert, appsink.upcast_ref()])
            .map_err(|e| CaptureError::Pipeline(format!("failed to link elements: {}", e)))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CaptureError::Pipeline(format!("failed to start capture: {}", e)))?;

        info!(device = %device.name, "Video capture started");
        Ok(Self { pipeline, appsink })
    }

    fn screen_source() -> Result<gst::Element, CaptureError> {
        for element in ["pipewiresrc", "ximagesrc"] {
            if let Ok(source) = gst::ElementFactory::make(element).build() {
                debug!(element, "Using screen capture source");
                return Ok(source);
            }
        }
        Err(CaptureError::NoDevice(
            "no screen capture source available".into(),
        ))
    }

    /// Pull the next frame, waiting up to `timeout_ms`
    ///
    /// Returns `None` on timeout or end of stream.
    pub fn read(&self, timeout_ms: u64) -> Result<Option<CapturedFrame>, CaptureError> {
        let Some(sample) = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_mseconds(timeout_ms))
        else {
            return Ok(None);
        };

        let caps = sample
            .caps()
            .ok_or_else(|| CaptureError::Backend("sample carries no caps".into()))?;
        let info = VideoInfo::from_caps(caps)
            .map_err(|e| CaptureError::Backend(format!("unreadable caps: {}", e)))?;

        let buffer = sample
            .buffer_owned()
            .ok_or_else(|| CaptureError::Backend("sample carries no buffer".into()))?;
        let timestamp_ns = buffer.pts().map(|t| t.nseconds()).unwrap_or(0);
        let mapped = buffer
            .into_mapped_buffer_readable()
            .map_err(|_| CaptureError::Backend("failed to map capture buffer".into()))?;

        Ok(Some(CapturedFrame {
            data: FrameData::from_mapped_buffer(mapped),
            width: info.width(),
            height: info.height(),
            format: PixelFormat::Bgra,
            timestamp_ns,
        }))
    }

    /// Stop the capture pipeline
    pub fn stop(&self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(?e, "Failed to stop capture pipeline");
        }
    }
}

impl Drop for VideoCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
