// SPDX-License-Identifier: GPL-3.0-only

//! Pull-based audio capture wrapper
//!
//! Microphones capture directly from their device element; speakers are
//! captured through the PulseAudio monitor source of the sink. Delivers raw
//! interleaved S16LE samples, no encoding.

use super::types::{CapturedSamples, DeviceKind, FrameData, MediaDevice};
use crate::errors::CaptureError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use tracing::{info, warn};

/// Live audio capture delivering raw sample chunks
pub struct AudioCapture {
    pipeline: gst::Pipeline,
    appsink: AppSink,
}

impl AudioCapture {
    /// Build and start a capture pipeline for the given device
    pub fn open(device: &MediaDevice) -> Result<Self, CaptureError> {
        gst::init().map_err(|e| CaptureError::Backend(format!("GStreamer init failed: {}", e)))?;

        let source = match device.kind {
            DeviceKind::Microphone => device
                .device
                .as_ref()
                .ok_or_else(|| CaptureError::NoDevice("microphone has no device handle".into()))?
                .create_element(None)
                .map_err(|e| {
                    CaptureError::Pipeline(format!("failed to create audio source: {}", e))
                })?,
            DeviceKind::Speaker => Self::loopback_source(device)?,
            other => {
                return Err(CaptureError::Pipeline(format!(
                    "{} is not an audio device",
                    other
                )))
            }
        };

        let convert = gst::ElementFactory::make("audioconvert")
            .build()
            .map_err(|e| CaptureError::Pipeline(format!("failed to create audioconvert: {}", e)))?;

        let appsink = gst::ElementFactory::make("appsink")
            .build()
            .map_err(|e| CaptureError::Pipeline(format!("failed to create appsink: {}", e)))?
            .downcast::<AppSink>()
            .map_err(|_| CaptureError::Pipeline("failed to downcast to AppSink".into()))?;
        let caps = gst::Caps::builder("audio/x-raw")
            .field("format", "S16LE")
            .field("layout", "interleaved")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_sync(false);

        let pipeline = gst::Pipeline::new();
        pipeline
            .add_many([&source, &convert, appsink.upcast_ref()])
            .map_err(|e| CaptureError::Pipeline(format!("failed to add elements: {}", e)))?;
        gst::Element::link_many([&source, &convert, appsink.upcast_ref()])
            .map_err(|e| CaptureError::Pipeline(format!("failed to link elements: {}", e)))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CaptureError::Pipeline(format!("failed to start capture: {}", e)))?;

        info!(device = %device.name, kind = %device.kind, "Audio capture started");
        Ok(Self { pipeline, appsink })
    }

    /// Capture what a sink is playing through its monitor source
    fn loopback_source(device: &MediaDevice) -> Result<gst::Element, CaptureError> {
        let sink_name = device
            .device
            .as_ref()
            .and_then(|d| d.properties())
            .and_then(|props| {
                props
                    .get::<String>("node.name")
                    .or_else(|_| props.get::<String>("device.name"))
                    .ok()
            })
            .ok_or_else(|| {
                CaptureError::Backend("sink exposes no monitor source name".into())
            })?;

        let source = gst::ElementFactory::make("pulsesrc")
            .build()
            .map_err(|e| CaptureError::Pipeline(format!("failed to create pulsesrc: {}", e)))?;
        source.set_property("device", format!("{}.monitor", sink_name));
        Ok(source)
    }

    /// Pull the next chunk of samples, waiting up to `timeout_ms`
    pub fn read(&self, timeout_ms: u64) -> Result<Option<CapturedSamples>, CaptureError> {
        let Some(sample) = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_mseconds(timeout_ms))
        else {
            return Ok(None);
        };

        let (channels, sample_rate) = sample
            .caps()
            .and_then(|caps| caps.structure(0))
            .map(|s| {
                (
                    s.get::<i32>("channels").unwrap_or(2) as u32,
                    s.get::<i32>("rate").unwrap_or(48_000) as u32,
                )
            })
            .unwrap_or((2, 48_000));

        let buffer = sample
            .buffer_owned()
            .ok_or_else(|| CaptureError::Backend("sample carries no buffer".into()))?;
        let timestamp_ns = buffer.pts().map(|t| t.nseconds()).unwrap_or(0);
        let mapped = buffer
            .into_mapped_buffer_readable()
            .map_err(|_| CaptureError::Backend("failed to map capture buffer".into()))?;

        Ok(Some(CapturedSamples {
            data: FrameData::from_mapped_buffer(mapped),
            channels,
            sample_rate,
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

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
