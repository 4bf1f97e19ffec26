// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer-backed transforms
//!
//! Implements the [`VideoTransform`] trait on top of appsrc/appsink
//! pipelines: one around a hardware-first H.264 encoder element, one around
//! videoconvert/videoscale for the raw fallback path. Element selection
//! follows hardware priority, software encoders last.

use super::session::TransformProvider;
use super::transform::{MediaFormat, MediaType, PullStatus, PushStatus, Sample, VideoTransform};
use crate::errors::TransformError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSrc};
use tracing::{debug, info, warn};

/// H.264 encoder elements in selection order, hardware first
const H264_ENCODERS: &[(&str, bool)] = &[
    ("vah264enc", true),
    ("vaapih264enc", true),
    ("nvh264enc", true),
    ("qsvh264enc", true),
    ("amfh264enc", true),
    ("v4l2h264enc", true),
    ("x264enc", false),
    ("openh264enc", false),
];

/// How many raw frames appsrc may buffer before the transform reports
/// `NotAccepting`
const MAX_QUEUED_FRAMES: u64 = 4;

/// Bounded wait per drain pull before giving up on the pipeline
const DRAIN_PULL_TIMEOUT_MS: u64 = 100;
const DRAIN_PULL_ATTEMPTS: u32 = 50;

#[inline]
fn ticks_to_ns(ticks: i64, time_base: i64) -> u64 {
    (ticks as i128 * 1_000_000_000 / time_base as i128) as u64
}

#[inline]
fn ns_to_ticks(ns: u64, time_base: i64) -> i64 {
    (ns as i128 * time_base as i128 / 1_000_000_000) as i64
}

fn raw_caps(ty: &MediaType) -> Result<gst::Caps, TransformError> {
    let MediaFormat::Raw(format) = ty.format else {
        return Err(TransformError::Unsupported(format!(
            "expected a raw video type, got {}",
            ty.format
        )));
    };
    Ok(gst::Caps::builder("video/x-raw")
        .field("format", format.gst_format())
        .field("width", ty.width as i32)
        .field("height", ty.height as i32)
        .field(
            "framerate",
            gst::Fraction::new(ty.fps_num as i32, ty.fps_den as i32),
        )
        .build())
}

/// Check whether an element factory can consume the given raw caps
fn factory_accepts(factory: &gst::ElementFactory, caps: &gst::Caps) -> bool {
    factory
        .static_pad_templates()
        .iter()
        .filter(|tmpl| tmpl.direction() == gst::PadDirection::Sink)
        .any(|tmpl| tmpl.caps().can_intersect(caps))
}

/// Pick the best available H.264 encoder element
fn select_h264_factory() -> Result<(gst::ElementFactory, &'static str, bool), TransformError> {
    gst::init().map_err(|e| TransformError::Create(format!("GStreamer init failed: {}", e)))?;

    for (name, is_hardware) in H264_ENCODERS {
        if let Some(factory) = gst::ElementFactory::find(name) {
            info!(encoder = name, hardware = is_hardware, "Selected H.264 encoder element");
            return Ok((factory, *name, *is_hardware));
        }
    }
    Err(TransformError::Create(
        "no H.264 encoder element available".into(),
    ))
}

/// Configure per-element encoding properties
fn configure_h264_encoder(encoder: &gst::Element, name: &str, output: &MediaType) {
    let bitrate_kbps = output.avg_bitrate / 1000;
    match name {
        "x264enc" => {
            encoder.set_property_from_str("speed-preset", "veryfast");
            encoder.set_property_from_str("tune", "zerolatency");
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property("key-int-max", output.keyframe_interval);
        }
        "openh264enc" => {
            encoder.set_property_from_str("rate-control", "bitrate");
            encoder.set_property("bitrate", output.avg_bitrate);
            encoder.set_property("gop-size", output.keyframe_interval);
        }
        "vah264enc" => {
            encoder.set_property_from_str("rate-control", "cbr");
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property("key-int-max", output.keyframe_interval);
        }
        "vaapih264enc" => {
            encoder.set_property("rate-control", 2);
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property("keyframe-period", output.keyframe_interval);
        }
        "nvh264enc" => {
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property_from_str("rc-mode", "cbr");
            encoder.set_property("gop-size", output.keyframe_interval as i32);
        }
        "qsvh264enc" => {
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property("gop-size", output.keyframe_interval);
        }
        "amfh264enc" => {
            encoder.set_property("bitrate", bitrate_kbps);
            encoder.set_property("gop-size", output.keyframe_interval as i32);
        }
        _ => {
            debug!(encoder = name, "Using element defaults");
        }
    }
    debug!(
        encoder = name,
        bitrate_kbps,
        keyframe_interval = output.keyframe_interval,
        "Configured encoder element"
    );
}

struct Pipe {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    appsink: AppSink,
}

impl Pipe {
    fn shutdown(&self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(?e, "Failed to set pipeline to Null");
        }
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_pipe(
    elements: &[&gst::Element],
    src_caps: &gst::Caps,
    sink_caps: Option<&gst::Caps>,
    max_bytes: u64,
) -> Result<Pipe, TransformError> {
    let pipeline = gst::Pipeline::new();

    let appsrc = gst::ElementFactory::make("appsrc")
        .build()
        .map_err(|e| TransformError::Create(format!("failed to create appsrc: {}", e)))?
        .downcast::<AppSrc>()
        .map_err(|_| TransformError::Create("failed to downcast to AppSrc".into()))?;
    appsrc.set_caps(Some(src_caps));
    appsrc.set_format(gst::Format::Time);
    appsrc.set_max_bytes(max_bytes);
    appsrc.set_block(false);

    let appsink = gst::ElementFactory::make("appsink")
        .build()
        .map_err(|e| TransformError::Create(format!("failed to create appsink: {}", e)))?
        .downcast::<AppSink>()
        .map_err(|_| TransformError::Create("failed to downcast to AppSink".into()))?;
    appsink.set_caps(sink_caps);
    appsink.set_sync(false);
    appsink.set_max_buffers(8);

    let mut chain: Vec<&gst::Element> = vec![appsrc.upcast_ref()];
    chain.extend_from_slice(elements);
    chain.push(appsink.upcast_ref());

    pipeline
        .add_many(chain.iter().copied())
        .map_err(|e| TransformError::Create(format!("failed to add elements: {}", e)))?;
    gst::Element::link_many(chain.iter().copied())
        .map_err(|e| TransformError::Create(format!("failed to link elements: {}", e)))?;

    pipeline
        .set_state(gst::State::Playing)
        .map_err(|e| TransformError::Create(format!("failed to start pipeline: {}", e)))?;

    Ok(Pipe {
        pipeline,
        appsrc,
        appsink,
    })
}

fn push_sample(pipe: &Pipe, sample: &Sample, time_base: i64) -> Result<PushStatus, TransformError> {
    let size = sample.size.min(sample.data.len());

    // Emulate transform back-pressure via the appsrc queue level
    let max = pipe.appsrc.max_bytes();
    if max > 0 && pipe.appsrc.current_level_bytes() + size as u64 > max {
        return Ok(PushStatus::NotAccepting);
    }

    let mut buffer = gst::Buffer::with_size(size)
        .map_err(|e| TransformError::Processing(format!("failed to create buffer: {}", e)))?;
    {
        let buffer_ref = buffer
            .get_mut()
            .ok_or_else(|| TransformError::Processing("buffer not writable".into()))?;
        buffer_ref.set_pts(gst::ClockTime::from_nseconds(ticks_to_ns(
            sample.timestamp,
            time_base,
        )));
        buffer_ref.set_duration(gst::ClockTime::from_nseconds(ticks_to_ns(
            sample.duration,
            time_base,
        )));
        let mut map = buffer_ref
            .map_writable()
            .map_err(|e| TransformError::Processing(format!("failed to map buffer: {}", e)))?;
        map.copy_from_slice(&sample.data[..size]);
    }

    pipe.appsrc
        .push_buffer(buffer)
        .map_err(|e| TransformError::Processing(format!("failed to push buffer: {:?}", e)))?;
    Ok(PushStatus::Accepted)
}

fn copy_out(
    gst_sample: &gst::Sample,
    out: &mut Sample,
    time_base: i64,
) -> Result<(), TransformError> {
    let buffer = gst_sample
        .buffer()
        .ok_or_else(|| TransformError::Processing("sample carries no buffer".into()))?;
    let map = buffer
        .map_readable()
        .map_err(|e| TransformError::Processing(format!("failed to map output: {}", e)))?;

    out.data.clear();
    out.data.extend_from_slice(map.as_slice());
    out.size = map.len();
    out.timestamp = buffer
        .pts()
        .map(|t| ns_to_ticks(t.nseconds(), time_base))
        .unwrap_or(0);
    out.duration = buffer
        .duration()
        .map(|t| ns_to_ticks(t.nseconds(), time_base))
        .unwrap_or(0);
    out.key_frame = !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT);
    Ok(())
}

/// H.264 encoder behind the transform interface
///
/// The pipeline is appsrc -> encoder -> h264parse -> appsink and is built
/// once both media types are set.
pub struct GstEncoderTransform {
    factory: gst::ElementFactory,
    element_name: &'static str,
    output: Option<MediaType>,
    input: Option<MediaType>,
    pipe: Option<Pipe>,
    eos_sent: bool,
}

impl GstEncoderTransform {
    pub fn new() -> Result<Self, TransformError> {
        let (factory, element_name, _hardware) = select_h264_factory()?;
        Ok(Self {
            factory,
            element_name,
            output: None,
            input: None,
            pipe: None,
            eos_sent: false,
        })
    }

    pub fn element_name(&self) -> &str {
        self.element_name
    }

    fn build(&mut self) -> Result<(), TransformError> {
        let (Some(input), Some(output)) = (self.input.as_ref(), self.output.as_ref()) else {
            return Ok(());
        };

        let encoder = self
            .factory
            .create()
            .build()
            .map_err(|e| TransformError::Create(format!("failed to create encoder: {}", e)))?;
        configure_h264_encoder(&encoder, self.element_name, output);

        let parser = gst::ElementFactory::make("h264parse")
            .build()
            .map_err(|e| TransformError::Create(format!("failed to create h264parse: {}", e)))?;

        let src_caps = raw_caps(input)?;
        let sink_caps = gst::Caps::builder("video/x-h264")
            .field("stream-format", "byte-stream")
            .field("alignment", "au")
            .build();

        let frame_size = match input.format {
            MediaFormat::Raw(p) => p.frame_size(input.width, input.height) as u64,
            MediaFormat::H264 => 0,
        };
        let pipe = build_pipe(
            &[&encoder, &parser],
            &src_caps,
            Some(&sink_caps),
            frame_size * MAX_QUEUED_FRAMES,
        )?;

        self.pipe = Some(pipe);
        self.eos_sent = false;
        Ok(())
    }

    fn time_base(&self) -> i64 {
        self.input
            .as_ref()
            .map(|t| t.time_base)
            .unwrap_or(crate::constants::MPEG_TIME_BASE)
    }
}

impl VideoTransform for GstEncoderTransform {
    fn set_output_type(&mut self, ty: &MediaType) -> Result<(), TransformError> {
        if ty.format != MediaFormat::H264 {
            return Err(TransformError::Unsupported(format!(
                "encoder only produces H264, got {}",
                ty.format
            )));
        }
        self.output = Some(ty.clone());
        Ok(())
    }

    fn set_input_type(&mut self, ty: &MediaType) -> Result<(), TransformError> {
        let caps = raw_caps(ty)?;
        if !factory_accepts(&self.factory, &caps) {
            return Err(TransformError::Unsupported(format!(
                "{} does not accept {}",
                self.element_name, ty.format
            )));
        }
        self.input = Some(ty.clone());
        self.build()
    }

    fn push(&mut self, sample: &Sample) -> Result<PushStatus, TransformError> {
        let time_base = self.time_base();
        let pipe = self
            .pipe
            .as_ref()
            .ok_or_else(|| TransformError::Processing("media types not negotiated".into()))?;
        if self.eos_sent {
            return Err(TransformError::Processing("stream already drained".into()));
        }
        push_sample(pipe, sample, time_base)
    }

    fn pull(&mut self, out: &mut Sample) -> Result<PullStatus, TransformError> {
        let time_base = self.time_base();
        let pipe = self
            .pipe
            .as_ref()
            .ok_or_else(|| TransformError::Processing("media types not negotiated".into()))?;

        if !self.eos_sent {
            return match pipe.appsink.try_pull_sample(gst::ClockTime::ZERO) {
                Some(s) => {
                    copy_out(&s, out, time_base)?;
                    Ok(PullStatus::Produced)
                }
                None => Ok(PullStatus::NeedMoreInput),
            };
        }

        // Draining: wait for buffered output until the sink reports EOS
        for _ in 0..DRAIN_PULL_ATTEMPTS {
            if let Some(s) = pipe
                .appsink
                .try_pull_sample(gst::ClockTime::from_mseconds(DRAIN_PULL_TIMEOUT_MS))
            {
                copy_out(&s, out, time_base)?;
                return Ok(PullStatus::Produced);
            }
            if pipe.appsink.is_eos() {
                return Ok(PullStatus::NeedMoreInput);
            }
        }
        Err(TransformError::Processing(
            "timed out waiting for drained output".into(),
        ))
    }

    fn begin_drain(&mut self) -> Result<(), TransformError> {
        let pipe = self
            .pipe
            .as_ref()
            .ok_or_else(|| TransformError::Processing("media types not negotiated".into()))?;
        if !self.eos_sent {
            pipe.appsrc
                .end_of_stream()
                .map_err(|e| TransformError::Processing(format!("failed to send EOS: {:?}", e)))?;
            self.eos_sent = true;
        }
        Ok(())
    }
}

/// Raw-video converter/scaler behind the transform interface
///
/// The pipeline is appsrc -> videoconvert -> videoscale -> capsfilter ->
/// appsink and converts frame-resolution BGRA into encode-resolution I420
/// on the fallback path.
pub struct GstConverterTransform {
    output: Option<MediaType>,
    input: Option<MediaType>,
    pipe: Option<Pipe>,
    in_flight: u64,
    eos_sent: bool,
}

impl GstConverterTransform {
    pub fn new() -> Result<Self, TransformError> {
        gst::init().map_err(|e| TransformError::Create(format!("GStreamer init failed: {}", e)))?;
        Ok(Self {
            output: None,
            input: None,
            pipe: None,
            in_flight: 0,
            eos_sent: false,
        })
    }

    fn build(&mut self) -> Result<(), TransformError> {
        let (Some(input), Some(output)) = (self.input.as_ref(), self.output.as_ref()) else {
            return Ok(());
        };

        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| TransformError::Create(format!("failed to create videoconvert: {}", e)))?;
        let scale = gst::ElementFactory::make("videoscale")
            .build()
            .map_err(|e| TransformError::Create(format!("failed to create videoscale: {}", e)))?;

        let src_caps = raw_caps(input)?;
        let sink_caps = raw_caps(output)?;

        let frame_size = match input.format {
            MediaFormat::Raw(p) => p.frame_size(input.width, input.height) as u64,
            MediaFormat::H264 => 0,
        };
        let pipe = build_pipe(
            &[&convert, &scale],
            &src_caps,
            Some(&sink_caps),
            frame_size * MAX_QUEUED_FRAMES,
        )?;

        self.pipe = Some(pipe);
        self.in_flight = 0;
        self.eos_sent = false;
        Ok(())
    }

    fn time_base(&self) -> i64 {
        self.input
            .as_ref()
            .map(|t| t.time_base)
            .unwrap_or(crate::constants::MPEG_TIME_BASE)
    }
}

impl VideoTransform for GstConverterTransform {
    fn set_output_type(&mut self, ty: &MediaType) -> Result<(), TransformError> {
        raw_caps(ty)?;
        self.output = Some(ty.clone());
        Ok(())
    }

    fn set_input_type(&mut self, ty: &MediaType) -> Result<(), TransformError> {
        raw_caps(ty)?;
        self.input = Some(ty.clone());
        self.build()
    }

    fn push(&mut self, sample: &Sample) -> Result<PushStatus, TransformError> {
        let time_base = self.time_base();
        let pipe = self
            .pipe
            .as_ref()
            .ok_or_else(|| TransformError::Processing("media types not negotiated".into()))?;
        let status = push_sample(pipe, sample, time_base)?;
        if status == PushStatus::Accepted {
            self.in_flight += 1;
        }
        Ok(status)
    }

    fn pull(&mut self, out: &mut Sample) -> Result<PullStatus, TransformError> {
        let time_base = self.time_base();
        let pipe = self
            .pipe
            .as_ref()
            .ok_or_else(|| TransformError::Processing("media types not negotiated".into()))?;

        // The chain is one-in-one-out, so wait only when frames are in flight
        let timeout = if self.in_flight > 0 || self.eos_sent {
            gst::ClockTime::from_mseconds(DRAIN_PULL_TIMEOUT_MS * 5)
        } else {
            gst::ClockTime::ZERO
        };
        match pipe.appsink.try_pull_sample(timeout) {
            Some(s) => {
                copy_out(&s, out, time_base)?;
                self.in_flight = self.in_flight.saturating_sub(1);
                Ok(PullStatus::Produced)
            }
            None => Ok(PullStatus::NeedMoreInput),
        }
    }

    fn begin_drain(&mut self) -> Result<(), TransformError> {
        let pipe = self
            .pipe
            .as_ref()
            .ok_or_else(|| TransformError::Processing("media types not negotiated".into()))?;
        if !self.eos_sent {
            pipe.appsrc
                .end_of_stream()
                .map_err(|e| TransformError::Processing(format!("failed to send EOS: {:?}", e)))?;
            self.eos_sent = true;
        }
        Ok(())
    }
}

/// Default provider backed by GStreamer elements
pub struct GstTransformProvider;

impl TransformProvider for GstTransformProvider {
    fn create_encoder(&self) -> Result<Box<dyn VideoTransform>, TransformError> {
        Ok(Box::new(GstEncoderTransform::new()?))
    }

    fn create_converter(&self) -> Result<Box<dyn VideoTransform>, TransformError> {
        Ok(Box::new(GstConverterTransform::new()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MPEG_TIME_BASE;
    use crate::encoder::types::PixelFormat;

    #[test]
    fn test_tick_conversions() {
        assert_eq!(ticks_to_ns(90_000, MPEG_TIME_BASE), 1_000_000_000);
        assert_eq!(ns_to_ticks(1_000_000_000, MPEG_TIME_BASE), 90_000);
        assert_eq!(ticks_to_ns(3_000, MPEG_TIME_BASE), 33_333_333);
        assert_eq!(ticks_to_ns(0, MPEG_TIME_BASE), 0);
    }

    #[test]
    fn test_raw_caps_rejects_compressed() {
        let ty = MediaType {
            format: MediaFormat::H264,
            width: 1280,
            height: 720,
            fps_num: 30,
            fps_den: 1,
            keyframe_interval: 150,
            avg_bitrate: 0,
            time_base: MPEG_TIME_BASE,
        };
        assert!(raw_caps(&ty).is_err());
    }

    #[test]
    fn test_x264_accepts_i420() {
        // Requires GStreamer with x264enc; skip when absent
        if gst::init().is_err() {
            println!("Skipping test (no GStreamer)");
            return;
        }
        let Some(factory) = gst::ElementFactory::find("x264enc") else {
            println!("Skipping test (no x264enc)");
            return;
        };
        let ty = MediaType::raw(PixelFormat::I420, 1280, 720, 30, MPEG_TIME_BASE);
        assert!(factory_accepts(&factory, &raw_caps(&ty).unwrap()));
    }

    #[test]
    fn test_encoder_rejects_h264_input() {
        if gst::init().is_err() {
            println!("Skipping test (no GStreamer)");
            return;
        }
        let Ok(mut enc) = GstEncoderTransform::new() else {
            println!("Skipping test (no encoder element)");
            return;
        };
        let ty = MediaType {
            format: MediaFormat::H264,
            width: 1280,
            height: 720,
            fps_num: 30,
            fps_den: 1,
            keyframe_interval: 150,
            avg_bitrate: 1_000_000,
            time_base: MPEG_TIME_BASE,
        };
        assert!(enc.set_input_type(&ty).is_err());
    }
}
