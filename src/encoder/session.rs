// SPDX-License-Identifier: GPL-3.0-only

//! Video encoding session
//!
//! Owns the negotiated encoder transform, the optional fallback converter and
//! the frame preparer, and drives the push/pull loop that turns submitted
//! frames into H.264 units. One session encodes one stream; `start` fixes the
//! geometry and `stop` releases everything and resets the configuration.

use super::negotiate::{negotiate, NegotiatedLayout};
use super::prepare::{FramePreparer, GpuContext};
use super::transform::{MediaType, PullStatus, PushStatus, Sample, VideoTransform};
use super::types::{CropRect, EncodeStatus, EncodedUnit, InputFrame, PixelFormat};
use crate::constants::{MPEG_TIME_BASE, OUTPUT_BUFFER_CAPACITY, SAMPLE_QUALITY_HINT};
use crate::errors::{EncodeError, TransformError};
use std::collections::VecDeque;
use tracing::{debug, info, instrument};

/// Factory for the platform transforms a session needs
///
/// Split out so tests can drive the session with scripted transforms.
pub trait TransformProvider {
    /// Create the H.264 encoder transform
    fn create_encoder(&self) -> Result<Box<dyn VideoTransform>, TransformError>;

    /// Create the raw-video converter used on the fallback path
    fn create_converter(&self) -> Result<Box<dyn VideoTransform>, TransformError>;
}

enum Phase {
    Idle,
    Encoding,
    Draining,
    Drained,
}

/// H.264 encoding session over a negotiated hardware transform
pub struct VideoEncoderSession<P: TransformProvider> {
    provider: P,
    crop: CropRect,
    scale_ratio: f32,
    time_base: i64,
    phase: Phase,
    layout: Option<NegotiatedLayout>,
    shared_gpu: Option<GpuContext>,
    encoder: Option<Box<dyn VideoTransform>>,
    converter: Option<Box<dyn VideoTransform>>,
    preparer: Option<FramePreparer>,
    frame_count: i64,
    scratch: Sample,
    pending: VecDeque<Sample>,
}

impl<P: TransformProvider> VideoEncoderSession<P> {
    pub fn with_provider(provider: P) -> Self {
        Self {
            provider,
            crop: CropRect::default(),
            scale_ratio: 1.0,
            time_base: MPEG_TIME_BASE,
            phase: Phase::Idle,
            layout: None,
            shared_gpu: None,
            encoder: None,
            converter: None,
            preparer: None,
            frame_count: 0,
            scratch: Sample::default(),
            pending: VecDeque::new(),
        }
    }

    /// Configure the crop rectangle applied to every frame
    ///
    /// Takes effect at the next `start`.
    pub fn set_crop(&mut self, crop: CropRect) -> Result<(), EncodeError> {
        crop.validate()?;
        self.crop = crop;
        Ok(())
    }

    /// Configure the uniform scale applied after cropping
    ///
    /// Takes effect at the next `start`.
    pub fn set_scale_ratio(&mut self, scale_ratio: f32) -> Result<(), EncodeError> {
        if !(scale_ratio > 0.0) || !scale_ratio.is_finite() {
            return Err(EncodeError::Config(format!(
                "scale ratio must be positive, got {}",
                scale_ratio
            )));
        }
        self.scale_ratio = scale_ratio;
        Ok(())
    }

    /// Change the timestamp time base (ticks per second)
    pub fn set_time_base(&mut self, time_base: i64) -> Result<(), EncodeError> {
        if time_base <= 0 {
            return Err(EncodeError::Config(format!(
                "time base must be positive, got {}",
                time_base
            )));
        }
        self.time_base = time_base;
        Ok(())
    }

    /// Share an existing wgpu device instead of requesting one at `start`
    ///
    /// Useful when the caller already renders with wgpu and frames arrive as
    /// textures on that device.
    pub fn set_gpu_context(&mut self, gpu: GpuContext) {
        self.shared_gpu = Some(gpu);
    }

    /// The layout agreed at `start`, if the session is active
    pub fn layout(&self) -> Option<&NegotiatedLayout> {
        self.layout.as_ref()
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Negotiate formats and bring up the transform chain
    ///
    /// On any failure nothing is retained and the session stays idle, so a
    /// caller can adjust the configuration and try again.
    #[instrument(skip(self))]
    pub fn start(&mut self, width: u32, height: u32, fps: u32) -> Result<(), EncodeError> {
        if self.is_active() {
            return Err(EncodeError::SessionState("session already started"));
        }

        let mut encoder = self.provider.create_encoder()?;
        let layout = negotiate(
            encoder.as_mut(),
            width,
            height,
            fps,
            &self.crop,
            self.scale_ratio,
            self.time_base,
        )?;

        let converter = if layout.input_format == PixelFormat::I420 {
            let mut converter = self.provider.create_converter()?;
            let out_ty = MediaType::raw(
                PixelFormat::I420,
                layout.encode_width,
                layout.encode_height,
                fps,
                self.time_base,
            );
            let in_ty = MediaType::raw(
                PixelFormat::Bgra,
                layout.frame_width,
                layout.frame_height,
                fps,
                self.time_base,
            );
            converter.set_output_type(&out_ty)?;
            converter.set_input_type(&in_ty)?;
            Some(converter)
        } else {
            None
        };

        let gpu = match self.shared_gpu.clone() {
            Some(gpu) => Some(gpu),
            None => pollster::block_on(GpuContext::acquire()),
        };
        let preparer = FramePreparer::new(layout.clone(), self.crop, gpu);

        info!(
            input = %layout.input_format,
            encode_width = layout.encode_width,
            encode_height = layout.encode_height,
            fallback = converter.is_some(),
            "Encoding session started"
        );

        self.encoder = Some(encoder);
        self.converter = converter;
        self.preparer = Some(preparer);
        self.layout = Some(layout);
        self.frame_count = 0;
        self.phase = Phase::Encoding;
        Ok(())
    }

    /// Tear down the transform chain and reset configuration to defaults
    ///
    /// Safe to call repeatedly or on an idle session.
    pub fn stop(&mut self) {
        if let Some(preparer) = self.preparer.as_mut() {
            preparer.release();
        }
        self.encoder = None;
        self.converter = None;
        self.preparer = None;
        self.layout = None;
        self.pending.clear();
        self.frame_count = 0;
        self.crop = CropRect::default();
        self.scale_ratio = 1.0;
        self.phase = Phase::Idle;
        debug!("Encoding session stopped");
    }

    /// Submit one frame (or end of stream) and try to collect one compressed
    /// unit into `out`
    ///
    /// `out` is overwritten on every `Success`; its previous contents become
    /// invalid. `MoreInput` means the encoder buffered the frame. After an
    /// `Eos` frame the session drains: keep calling with `Eos` until `Eof`.
    pub fn encode(
        &mut self,
        frame: InputFrame<'_>,
        out: &mut EncodedUnit,
    ) -> Result<EncodeStatus, EncodeError> {
        match self.phase {
            Phase::Idle => return Err(EncodeError::SessionState("session not started")),
            Phase::Drained => {
                if matches!(frame, InputFrame::Eos) {
                    return Ok(EncodeStatus::Eof);
                }
                return Err(EncodeError::SessionState("stream already drained"));
            }
            Phase::Draining => {
                if !matches!(frame, InputFrame::Eos) {
                    return Err(EncodeError::SessionState("cannot push frames while draining"));
                }
                return self.pull_drained(out);
            }
            Phase::Encoding => {}
        }

        if matches!(frame, InputFrame::Eos) {
            self.begin_drain()?;
            return self.pull_drained(out);
        }

        let layout = self
            .layout
            .as_ref()
            .ok_or(EncodeError::SessionState("session not started"))?;
        let fps = layout.fps;
        let prepared = {
            let preparer = self
                .preparer
                .as_mut()
                .ok_or(EncodeError::SessionState("session not started"))?;
            pollster::block_on(preparer.prepare(&frame))?
        };

        let duration = self.time_base / fps as i64;
        let timestamp = self.frame_count * duration;
        let sample = Sample {
            size: prepared.data.len(),
            data: prepared.data,
            timestamp,
            duration,
            key_frame: false,
            quality: SAMPLE_QUALITY_HINT,
        };

        // Frames buffered inside the converter still count
        let encoder_sample = match prepared.format {
            PixelFormat::Bgra => self.run_converter(sample)?,
            _ => Some(sample),
        };
        if let Some(encoder_sample) = encoder_sample {
            self.push_and_pull(&encoder_sample)?;
        }
        self.frame_count += 1;

        match self.pending.pop_front() {
            Some(unit) => {
                self.deliver(unit, out);
                Ok(EncodeStatus::Success)
            }
            None => Ok(EncodeStatus::MoreInput),
        }
    }

    /// Push one raw sample through the fallback converter
    ///
    /// When the converter refuses input, its ready output is pulled and fed
    /// straight to the encoder before the push is retried, so backpressure
    /// never drops a frame.
    fn run_converter(&mut self, sample: Sample) -> Result<Option<Sample>, EncodeError> {
        let mut converter = self
            .converter
            .take()
            .ok_or(EncodeError::SessionState("no converter on this session"))?;
        let result = self.feed_converter(converter.as_mut(), sample);
        self.converter = Some(converter);
        result
    }

    fn feed_converter(
        &mut self,
        converter: &mut dyn VideoTransform,
        sample: Sample,
    ) -> Result<Option<Sample>, EncodeError> {
        loop {
            match converter.push(&sample)? {
                PushStatus::Accepted => break,
                PushStatus::NotAccepting => {
                    let mut ready = Sample::default();
                    match converter.pull(&mut ready)? {
                        PullStatus::Produced => self.push_and_pull(&ready)?,
                        PullStatus::NeedMoreInput => {
                            return Err(TransformError::Processing(
                                "converter rejected input but has no output".into(),
                            )
                            .into())
                        }
                    }
                }
            }
        }
        let mut converted = Sample::default();
        match converter.pull(&mut converted)? {
            PullStatus::Produced => Ok(Some(converted)),
            PullStatus::NeedMoreInput => Ok(None),
        }
    }

    /// Offer one sample to the encoder, pulling output on every attempt
    ///
    /// Produced units queue on `pending` until `encode` hands them to the
    /// caller, so a transform that emits several units while refusing input
    /// catches up instead of spinning.
    fn push_and_pull(&mut self, sample: &Sample) -> Result<(), EncodeError> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or(EncodeError::SessionState("session not started"))?;
        loop {
            if self.scratch.data.capacity() == 0 {
                self.scratch.data.reserve(OUTPUT_BUFFER_CAPACITY);
            }
            let push_status = encoder.push(sample)?;
            if encoder.pull(&mut self.scratch)? == PullStatus::Produced {
                self.pending.push_back(std::mem::take(&mut self.scratch));
            }
            if push_status == PushStatus::Accepted {
                return Ok(());
            }
        }
    }

    fn begin_drain(&mut self) -> Result<(), EncodeError> {
        // Flush the converter first so nothing raw is stranded in front of
        // the encoder
        if let Some(mut converter) = self.converter.take() {
            converter.begin_drain()?;
            let mut leftover = Sample::default();
            while converter.pull(&mut leftover)? == PullStatus::Produced {
                let sample = std::mem::take(&mut leftover);
                self.push_and_pull(&sample)?;
            }
            self.converter = Some(converter);
        }
        let encoder = self
            .encoder
            .as_mut()
            .ok_or(EncodeError::SessionState("session not started"))?;
        encoder.begin_drain()?;
        self.phase = Phase::Draining;
        debug!(frames = self.frame_count, "Draining encoder");
        Ok(())
    }

    fn pull_drained(&mut self, out: &mut EncodedUnit) -> Result<EncodeStatus, EncodeError> {
        // Units queued during the converter flush come out first
        if let Some(unit) = self.pending.pop_front() {
            self.deliver(unit, out);
            return Ok(EncodeStatus::Success);
        }
        let encoder = self
            .encoder
            .as_mut()
            .ok_or(EncodeError::SessionState("session not started"))?;
        match encoder.pull(&mut self.scratch)? {
            PullStatus::Produced => {
                let unit = std::mem::take(&mut self.scratch);
                self.deliver(unit, out);
                Ok(EncodeStatus::Success)
            }
            PullStatus::NeedMoreInput => {
                self.phase = Phase::Drained;
                info!(frames = self.frame_count, "Encoder drained");
                Ok(EncodeStatus::Eof)
            }
        }
    }

    /// Copy one produced unit into the caller's buffer, recycling its
    /// allocation as the next scratch when one is needed
    fn deliver(&mut self, mut unit: Sample, out: &mut EncodedUnit) {
        out.data.clear();
        out.data.extend_from_slice(&unit.data[..unit.size]);
        out.size = unit.size;
        out.duration = unit.duration;
        out.timestamp = unit.timestamp;
        out.key_frame = unit.key_frame;
        if self.scratch.data.capacity() == 0 {
            unit.data.clear();
            self.scratch.data = unit.data;
        }
    }
}

// Convenience constructor for sessions driven by the default provider lives
// in the module root next to the provider itself.
