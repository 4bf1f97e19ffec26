// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end session behavior against a scripted transform
//!
//! Uses the public transform traits the way an embedder with its own media
//! stack would, and checks the one-unit-per-frame accounting across
//! backpressure and drain.

use mediacap::constants::MPEG_TIME_BASE;
use mediacap::encoder::session::TransformProvider;
use mediacap::encoder::transform::{
    MediaFormat, MediaType, PullStatus, PushStatus, Sample, VideoTransform,
};
use mediacap::encoder::VideoEncoderSession;
use mediacap::{EncodeStatus, EncodedUnit, InputFrame, PixelFormat, TransformError};
use std::collections::VecDeque;

/// Encoder that refuses every other push and holds two frames of latency
struct StutteringEncoder {
    queue: VecDeque<(i64, i64)>,
    draining: bool,
    refuse_next: bool,
    outputs: usize,
}

impl VideoTransform for StutteringEncoder {
    fn set_output_type(&mut self, ty: &MediaType) -> Result<(), TransformError> {
        assert_eq!(ty.format, MediaFormat::H264);
        Ok(())
    }

    fn set_input_type(&mut self, ty: &MediaType) -> Result<(), TransformError> {
        match ty.format {
            MediaFormat::Raw(PixelFormat::Nv12) => Ok(()),
            other => Err(TransformError::Unsupported(other.to_string())),
        }
    }

    fn push(&mut self, sample: &Sample) -> Result<PushStatus, TransformError> {
        if self.refuse_next {
            self.refuse_next = false;
            return Ok(PushStatus::NotAccepting);
        }
        self.refuse_next = true;
        self.queue.push_back((sample.timestamp, sample.duration));
        Ok(PushStatus::Accepted)
    }

    fn pull(&mut self, out: &mut Sample) -> Result<PullStatus, TransformError> {
        let ready = self.draining || self.queue.len() > 2;
        if !ready {
            return Ok(PullStatus::NeedMoreInput);
        }
        let Some((timestamp, duration)) = self.queue.pop_front() else {
            return Ok(PullStatus::NeedMoreInput);
        };
        out.data.clear();
        out.data.extend_from_slice(&[0, 0, 0, 1, 0x65]);
        out.size = 5;
        out.timestamp = timestamp;
        out.duration = duration;
        out.key_frame = self.outputs == 0;
        self.outputs += 1;
        Ok(PullStatus::Produced)
    }

    fn begin_drain(&mut self) -> Result<(), TransformError> {
        self.draining = true;
        Ok(())
    }
}

struct StutteringProvider;

impl TransformProvider for StutteringProvider {
    fn create_encoder(&self) -> Result<Box<dyn VideoTransform>, TransformError> {
        Ok(Box::new(StutteringEncoder {
            queue: VecDeque::new(),
            draining: false,
            refuse_next: false,
            outputs: 0,
        }))
    }

    fn create_converter(&self) -> Result<Box<dyn VideoTransform>, TransformError> {
        unreachable!("NV12 sessions never build a converter")
    }
}

#[test]
fn test_n_frames_yield_n_units_in_order() {
    let mut session = VideoEncoderSession::with_provider(StutteringProvider);
    session.start(64, 32, 30).unwrap();

    let nv12 = vec![0u8; 64 * 32 * 3 / 2];
    let mut unit = EncodedUnit::default();
    let total_frames = 10;
    let mut collected: Vec<(i64, bool)> = Vec::new();

    for _ in 0..total_frames {
        let status = session
            .encode(
                InputFrame::Memory {
                    data: &nv12,
                    width: 64,
                    height: 32,
                    format: PixelFormat::Nv12,
                },
                &mut unit,
            )
            .unwrap();
        if status == EncodeStatus::Success {
            collected.push((unit.timestamp, unit.key_frame));
        }
    }

    loop {
        match session.encode(InputFrame::Eos, &mut unit).unwrap() {
            EncodeStatus::Success => collected.push((unit.timestamp, unit.key_frame)),
            EncodeStatus::Eof => break,
            EncodeStatus::MoreInput => panic!("drain must not report MoreInput"),
        }
    }

    assert_eq!(collected.len(), total_frames);

    // Strictly increasing timestamps spaced by time_base/fps, keyframe first
    let duration = MPEG_TIME_BASE / 30;
    for (i, (timestamp, key_frame)) in collected.iter().enumerate() {
        assert_eq!(*timestamp, i as i64 * duration);
        assert_eq!(*key_frame, i == 0);
    }
}

#[test]
fn test_session_survives_restart() {
    let mut session = VideoEncoderSession::with_provider(StutteringProvider);
    let nv12 = vec![0u8; 64 * 32 * 3 / 2];
    let mut unit = EncodedUnit::default();

    for _ in 0..2 {
        session.start(64, 32, 30).unwrap();
        session
            .encode(
                InputFrame::Memory {
                    data: &nv12,
                    width: 64,
                    height: 32,
                    format: PixelFormat::Nv12,
                },
                &mut unit,
            )
            .unwrap();
        session.stop();
    }
    assert!(!session.is_active());
}
