// SPDX-License-Identifier: GPL-3.0-only

//! Media capture and hardware-accelerated H.264 encoding
//!
//! The crate is split along the pipeline:
//! - [`capture`] — device enumeration and thin pull-based capture wrappers
//! - [`encoder`] — negotiation, frame preparation and the encoding session
//! - [`gpu`] — wgpu device utilities and the BGRA to NV12 render pipeline
//!
//! A typical flow opens a [`capture::VideoCapture`], starts a
//! [`encoder::VideoEncoderSession`] at the captured geometry and feeds frames
//! through [`encoder::VideoEncoderSession::encode`] until end of stream.

pub mod capture;
pub mod config;
pub mod constants;
pub mod encoder;
pub mod errors;
pub mod gpu;

pub use config::EncoderSettings;
pub use encoder::{
    CropRect, EncodeStatus, EncodedUnit, InputFrame, PixelFormat, VideoEncoderSession,
};
pub use errors::{CaptureError, EncodeError, TransformError};
