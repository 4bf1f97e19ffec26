// SPDX-License-Identifier: GPL-3.0-only

//! Hardware-accelerated H.264 encoding
//!
//! The session negotiates formats with a platform encoder transform, prepares
//! each submitted frame (crop, scale, colour-space conversion) and drives the
//! push/pull encode loop. See [`VideoEncoderSession`] for the entry point.

pub mod convert;
pub mod gst;
pub mod negotiate;
pub mod prepare;
pub mod session;
pub mod transform;
pub mod types;

pub use gst::GstTransformProvider;
pub use negotiate::NegotiatedLayout;
pub use session::{TransformProvider, VideoEncoderSession};
pub use types::{CropRect, EncodeStatus, EncodedUnit, InputFrame, PixelFormat};

impl VideoEncoderSession<GstTransformProvider> {
    /// A session backed by the best available GStreamer H.264 encoder
    pub fn new() -> Self {
        Self::with_provider(GstTransformProvider)
    }
}

impl Default for VideoEncoderSession<GstTransformProvider> {
    fn default() -> Self {
        Self::new()
    }
}
