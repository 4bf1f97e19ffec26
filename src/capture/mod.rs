// SPDX-License-Identifier: GPL-3.0-only

//! Capture boundary: device enumeration and thin pull-based wrappers
//!
//! Enumerates cameras, monitors, microphones and speaker loopbacks, and
//! wraps each in a small pipeline with a `start`/`read`/`stop` surface. The
//! wrappers deliver raw frames and samples; everything downstream (encoding,
//! muxing) is the caller's business.

pub mod audio;
pub mod devices;
pub mod types;
pub mod video;

pub use audio::AudioCapture;
pub use devices::list_devices;
pub use types::{CapturedFrame, CapturedSamples, DeviceKind, FrameData, MediaDevice};
pub use video::VideoCapture;
