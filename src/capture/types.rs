// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the capture boundary

use crate::encoder::PixelFormat;
use gstreamer::buffer::{MappedBuffer, Readable};
use std::sync::Arc;

/// Kinds of capturable devices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Camera,
    Monitor,
    Microphone,
    /// Speaker loopback (captures what is being played)
    Speaker,
}

impl DeviceKind {
    /// GStreamer device-monitor class filter for this kind
    pub fn device_class(&self) -> Option<&'static str> {
        match self {
            DeviceKind::Camera => Some("Video/Source"),
            DeviceKind::Microphone => Some("Audio/Source"),
            DeviceKind::Speaker => Some("Audio/Sink"),
            // Monitors are not enumerated through the device monitor
            DeviceKind::Monitor => None,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, DeviceKind::Microphone | DeviceKind::Speaker)
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceKind::Camera => "camera",
            DeviceKind::Monitor => "monitor",
            DeviceKind::Microphone => "microphone",
            DeviceKind::Speaker => "speaker",
        };
        f.write_str(s)
    }
}

/// One enumerated capture device
#[derive(Debug, Clone)]
pub struct MediaDevice {
    pub kind: DeviceKind,
    /// Position within the enumeration for this kind
    pub index: usize,
    pub name: String,
    /// Backing device handle; absent for synthesized entries like monitors
    pub device: Option<gstreamer::Device>,
}

/// Frame data storage, either pre-copied bytes or a zero-copy mapped
/// GStreamer buffer kept alive by reference counting
#[derive(Clone)]
pub enum FrameData {
    Copied(Arc<[u8]>),
    Mapped(Arc<MappedBuffer<Readable>>),
}

impl FrameData {
    pub fn from_mapped_buffer(buffer: MappedBuffer<Readable>) -> Self {
        FrameData::Mapped(Arc::new(buffer))
    }

    pub fn len(&self) -> usize {
        match self {
            FrameData::Copied(data) => data.len(),
            FrameData::Mapped(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
            FrameData::Mapped(buf) => buf.as_slice(),
        }
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Mapped(buf) => write!(f, "FrameData::Mapped({} bytes)", buf.len()),
        }
    }
}

/// One raw video frame read from a capture wrapper
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub data: FrameData,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Pipeline running time in nanoseconds
    pub timestamp_ns: u64,
}

/// One chunk of raw audio read from a capture wrapper
#[derive(Debug, Clone)]
pub struct CapturedSamples {
    pub data: FrameData,
    pub channels: u32,
    pub sample_rate: u32,
    pub timestamp_ns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_classes() {
        assert_eq!(DeviceKind::Camera.device_class(), Some("Video/Source"));
        assert_eq!(DeviceKind::Microphone.device_class(), Some("Audio/Source"));
        assert_eq!(DeviceKind::Speaker.device_class(), Some("Audio/Sink"));
        assert_eq!(DeviceKind::Monitor.device_class(), None);
    }

    #[test]
    fn test_frame_data_copied() {
        let data = FrameData::Copied(vec![1u8, 2, 3].into());
        assert_eq!(data.len(), 3);
        assert!(!data.is_empty());
        assert_eq!(data.as_ref(), &[1, 2, 3]);
    }
}
