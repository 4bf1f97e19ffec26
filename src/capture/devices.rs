// SPDX-License-Identifier: GPL-3.0-only

//! Device enumeration over the GStreamer device monitor

use super::types::{DeviceKind, MediaDevice};
use crate::errors::CaptureError;
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::debug;

/// Enumerate capture devices of one kind
///
/// Cameras, microphones and speakers come from the device monitor; monitors
/// are synthesized from the availability of a screen-capture source element.
pub fn list_devices(kind: DeviceKind) -> Result<Vec<MediaDevice>, CaptureError> {
    gst::init().map_err(|e| CaptureError::Backend(format!("GStreamer init failed: {}", e)))?;

    let Some(class) = kind.device_class() else {
        return list_monitors();
    };

    let monitor = gst::DeviceMonitor::new();
    let caps = if kind.is_audio() {
        gst::Caps::builder("audio/x-raw").build()
    } else {
        gst::Caps::builder("video/x-raw").build()
    };
    monitor.add_filter(Some(class), Some(&caps));
    monitor
        .start()
        .map_err(|e| CaptureError::Backend(format!("device monitor failed to start: {}", e)))?;

    let devices = monitor
        .devices()
        .iter()
        .enumerate()
        .map(|(index, device)| MediaDevice {
            kind,
            index,
            name: device.display_name().to_string(),
            device: Some(device.clone()),
        })
        .collect::<Vec<_>>();

    monitor.stop();
    debug!(kind = %kind, count = devices.len(), "Enumerated devices");
    Ok(devices)
}

fn list_monitors() -> Result<Vec<MediaDevice>, CaptureError> {
    // Screen capture goes through a source element rather than a device; one
    // entry per available element kind
    let mut monitors = Vec::new();
    for (element, label) in [
        ("pipewiresrc", "Screen (PipeWire)"),
        ("ximagesrc", "Screen (X11)"),
    ] {
        if gst::ElementFactory::find(element).is_some() {
            monitors.push(MediaDevice {
                kind: DeviceKind::Monitor,
                index: monitors.len(),
                name: label.to_string(),
                device: None,
            });
        }
    }
    if monitors.is_empty() {
        return Err(CaptureError::NoDevice(
            "no screen capture source available".into(),
        ));
    }
    Ok(monitors)
}
