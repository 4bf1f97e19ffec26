// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! Wires the capture wrappers to the encoding session: listing devices and
//! recording a raw H.264 elementary stream from a camera or screen.

use mediacap::capture::{self, DeviceKind, VideoCapture};
use mediacap::encoder::{EncodeStatus, EncodedUnit, InputFrame, VideoEncoderSession};
use mediacap::EncoderSettings;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

/// List all capturable devices, grouped by kind
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let mut found_any = false;
    for kind in [
        DeviceKind::Camera,
        DeviceKind::Monitor,
        DeviceKind::Microphone,
        DeviceKind::Speaker,
    ] {
        let devices = match capture::list_devices(kind) {
            Ok(devices) => devices,
            Err(_) => continue,
        };
        if devices.is_empty() {
            continue;
        }
        found_any = true;
        println!("{}s:", kind);
        for device in &devices {
            println!("  [{}] {}", device.index, device.name);
        }
        println!();
    }
    if !found_any {
        println!("No capture devices found.");
    }
    Ok(())
}

/// Record H.264 from a video device into an elementary-stream file
pub fn record(
    kind: DeviceKind,
    device_index: usize,
    duration_secs: u64,
    fps: u32,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let devices = capture::list_devices(kind)?;
    let device = devices
        .get(device_index)
        .ok_or_else(|| format!("no {} at index {}", kind, device_index))?;

    let output = output.unwrap_or_else(|| PathBuf::from(format!("capture_{}.h264", device_index)));
    println!(
        "Recording {}s from [{}] {} to {}",
        duration_secs,
        device.index,
        device.name,
        output.display()
    );

    let capture = VideoCapture::open(device)?;

    // First frame fixes the session geometry
    let first = loop {
        if let Some(frame) = capture.read(1000)? {
            break frame;
        }
    };
    info!(width = first.width, height = first.height, "Capture geometry locked");

    let settings = EncoderSettings::load();
    let mut session = VideoEncoderSession::new();
    session.set_time_base(settings.time_base)?;
    session.set_crop(mediacap::CropRect {
        left: settings.crop.0,
        top: settings.crop.1,
        right: settings.crop.2,
        bottom: settings.crop.3,
    })?;
    session.set_scale_ratio(settings.scale_ratio)?;
    session.start(first.width, first.height, fps)?;

    let mut file = std::fs::File::create(&output)?;
    let mut unit = EncodedUnit::default();
    let mut frames: u64 = 0;
    let mut units: u64 = 0;
    let deadline = Instant::now() + Duration::from_secs(duration_secs);

    let mut submit = |session: &mut VideoEncoderSession<_>,
                      frame: InputFrame<'_>,
                      unit: &mut EncodedUnit,
                      file: &mut std::fs::File,
                      units: &mut u64|
     -> Result<EncodeStatus, Box<dyn std::error::Error>> {
        let status = session.encode(frame, unit)?;
        if status == EncodeStatus::Success {
            file.write_all(unit.payload())?;
            *units += 1;
        }
        Ok(status)
    };

    submit(
        &mut session,
        InputFrame::Memory {
            data: first.data.as_ref(),
            width: first.width,
            height: first.height,
            format: first.format,
        },
        &mut unit,
        &mut file,
        &mut units,
    )?;
    frames += 1;

    while Instant::now() < deadline {
        let Some(frame) = capture.read(1000)? else {
            continue;
        };
        submit(
            &mut session,
            InputFrame::Memory {
                data: frame.data.as_ref(),
                width: frame.width,
                height: frame.height,
                format: frame.format,
            },
            &mut unit,
            &mut file,
            &mut units,
        )?;
        frames += 1;
    }

    capture.stop();

    // Drain buffered output
    loop {
        match submit(&mut session, InputFrame::Eos, &mut unit, &mut file, &mut units)? {
            EncodeStatus::Eof => break,
            _ => continue,
        }
    }
    session.stop();

    println!("Recorded {} frames, wrote {} units to {}", frames, units, output.display());
    Ok(())
}
