// SPDX-License-Identifier: GPL-3.0-only

//! Shared constants for the capture and encoding pipeline

/// Default presentation time base (MPEG transport ticks per second)
pub const MPEG_TIME_BASE: i64 = 90_000;

/// Capacity of the reused compressed-output scratch buffer
pub const OUTPUT_BUFFER_CAPACITY: usize = 16 * 1024 * 1024;

/// Encoded frame width alignment required by hardware H.264 profiles
pub const WIDTH_ALIGN: u32 = 16;

/// Encoded frame height alignment (4:2:0 chroma subsampling)
pub const HEIGHT_ALIGN: u32 = 2;

/// Keyframe spacing in seconds of frames
pub const KEYFRAME_INTERVAL_SECS: u32 = 5;

/// Average bitrate heuristic: bits per second per encoded pixel
pub const BITRATE_PER_PIXEL: u32 = 100;

/// Constant quantizer hint attached to every pushed sample
pub const SAMPLE_QUALITY_HINT: u32 = 10;

/// Tolerance per crop ratio before a crop pass is considered necessary
pub const CROP_EPSILON: f32 = 0.01;

/// Align `x` up to a multiple of `a` (power of two)
pub const fn align_up(x: u32, a: u32) -> u32 {
    (x + a - 1) & !(a - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(1920, WIDTH_ALIGN), 1920);
        assert_eq!(align_up(1913, WIDTH_ALIGN), 1920);
        assert_eq!(align_up(1, WIDTH_ALIGN), 16);
        assert_eq!(align_up(1079, HEIGHT_ALIGN), 1080);
        assert_eq!(align_up(0, WIDTH_ALIGN), 0);
    }
}
