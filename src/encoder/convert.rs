// SPDX-License-Identifier: GPL-3.0-only

//! Software pixel format conversion and raw-buffer cropping
//!
//! CPU fallback for memory-path frames: converts between packed BGRA and the
//! planar/semi-planar YUV 4:2:0 layouts, and performs rectangular cropping on
//! raw buffers. Uses BT.601 studio-swing coefficients in fixed point.

use super::types::{CropRect, PixelFormat};
use crate::constants::{align_up, HEIGHT_ALIGN, WIDTH_ALIGN};
use crate::errors::EncodeError;

#[inline]
fn rgb_to_y(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

#[inline]
fn rgb_to_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

#[inline]
fn rgb_to_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

/// Convert packed BGRA to semi-planar NV12
///
/// Chroma is taken from the top-left pixel of each 2x2 block.
pub fn bgra_to_nv12(bgra: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let stride = w * 4;
    let y_size = w * h;
    let mut out = vec![0u8; y_size + y_size / 2];
    let (y_plane, uv_plane) = out.split_at_mut(y_size);

    for row in 0..h {
        let src_row = row * stride;
        let dst_row = row * w;
        for col in 0..w {
            let si = src_row + col * 4;
            let b = bgra[si] as i32;
            let g = bgra[si + 1] as i32;
            let r = bgra[si + 2] as i32;
            y_plane[dst_row + col] = rgb_to_y(r, g, b);
        }
    }

    for block_row in 0..h / 2 {
        let src_row = (block_row * 2) * stride;
        let uv_row = block_row * w;
        for block_col in 0..w / 2 {
            let si = src_row + (block_col * 2) * 4;
            let b = bgra[si] as i32;
            let g = bgra[si + 1] as i32;
            let r = bgra[si + 2] as i32;
            uv_plane[uv_row + block_col * 2] = rgb_to_u(r, g, b);
            uv_plane[uv_row + block_col * 2 + 1] = rgb_to_v(r, g, b);
        }
    }

    out
}

/// Convert packed BGRA to planar I420
pub fn bgra_to_i420(bgra: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let stride = w * 4;
    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut out = vec![0u8; y_size + 2 * uv_size];
    let (y_plane, chroma) = out.split_at_mut(y_size);
    let (u_plane, v_plane) = chroma.split_at_mut(uv_size);

    for row in 0..h {
        let src_row = row * stride;
        let dst_row = row * w;
        for col in 0..w {
            let si = src_row + col * 4;
            let b = bgra[si] as i32;
            let g = bgra[si + 1] as i32;
            let r = bgra[si + 2] as i32;
            y_plane[dst_row + col] = rgb_to_y(r, g, b);
        }
    }

    for block_row in 0..h / 2 {
        let src_row = (block_row * 2) * stride;
        let uv_row = block_row * (w / 2);
        for block_col in 0..w / 2 {
            let si = src_row + (block_col * 2) * 4;
            let b = bgra[si] as i32;
            let g = bgra[si + 1] as i32;
            let r = bgra[si + 2] as i32;
            u_plane[uv_row + block_col] = rgb_to_u(r, g, b);
            v_plane[uv_row + block_col] = rgb_to_v(r, g, b);
        }
    }

    out
}

/// Deinterleave NV12 chroma into separate I420 planes
pub fn nv12_to_i420(nv12: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut out = vec![0u8; y_size + 2 * uv_size];

    out[..y_size].copy_from_slice(&nv12[..y_size]);
    let interleaved = &nv12[y_size..y_size + 2 * uv_size];
    let (u_plane, v_plane) = out[y_size..].split_at_mut(uv_size);
    for (i, pair) in interleaved.chunks_exact(2).enumerate() {
        u_plane[i] = pair[0];
        v_plane[i] = pair[1];
    }

    out
}

/// Interleave I420 chroma planes into NV12
pub fn i420_to_nv12(i420: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut out = vec![0u8; y_size + 2 * uv_size];

    out[..y_size].copy_from_slice(&i420[..y_size]);
    let u_plane = &i420[y_size..y_size + uv_size];
    let v_plane = &i420[y_size + uv_size..y_size + 2 * uv_size];
    let interleaved = &mut out[y_size..];
    for i in 0..uv_size {
        interleaved[i * 2] = u_plane[i];
        interleaved[i * 2 + 1] = v_plane[i];
    }

    out
}

/// Convert a full frame between two layouts
pub fn convert_frame(
    src: &[u8],
    from: PixelFormat,
    to: PixelFormat,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, EncodeError> {
    let expected = from.frame_size(width, height);
    if src.len() < expected {
        return Err(EncodeError::InvalidInput(format!(
            "frame too small: {} bytes, expected {} for {}x{} {}",
            src.len(),
            expected,
            width,
            height,
            from
        )));
    }
    match (from, to) {
        (PixelFormat::Bgra, PixelFormat::Nv12) => Ok(bgra_to_nv12(src, width, height)),
        (PixelFormat::Bgra, PixelFormat::I420) => Ok(bgra_to_i420(src, width, height)),
        (PixelFormat::Nv12, PixelFormat::I420) => Ok(nv12_to_i420(src, width, height)),
        (PixelFormat::I420, PixelFormat::Nv12) => Ok(i420_to_nv12(src, width, height)),
        (a, b) if a == b => Ok(src[..expected].to_vec()),
        (a, b) => Err(EncodeError::InvalidInput(format!(
            "unsupported conversion {} -> {}",
            a, b
        ))),
    }
}

/// Crop a raw buffer to the rectangle, returning the cropped buffer and its
/// aligned dimensions
///
/// Rows are copied per plane; the output width is 16-aligned and the height
/// 2-aligned to stay compatible with the negotiated encode geometry. Chroma
/// offsets are kept even so NV12 U/V pairs stay paired.
pub fn crop_frame(
    src: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    crop: &CropRect,
) -> (Vec<u8>, u32, u32) {
    let out_w = align_up((width as f32 * crop.extent_x()) as u32, WIDTH_ALIGN).min(width);
    let out_h = align_up((height as f32 * crop.extent_y()) as u32, HEIGHT_ALIGN).min(height);
    let left = ((width as f32 * crop.left) as u32).min(width - out_w) as usize;
    let top = ((height as f32 * crop.top) as u32).min(height - out_h) as usize;
    let left = left & !1;
    let top = top & !1;

    let w = width as usize;
    let ow = out_w as usize;
    let oh = out_h as usize;

    let mut out = vec![0u8; format.frame_size(out_w, out_h)];
    match format {
        PixelFormat::Bgra => {
            for row in 0..oh {
                let src_off = (row + top) * w * 4 + left * 4;
                out[row * ow * 4..(row + 1) * ow * 4]
                    .copy_from_slice(&src[src_off..src_off + ow * 4]);
            }
        }
        PixelFormat::Nv12 => {
            let y_size = w * height as usize;
            for row in 0..oh {
                let src_off = (row + top) * w + left;
                out[row * ow..(row + 1) * ow].copy_from_slice(&src[src_off..src_off + ow]);
            }
            // Interleaved chroma plane: half the rows, full row stride
            let dst_uv = ow * oh;
            for row in 0..oh / 2 {
                let src_off = y_size + (row + top / 2) * w + left;
                out[dst_uv + row * ow..dst_uv + (row + 1) * ow]
                    .copy_from_slice(&src[src_off..src_off + ow]);
            }
        }
        PixelFormat::I420 => {
            let y_size = w * height as usize;
            let uv_size = (w / 2) * (height as usize / 2);
            for row in 0..oh {
                let src_off = (row + top) * w + left;
                out[row * ow..(row + 1) * ow].copy_from_slice(&src[src_off..src_off + ow]);
            }
            let dst_u = ow * oh;
            let dst_v = dst_u + (ow / 2) * (oh / 2);
            for row in 0..oh / 2 {
                let src_u = y_size + (row + top / 2) * (w / 2) + left / 2;
                let src_v = y_size + uv_size + (row + top / 2) * (w / 2) + left / 2;
                out[dst_u + row * (ow / 2)..dst_u + (row + 1) * (ow / 2)]
                    .copy_from_slice(&src[src_u..src_u + ow / 2]);
                out[dst_v + row * (ow / 2)..dst_v + (row + 1) * (ow / 2)]
                    .copy_from_slice(&src[src_v..src_v + ow / 2]);
            }
        }
    }

    (out, out_w, out_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_bgra(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x * 7 % 256) as u8);
                data.push((y * 11 % 256) as u8);
                data.push(((x + y) * 13 % 256) as u8);
                data.push(255);
            }
        }
        data
    }

    #[test]
    fn test_full_frame_crop_is_identity() {
        let bgra = gradient_bgra(32, 16);
        let (cropped, w, h) = crop_frame(&bgra, 32, 16, PixelFormat::Bgra, &CropRect::default());
        assert_eq!((w, h), (32, 16));
        assert_eq!(cropped, bgra);

        let nv12 = bgra_to_nv12(&bgra, 32, 16);
        let (cropped, w, h) = crop_frame(&nv12, 32, 16, PixelFormat::Nv12, &CropRect::default());
        assert_eq!((w, h), (32, 16));
        assert_eq!(cropped, nv12);

        let i420 = bgra_to_i420(&bgra, 32, 16);
        let (cropped, w, h) = crop_frame(&i420, 32, 16, PixelFormat::I420, &CropRect::default());
        assert_eq!((w, h), (32, 16));
        assert_eq!(cropped, i420);
    }

    #[test]
    fn test_crop_dimensions_aligned() {
        let bgra = gradient_bgra(64, 64);
        let crop = CropRect {
            left: 0.25,
            top: 0.25,
            right: 0.75,
            bottom: 0.75,
        };
        let (_, w, h) = crop_frame(&bgra, 64, 64, PixelFormat::Bgra, &crop);
        assert_eq!(w % 16, 0);
        assert_eq!(h % 2, 0);
        assert_eq!((w, h), (32, 32));
    }

    #[test]
    fn test_white_pixel_yuv() {
        // Pure white: Y=235, U=V=128 in studio swing
        let bgra = vec![255u8, 255, 255, 255].repeat(4);
        let nv12 = bgra_to_nv12(&bgra, 2, 2);
        assert_eq!(nv12[0], 235);
        assert_eq!(nv12[4], 128);
        assert_eq!(nv12[5], 128);
    }

    #[test]
    fn test_black_pixel_yuv() {
        let bgra = vec![0u8, 0, 0, 255].repeat(4);
        let i420 = bgra_to_i420(&bgra, 2, 2);
        assert_eq!(i420[0], 16);
        assert_eq!(i420[4], 128);
        assert_eq!(i420[5], 128);
    }

    #[test]
    fn test_nv12_i420_roundtrip_planes() {
        let bgra = gradient_bgra(16, 8);
        let nv12 = bgra_to_nv12(&bgra, 16, 8);
        let i420 = nv12_to_i420(&nv12, 16, 8);
        let back = i420_to_nv12(&i420, 16, 8);
        assert_eq!(back, nv12);
    }

    #[test]
    fn test_bgra_conversions_share_luma() {
        let bgra = gradient_bgra(16, 8);
        let nv12 = bgra_to_nv12(&bgra, 16, 8);
        let i420 = bgra_to_i420(&bgra, 16, 8);
        assert_eq!(nv12[..16 * 8], i420[..16 * 8]);
    }

    #[test]
    fn test_convert_rejects_short_buffer() {
        let short = vec![0u8; 10];
        assert!(convert_frame(&short, PixelFormat::Bgra, PixelFormat::Nv12, 16, 16).is_err());
    }
}
