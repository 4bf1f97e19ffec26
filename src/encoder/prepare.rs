// SPDX-License-Identifier: GPL-3.0-only

//! Frame preparation ahead of the encoder transform
//!
//! Normalizes each submitted frame into a layout the negotiated pipeline can
//! consume: crops against the configured rectangle, converts BGRA into the
//! accepted YUV layout (on GPU when a device is available, on CPU otherwise)
//! and reads GPU-resident frames back when the slow path needs their pixels.

use super::convert;
use super::negotiate::NegotiatedLayout;
use super::types::{CropRect, InputFrame, PixelFormat};
use crate::constants::CROP_EPSILON;
use crate::errors::EncodeError;
use crate::gpu::{self, nv12_pack::Nv12PackPipeline};
use std::sync::Arc;
use tracing::{debug, warn};

/// GPU device shared by the conversion pipeline
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Create a context on a dedicated conversion device, or `None` when no
    /// adapter is available
    pub async fn acquire() -> Option<Self> {
        match gpu::create_convert_device("NV12 Convert").await {
            Ok((device, queue, _info)) => Some(Self { device, queue }),
            Err(e) => {
                warn!(error = %e, "No GPU available, conversions stay on CPU");
                None
            }
        }
    }
}

/// One normalized frame ready to enter a transform
pub struct PreparedFrame {
    pub data: Vec<u8>,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

/// Converts submitted frames into the negotiated input layout
pub struct FramePreparer {
    layout: NegotiatedLayout,
    crop: CropRect,
    needs_crop: bool,
    gpu: Option<GpuContext>,
    pack: Option<Nv12PackPipeline>,
    upload: Option<wgpu::Texture>,
    upload_dims: (u32, u32),
}

impl FramePreparer {
    pub fn new(layout: NegotiatedLayout, crop: CropRect, gpu: Option<GpuContext>) -> Self {
        let needs_crop = !crop.is_full_frame(CROP_EPSILON);
        Self {
            layout,
            crop,
            needs_crop,
            gpu,
            pack: None,
            upload: None,
            upload_dims: (0, 0),
        }
    }

    /// Release GPU resources held between frames
    pub fn release(&mut self) {
        if let Some(pack) = self.pack.as_mut() {
            pack.release_resources();
        }
        self.pack = None;
        self.upload = None;
        self.upload_dims = (0, 0);
    }

    fn pack_pipeline(&mut self) -> Option<&mut Nv12PackPipeline> {
        if self.pack.is_none() {
            let gpu = self.gpu.as_ref()?;
            self.pack = Some(Nv12PackPipeline::new(
                Arc::clone(&gpu.device),
                Arc::clone(&gpu.queue),
            ));
        }
        self.pack.as_mut()
    }

    /// Normalize one frame for the negotiated pipeline
    ///
    /// NV12 sessions get a frame in NV12 at the encode resolution; fallback
    /// sessions get BGRA at the cropped frame resolution for the converter
    /// transform. YUV input that already matches the encode geometry is
    /// reshaped directly.
    pub async fn prepare(&mut self, frame: &InputFrame<'_>) -> Result<PreparedFrame, EncodeError> {
        let (data, width, height, format): (Vec<u8>, u32, u32, PixelFormat) = match frame {
            InputFrame::Eos => {
                return Err(EncodeError::InvalidInput(
                    "end of stream carries no frame".into(),
                ))
            }
            InputFrame::Texture {
                texture,
                width,
                height,
                format,
            } => {
                if *format != PixelFormat::Bgra {
                    return Err(EncodeError::InvalidInput(format!(
                        "GPU frames must be BGRA, got {}",
                        format
                    )));
                }
                // Fast path: uncropped BGRA texture straight through the
                // render pipeline, scaled while sampling
                if !self.needs_crop && self.layout.input_format == PixelFormat::Nv12 {
                    let (encode_w, encode_h) =
                        (self.layout.encode_width, self.layout.encode_height);
                    if let Some(pack) = self.pack_pipeline() {
                        pack.prepare_resources(encode_w, encode_h);
                        pack.process(texture).map_err(EncodeError::Gpu)?;
                        let nv12 = pack.read_nv12().await.map_err(EncodeError::Gpu)?;
                        pack.release_input_view();
                        return Ok(PreparedFrame {
                            data: nv12,
                            format: PixelFormat::Nv12,
                            width: encode_w,
                            height: encode_h,
                        });
                    }
                }
                let gpu = self.gpu.as_ref().ok_or(EncodeError::Gpu(
                    "GPU frame submitted without a GPU device".into(),
                ))?;
                let bgra =
                    gpu::read_texture_bgra(&gpu.device, &gpu.queue, texture, *width, *height)
                        .await
                        .map_err(EncodeError::Gpu)?;
                (bgra, *width, *height, PixelFormat::Bgra)
            }
            InputFrame::Memory {
                data,
                width,
                height,
                format,
            } => {
                let expected = format.frame_size(*width, *height);
                if data.len() < expected {
                    return Err(EncodeError::InvalidInput(format!(
                        "frame too small: {} bytes, expected {}",
                        data.len(),
                        expected
                    )));
                }
                (data.to_vec(), *width, *height, *format)
            }
        };

        let (data, width, height) = if self.needs_crop {
            let (cropped, w, h) = convert::crop_frame(&data, width, height, format, &self.crop);
            debug!(width = w, height = h, "Cropped input frame");
            (cropped, w, h)
        } else {
            (data, width, height)
        };

        match self.layout.input_format {
            PixelFormat::Nv12 => self.to_nv12(data, width, height, format).await,
            PixelFormat::I420 => self.for_fallback(data, width, height, format),
            PixelFormat::Bgra => Err(EncodeError::InvalidInput(
                "encoder cannot consume BGRA directly".into(),
            )),
        }
    }

    async fn to_nv12(
        &mut self,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<PreparedFrame, EncodeError> {
        let (encode_w, encode_h) = (self.layout.encode_width, self.layout.encode_height);
        match format {
            PixelFormat::Bgra => {
                if self.gpu.is_some() {
                    let nv12 = self.pack_bgra_gpu(&data, width, height).await?;
                    return Ok(PreparedFrame {
                        data: nv12,
                        format: PixelFormat::Nv12,
                        width: encode_w,
                        height: encode_h,
                    });
                }
                if (width, height) != (encode_w, encode_h) {
                    return Err(EncodeError::Gpu(
                        "scaling requires a GPU device".into(),
                    ));
                }
                Ok(PreparedFrame {
                    data: convert::bgra_to_nv12(&data, width, height),
                    format: PixelFormat::Nv12,
                    width,
                    height,
                })
            }
            PixelFormat::Nv12 | PixelFormat::I420 => {
                if (width, height) != (encode_w, encode_h) {
                    return Err(EncodeError::InvalidInput(format!(
                        "YUV input must match the encode resolution {}x{}, got {}x{}",
                        encode_w, encode_h, width, height
                    )));
                }
                let data = convert::convert_frame(&data, format, PixelFormat::Nv12, width, height)?;
                Ok(PreparedFrame {
                    data,
                    format: PixelFormat::Nv12,
                    width,
                    height,
                })
            }
        }
    }

    /// Upload BGRA to a reusable texture and run the render pipeline
    async fn pack_bgra_gpu(
        &mut self,
        bgra: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, EncodeError> {
        let (device, queue) = {
            let gpu = self
                .gpu
                .as_ref()
                .ok_or(EncodeError::Gpu("no GPU device".into()))?;
            (Arc::clone(&gpu.device), Arc::clone(&gpu.queue))
        };
        if self.upload_dims != (width, height) {
            self.upload = Some(device.create_texture(&wgpu::TextureDescriptor {
                label: Some("BGRA Upload Texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Bgra8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            }));
            self.upload_dims = (width, height);
        }
        let upload = self.upload.clone().ok_or(EncodeError::Gpu(
            "upload texture missing".into(),
        ))?;
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &upload,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bgra,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let (encode_w, encode_h) = (self.layout.encode_width, self.layout.encode_height);
        let pack = self
            .pack_pipeline()
            .ok_or(EncodeError::Gpu("no GPU device".into()))?;
        pack.prepare_resources(encode_w, encode_h);
        pack.process(&upload).map_err(EncodeError::Gpu)?;
        let nv12 = pack.read_nv12().await.map_err(EncodeError::Gpu)?;
        pack.release_input_view();
        Ok(nv12)
    }

    /// Shape a frame for the fallback converter transform
    ///
    /// The converter consumes BGRA at the frame resolution and produces I420
    /// at the encode resolution. YUV input that already matches the encode
    /// geometry skips the converter entirely.
    fn for_fallback(
        &self,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<PreparedFrame, EncodeError> {
        let (encode_w, encode_h) = (self.layout.encode_width, self.layout.encode_height);
        match format {
            PixelFormat::Bgra => Ok(PreparedFrame {
                data,
                format: PixelFormat::Bgra,
                width,
                height,
            }),
            PixelFormat::Nv12 | PixelFormat::I420 => {
                if (width, height) != (encode_w, encode_h) {
                    return Err(EncodeError::InvalidInput(format!(
                        "YUV input must match the encode resolution {}x{}, got {}x{}",
                        encode_w, encode_h, width, height
                    )));
                }
                let data = convert::convert_frame(&data, format, PixelFormat::I420, width, height)?;
                Ok(PreparedFrame {
                    data,
                    format: PixelFormat::I420,
                    width,
                    height,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MPEG_TIME_BASE;

    fn layout(input_format: PixelFormat) -> NegotiatedLayout {
        NegotiatedLayout {
            frame_width: 32,
            frame_height: 16,
            encode_width: 32,
            encode_height: 16,
            fps: 30,
            time_base: MPEG_TIME_BASE,
            input_format,
        }
    }

    #[test]
    fn test_memory_bgra_to_nv12_cpu() {
        let mut preparer = FramePreparer::new(layout(PixelFormat::Nv12), CropRect::default(), None);
        let bgra = vec![128u8; 32 * 16 * 4];
        let frame = InputFrame::Memory {
            data: &bgra,
            width: 32,
            height: 16,
            format: PixelFormat::Bgra,
        };
        let prepared = pollster::block_on(preparer.prepare(&frame)).unwrap();
        assert_eq!(prepared.format, PixelFormat::Nv12);
        assert_eq!(prepared.data.len(), 32 * 16 * 3 / 2);
    }

    #[test]
    fn test_memory_i420_reshaped_for_nv12_session() {
        let mut preparer = FramePreparer::new(layout(PixelFormat::Nv12), CropRect::default(), None);
        let i420 = vec![64u8; 32 * 16 * 3 / 2];
        let frame = InputFrame::Memory {
            data: &i420,
            width: 32,
            height: 16,
            format: PixelFormat::I420,
        };
        let prepared = pollster::block_on(preparer.prepare(&frame)).unwrap();
        assert_eq!(prepared.format, PixelFormat::Nv12);
    }

    #[test]
    fn test_fallback_passes_bgra_through() {
        let mut preparer = FramePreparer::new(layout(PixelFormat::I420), CropRect::default(), None);
        let bgra = vec![10u8; 32 * 16 * 4];
        let frame = InputFrame::Memory {
            data: &bgra,
            width: 32,
            height: 16,
            format: PixelFormat::Bgra,
        };
        let prepared = pollster::block_on(preparer.prepare(&frame)).unwrap();
        assert_eq!(prepared.format, PixelFormat::Bgra);
        assert_eq!(prepared.data, bgra);
    }

    #[test]
    fn test_mismatched_yuv_resolution_rejected() {
        let mut preparer = FramePreparer::new(layout(PixelFormat::Nv12), CropRect::default(), None);
        let nv12 = vec![0u8; 64 * 32 * 3 / 2];
        let frame = InputFrame::Memory {
            data: &nv12,
            width: 64,
            height: 32,
            format: PixelFormat::Nv12,
        };
        assert!(pollster::block_on(preparer.prepare(&frame)).is_err());
    }

    #[test]
    fn test_short_frame_rejected() {
        let mut preparer = FramePreparer::new(layout(PixelFormat::Nv12), CropRect::default(), None);
        let tiny = vec![0u8; 8];
        let frame = InputFrame::Memory {
            data: &tiny,
            width: 32,
            height: 16,
            format: PixelFormat::Bgra,
        };
        assert!(pollster::block_on(preparer.prepare(&frame)).is_err());
    }

    #[test]
    fn test_eos_is_not_a_frame() {
        let mut preparer = FramePreparer::new(layout(PixelFormat::Nv12), CropRect::default(), None);
        assert!(pollster::block_on(preparer.prepare(&InputFrame::Eos)).is_err());
    }
}
