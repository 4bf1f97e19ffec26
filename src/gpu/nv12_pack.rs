// SPDX-License-Identifier: GPL-3.0-only

//! GPU BGRA to NV12 packing pipeline
//!
//! Render-pass implementation of the colour-space conversion: a BGRA input
//! texture is split into full-resolution Y/Cb/Cr planes, the chroma planes
//! are downsampled to half resolution, and luma plus interleaved chroma are
//! packed into a single R8 target laid out exactly like an NV12 frame
//! (width x height * 3/2). The packed plane can then be read back through a
//! row-aligned staging buffer and handed to the encoder without further CPU
//! conversion.

use super::{padded_bytes_per_row, read_buffer_async, CachedDimensions};
use std::sync::Arc;
use tracing::debug;

fn clear_target(view: &wgpu::TextureView) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            store: wgpu::StoreOp::Store,
        },
    })
}

struct PlaneTextures {
    y: wgpu::Texture,
    cb: wgpu::Texture,
    cr: wgpu::Texture,
    cb_half: wgpu::Texture,
    cr_half: wgpu::Texture,
    packed: wgpu::Texture,
    shift_mask: wgpu::Texture,
}

/// Four-pass BGRA to NV12 conversion pipeline
///
/// Resources are sized by `prepare_resources` and reused across frames until
/// the dimensions change or `release_resources` drops them.
pub struct Nv12PackPipeline {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_ycbcr: wgpu::RenderPipeline,
    pipeline_downsample: wgpu::RenderPipeline,
    pipeline_copy: wgpu::RenderPipeline,
    pipeline_interleave: wgpu::RenderPipeline,
    sampler_point: wgpu::Sampler,
    sampler_linear: wgpu::Sampler,
    cached_dims: CachedDimensions,
    planes: Option<PlaneTextures>,
    staging: Option<wgpu::Buffer>,
    input_view: Option<wgpu::TextureView>,
    width: u32,
    height: u32,
}

impl Nv12PackPipeline {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("NV12 Pack Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("nv12_pack.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("NV12 Pack Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D1,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("NV12 Pack Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, entry: &str, target_count: usize| {
            let targets: Vec<Option<wgpu::ColorTargetState>> = (0..target_count)
                .map(|_| {
                    Some(wgpu::ColorTargetState {
                        format: wgpu::TextureFormat::R8Unorm,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })
                })
                .collect();
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_fullscreen"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry),
                    compilation_options: Default::default(),
                    targets: &targets,
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let pipeline_ycbcr = make_pipeline("YCbCr Split Pipeline", "fs_ycbcr", 3);
        let pipeline_downsample = make_pipeline("Chroma Downsample Pipeline", "fs_downsample", 2);
        let pipeline_copy = make_pipeline("Luma Copy Pipeline", "fs_copy", 1);
        let pipeline_interleave = make_pipeline("Chroma Interleave Pipeline", "fs_interleave", 1);

        let sampler_point = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("NV12 Point Sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let sampler_linear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("NV12 Linear Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            device,
            queue,
            bind_group_layout,
            pipeline_ycbcr,
            pipeline_downsample,
            pipeline_copy,
            pipeline_interleave,
            sampler_point,
            sampler_linear,
            cached_dims: CachedDimensions::default(),
            planes: None,
            staging: None,
            input_view: None,
            width: 0,
            height: 0,
        }
    }

    fn plane_texture(&self, label: &str, width: u32, height: u32, extra: wgpu::TextureUsages) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | extra,
            view_formats: &[],
        })
    }

    /// Allocate (or reallocate) render targets and the readback buffer for
    /// the given output dimensions
    ///
    /// Dimensions must be even; callers pass the negotiated encode size which
    /// is already 16/2-aligned.
    pub fn prepare_resources(&mut self, width: u32, height: u32) {
        if !self.cached_dims.needs_update(width, height) {
            return;
        }

        debug!(width, height, "Allocating NV12 pack resources");

        let sampled = wgpu::TextureUsages::TEXTURE_BINDING;
        let y = self.plane_texture("Luma Plane", width, height, sampled);
        let cb = self.plane_texture("Cb Plane", width, height, sampled);
        let cr = self.plane_texture("Cr Plane", width, height, sampled);
        let cb_half = self.plane_texture("Cb Half Plane", width / 2, height / 2, sampled);
        let cr_half = self.plane_texture("Cr Half Plane", width / 2, height / 2, sampled);
        let packed = self.plane_texture(
            "NV12 Packed Plane",
            width,
            height * 3 / 2,
            wgpu::TextureUsages::COPY_SRC,
        );

        // 1-D mask alternating 0/1 per column, used to pick Cb or Cr while
        // interleaving
        let shift_mask = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Chroma Shift Mask"),
            size: wgpu::Extent3d {
                width,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D1,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let mask_data: Vec<u8> = (0..width).map(|x| if x % 2 == 0 { 0 } else { 255 }).collect();
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &shift_mask,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &mask_data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width,
                height: 1,
                depth_or_array_layers: 1,
            },
        );

        let staging_size = padded_bytes_per_row(width) as u64 * (height * 3 / 2) as u64;
        self.staging = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("NV12 Staging Buffer"),
            size: staging_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        }));

        self.planes = Some(PlaneTextures {
            y,
            cb,
            cr,
            cb_half,
            cr_half,
            packed,
            shift_mask,
        });
        self.width = width;
        self.height = height;
        self.cached_dims.update(width, height);
    }

    /// Drop all cached render targets, the readback buffer and any retained
    /// input view
    pub fn release_resources(&mut self) {
        self.planes = None;
        self.staging = None;
        self.input_view = None;
        self.cached_dims.clear();
        self.width = 0;
        self.height = 0;
    }

    /// Drop the reference to the last processed input texture
    pub fn release_input_view(&mut self) {
        self.input_view = None;
    }

    fn bind(
        &self,
        sampler: &wgpu::Sampler,
        tex_a: &wgpu::TextureView,
        tex_b: &wgpu::TextureView,
        mask: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("NV12 Pack Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(tex_a),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(tex_b),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(mask),
                },
            ],
        })
    }

    /// Run the four conversion passes over one BGRA input texture and queue
    /// the packed result into the staging buffer
    ///
    /// The input view is retained until `release_input_view` (or the next
    /// `process`) drops it.
    pub fn process(&mut self, input: &wgpu::Texture) -> Result<(), String> {
        let planes = self
            .planes
            .as_ref()
            .ok_or("NV12 pack resources not prepared")?;
        let staging = self.staging.as_ref().ok_or("staging buffer missing")?;
        let (width, height) = (self.width, self.height);

        let input_view = input.create_view(&wgpu::TextureViewDescriptor::default());
        let y_view = planes.y.create_view(&wgpu::TextureViewDescriptor::default());
        let cb_view = planes.cb.create_view(&wgpu::TextureViewDescriptor::default());
        let cr_view = planes.cr.create_view(&wgpu::TextureViewDescriptor::default());
        let cb_half_view = planes
            .cb_half
            .create_view(&wgpu::TextureViewDescriptor::default());
        let cr_half_view = planes
            .cr_half
            .create_view(&wgpu::TextureViewDescriptor::default());
        let packed_view = planes
            .packed
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mask_view = planes
            .shift_mask
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("NV12 Pack Encoder"),
            });

        // Pass 1: split BGRA into full-resolution Y, Cb, Cr
        {
            let bind = self.bind(&self.sampler_point, &input_view, &input_view, &mask_view);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("YCbCr Split Pass"),
                color_attachments: &[
                    clear_target(&y_view),
                    clear_target(&cb_view),
                    clear_target(&cr_view),
                ],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline_ycbcr);
            pass.set_bind_group(0, &bind, &[]);
            pass.draw(0..4, 0..1);
        }

        // Pass 2: downsample chroma to half resolution
        {
            let bind = self.bind(&self.sampler_linear, &cb_view, &cr_view, &mask_view);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Chroma Downsample Pass"),
                color_attachments: &[clear_target(&cb_half_view), clear_target(&cr_half_view)],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline_downsample);
            pass.set_bind_group(0, &bind, &[]);
            pass.draw(0..4, 0..1);
        }

        // Pass 3: luma into the top of the packed target
        {
            let bind = self.bind(&self.sampler_point, &y_view, &y_view, &mask_view);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Luma Copy Pass"),
                color_attachments: &[clear_target(&packed_view)],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline_copy);
            pass.set_bind_group(0, &bind, &[]);
            pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
            pass.draw(0..4, 0..1);
        }

        // Pass 4: interleave CbCr into the bottom third
        {
            let bind = self.bind(&self.sampler_point, &cb_half_view, &cr_half_view, &mask_view);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Chroma Interleave Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &packed_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline_interleave);
            pass.set_bind_group(0, &bind, &[]);
            pass.set_viewport(
                0.0,
                height as f32,
                width as f32,
                height as f32 / 2.0,
                0.0,
                1.0,
            );
            pass.draw(0..4, 0..1);
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &planes.packed,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row(width)),
                    rows_per_image: Some(height * 3 / 2),
                },
            },
            wgpu::Extent3d {
                width,
                height: height * 3 / 2,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(std::iter::once(encoder.finish()));
        self.input_view = Some(input_view);
        Ok(())
    }

    /// Read the packed NV12 frame produced by the last `process` call
    pub async fn read_nv12(&self) -> Result<Vec<u8>, String> {
        let staging = self.staging.as_ref().ok_or("staging buffer missing")?;
        let padded = padded_bytes_per_row(self.width) as usize;
        let rows = (self.height * 3 / 2) as usize;
        let raw = read_buffer_async(&self.device, staging).await?;

        if padded == self.width as usize {
            return Ok(raw);
        }
        let mut out = Vec::with_capacity(self.width as usize * rows);
        for row in 0..rows {
            let start = row * padded;
            out.extend_from_slice(&raw[start..start + self.width as usize]);
        }
        Ok(out)
    }
}
