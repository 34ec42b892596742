//! Textured disc renderer shared by every body.
//!
//! One unit disc lives in a static vertex buffer. Each body is a single
//! draw of it, placed and tinted through push constants and scaled to the
//! canvas aspect by a view uniform. Rocky bodies sample a mipmapped
//! limb-darkened surface; the sun samples a streaming texture whose
//! granulation is re-uploaded a few times a second.

use std::f32::consts::TAU;
use std::sync::Arc;

use anyhow::Context as _;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use trellis_gpu::texture::full_mip_levels;
use trellis_gpu::{
    mip_chain, Canvas, DescriptorBinding, DescriptorSet, Device, GraphicsPipeline,
    GraphicsPipelineOptions, ShaderModule, StaticBuffer, StreamingTexture, Texture,
    UniformBuffer,
};

/// SPIR-V for `shaders/disc.vert`.
pub const VERTEX_SHADER: &[u8] = include_bytes!("../shaders/disc.vert.spv");
/// SPIR-V for `shaders/disc.frag`.
pub const FRAGMENT_SHADER: &[u8] = include_bytes!("../shaders/disc.frag.spv");

/// Rim segments of the disc mesh.
pub const DISC_SEGMENTS: u32 = 48;

/// Side of the rocky surface texture, level 0.
const SURFACE_SIZE: u32 = 64;

/// Side of the sun's granulation texture.
const GRANULATION_SIZE: u32 = 32;

/// Bytes per RGBA8 texel.
const TEXEL_BYTES: u32 = 4;

const VIEW_BINDING: u32 = 0;
const SURFACE_BINDING: u32 = 1;

/// Contents of the view uniform. Only `xy` of `scale` is used.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ViewUniform {
    pub scale: [f32; 4],
}

impl ViewUniform {
    pub fn for_extent(extent: vk::Extent2D) -> Self {
        let scale = view_scale(extent);
        Self {
            scale: [scale.x, scale.y, 0.0, 0.0],
        }
    }
}

/// Per-draw push constants, matching the `Body` block of the vertex shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DiscPush {
    pub color: [f32; 4],
    /// Center in `xy`, radius in `z`.
    pub placement: [f32; 4],
}

impl DiscPush {
    pub fn new(center: Vec2, radius: f32, color: [f32; 4]) -> Self {
        Self {
            color,
            placement: [center.x, center.y, radius, 0.0],
        }
    }
}

/// Which texture a disc is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Rocky,
    Solar,
}

/// Scene units to clip space. One scene unit is half the shorter side of
/// the canvas.
#[allow(clippy::cast_precision_loss)]
pub fn view_scale(extent: vk::Extent2D) -> Vec2 {
    let width = extent.width.max(1) as f32;
    let height = extent.height.max(1) as f32;
    let shorter = width.min(height);
    Vec2::new(shorter / width, shorter / height)
}

/// Triangle list of a unit disc: one triangle per rim segment.
#[allow(clippy::cast_precision_loss)]
pub fn disc_vertices(segments: u32) -> Vec<Vec2> {
    let segments = segments.max(3);
    let rim = |i: u32| {
        let angle = i as f32 * TAU / segments as f32;
        Vec2::new(angle.cos(), angle.sin())
    };
    (0..segments)
        .flat_map(|i| [Vec2::ZERO, rim(i), rim(i + 1)])
        .collect()
}

/// Brightness of a sphere seen face on, at `uv` across its disc.
fn limb_darkening(uv: Vec2) -> f32 {
    let r2 = (uv * 2.0 - Vec2::ONE).length_squared().min(1.0);
    0.35 + 0.65 * (1.0 - r2).sqrt()
}

/// RGBA8 texels of a limb-darkened surface, every mip level of a
/// `size`-sided texture packed one after the other.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn shaded_surface(size: u32, mip_levels: u32) -> Vec<u8> {
    let levels = mip_chain(size, size, TEXEL_BYTES, mip_levels);
    let mut bytes = Vec::new();
    for level in &levels {
        for y in 0..level.height {
            for x in 0..level.width {
                let uv = Vec2::new(
                    (x as f32 + 0.5) / level.width as f32,
                    (y as f32 + 0.5) / level.height as f32,
                );
                let shade = (limb_darkening(uv) * 255.0).round() as u8;
                bytes.extend_from_slice(&[shade, shade, shade, 255]);
            }
        }
    }
    bytes
}

/// RGBA8 granulation pattern of the sun for animation step `tick`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn granulation(size: u32, tick: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity((size * size * TEXEL_BYTES) as usize);
    for y in 0..size {
        for x in 0..size {
            let cell = u64::from(x / 4) | (u64::from(y / 4) << 16);
            let noise = (hash(cell ^ tick.wrapping_mul(0x9E37_79B9)) % 64) as u8;
            let shade = 191 + noise;
            bytes.extend_from_slice(&[shade, shade, shade, 255]);
        }
    }
    bytes
}

fn hash(mut value: u64) -> u64 {
    value ^= value >> 33;
    value = value.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    value ^= value >> 33;
    value = value.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
    value ^ (value >> 33)
}

pub struct DiscRenderer {
    pipeline: GraphicsPipeline,
    rocky_set: DescriptorSet,
    solar_set: DescriptorSet,
    view: UniformBuffer,
    view_extent: vk::Extent2D,
    mesh: StaticBuffer,
    vertex_count: u32,
    rocky_surface: Texture,
    solar_surface: StreamingTexture,
    granulation_tick: u64,
}

impl DiscRenderer {
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(device: &Arc<Device>, canvas: &Canvas) -> anyhow::Result<Self> {
        let vertices = disc_vertices(DISC_SEGMENTS);
        let mesh = StaticBuffer::with_data(device, bytemuck::cast_slice(&vertices))
            .context("Failed to upload disc mesh")?;

        let mut view = UniformBuffer::for_type::<ViewUniform>(device)?;
        let view_extent = canvas.extent();
        view.update_uniform(&ViewUniform::for_extent(view_extent))?;

        let mip_levels = full_mip_levels(SURFACE_SIZE, SURFACE_SIZE);
        let rocky_surface = Texture::from_bytes(
            device,
            &shaded_surface(SURFACE_SIZE, mip_levels),
            SURFACE_SIZE,
            SURFACE_SIZE,
            TEXEL_BYTES,
            vk::Format::R8G8B8A8_UNORM,
            mip_levels,
        )
        .context("Failed to upload surface texture")?;
        let solar_surface = StreamingTexture::new(
            device,
            GRANULATION_SIZE,
            GRANULATION_SIZE,
            TEXEL_BYTES,
            vk::Format::R8G8B8A8_UNORM,
            Some(granulation(GRANULATION_SIZE, 0).as_slice()),
        )
        .context("Failed to upload granulation texture")?;

        let bindings = [
            DescriptorBinding::uniform_buffer(VIEW_BINDING, vk::ShaderStageFlags::VERTEX),
            DescriptorBinding::combined_image_sampler(
                SURFACE_BINDING,
                vk::ShaderStageFlags::FRAGMENT,
            ),
        ];
        let rocky_set = DescriptorSet::new(device, 1, &bindings)?;
        let solar_set = DescriptorSet::new(device, 1, &bindings)?;
        for (set, surface) in [
            (&rocky_set, rocky_surface.descriptor_info()),
            (&solar_set, solar_surface.descriptor_info()),
        ] {
            set.write_uniform_buffer(VIEW_BINDING, view.handle(), 0, view.size());
            set.write_combined_image_sampler(SURFACE_BINDING, surface);
        }

        let vertex = ShaderModule::from_spirv_bytes(device, VERTEX_SHADER)?;
        let fragment = ShaderModule::from_spirv_bytes(device, FRAGMENT_SHADER)?;
        let push_constants = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: std::mem::size_of::<DiscPush>() as u32,
        }];
        // Both descriptor sets share one layout.
        let options = GraphicsPipelineOptions::default()
            .with_cull_mode(vk::CullModeFlags::NONE)
            .with_depth(false, false, vk::CompareOp::ALWAYS)
            .with_push_constants(&push_constants)
            .with_set_layouts(&[rocky_set.layout()])
            .add_vertex_attribute_binding(
                std::mem::size_of::<Vec2>() as u32,
                vk::VertexInputRate::VERTEX,
                0,
                vk::Format::R32G32_SFLOAT,
            );
        let pipeline = GraphicsPipeline::new(device, canvas, &vertex, &fragment, &options)
            .context("Failed to create disc pipeline")?;

        Ok(Self {
            pipeline,
            rocky_set,
            solar_set,
            view,
            view_extent,
            mesh,
            vertex_count: vertices.len() as u32,
            rocky_surface,
            solar_surface,
            granulation_tick: 0,
        })
    }

    /// Follow the canvas extent. Waits for the device before touching the
    /// uniform, so only call this outside a recorded frame.
    pub fn sync_view(&mut self, device: &Device, extent: vk::Extent2D) -> anyhow::Result<()> {
        if extent == self.view_extent {
            return Ok(());
        }
        device.wait_idle()?;
        self.view.update_uniform(&ViewUniform::for_extent(extent))?;
        self.view_extent = extent;
        Ok(())
    }

    /// Re-upload the sun's granulation when `tick` moved on. Same
    /// constraint as [`Self::sync_view`].
    pub fn sync_granulation(&mut self, device: &Device, tick: u64) -> anyhow::Result<()> {
        if tick == self.granulation_tick {
            return Ok(());
        }
        device.wait_idle()?;
        self.solar_surface
            .update_texture(&granulation(GRANULATION_SIZE, tick))?;
        self.granulation_tick = tick;
        Ok(())
    }

    /// Bind the pipeline and the disc mesh.
    pub fn begin(&self, device: &Device, cmd: vk::CommandBuffer) {
        unsafe {
            let raw = device.raw();
            raw.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
            raw.cmd_bind_vertex_buffers(cmd, 0, &[self.mesh.handle()], &[0]);
        }
    }

    /// Draw one disc. [`Self::begin`] must have been recorded first.
    pub fn draw_disc(
        &self,
        device: &Device,
        cmd: vk::CommandBuffer,
        surface: Surface,
        push: &DiscPush,
    ) {
        let set = match surface {
            Surface::Rocky => &self.rocky_set,
            Surface::Solar => &self.solar_set,
        };
        unsafe {
            let raw = device.raw();
            raw.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout(),
                0,
                &[set.set()],
                &[],
            );
            raw.cmd_push_constants(
                cmd,
                self.pipeline.layout(),
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(push),
            );
            raw.cmd_draw(cmd, self.vertex_count, 1, 0, 0);
        }
    }

    pub fn rocky_surface(&self) -> &Texture {
        &self.rocky_surface
    }
}
