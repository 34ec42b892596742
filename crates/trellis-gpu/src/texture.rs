//! Sampled 2D textures.
//!
//! [`Texture`] uploads a whole mip chain once. [`StreamingTexture`] keeps a
//! staging buffer around and re-uploads a single level on demand, e.g. for
//! video frames.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use tracing::{debug, warn};

use crate::buffer::DynamicBuffer;
use crate::command::execute;
use crate::device::Device;
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;

const MAX_ANISOTROPY: f32 = 16.0;

/// One level of a tightly packed mip chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipLevel {
    /// Byte offset of the level in the source data.
    pub offset: u64,
    pub width: u32,
    pub height: u32,
    /// Size of the level in bytes.
    pub size: u64,
}

/// Lay out `mip_levels` levels back to back, halving the size each level.
pub fn mip_chain(width: u32, height: u32, bytes_per_pixel: u32, mip_levels: u32) -> Vec<MipLevel> {
    let mut levels = Vec::with_capacity(mip_levels as usize);
    let (mut w, mut h) = (width.max(1), height.max(1));
    let mut offset = 0;

    for _ in 0..mip_levels.max(1) {
        let size = u64::from(w) * u64::from(h) * u64::from(bytes_per_pixel);
        levels.push(MipLevel {
            offset,
            width: w,
            height: h,
            size,
        });
        offset += size;
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }

    levels
}

/// Total bytes of a mip chain.
pub fn mip_chain_size(levels: &[MipLevel]) -> u64 {
    levels.last().map_or(0, |level| level.offset + level.size)
}

/// Number of levels down to 1x1.
pub fn full_mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Buffer-to-image copies for every level of `levels`.
fn copy_regions(levels: &[MipLevel]) -> Vec<vk::BufferImageCopy> {
    levels
        .iter()
        .zip(0u32..)
        .map(|(level, mip)| vk::BufferImageCopy {
            buffer_offset: level.offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: mip,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width: level.width,
                height: level.height,
                depth: 1,
            },
        })
        .collect()
}

fn color_range(mip_levels: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: mip_levels,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Record transition to TRANSFER_DST, the copies, and transition to
/// SHADER_READ_ONLY.
///
/// `reupload` covers an image that fragment shaders may still be reading.
unsafe fn record_upload(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    staging: vk::Buffer,
    levels: &[MipLevel],
    reupload: bool,
) {
    unsafe {
        let range = color_range(levels.len() as u32);
        let (old_layout, src_stage, src_access) = if reupload {
            (
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::AccessFlags::SHADER_READ,
            )
        } else {
            (
                vk::ImageLayout::UNDEFINED,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::AccessFlags::empty(),
            )
        };

        let to_transfer = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range)
            .src_access_mask(src_access)
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer],
        );

        device.cmd_copy_buffer_to_image(
            cmd,
            staging,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &copy_regions(levels),
        );

        let to_shader = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ);
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_shader],
        );
    }
}

/// Device-local sampled image with its view and sampler.
pub struct Texture {
    device: Arc<Device>,
    image: GpuImage,
    view: vk::ImageView,
    sampler: vk::Sampler,
    mip_levels: u32,
}

impl Texture {
    /// Upload raw pixel data holding `mip_levels` tightly packed levels.
    pub fn from_bytes(
        device: &Arc<Device>,
        bytes: &[u8],
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
        format: vk::Format,
        mip_levels: u32,
    ) -> Result<Self> {
        let levels = mip_chain(width, height, bytes_per_pixel, mip_levels);
        check_source(&levels, bytes.len() as u64)?;

        let mut staging = DynamicBuffer::new(device, bytes.len() as u64)?;
        staging.update(0, bytes)?;
        Self::from_staging(device, &staging, width, height, bytes_per_pixel, format, mip_levels)
    }

    /// Upload from a buffer the caller already filled.
    pub fn from_staging(
        device: &Arc<Device>,
        staging: &DynamicBuffer,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
        format: vk::Format,
        mip_levels: u32,
    ) -> Result<Self> {
        let levels = mip_chain(width, height, bytes_per_pixel, mip_levels);
        check_source(&levels, staging.size())?;

        let texture = Self::create(
            device,
            width,
            height,
            format,
            levels.len() as u32,
            vk::Filter::LINEAR,
        )?;
        texture.upload(staging, &levels, false)?;

        debug!(
            "Texture uploaded: {}x{} {:?}, {} levels",
            width,
            height,
            format,
            levels.len()
        );
        Ok(texture)
    }

    /// Image, view and sampler. The image contents are undefined.
    fn create(
        device: &Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
        mip_levels: u32,
        filter: vk::Filter,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = device.create_image(&image_info, MemoryLocation::GpuOnly, "texture")?;

        // From here on Drop releases whatever exists.
        let mut texture = Self {
            device: Arc::clone(device),
            image,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            mip_levels,
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(texture.image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(color_range(mip_levels));
        texture.view = unsafe { device.raw().create_image_view(&view_info, None)? };

        let anisotropy = filter == vk::Filter::LINEAR && device.supports_anisotropy();
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy {
                MAX_ANISOTROPY.min(device.limits().max_sampler_anisotropy)
            } else {
                1.0
            })
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(mip_levels as f32);
        texture.sampler = unsafe { device.raw().create_sampler(&sampler_info, None)? };

        Ok(texture)
    }

    fn upload(&self, staging: &DynamicBuffer, levels: &[MipLevel], reupload: bool) -> Result<()> {
        let device = self.device.raw();
        execute(&*self.device, |cmd| unsafe {
            record_upload(
                device,
                cmd,
                self.image.image,
                staging.handle(),
                levels,
                reupload,
            );
        })
    }

    pub fn image(&self) -> vk::Image {
        self.image.image
    }

    pub fn image_view(&self) -> vk::ImageView {
        self.view
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.image.extent
    }

    pub fn format(&self) -> vk::Format {
        self.image.format
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Descriptor info for a combined image sampler.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                self.device.raw().destroy_sampler(self.sampler, None);
            }
            if self.view != vk::ImageView::null() {
                self.device.raw().destroy_image_view(self.view, None);
            }
        }
        if let Err(e) = self.device.free_image(&mut self.image) {
            warn!("Failed to free texture image: {}", e);
        }
    }
}

fn check_source(levels: &[MipLevel], available: u64) -> Result<()> {
    let needed = mip_chain_size(levels);
    if needed > available {
        return Err(GpuError::CopyOutOfBounds {
            size: needed,
            src_offset: 0,
            src_len: available,
            dst_offset: 0,
            dst_len: needed,
        });
    }
    Ok(())
}

/// Single-level texture that is re-uploaded in place.
///
/// The view and sampler survive updates; only the pixels change.
pub struct StreamingTexture {
    texture: Texture,
    staging: DynamicBuffer,
    level: MipLevel,
}

impl StreamingTexture {
    /// Create the texture. Without `initial` data it starts out black.
    pub fn new(
        device: &Arc<Device>,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
        format: vk::Format,
        initial: Option<&[u8]>,
    ) -> Result<Self> {
        let levels = mip_chain(width, height, bytes_per_pixel, 1);
        let level = levels[0];

        let mut staging = DynamicBuffer::new(device, level.size)?;
        match initial {
            Some(bytes) => {
                check_source(&levels, bytes.len() as u64)?;
                staging.update(0, &bytes[..level.size as usize])?;
            }
            None => staging.map()?.fill(0),
        }

        let texture = Texture::create(device, width, height, format, 1, vk::Filter::NEAREST)?;
        texture.upload(&staging, &levels, false)?;

        Ok(Self {
            texture,
            staging,
            level,
        })
    }

    /// Replace the pixels. `bytes` must hold at least one full frame.
    ///
    /// Blocks until the copy has finished.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn update_texture(&mut self, bytes: &[u8]) -> Result<()> {
        let levels = [self.level];
        check_source(&levels, bytes.len() as u64)?;
        self.staging.update(0, &bytes[..self.level.size as usize])?;
        self.texture.upload(&self.staging, &levels, true)
    }

    /// Bytes one frame has to supply.
    pub fn frame_size(&self) -> u64 {
        self.level.size
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn image_view(&self) -> vk::ImageView {
        self.texture.view
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.texture.sampler
    }

    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        self.texture.descriptor_info()
    }
}
