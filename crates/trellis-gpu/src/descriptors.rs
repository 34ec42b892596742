//! Descriptor set management.
//!
//! A [`DescriptorSet`] owns its layout and the pool it was allocated from,
//! built from a plain list of [`DescriptorBinding`]s.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::{GpuError, Result};

/// One binding of a descriptor set layout. Each binding holds a single
/// descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
}

impl DescriptorBinding {
    pub const fn new(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            binding,
            descriptor_type,
            stage_flags,
        }
    }

    pub const fn uniform_buffer(binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        Self::new(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    pub const fn storage_buffer(binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        Self::new(binding, vk::DescriptorType::STORAGE_BUFFER, stage_flags)
    }

    pub const fn combined_image_sampler(binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        Self::new(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stage_flags,
        )
    }

    fn layout_binding(&self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(1)
            .stage_flags(self.stage_flags)
    }
}

/// Descriptor counts per type, in the order the types first appear.
pub fn pool_sizes(bindings: &[DescriptorBinding]) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        match sizes
            .iter_mut()
            .find(|size| size.ty == binding.descriptor_type)
        {
            Some(size) => size.descriptor_count += 1,
            None => sizes.push(vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: 1,
            }),
        }
    }
    sizes
}

/// A descriptor set with its own layout and pool.
pub struct DescriptorSet {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}

impl DescriptorSet {
    /// Create the layout and a pool with room for `frames_in_flight` sets,
    /// then allocate one set.
    pub fn new(
        device: &Arc<Device>,
        frames_in_flight: u32,
        bindings: &[DescriptorBinding],
    ) -> Result<Self> {
        if bindings.is_empty() {
            return Err(GpuError::InvalidState(
                "Descriptor set without bindings".to_string(),
            ));
        }

        let layout_bindings: Vec<_> = bindings
            .iter()
            .map(DescriptorBinding::layout_binding)
            .collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&layout_bindings);
        let layout = unsafe { device.raw().create_descriptor_set_layout(&layout_info, None)? };

        let mut descriptors = Self {
            device: Arc::clone(device),
            layout,
            pool: vk::DescriptorPool::null(),
            set: vk::DescriptorSet::null(),
        };

        let sizes = pool_sizes(bindings);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(frames_in_flight.max(1))
            .pool_sizes(&sizes);
        descriptors.pool = unsafe { device.raw().create_descriptor_pool(&pool_info, None)? };

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(descriptors.pool)
            .set_layouts(&layouts);
        descriptors.set = unsafe { device.raw().allocate_descriptor_sets(&alloc_info)? }
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::InvalidState("No descriptor set allocated".to_string()))?;

        Ok(descriptors)
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Point `binding` at a uniform buffer range.
    pub fn write_uniform_buffer(&self, binding: u32, buffer: vk::Buffer, offset: u64, range: u64) {
        self.write_buffer(
            binding,
            vk::DescriptorType::UNIFORM_BUFFER,
            buffer,
            offset,
            range,
        );
    }

    /// Point `binding` at a storage buffer range.
    pub fn write_storage_buffer(&self, binding: u32, buffer: vk::Buffer, offset: u64, range: u64) {
        self.write_buffer(
            binding,
            vk::DescriptorType::STORAGE_BUFFER,
            buffer,
            offset,
            range,
        );
    }

    /// Point `binding` at a sampled image.
    pub fn write_combined_image_sampler(&self, binding: u32, image_info: vk::DescriptorImageInfo) {
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(std::slice::from_ref(&image_info));

        unsafe { self.device.raw().update_descriptor_sets(&[write], &[]) };
    }

    fn write_buffer(
        &self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    ) {
        let buffer_info = vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(offset)
            .range(range);

        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(binding)
            .descriptor_type(descriptor_type)
            .buffer_info(std::slice::from_ref(&buffer_info));

        unsafe { self.device.raw().update_descriptor_sets(&[write], &[]) };
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees the set.
            if self.pool != vk::DescriptorPool::null() {
                self.device.raw().destroy_descriptor_pool(self.pool, None);
            }
            self.device
                .raw()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}
