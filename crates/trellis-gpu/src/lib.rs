//! Vulkan convenience layer for the Trellis framework.
//!
//! This crate provides:
//! - Vulkan instance, device and surface management
//! - A presentable [`Canvas`] that owns the swapchain, render pass and
//!   framebuffers and drives the acquire / record / submit / present cycle
//! - Memory allocation via gpu-allocator
//! - Buffers, textures, shader modules, pipelines and descriptor sets
//! - Fences and single-shot command buffers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
//! use trellis_gpu::{Canvas, CanvasConfig, Device, GpuError, Instance, Surface};
//!
//! fn run<W: HasDisplayHandle + HasWindowHandle>(window: &W) -> trellis_gpu::Result<()> {
//!     let display = window
//!         .display_handle()
//!         .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?
//!         .as_raw();
//!     let instance = Arc::new(Instance::new("demo", false, Some(display))?);
//!     let physical_device = instance.select_physical_device()?;
//!     let device = Arc::new(Device::new(Arc::clone(&instance), physical_device)?);
//!     let surface = unsafe { Surface::from_window(&instance, window)? };
//!
//!     let config = CanvasConfig::default().with_depth_stencil(true);
//!     let mut canvas = Canvas::new(Arc::clone(&device), config);
//!     canvas.create_canvas(surface.handle(), 800, 600)?;
//!
//!     loop {
//!         if let Some(cmd) = canvas.start_rendering()? {
//!             // record draw commands into `cmd`
//!             let _ = cmd;
//!         }
//!         canvas.done_rendering()?;
//!     }
//! }
//! ```

pub mod backend;
pub mod buffer;
pub mod canvas;
pub mod command;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

#[cfg(test)]
mod mock;

pub use backend::{DeviceBackend, SampleCountLimits};
pub use buffer::{CopyRegion, DynamicBuffer, MappedBuffer, StaticBuffer, UniformBuffer};
pub use canvas::{
    negotiate_msaa, sample_count_from_u32, AttachmentPlan, Canvas, CanvasConfig, CanvasState,
    DEPTH_STENCIL_FORMAT,
};
pub use command::{execute, SingleShotCommand};
pub use descriptors::{pool_sizes, DescriptorBinding, DescriptorSet};
pub use device::Device;
pub use error::{GpuError, Result};
pub use instance::Instance;
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{ComputePipeline, GraphicsPipeline, GraphicsPipelineOptions, PipelineTarget};
pub use shader::{validate_spirv, ShaderModule};
pub use surface::Surface;
pub use sync::{create_semaphore, Fence};
pub use texture::{mip_chain, MipLevel, StreamingTexture, Texture};
