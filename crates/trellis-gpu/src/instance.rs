//! Vulkan instance creation and physical device selection.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

/// Validation layer enabled in debug setups.
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[cfg(target_os = "macos")]
const PLATFORM_EXTENSIONS: &[&CStr] = &[ash::khr::portability_enumeration::NAME];
#[cfg(not(target_os = "macos"))]
const PLATFORM_EXTENSIONS: &[&CStr] = &[];

/// Lowest API version we run on. Negative viewport heights are core in 1.1.
pub const MIN_API_VERSION: u32 = vk::API_VERSION_1_1;

/// Loaded Vulkan entry and instance.
pub struct Instance {
    entry: ash::Entry,
    instance: ash::Instance,
}

impl Instance {
    /// Create an instance with the surface extensions for `display`.
    ///
    /// Without a display handle no surface extensions are enabled and the
    /// instance can only be used headless.
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        display: Option<RawDisplayHandle>,
    ) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let app_name = CString::new(app_name)
            .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"Trellis")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(MIN_API_VERSION);

        let surface_extensions = match display {
            Some(display) => ash_window::enumerate_required_extensions(display)
                .map_err(|e| GpuError::ExtensionNotSupported(e.to_string()))?,
            None => &[][..],
        };
        let extension_names: Vec<*const c_char> = surface_extensions
            .iter()
            .copied()
            .chain(PLATFORM_EXTENSIONS.iter().map(|ext| ext.as_ptr()))
            .collect();

        let mut layer_names: Vec<*const c_char> = Vec::new();
        if enable_validation {
            if unsafe { layer_available(&entry, VALIDATION_LAYER)? } {
                layer_names.push(VALIDATION_LAYER.as_ptr());
            } else {
                tracing::warn!(
                    "Validation layer {} not available",
                    VALIDATION_LAYER.to_string_lossy()
                );
            }
        }

        // Required for MoltenVK on macOS
        #[cfg(target_os = "macos")]
        let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        #[cfg(not(target_os = "macos"))]
        let create_flags = vk::InstanceCreateFlags::empty();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names)
            .flags(create_flags);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        Ok(Self { entry, instance })
    }

    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn raw(&self) -> &ash::Instance {
        &self.instance
    }

    /// Select the best physical device.
    ///
    /// Devices below [`MIN_API_VERSION`] or without `VK_KHR_swapchain` are
    /// skipped.
    pub fn select_physical_device(&self) -> Result<vk::PhysicalDevice> {
        let devices = unsafe { self.instance.enumerate_physical_devices()? };

        let mut best = None;
        let mut best_score = -1i64;
        for device in devices {
            let score = unsafe { score_physical_device(&self.instance, device) };
            if score > best_score {
                best_score = score;
                best = Some(device);
            }
        }

        let device = best.ok_or(GpuError::NoSuitableDevice)?;
        let properties = unsafe { self.instance.get_physical_device_properties(device) };
        let name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!("Selected GPU: {} ({:?})", name, properties.device_type);

        Ok(device)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe { self.instance.destroy_instance(None) };
    }
}

unsafe fn layer_available(entry: &ash::Entry, layer: &CStr) -> Result<bool> {
    let available = entry.enumerate_instance_layer_properties()?;
    Ok(available
        .iter()
        .any(|props| props.layer_name_as_c_str().is_ok_and(|name| name == layer)))
}

/// Score a physical device for selection. Negative means unusable.
unsafe fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> i64 {
    let properties = instance.get_physical_device_properties(device);

    if properties.api_version < MIN_API_VERSION {
        return -1;
    }

    let has_swapchain = instance
        .enumerate_device_extension_properties(device)
        .map(|exts| {
            exts.iter().any(|ext| {
                ext.extension_name_as_c_str()
                    .is_ok_and(|name| name == ash::khr::swapchain::NAME)
            })
        })
        .unwrap_or(false);
    if !has_swapchain {
        return -1;
    }

    let mut score = device_type_score(properties.device_type);

    // Prefer more VRAM
    let memory = instance.get_physical_device_memory_properties(device);
    let vram_mb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|h| h.size / (1024 * 1024))
        .sum();
    score += (vram_mb / 1024) as i64; // +1 per GB

    score
}

fn device_type_score(device_type: vk::PhysicalDeviceType) -> i64 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    }
}
