//! Swapchain selection helpers.
//!
//! Pure functions over surface query results. The canvas owns the actual
//! swapchain lifecycle.

use ash::vk;

/// Select a present mode.
///
/// Returns `requested` if the surface lists it, otherwise FIFO, which every
/// surface has to support.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    requested: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&requested) {
        requested
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Find the exact format / color space pair among the surface formats.
///
/// There is no fallback: a different format changes how colors come out.
pub fn find_surface_format(
    available: &[vk::SurfaceFormatKHR],
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .copied()
        .find(|f| f.format == format && f.color_space == color_space)
}

/// Calculate swapchain extent.
///
/// The surface's current extent wins unless it is the `u32::MAX` wildcard,
/// in which case the desired size is clamped into the supported range.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width
                .max(capabilities.min_image_extent.width)
                .min(capabilities.max_image_extent.width),
            height: desired_height
                .max(capabilities.min_image_extent.height)
                .min(capabilities.max_image_extent.height),
        }
    }
}

/// Number of images to ask for: the requested frame count clamped into the
/// surface limits. A `max_image_count` of zero means unbounded.
pub fn clamp_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Build the swapchain create info used by the canvas.
///
/// `old_swapchain` may be null. When it is not, it is retired by the
/// create call whether or not that succeeds.
pub fn swapchain_create_info<'a>(
    surface: vk::SurfaceKHR,
    capabilities: &vk::SurfaceCapabilitiesKHR,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    frames_in_flight: u32,
    old_swapchain: vk::SwapchainKHR,
) -> vk::SwapchainCreateInfoKHR<'a> {
    vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(clamp_image_count(capabilities, frames_in_flight))
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain)
}
