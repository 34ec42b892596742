//! Sample count negotiation and viewport math.

use crate::backend::SampleCountLimits;
use ash::vk;

/// Sample count tiers from highest to lowest.
const SAMPLE_TIERS: [vk::SampleCountFlags; 7] = [
    vk::SampleCountFlags::TYPE_64,
    vk::SampleCountFlags::TYPE_32,
    vk::SampleCountFlags::TYPE_16,
    vk::SampleCountFlags::TYPE_8,
    vk::SampleCountFlags::TYPE_4,
    vk::SampleCountFlags::TYPE_2,
    vk::SampleCountFlags::TYPE_1,
];

/// Pick the highest supported sample count that does not exceed `requested`.
///
/// With a depth-stencil attachment the count has to be valid for color,
/// depth and stencil at once. A request of one sample, or anything that is
/// not a single tier, yields one sample.
pub fn negotiate_msaa(
    requested: vk::SampleCountFlags,
    limits: &SampleCountLimits,
    want_depth_stencil: bool,
) -> vk::SampleCountFlags {
    let Some(start) = SAMPLE_TIERS.iter().position(|&tier| tier == requested) else {
        return vk::SampleCountFlags::TYPE_1;
    };

    let usable = limits.usable(want_depth_stencil);
    SAMPLE_TIERS[start..]
        .iter()
        .copied()
        .find(|&tier| usable.contains(tier))
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Viewport covering `extent`.
///
/// Flipped viewports start at the bottom edge with a negative height so
/// that +Y points up.
pub fn viewport_for(extent: vk::Extent2D, flip: bool) -> vk::Viewport {
    let width = extent.width as f32;
    let height = extent.height as f32;
    let (y, height) = if flip { (height, -height) } else { (0.0, height) };

    vk::Viewport {
        x: 0.0,
        y,
        width,
        height,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Map a plain sample count like `4` to its flag. Unknown counts give `None`.
pub fn sample_count_from_u32(samples: u32) -> Option<vk::SampleCountFlags> {
    SAMPLE_TIERS
        .iter()
        .copied()
        .find(|tier| tier.as_raw() == samples)
}
