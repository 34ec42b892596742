//! Render pass attachment layout.
//!
//! The render pass, every framebuffer and every pipeline built against the
//! canvas have to agree on attachment indices. All of them derive the order
//! from one [`AttachmentPlan`]:
//!
//! | msaa | depth | attachments                      |
//! |------|-------|----------------------------------|
//! | no   | no    | `[color]`                        |
//! | no   | yes   | `[color, depth]`                 |
//! | yes  | no    | `[msaa color, resolve]`          |
//! | yes  | yes   | `[msaa color, depth, resolve]`   |

use ash::vk;

/// What an attachment slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentRole {
    /// The color target. Multisampled when MSAA is on, otherwise the
    /// swapchain image itself.
    Color,
    DepthStencil,
    /// Single-sample swapchain image the MSAA color is resolved into.
    Resolve,
}

/// Attachment order for a given sample count and depth-stencil choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentPlan {
    samples: vk::SampleCountFlags,
    depth_stencil: bool,
}

impl AttachmentPlan {
    pub const fn new(samples: vk::SampleCountFlags, depth_stencil: bool) -> Self {
        Self {
            samples,
            depth_stencil,
        }
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    pub fn is_multisampled(&self) -> bool {
        self.samples != vk::SampleCountFlags::TYPE_1
    }

    pub fn has_depth_stencil(&self) -> bool {
        self.depth_stencil
    }

    /// Attachment roles in index order.
    pub fn roles(&self) -> Vec<AttachmentRole> {
        let mut roles = vec![AttachmentRole::Color];
        if self.depth_stencil {
            roles.push(AttachmentRole::DepthStencil);
        }
        if self.is_multisampled() {
            roles.push(AttachmentRole::Resolve);
        }
        roles
    }

    /// Number of attachments.
    pub fn attachment_count(&self) -> usize {
        1 + usize::from(self.depth_stencil) + usize::from(self.is_multisampled())
    }

    /// Index of the depth-stencil attachment.
    pub fn depth_index(&self) -> Option<u32> {
        self.depth_stencil.then_some(1)
    }

    /// Index of the resolve attachment. It is always last.
    pub fn resolve_index(&self) -> Option<u32> {
        self.is_multisampled().then(|| self.attachment_count() as u32 - 1)
    }

    /// Clear values needed when beginning the render pass. The resolve
    /// attachment is never cleared.
    pub fn clear_value_count(&self) -> u32 {
        if self.depth_stencil {
            2
        } else {
            1
        }
    }

    /// Attachment descriptions in index order.
    pub fn descriptions(
        &self,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Vec<vk::AttachmentDescription> {
        let color_final = if self.is_multisampled() {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::PRESENT_SRC_KHR
        };

        self.roles()
            .into_iter()
            .map(|role| match role {
                AttachmentRole::Color => vk::AttachmentDescription::default()
                    .format(color_format)
                    .samples(self.samples)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(color_final),
                AttachmentRole::DepthStencil => vk::AttachmentDescription::default()
                    .format(depth_format)
                    .samples(self.samples)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
                    .stencil_store_op(vk::AttachmentStoreOp::STORE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
                AttachmentRole::Resolve => vk::AttachmentDescription::default()
                    .format(color_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            })
            .collect()
    }

    /// Framebuffer views in index order for one swapchain image.
    ///
    /// `depth` and `msaa` are ignored when the plan has no slot for them.
    pub fn framebuffer_views(
        &self,
        swapchain_view: vk::ImageView,
        depth_view: vk::ImageView,
        msaa_view: vk::ImageView,
    ) -> Vec<vk::ImageView> {
        self.roles()
            .into_iter()
            .map(|role| match role {
                AttachmentRole::Color if self.is_multisampled() => msaa_view,
                AttachmentRole::Color | AttachmentRole::Resolve => swapchain_view,
                AttachmentRole::DepthStencil => depth_view,
            })
            .collect()
    }

    /// The external-to-subpass dependency guarding attachment writes.
    pub fn subpass_dependency(&self) -> vk::SubpassDependency {
        let (stages, access) = if self.depth_stencil {
            (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
        } else {
            (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )
        };

        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(access)
    }
}
