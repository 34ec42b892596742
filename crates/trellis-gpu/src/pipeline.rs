//! Pipeline creation and management.

use std::sync::Arc;

use ash::vk;

use crate::backend::DeviceBackend;
use crate::canvas::{AttachmentPlan, Canvas};
use crate::device::Device;
use crate::error::{GpuError, Result};
use crate::shader::ShaderModule;

/// What a graphics pipeline has to agree on with the render pass it draws
/// into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTarget {
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    /// Rasterization samples. Matches the color and depth attachments.
    pub samples: vk::SampleCountFlags,
    /// Whether the subpass has a depth-stencil attachment.
    pub depth_stencil: bool,
    pub color_attachment_count: u32,
}

impl PipelineTarget {
    /// Subpass 0 of `render_pass`, laid out by `plan`.
    pub fn from_plan(plan: &AttachmentPlan, render_pass: vk::RenderPass) -> Self {
        Self {
            render_pass,
            subpass: 0,
            samples: plan.samples(),
            depth_stencil: plan.has_depth_stencil(),
            color_attachment_count: 1,
        }
    }

    pub fn for_canvas<D: DeviceBackend>(canvas: &Canvas<D>) -> Self {
        Self::from_plan(&canvas.attachment_plan(), canvas.render_pass())
    }
}

/// Fixed-function state for a [`GraphicsPipeline`].
///
/// Vertex input, push constants and descriptor set layouts are empty by
/// default.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineOptions {
    pub topology: vk::PrimitiveTopology,
    pub front_face: vk::FrontFace,
    pub cull_mode: vk::CullModeFlags,
    pub polygon_mode: vk::PolygonMode,
    pub blend_enable: bool,
    pub src_color_blend_factor: vk::BlendFactor,
    pub dst_color_blend_factor: vk::BlendFactor,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    pub stencil_test: bool,
    pub stencil_front: vk::StencilOpState,
    pub stencil_back: vk::StencilOpState,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl Default for GraphicsPipelineOptions {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            front_face: vk::FrontFace::CLOCKWISE,
            cull_mode: vk::CullModeFlags::BACK,
            polygon_mode: vk::PolygonMode::FILL,
            blend_enable: false,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            depth_test: false,
            depth_write: false,
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            stencil_test: false,
            stencil_front: vk::StencilOpState::default(),
            stencil_back: vk::StencilOpState::default(),
            push_constant_ranges: Vec::new(),
            set_layouts: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
        }
    }
}

impl GraphicsPipelineOptions {
    pub fn with_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_polygon_mode(mut self, polygon_mode: vk::PolygonMode) -> Self {
        self.polygon_mode = polygon_mode;
        self
    }

    /// Enable alpha blending with the given color factors.
    pub fn with_blend(mut self, src: vk::BlendFactor, dst: vk::BlendFactor) -> Self {
        self.blend_enable = true;
        self.src_color_blend_factor = src;
        self.dst_color_blend_factor = dst;
        self
    }

    /// Depth test and write. Only used when the canvas has a depth-stencil
    /// attachment.
    pub fn with_depth(mut self, test: bool, write: bool, compare_op: vk::CompareOp) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_compare_op = compare_op;
        self
    }

    pub fn with_stencil(mut self, front: vk::StencilOpState, back: vk::StencilOpState) -> Self {
        self.stencil_test = true;
        self.stencil_front = front;
        self.stencil_back = back;
        self
    }

    pub fn with_push_constants(mut self, ranges: &[vk::PushConstantRange]) -> Self {
        self.push_constant_ranges = ranges.to_vec();
        self
    }

    pub fn with_set_layouts(mut self, layouts: &[vk::DescriptorSetLayout]) -> Self {
        self.set_layouts = layouts.to_vec();
        self
    }

    /// Add a vertex buffer binding with a single attribute at offset 0.
    ///
    /// Bindings are numbered in the order they are added.
    pub fn add_vertex_attribute_binding(
        mut self,
        stride: u32,
        input_rate: vk::VertexInputRate,
        location: u32,
        format: vk::Format,
    ) -> Self {
        let binding = self.vertex_bindings.len() as u32;
        self.vertex_bindings.push(vk::VertexInputBindingDescription {
            binding,
            stride,
            input_rate,
        });
        self.vertex_attributes.push(vk::VertexInputAttributeDescription {
            location,
            binding,
            format,
            offset: 0,
        });
        self
    }

    pub fn vertex_bindings(&self) -> &[vk::VertexInputBindingDescription] {
        &self.vertex_bindings
    }

    pub fn vertex_attributes(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.vertex_attributes
    }

    fn rasterization_state(&self) -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false)
            .line_width(1.0)
    }

    /// Depth-stencil state, present only when `target` has a depth-stencil
    /// attachment.
    pub fn depth_stencil_state(
        &self,
        target: &PipelineTarget,
    ) -> Option<vk::PipelineDepthStencilStateCreateInfo<'static>> {
        target.depth_stencil.then(|| {
            vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(self.depth_test)
                .depth_write_enable(self.depth_write)
                .depth_compare_op(self.depth_compare_op)
                .depth_bounds_test_enable(false)
                .min_depth_bounds(0.0)
                .max_depth_bounds(1.0)
                .stencil_test_enable(self.stencil_test)
                .front(self.stencil_front)
                .back(self.stencil_back)
        })
    }

    pub fn multisample_state(
        &self,
        target: &PipelineTarget,
    ) -> vk::PipelineMultisampleStateCreateInfo<'static> {
        vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(target.samples)
            .sample_shading_enable(false)
            .min_sample_shading(1.0)
    }

    /// One blend state per color attachment of `target`.
    pub fn color_blend_attachments(
        &self,
        target: &PipelineTarget,
    ) -> Vec<vk::PipelineColorBlendAttachmentState> {
        vec![self.color_blend_attachment(); target.color_attachment_count as usize]
    }

    fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(self.blend_enable)
            .src_color_blend_factor(self.src_color_blend_factor)
            .dst_color_blend_factor(self.dst_color_blend_factor)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    }
}

/// Graphics pipeline targeting a canvas render pass.
pub struct GraphicsPipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create a pipeline for subpass 0 of the canvas render pass.
    ///
    /// Viewport and scissor are dynamic, so the pipeline survives resizes.
    /// Sample count and depth-stencil state follow the canvas
    /// [`PipelineTarget`].
    pub fn new(
        device: &Arc<Device>,
        canvas: &Canvas,
        vertex: &ShaderModule,
        fragment: &ShaderModule,
        options: &GraphicsPipelineOptions,
    ) -> Result<Self> {
        let target = PipelineTarget::for_canvas(canvas);
        let layout = create_layout(device, &options.set_layouts, &options.push_constant_ranges)?;
        let mut pipeline = Self {
            device: Arc::clone(device),
            pipeline: vk::Pipeline::null(),
            layout,
        };

        let stages = [
            vertex.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&options.vertex_bindings)
            .vertex_attribute_descriptions(&options.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(options.topology)
            .primitive_restart_enable(false);

        let rasterization = options.rasterization_state();

        let multisampling = options.multisample_state(&target);
        let depth_stencil = options.depth_stencil_state(&target);

        let blend_attachments = options.color_blend_attachments(&target);
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&blend_attachments);

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(target.render_pass)
            .subpass(target.subpass);
        if let Some(depth_stencil) = depth_stencil.as_ref() {
            pipeline_info = pipeline_info.depth_stencil_state(depth_stencil);
        }

        let pipelines = unsafe {
            device
                .raw()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;
        pipeline.pipeline = pipelines[0];

        Ok(pipeline)
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { destroy_pipeline(self.device.raw(), self.pipeline, self.layout) };
    }
}

/// Compute pipeline wrapper.
pub struct ComputePipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl ComputePipeline {
    pub fn new(
        device: &Arc<Device>,
        shader: &ShaderModule,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let layout = create_layout(device, set_layouts, push_constant_ranges)?;
        let mut pipeline = Self {
            device: Arc::clone(device),
            pipeline: vk::Pipeline::null(),
            layout,
        };

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(shader.stage_info(vk::ShaderStageFlags::COMPUTE))
            .layout(layout);

        let pipelines = unsafe {
            device
                .raw()
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;
        pipeline.pipeline = pipelines[0];

        Ok(pipeline)
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe { destroy_pipeline(self.device.raw(), self.pipeline, self.layout) };
    }
}

fn create_layout(
    device: &Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
) -> Result<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constant_ranges);

    unsafe { device.raw().create_pipeline_layout(&layout_info, None) }
        .map_err(|e| GpuError::PipelineCreation(e.to_string()))
}

unsafe fn destroy_pipeline(
    device: &ash::Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
) {
    unsafe {
        if pipeline != vk::Pipeline::null() {
            device.destroy_pipeline(pipeline, None);
        }
        device.destroy_pipeline_layout(layout, None);
    }
}
