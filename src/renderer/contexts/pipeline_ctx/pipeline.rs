use std::sync::Arc;
use ash::vk;
use bytemuck::Pod;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::resources::shader::GraphicsShader;
use crate::renderer::resources::vertex::{Vertex, VertexInputDescription};

pub struct Pipeline {
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    device: Arc<ash::Device>,
}

impl Pipeline {
    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline,
            );
        }
    }

    pub fn push_constants<T: Pod>(
        &self,
        command_buffer: vk::CommandBuffer,
        stage_flags: vk::ShaderStageFlags,
        data: &T,
    ) {
        unsafe {
            self.device.cmd_push_constants(
                command_buffer,
                self.pipeline_layout,
                stage_flags,
                0,
                bytemuck::bytes_of(data),
            );
        }
    }

    pub fn bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // The layout belongs to whoever passed it to the builder
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

/// Fixed function state the builder fills into the pipeline create info
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub vertex_input: VertexInputDescription,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    pub depth_test: bool,
    pub depth_compare: vk::CompareOp,
    pub subpass: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vertex_input: Vertex::input_description(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            color_blend_attachment: opaque_blend_state(),
            depth_test: true,
            depth_compare: vk::CompareOp::LESS,
            subpass: 0,
        }
    }
}

fn opaque_blend_state() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .src_color_blend_factor(vk::BlendFactor::ONE)
        .dst_color_blend_factor(vk::BlendFactor::ZERO)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
}

pub struct GraphicsPipelineBuilder {
    device: Arc<ash::Device>,
    config: PipelineConfig,
    shader: Option<GraphicsShader>,
    pipeline_layout: Option<vk::PipelineLayout>,
    render_pass: Option<vk::RenderPass>,
}

impl GraphicsPipelineBuilder {
    pub fn new(device: Arc<ash::Device>) -> Self {
        Self {
            device,
            config: PipelineConfig::default(),
            shader: None,
            pipeline_layout: None,
            render_pass: None,
        }
    }

    pub fn with_shader(mut self, shader: GraphicsShader) -> Self {
        let _ = self.shader.replace(shader);
        self
    }

    pub fn with_pipeline_layout(mut self, layout: vk::PipelineLayout) -> Self {
        let _ = self.pipeline_layout.replace(layout);
        self
    }

    pub fn with_render_pass(mut self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        let _ = self.render_pass.replace(render_pass);
        self.config.subpass = subpass;
        self
    }

    pub fn with_vertex_input(mut self, description: VertexInputDescription) -> Self {
        self.config.vertex_input = description;
        self
    }

    pub fn with_input_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.config.topology = topology;
        self
    }

    pub fn with_polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.config.polygon_mode = mode;
        self
    }

    pub fn with_cull_mode(
        mut self,
        cull_mode: vk::CullModeFlags,
        front_face: vk::FrontFace,
    ) -> Self {
        self.config.cull_mode = cull_mode;
        self.config.front_face = front_face;
        self
    }

    pub fn with_blending_disabled(mut self) -> Self {
        self.config.color_blend_attachment = opaque_blend_state();
        self
    }

    /// `None` for `compare` keeps `LESS`.
    pub fn with_depth_test(mut self, enable: bool, compare: Option<vk::CompareOp>) -> Self {
        self.config.depth_test = enable;
        self.config.depth_compare = if enable {
            compare.unwrap_or(vk::CompareOp::LESS)
        } else {
            vk::CompareOp::ALWAYS
        };
        self
    }

    pub fn build(mut self) -> Result<Pipeline> {
        let shader = self
            .shader
            .take()
            .ok_or_eyre("No shader provided for GraphicsPipelineBuilder")?;
        let pipeline_layout = self
            .pipeline_layout
            .ok_or_eyre("No pipeline layout provided for GraphicsPipelineBuilder")?;
        let render_pass = self
            .render_pass
            .ok_or_eyre("No render pass provided for GraphicsPipelineBuilder")?;
        let config = &self.config;

        let entry_point = c"main";
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(shader.vert_mod)
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(shader.frag_mod)
                .name(entry_point),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.vertex_input.bindings)
            .vertex_attribute_descriptions(&config.vertex_input.attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);
        // Viewport and scissor are dynamic, only their counts are fixed here
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .line_width(1.0)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false);
        let color_blend_attachments = [config.color_blend_attachment];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_test)
            .depth_compare_op(config.depth_compare)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_info = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .depth_stencil_state(&depth_stencil)
            .dynamic_state(&dynamic_info)
            .layout(pipeline_layout)
            .render_pass(render_pass)
            .subpass(config.subpass);

        let pipeline = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| eyre!("Failed to create graphics pipeline: {}", e))?
        }
            .into_iter()
            .next()
            .ok_or_eyre("No graphics pipeline created")?;

        // Shader modules are only needed while the pipeline is being created
        drop(shader);

        Ok(Pipeline {
            pipeline,
            pipeline_layout,
            device: self.device,
        })
    }
}
