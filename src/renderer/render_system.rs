use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::pipeline_ctx::pipeline::{GraphicsPipelineBuilder, Pipeline};
use crate::renderer::frame_info::FrameInfo;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::resources::shader::GraphicsShader;
use crate::renderer::resources::vertex::Vertex;
use crate::renderer::shader_data::PushConstants;
use crate::renderer::Renderer;
use crate::scene::entity::Entity;
use crate::scene::transform::Transform;

const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

pub fn push_constants_for(transform: &Transform) -> PushConstants {
    PushConstants {
        mesh_matrix: transform.mesh_matrix(),
        normal_matrix: transform.normal_matrix(),
    }
}

/// Draws every entity that has a mesh with one lit, vertex colored pipeline
pub struct RenderSystem {
    shader_name: String,
    pipeline: Option<Pipeline>,
    pipeline_layout: vk::PipelineLayout,
    render_pass_generation: u64,
    device: Arc<ash::Device>,
}

impl RenderSystem {
    pub fn new(renderer: &Renderer, shader_name: &str) -> Result<Self> {
        let device = renderer.device().logical.clone();

        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(PUSH_CONSTANT_STAGES)
            .offset(0)
            .size(size_of::<PushConstants>() as u32)];
        let set_layouts = [renderer.global_set_layout()];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let pipeline_layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

        let mut system = Self {
            shader_name: shader_name.to_owned(),
            pipeline: None,
            pipeline_layout,
            render_pass_generation: renderer.render_pass_generation(),
            device,
        };
        system.rebuild_pipeline(renderer)?;
        Ok(system)
    }

    /// Rebuilds the pipeline if the renderer's render pass was replaced since the last build.
    pub fn sync_render_pass(&mut self, renderer: &Renderer) -> Result<()> {
        if self.pipeline.is_some() && self.render_pass_generation == renderer.render_pass_generation() {
            return Ok(());
        }
        self.rebuild_pipeline(renderer)
    }

    fn rebuild_pipeline(&mut self, renderer: &Renderer) -> Result<()> {
        // Release the old pipeline before building its replacement
        self.pipeline = None;

        let shader = GraphicsShader::new(&self.shader_name, self.device.clone())?;
        let pipeline = GraphicsPipelineBuilder::new(self.device.clone())
            .with_shader(shader)
            .with_pipeline_layout(self.pipeline_layout)
            .with_render_pass(renderer.render_pass()?, 0)
            .with_vertex_input(Vertex::input_description())
            .with_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .with_polygon_mode(vk::PolygonMode::FILL)
            .with_cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
            .with_blending_disabled()
            .with_depth_test(true, Some(vk::CompareOp::LESS))
            .build()?;

        self.pipeline = Some(pipeline);
        self.render_pass_generation = renderer.render_pass_generation();
        log::debug!("Built pipeline for render pass generation {}", self.render_pass_generation);
        Ok(())
    }

    pub fn render<'a>(
        &self,
        frame_info: &FrameInfo,
        entities: impl IntoIterator<Item = &'a Entity<Mesh>>,
    ) {
        let Some(pipeline) = &self.pipeline else {
            log::warn!("Render system has no pipeline, skipping draw");
            return;
        };
        let command_buffer = frame_info.command_buffer;

        pipeline.bind(command_buffer);
        if let Some(descriptor_set) = frame_info.global_descriptor_set {
            pipeline.bind_descriptor_sets(command_buffer, 0, &[descriptor_set]);
        }

        for entity in entities {
            let Some(mesh) = &entity.mesh else {
                continue;
            };
            let push = push_constants_for(&entity.transform);
            pipeline.push_constants(command_buffer, PUSH_CONSTANT_STAGES, &push);
            mesh.bind(command_buffer);
            mesh.draw(command_buffer);
        }
    }
}

impl Drop for RenderSystem {
    fn drop(&mut self) {
        self.pipeline = None;
        unsafe {
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use glam::{Mat4, Vec3, Vec4};

    #[test]
    fn push_constants_carry_both_matrices() {
        let transform = Transform::from_translation(Vec3::new(0.0, 0.0, 2.5))
            .with_scale(Vec3::splat(0.5));
        let push = push_constants_for(&transform);

        assert_eq!(push.mesh_matrix.w_axis, Vec4::new(0.0, 0.0, 2.5, 1.0));
        assert_abs_diff_eq!(push.mesh_matrix.x_axis, Vec4::new(0.5, 0.0, 0.0, 0.0), epsilon = 1e-6);
        assert_abs_diff_eq!(
            push.normal_matrix,
            Mat4::from_scale(Vec3::splat(2.0)),
            epsilon = 1e-6
        );
    }

    #[test]
    fn push_constant_stages_cover_both_shaders() {
        assert!(PUSH_CONSTANT_STAGES.contains(vk::ShaderStageFlags::VERTEX));
        assert!(PUSH_CONSTANT_STAGES.contains(vk::ShaderStageFlags::FRAGMENT));
    }
}
