use ash::vk;
use crate::renderer::camera::Camera;

/// Everything a render system needs to record its part of one frame
pub struct FrameInfo<'a> {
    pub frame_index: usize,
    pub image_index: u32,
    pub frame_time: f32,
    pub command_buffer: vk::CommandBuffer,
    pub camera: &'a Camera,
    pub global_descriptor_set: Option<vk::DescriptorSet>,
}
