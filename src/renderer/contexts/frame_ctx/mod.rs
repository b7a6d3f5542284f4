pub mod frame;
pub mod images_in_flight;
pub mod tracker;

use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use gpu_descriptor::DescriptorSet;
use crate::renderer::config::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::tracker::FrameTracker;
use crate::renderer::contexts::resource_ctx::descriptor_set_layout_builder::{
    DescriptorSetLayout, DescriptorSetLayoutBuilder,
};
use crate::renderer::internals::buffer::{aligned_size, Buffer};
use crate::renderer::shader_data::GlobalUbo;

/// Uniform data and its descriptor set for one frame-in-flight slot
struct FrameResources {
    ubo_buffer: Buffer,
    descriptor_set: DescriptorSet<vk::DescriptorSet>,
}

/// Responsibilities:
/// - Manage per-frame command buffers
/// - Manage per-frame resources
/// - Track where the current frame is in its lifecycle
///
/// Everything here is sized by `MAX_FRAMES_IN_FLIGHT`, never by the swapchain image count,
/// so recreating the swapchain leaves it untouched.
pub struct RenderFrameContext {
    pub tracker: FrameTracker,
    command_buffers: Vec<vk::CommandBuffer>,
    global_set_layout: DescriptorSetLayout,
    resources: Vec<FrameResources>,
}

impl RenderFrameContext {
    pub fn new(dev: &RenderDevice) -> Result<Self> {
        let command_buffers = dev.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;

        let global_set_layout = DescriptorSetLayoutBuilder::new()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                1,
            )?
            .build(&dev.logical)?;

        let descriptor_sets = dev.allocate_descriptor_sets(
            global_set_layout.layout,
            &global_set_layout.descriptor_count,
            MAX_FRAMES_IN_FLIGHT as u32,
        )?;

        let ubo_size = aligned_size(
            size_of::<GlobalUbo>() as vk::DeviceSize,
            dev.properties.limits.min_uniform_buffer_offset_alignment,
        );
        let mut resources = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for descriptor_set in descriptor_sets {
            let ubo_buffer = Buffer::new(
                ubo_size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                "Global UBO",
                MemoryLocation::CpuToGpu,
                dev.memory_allocator(),
                dev.logical.clone(),
            )?;

            let buffer_info = [ubo_buffer.descriptor_info()];
            let write = vk::WriteDescriptorSet::default()
                .dst_set(*descriptor_set.raw())
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info);
            unsafe {
                dev.logical.update_descriptor_sets(&[write], &[]);
            }

            resources.push(FrameResources {
                ubo_buffer,
                descriptor_set,
            });
        }

        Ok(Self {
            tracker: FrameTracker::new(),
            command_buffers,
            global_set_layout,
            resources,
        })
    }

    pub fn global_set_layout(&self) -> vk::DescriptorSetLayout {
        self.global_set_layout.layout
    }

    /// Command buffer of the frame being recorded.
    pub fn current_command_buffer(&self) -> Result<vk::CommandBuffer> {
        if !self.tracker.is_frame_in_progress() {
            return Err(eyre!("Cannot get command buffer when frame is not in progress"));
        }
        self.command_buffer(self.tracker.frame_index())
    }

    /// Command buffer the next `begin_frame` will record into.
    pub fn next_command_buffer(&self) -> Result<vk::CommandBuffer> {
        self.command_buffer(self.tracker.frame_index())
    }

    pub fn global_descriptor_set(&self) -> Result<vk::DescriptorSet> {
        let frame = self.resources
            .get(self.tracker.frame_index())
            .ok_or_eyre("No resources for frame slot")?;
        Ok(*frame.descriptor_set.raw())
    }

    /// Writes the uniform data for the current slot. Only call once the slot's fence has been waited on.
    pub fn write_global_ubo(&mut self, ubo: &GlobalUbo) -> Result<()> {
        let frame = self.resources
            .get_mut(self.tracker.frame_index())
            .ok_or_eyre("No resources for frame slot")?;
        frame.ubo_buffer.write(std::slice::from_ref(ubo), 0)?;
        Ok(())
    }

    /// Returns descriptor sets, command buffers and the layout to the device. The device must be idle.
    pub fn destroy(&mut self, dev: &RenderDevice) -> Result<()> {
        let (buffers, sets): (Vec<_>, Vec<_>) = self.resources
            .drain(..)
            .map(|frame| (frame.ubo_buffer, frame.descriptor_set))
            .unzip();
        drop(buffers);
        dev.free_descriptor_sets(sets)?;
        dev.free_command_buffers(&self.command_buffers);
        self.command_buffers.clear();
        self.global_set_layout.destroy(&dev.logical);
        Ok(())
    }

    fn command_buffer(&self, frame_index: usize) -> Result<vk::CommandBuffer> {
        self.command_buffers
            .get(frame_index)
            .copied()
            .ok_or_eyre("No command buffer for frame slot")
    }
}
