pub mod camera;
pub mod config;
pub mod frame_info;
pub mod render_system;
pub mod resources;
pub mod shader_data;
pub mod window;

pub(crate) mod contexts;
pub(crate) mod internals;

use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::camera::Camera;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::RenderFrameContext;
use crate::renderer::frame_info::FrameInfo;
use crate::renderer::internals::swapchain::{AcquireResult, Swapchain};
use crate::renderer::shader_data::GlobalUbo;
use crate::renderer::window::{wait_for_drawable_extent, PresentationWindow};

/// Drives one frame at a time: acquire, record into the swapchain's render pass, submit and present.
/// Swapchain recreation on resize or when presentation goes stale is handled here and stays invisible
/// to render systems, apart from the render pass changing.
///
/// Fields drop in declaration order, so everything created from the device goes before it.
pub struct Renderer {
    swapchain: Option<Swapchain>,
    frame: RenderFrameContext,
    render_pass_generation: u64,
    config: RenderConfig,
    dev: RenderDeviceContext,
}

impl Renderer {
    pub fn new(
        window: &Arc<Window>,
        presentation: &mut dyn PresentationWindow,
        config: RenderConfig,
    ) -> Result<Self> {
        let dev = RenderDeviceContext::new(window)?;
        let frame = RenderFrameContext::new(&dev.device)?;

        let mut renderer = Self {
            swapchain: None,
            frame,
            render_pass_generation: 0,
            config,
            dev,
        };
        renderer.recreate_swap_chain(presentation)?;
        if renderer.swapchain.is_none() {
            return Err(eyre!("Window closed before the first swapchain could be created"));
        }

        Ok(renderer)
    }

    pub fn device(&self) -> &RenderDevice {
        &self.dev.device
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render pass of the current swapchain. It changes on every recreation, see [`Renderer::render_pass_generation`].
    pub fn render_pass(&self) -> Result<vk::RenderPass> {
        Ok(self.swapchain()?.render_pass)
    }

    /// Bumped whenever the render pass is replaced, so pipelines know to rebuild.
    pub fn render_pass_generation(&self) -> u64 {
        self.render_pass_generation
    }

    pub fn global_set_layout(&self) -> vk::DescriptorSetLayout {
        self.frame.global_set_layout()
    }

    pub fn aspect_ratio(&self) -> Result<f32> {
        Ok(self.swapchain()?.extent_aspect_ratio())
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.frame.tracker.is_frame_in_progress()
    }

    pub fn current_command_buffer(&self) -> Result<vk::CommandBuffer> {
        self.frame.current_command_buffer()
    }

    pub fn frame_index(&self) -> Result<usize> {
        if !self.is_frame_in_progress() {
            return Err(eyre!("Cannot get frame index when frame is not in progress"));
        }
        Ok(self.frame.tracker.frame_index())
    }

    /// Starts a frame. `None` means the swapchain had to be recreated and this tick should be skipped.
    pub fn begin_frame(
        &mut self,
        window: &mut dyn PresentationWindow,
    ) -> Result<Option<vk::CommandBuffer>> {
        self.frame.tracker.ensure_idle("call begin_frame")?;

        let image_index = match self.swapchain()?.acquire_next_image()? {
            AcquireResult::OutOfDate => {
                log::debug!("Swapchain out of date on acquire");
                self.recreate_swap_chain(window)?;
                return Ok(None);
            }
            // A suboptimal image still gets this frame, end_frame recreates after presenting
            AcquireResult::Acquired { image_index, .. } => image_index,
        };

        let command_buffer = self.frame.next_command_buffer()?;
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe {
            self.dev.device.logical
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| eyre!("Failed to begin recording command buffer: {}", e))?;
        }
        self.frame.tracker.begin_frame(image_index)?;
        log::trace!("Began frame {} on image {}", self.frame.tracker.frame_index(), image_index);

        Ok(Some(command_buffer))
    }

    /// Submits and presents the frame, then recreates the swapchain if presentation went stale or the window was resized.
    pub fn end_frame(&mut self, window: &mut dyn PresentationWindow) -> Result<()> {
        let command_buffer = self.frame.current_command_buffer()?;
        let image_index = self.frame.tracker.end_frame()?;

        unsafe {
            self.dev.device.logical
                .end_command_buffer(command_buffer)
                .map_err(|e| eyre!("Failed to record command buffer: {}", e))?;
        }

        let status = self.swapchain_mut()?.submit_and_present(command_buffer, image_index)?;
        if status.needs_recreation() || window.was_resized() {
            log::debug!("Recreating swapchain after present: {:?}, resized: {}", status, window.was_resized());
            window.reset_resized_flag();
            self.recreate_swap_chain(window)?;
        }

        Ok(())
    }

    pub fn begin_swap_chain_render_pass(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        self.check_command_buffer(command_buffer, "begin render pass")?;
        let image_index = self.frame.tracker.image_index()?;
        self.frame.tracker.begin_render_pass()?;

        let swapchain = self.swapchain()?;
        let framebuffer = swapchain
            .framebuffer(image_index)
            .ok_or_eyre("No framebuffer for acquired image")?;
        let extent = swapchain.extent;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.config.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.config.clear_depth,
                    stencil: 0,
                },
            },
        ];
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(swapchain.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        let device = &self.dev.device.logical;
        unsafe {
            device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }

        Ok(())
    }

    pub fn end_swap_chain_render_pass(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        self.check_command_buffer(command_buffer, "end render pass")?;
        self.frame.tracker.end_render_pass()?;
        unsafe {
            self.dev.device.logical.cmd_end_render_pass(command_buffer);
        }
        Ok(())
    }

    /// Uploads this frame's global uniform data. Only valid between `begin_frame` and `end_frame`.
    pub fn update_global_ubo(&mut self, ubo: &GlobalUbo) -> Result<()> {
        if !self.is_frame_in_progress() {
            return Err(eyre!("Cannot update uniforms when frame is not in progress"));
        }
        self.frame.write_global_ubo(ubo)
    }

    pub fn frame_info<'a>(
        &self,
        command_buffer: vk::CommandBuffer,
        frame_time: f32,
        camera: &'a Camera,
    ) -> Result<FrameInfo<'a>> {
        self.check_command_buffer(command_buffer, "build frame info")?;
        Ok(FrameInfo {
            frame_index: self.frame.tracker.frame_index(),
            image_index: self.frame.tracker.image_index()?,
            frame_time,
            command_buffer,
            camera,
            global_descriptor_set: Some(self.frame.global_descriptor_set()?),
        })
    }

    /// Replaces the swapchain with one matching the window's current size.
    /// Blocks while the window is minimized and waits for the GPU to go idle first.
    /// Errors if called while a frame is being recorded, since its command buffer still references the old render pass.
    pub fn recreate_swap_chain(&mut self, window: &mut dyn PresentationWindow) -> Result<()> {
        self.frame.tracker.ensure_idle("recreate the swapchain")?;

        let Some(extent) = wait_for_drawable_extent(window) else {
            log::debug!("Window closing, skipping swapchain recreation");
            return Ok(());
        };

        self.dev.device.wait_idle()?;

        let previous = self.swapchain.take();
        let previous_formats = previous.as_ref().map(|swapchain| swapchain.formats);
        let swapchain = Swapchain::new(&self.dev, extent, &self.config, previous)?;

        if let Some(formats) = previous_formats {
            if !swapchain.compare_formats(&formats) {
                return Err(eyre!(
                    "Swapchain image or depth format has changed: {:?} -> {:?}",
                    formats,
                    swapchain.formats,
                ));
            }
        }

        self.swapchain = Some(swapchain);
        self.render_pass_generation += 1;
        Ok(())
    }

    fn check_command_buffer(&self, command_buffer: vk::CommandBuffer, action: &str) -> Result<()> {
        let current = self.frame.current_command_buffer()?;
        if command_buffer != current {
            return Err(eyre!("Can't {} on a command buffer from a different frame", action));
        }
        Ok(())
    }

    fn swapchain(&self) -> Result<&Swapchain> {
        self.swapchain.as_ref().ok_or_eyre("No swapchain")
    }

    fn swapchain_mut(&mut self) -> Result<&mut Swapchain> {
        self.swapchain.as_mut().ok_or_eyre("No swapchain")
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.dev.device.wait_idle() {
            log::error!("Failed to wait for device idle before teardown: {}", e);
        }
        self.swapchain = None;
        if let Err(e) = self.frame.destroy(&self.dev.device) {
            log::error!("Failed to release frame resources: {}", e);
        }
    }
}
