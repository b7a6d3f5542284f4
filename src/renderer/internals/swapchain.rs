use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::config::{PresentModePreference, RenderConfig, MAX_FRAMES_IN_FLIGHT};
use crate::renderer::contexts::device_ctx::queue::{image_sharing, Queue};
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::frame::FrameSync;
use crate::renderer::contexts::frame_ctx::images_in_flight::ImagesInFlight;
use crate::renderer::internals::image::Image;

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Outcome of presenting, or of acquiring once an image index is in hand.
/// Anything worse than `OutOfDate` is returned as an error instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    /// The image can still be used this frame, but the swapchain should be recreated afterwards
    Suboptimal,
    /// The surface changed under the swapchain, nothing can be presented until it is recreated
    OutOfDate,
}

impl SwapchainStatus {
    pub fn needs_recreation(&self) -> bool {
        !matches!(self, Self::Optimal)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquireResult {
    Acquired {
        image_index: u32,
        status: SwapchainStatus,
    },
    OutOfDate,
}

/// Formats a render pass and its pipelines were built against
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SwapchainFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
}

pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// FIFO is the only mode every surface has to support, so it is the fallback for any preference.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preference: PresentModePreference,
) -> vk::PresentModeKHR {
    let preferred = preference.as_vk();
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_swap_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: window_extent.width.clamp(min.width, max.width),
        height: window_extent.height.clamp(min.height, max.height),
    }
}

/// One more than the minimum so acquisition does not wait on the driver, bounded by the maximum when there is one.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    match capabilities.max_image_count {
        0 => desired,
        max => desired.min(max),
    }
}

pub fn classify_acquire(result: VkResult<(u32, bool)>) -> Result<AcquireResult> {
    match result {
        Ok((image_index, false)) => Ok(AcquireResult::Acquired {
            image_index,
            status: SwapchainStatus::Optimal,
        }),
        Ok((image_index, true)) => Ok(AcquireResult::Acquired {
            image_index,
            status: SwapchainStatus::Suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
        Err(e) => Err(eyre!("Failed to acquire swapchain image: {}", e)),
    }
}

pub fn classify_present(result: VkResult<bool>) -> Result<SwapchainStatus> {
    match result {
        Ok(false) => Ok(SwapchainStatus::Optimal),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(SwapchainStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
        Err(e) => Err(eyre!("Failed to present swapchain image: {}", e)),
    }
}

/// Color is cleared and left ready to present, depth is cleared and thrown away after the pass.
pub fn attachment_descriptions(formats: SwapchainFormats) -> [vk::AttachmentDescription; 2] {
    let color = vk::AttachmentDescription::default()
        .format(formats.color)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);
    let depth = vk::AttachmentDescription::default()
        .format(formats.depth)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    [color, depth]
}

/// Holds back attachment writes until whatever last touched the recycled image is done with it
pub fn external_dependency() -> vk::SubpassDependency {
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
}

/// The presentable images of one window surface, with everything needed to render into and present them.
///
/// A swapchain is replaced as a whole on resize: the retiring one is handed to [`Swapchain::new`],
/// which lets the driver reuse its resources and then drops it.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub extent: vk::Extent2D,
    pub formats: SwapchainFormats,
    pub present_mode: vk::PresentModeKHR,
    pub render_pass: vk::RenderPass,

    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth_images: Vec<Image>,
    framebuffers: Vec<vk::Framebuffer>,

    frames: Vec<FrameSync>,
    images_in_flight: ImagesInFlight,
    current_frame: usize,

    loader: ash::khr::swapchain::Device,
    graphics_queue: Arc<Queue>,
    present_queue: Arc<Queue>,
    device: Arc<ash::Device>,
}

impl Swapchain {
    pub fn new(
        dev_ctx: &RenderDeviceContext,
        window_extent: vk::Extent2D,
        config: &RenderConfig,
        previous: Option<Swapchain>,
    ) -> Result<Self> {
        let dev = &dev_ctx.device;
        let surface = &dev_ctx.surface;

        let capabilities = surface.capabilities(dev.physical)?;
        let surface_format = choose_surface_format(&surface.formats(dev.physical)?)
            .ok_or_eyre("Surface reports no supported formats")?;
        let present_mode = choose_present_mode(
            &surface.present_modes(dev.physical)?,
            config.present_mode,
        );
        if present_mode != config.present_mode.as_vk() {
            log::warn!(
                "Present mode {:?} not supported, falling back to {:?}",
                config.present_mode,
                present_mode,
            );
        }
        let extent = choose_swap_extent(&capabilities, window_extent);
        let min_image_count = choose_image_count(&capabilities);

        let (sharing_mode, queue_family_indices) = image_sharing(
            dev.graphics_queue.family.index,
            dev.present_queue.family.index,
        );

        let loader = ash::khr::swapchain::Device::new(&dev_ctx.instance.instance, &dev.logical);
        let swapchain = {
            let old_swapchain = previous
                .as_ref()
                .map_or(vk::SwapchainKHR::null(), |old| old.swapchain);
            let info = vk::SwapchainCreateInfoKHR::default()
                .surface(surface.surface)
                .min_image_count(min_image_count)
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .image_sharing_mode(sharing_mode)
                .queue_family_indices(&queue_family_indices)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode)
                .clipped(true)
                .old_swapchain(old_swapchain);
            unsafe { loader.create_swapchain(&info, None)? }
        };
        // The retiring swapchain has been handed over and must not be used to acquire again
        drop(previous);

        let depth_format = dev.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;

        // From here on a failure drops `swapchain`, which releases whatever was already created
        let mut swapchain = Self {
            swapchain,
            extent,
            formats: SwapchainFormats {
                color: surface_format.format,
                depth: depth_format,
            },
            present_mode,
            render_pass: vk::RenderPass::null(),

            images: Vec::new(),
            image_views: Vec::new(),
            depth_images: Vec::new(),
            framebuffers: Vec::new(),

            frames: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            images_in_flight: ImagesInFlight::new(0),
            current_frame: 0,

            loader,
            graphics_queue: dev.graphics_queue.clone(),
            present_queue: dev.present_queue.clone(),
            device: dev.logical.clone(),
        };

        swapchain.create_image_views()?;
        swapchain.create_render_pass()?;
        swapchain.create_depth_resources(dev_ctx)?;
        swapchain.create_framebuffers()?;
        swapchain.create_sync_objects()?;

        log::info!(
            "Created swapchain: {}x{}, {} images, {:?}/{:?}, depth {:?}, {:?}",
            extent.width,
            extent.height,
            swapchain.image_count(),
            surface_format.format,
            surface_format.color_space,
            depth_format,
            present_mode,
        );

        Ok(swapchain)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    pub fn extent_aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }

    /// Whether pipelines built for `other` can render into this swapchain.
    pub fn compare_formats(&self, other: &SwapchainFormats) -> bool {
        self.formats == *other
    }

    /// Blocks until the current frame slot is free, then asks for the next image to render into.
    pub fn acquire_next_image(&self) -> Result<AcquireResult> {
        let frame = &self.frames[self.current_frame];
        frame.wait()?;

        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                frame.image_available,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    /// Submits `command_buffer` for `image_index`, queues the image for presentation and moves on to the next frame slot.
    pub fn submit_and_present(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<SwapchainStatus> {
        let frame = &self.frames[self.current_frame];

        // Another slot may still be rendering into this image
        if let Some(previous_owner) = self.images_in_flight.claim(image_index, frame.in_flight) {
            unsafe {
                self.device.wait_for_fences(&[previous_owner], true, u64::MAX)?;
            }
        }

        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [frame.render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.reset_fences(&[frame.in_flight])?;
            self.device
                .queue_submit(self.graphics_queue.handle, &[submit_info], frame.in_flight)
                .map_err(|e| eyre!("Failed to submit draw command buffer: {}", e))?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let result = unsafe {
            self.loader.queue_present(self.present_queue.handle, &present_info)
        };

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;

        classify_present(result)
    }

    fn create_image_views(&mut self) -> Result<()> {
        self.images = unsafe { self.loader.get_swapchain_images(self.swapchain)? };
        self.images_in_flight = ImagesInFlight::new(self.images.len());

        for &image in &self.images {
            let info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.formats.color)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { self.device.create_image_view(&info, None)? };
            self.image_views.push(view);
        }
        Ok(())
    }

    fn create_render_pass(&mut self) -> Result<()> {
        let attachments = attachment_descriptions(self.formats);
        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];
        let dependencies = [external_dependency()];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        self.render_pass = unsafe { self.device.create_render_pass(&info, None)? };
        Ok(())
    }

    fn create_depth_resources(&mut self, dev_ctx: &RenderDeviceContext) -> Result<()> {
        for _ in 0..self.images.len() {
            let depth_image = Image::new_depth_image(
                self.formats.depth,
                self.extent,
                dev_ctx.device.memory_allocator(),
                self.device.clone(),
            )?;
            self.depth_images.push(depth_image);
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> Result<()> {
        for (color_view, depth_image) in self.image_views.iter().zip(&self.depth_images) {
            let attachments = [*color_view, depth_image.view];
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);
            let framebuffer = unsafe { self.device.create_framebuffer(&info, None)? };
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    fn create_sync_objects(&mut self) -> Result<()> {
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            self.frames.push(FrameSync::new(self.device.clone())?);
        }
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            self.device.destroy_render_pass(self.render_pass, None);
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            // Swapchain images belong to the swapchain itself
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        // Depth images and frame sync objects release themselves
    }
}
