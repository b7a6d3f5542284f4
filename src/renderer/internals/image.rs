use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::Result;
use color_eyre::eyre::eyre;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};

pub struct ImageCreateInfo<'a> {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub name: &'a str,
}

/// A GPU-only 2D image, its memory and a view covering the whole image
pub struct Image {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Image {
    pub fn new(
        create_info: &ImageCreateInfo,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(create_info.format)
                .usage(create_info.usage)
                .extent(vk::Extent3D {
                    width: create_info.extent.width,
                    height: create_info.extent.height,
                    depth: 1,
                })
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            unsafe { device.create_image(&info, None)? }
        };

        // Drop releases whatever got created if a later step fails
        let mut result = Self {
            image,
            view: vk::ImageView::null(),
            format: create_info.format,
            extent: create_info.extent,

            allocation: None,
            memory_allocator,
            device,
        };

        let reqs = unsafe { result.device.get_image_memory_requirements(image) };
        let allocation = result.memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name: create_info.name,
                requirements: reqs,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::DedicatedImage(image),
            })?;
        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        result.allocation = Some(allocation);
        unsafe {
            result.device.bind_image_memory(image, memory, offset)?;
        }

        let info = vk::ImageViewCreateInfo::default()
            .view_type(vk::ImageViewType::TYPE_2D)
            .image(image)
            .format(create_info.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: create_info.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        result.view = unsafe { result.device.create_image_view(&info, None)? };

        Ok(result)
    }

    /// Create a depth attachment matching a swapchain image
    pub fn new_depth_image(
        format: vk::Format,
        extent: vk::Extent2D,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let create_info = ImageCreateInfo {
            format,
            extent,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            name: "Depth Image",
        };
        Self::new(&create_info, memory_allocator, device)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free image allocation: {}", e);
                    }
                }
                Err(e) => log::error!("Memory allocator poisoned: {}", e),
            }
        }
        unsafe {
            self.device.destroy_image(self.image, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::internals::headless::HeadlessDevice;

    fn color_target(extent: vk::Extent2D) -> ImageCreateInfo<'static> {
        ImageCreateInfo {
            format: vk::Format::R8G8B8A8_UNORM,
            extent,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            aspect: vk::ImageAspectFlags::COLOR,
            name: "Test image",
        }
    }

    #[test]
    #[ignore = "needs a Vulkan device"]
    fn creates_image_with_view() {
        let dev = HeadlessDevice::new().unwrap();
        let extent = vk::Extent2D { width: 16, height: 8 };
        let image = Image::new(&color_target(extent), dev.allocator(), dev.device.clone()).unwrap();

        assert_ne!(image.view, vk::ImageView::null());
        assert_eq!(image.extent, extent);
        assert_eq!(image.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    #[ignore = "needs a Vulkan device"]
    fn poisoned_allocator_fails_without_keeping_the_image() {
        let dev = HeadlessDevice::new().unwrap();
        dev.poison_allocator();

        let extent = vk::Extent2D { width: 16, height: 8 };
        let result = Image::new(&color_target(extent), dev.allocator(), dev.device.clone());
        let err = result.err().unwrap();
        assert!(err.to_string().contains("poisoned"));
        assert_eq!(Arc::strong_count(&dev.device), 1);
        assert_eq!(Arc::strong_count(&*dev.memory_allocator), 1);
    }
}
