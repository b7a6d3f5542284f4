use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

/// Synchronization objects owned by one frame-in-flight slot
pub struct FrameSync {
    // Signals when the acquired swapchain image can be rendered to.
    pub image_available: vk::Semaphore,

    // Signals when rendering commands have finished and the image can be presented.
    pub render_finished: vk::Semaphore,

    // Signals when the GPU is done with everything submitted from this slot.
    pub in_flight: vk::Fence,

    device: Arc<ash::Device>,
}

impl FrameSync {
    pub fn new(device: Arc<ash::Device>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Created signaled so the first wait on a fresh slot returns immediately
        let fence_info = vk::FenceCreateInfo::default()
            .flags(vk::FenceCreateFlags::SIGNALED);

        let image_available = unsafe { device.create_semaphore(&semaphore_info, None)? };
        let render_finished = match unsafe { device.create_semaphore(&semaphore_info, None) } {
            Ok(semaphore) => semaphore,
            Err(e) => {
                unsafe { device.destroy_semaphore(image_available, None) };
                return Err(e.into());
            }
        };
        let in_flight = match unsafe { device.create_fence(&fence_info, None) } {
            Ok(fence) => fence,
            Err(e) => {
                unsafe {
                    device.destroy_semaphore(image_available, None);
                    device.destroy_semaphore(render_finished, None);
                }
                return Err(e.into());
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
            device,
        })
    }

    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device.wait_for_fences(&[self.in_flight], true, u64::MAX)?;
        }
        Ok(())
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.image_available, None);
            self.device.destroy_semaphore(self.render_finished, None);
            self.device.destroy_fence(self.in_flight, None);
        }
    }
}
