use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::Result;
use color_eyre::eyre::{eyre, OptionExt};
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};

/// Rounds `instance_size` up to the next multiple of `min_alignment`.
/// `min_alignment` must be zero or a power of two, zero leaves the size untouched.
pub fn aligned_size(instance_size: vk::DeviceSize, min_alignment: vk::DeviceSize) -> vk::DeviceSize {
    if min_alignment == 0 {
        return instance_size;
    }
    (instance_size + min_alignment - 1) & !(min_alignment - 1)
}

/// A `vk::Buffer` together with the memory backing it
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Buffer {
    pub fn new(
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        name: &str,
        mem_loc: MemoryLocation,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let buffer = {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            unsafe { device.create_buffer(&buffer_info, None)? }
        };

        // Drop releases the buffer, and the allocation once it exists, if a later step fails
        let mut result = Self {
            buffer,
            size,

            allocation: None,
            memory_allocator,
            device,
        };

        let requirements = unsafe {
            result.device.get_buffer_memory_requirements(buffer)
        };
        let allocation = result.memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: mem_loc,
                linear: true,
                allocation_scheme: AllocationScheme::DedicatedBuffer(buffer),
            })?;
        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        result.allocation = Some(allocation);

        unsafe {
            result.device.bind_buffer_memory(buffer, memory, offset)?;
        }

        Ok(result)
    }

    /// Copies `data` into host-visible memory starting at `start_offset` bytes.
    pub fn write<T>(
        &mut self,
        data: &[T],
        start_offset: usize,
    ) -> Result<presser::CopyRecord>
    where
        T: Copy,
    {
        let mut slab = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.try_as_mapped_slab())
            .ok_or_eyre("Buffer memory is not host visible")?;
        Ok(presser::copy_from_slice_to_offset(
            data,
            &mut slab,
            start_offset,
        )?)
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(0)
            .range(self.size)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free buffer allocation: {}", e);
                    }
                }
                Err(e) => log::error!("Memory allocator poisoned: {}", e),
            }
        }
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::internals::headless::HeadlessDevice;

    #[test]
    fn aligned_size_rounds_up_to_alignment() {
        assert_eq!(aligned_size(80, 64), 128);
        assert_eq!(aligned_size(64, 64), 64);
        assert_eq!(aligned_size(1, 256), 256);
    }

    #[test]
    fn aligned_size_without_alignment_is_identity() {
        assert_eq!(aligned_size(80, 0), 80);
        assert_eq!(aligned_size(80, 1), 80);
    }

    #[test]
    #[ignore = "needs a Vulkan device"]
    fn creates_and_writes_host_visible_buffer() {
        let dev = HeadlessDevice::new().unwrap();
        let mut buffer = Buffer::new(
            64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "Test buffer",
            MemoryLocation::CpuToGpu,
            dev.allocator(),
            dev.device.clone(),
        )
        .unwrap();

        assert_ne!(buffer.buffer, vk::Buffer::null());
        assert_eq!(buffer.descriptor_info().range, 64);
        assert!(buffer.write(&[1.0f32, 2.0, 3.0, 4.0], 16).is_ok());
    }

    #[test]
    #[ignore = "needs a Vulkan device"]
    fn poisoned_allocator_fails_without_keeping_the_buffer() {
        let dev = HeadlessDevice::new().unwrap();
        dev.poison_allocator();

        let result = Buffer::new(
            64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "Test buffer",
            MemoryLocation::CpuToGpu,
            dev.allocator(),
            dev.device.clone(),
        );
        assert!(result.is_err());
        // Only the device's own handle is left, the half-built buffer released its clone
        assert_eq!(Arc::strong_count(&dev.device), 1);
        assert_eq!(Arc::strong_count(&*dev.memory_allocator), 1);
    }
}
