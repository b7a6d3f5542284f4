use ash::vk;
use gpu_descriptor::{
    CreatePoolError, DescriptorDevice, DescriptorPoolCreateFlags, DescriptorTotalCount,
    DeviceAllocationError,
};

/// Lets `gpu-descriptor` create pools and allocate sets through an `ash` device
pub struct DescriptorAshDevice<'a>(pub &'a ash::Device);

impl<'a> From<&'a ash::Device> for DescriptorAshDevice<'a> {
    fn from(device: &'a ash::Device) -> Self {
        Self(device)
    }
}

fn pool_sizes(count: &DescriptorTotalCount) -> smallvec::SmallVec<[vk::DescriptorPoolSize; 12]> {
    [
        (vk::DescriptorType::SAMPLER, count.sampler),
        (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, count.combined_image_sampler),
        (vk::DescriptorType::SAMPLED_IMAGE, count.sampled_image),
        (vk::DescriptorType::STORAGE_IMAGE, count.storage_image),
        (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, count.uniform_texel_buffer),
        (vk::DescriptorType::STORAGE_TEXEL_BUFFER, count.storage_texel_buffer),
        (vk::DescriptorType::UNIFORM_BUFFER, count.uniform_buffer),
        (vk::DescriptorType::STORAGE_BUFFER, count.storage_buffer),
        (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, count.uniform_buffer_dynamic),
        (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, count.storage_buffer_dynamic),
        (vk::DescriptorType::INPUT_ATTACHMENT, count.input_attachment),
        (vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, count.acceleration_structure),
    ]
        .into_iter()
        .filter(|(_, descriptor_count)| *descriptor_count != 0)
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
        .collect()
}

impl DescriptorDevice<vk::DescriptorSetLayout, vk::DescriptorPool, vk::DescriptorSet>
for DescriptorAshDevice<'_>
{
    unsafe fn create_descriptor_pool(
        &self,
        descriptor_count: &DescriptorTotalCount,
        max_sets: u32,
        flags: DescriptorPoolCreateFlags,
    ) -> Result<vk::DescriptorPool, CreatePoolError> {
        let sizes = pool_sizes(descriptor_count);

        let mut ash_flags = vk::DescriptorPoolCreateFlags::empty();
        if flags.contains(DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET) {
            ash_flags |= vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        }
        if flags.contains(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND) {
            ash_flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        }

        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&sizes)
            .flags(ash_flags);
        match unsafe { self.0.create_descriptor_pool(&info, None) } {
            Ok(pool) => Ok(pool),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => Err(CreatePoolError::OutOfDeviceMemory),
            Err(vk::Result::ERROR_FRAGMENTATION) => Err(CreatePoolError::Fragmentation),
            Err(err) => {
                log::error!("Unexpected result creating descriptor pool: {}", err);
                Err(CreatePoolError::OutOfHostMemory)
            }
        }
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe {
            self.0.destroy_descriptor_pool(pool, None)
        }
    }

    unsafe fn alloc_descriptor_sets<'a>(
        &self,
        pool: &mut vk::DescriptorPool,
        layouts: impl ExactSizeIterator<Item = &'a vk::DescriptorSetLayout>,
        sets: &mut impl Extend<vk::DescriptorSet>,
    ) -> Result<(), DeviceAllocationError> {
        let set_layouts: smallvec::SmallVec<[_; 16]> = layouts.copied().collect();
        let info = vk::DescriptorSetAllocateInfo::default()
            .set_layouts(&set_layouts)
            .descriptor_pool(*pool);

        match unsafe { self.0.allocate_descriptor_sets(&info) } {
            Ok(allocated) => {
                sets.extend(allocated);
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => Err(DeviceAllocationError::OutOfDeviceMemory),
            Err(vk::Result::ERROR_FRAGMENTED_POOL) => Err(DeviceAllocationError::FragmentedPool),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) => Err(DeviceAllocationError::OutOfPoolMemory),
            Err(err) => {
                if err != vk::Result::ERROR_OUT_OF_HOST_MEMORY {
                    log::error!("Unexpected result allocating descriptor sets: {}", err);
                }
                Err(DeviceAllocationError::OutOfHostMemory)
            }
        }
    }

    unsafe fn dealloc_descriptor_sets<'a>(
        &self,
        pool: &mut vk::DescriptorPool,
        sets: impl Iterator<Item = vk::DescriptorSet>,
    ) {
        let sets: smallvec::SmallVec<[_; 16]> = sets.collect();
        if let Err(err) = unsafe { self.0.free_descriptor_sets(*pool, &sets) } {
            log::error!("Failed to free descriptor sets: {}", err);
        }
    }
}
