use std::collections::HashMap;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_descriptor::DescriptorTotalCount;

/// Collects bindings for a descriptor set layout and keeps track of how many descriptors
/// of each type one set of the layout needs, which is what the set allocator sizes pools by.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: HashMap<u32, vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
        descriptor_count: u32,
    ) -> Result<Self> {
        if self.bindings.contains_key(&binding) {
            return Err(eyre!("Descriptor binding {} is already in use", binding));
        }
        let layout_binding = vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(descriptor_count)
            .stage_flags(stages);
        self.bindings.insert(binding, layout_binding);
        Ok(self)
    }

    pub fn descriptor_count(&self) -> DescriptorTotalCount {
        let mut count = DescriptorTotalCount::default();
        for binding in self.bindings.values() {
            let n = binding.descriptor_count;
            match binding.descriptor_type {
                vk::DescriptorType::SAMPLER => count.sampler += n,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER => count.combined_image_sampler += n,
                vk::DescriptorType::SAMPLED_IMAGE => count.sampled_image += n,
                vk::DescriptorType::STORAGE_IMAGE => count.storage_image += n,
                vk::DescriptorType::UNIFORM_TEXEL_BUFFER => count.uniform_texel_buffer += n,
                vk::DescriptorType::STORAGE_TEXEL_BUFFER => count.storage_texel_buffer += n,
                vk::DescriptorType::UNIFORM_BUFFER => count.uniform_buffer += n,
                vk::DescriptorType::STORAGE_BUFFER => count.storage_buffer += n,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => count.uniform_buffer_dynamic += n,
                vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => count.storage_buffer_dynamic += n,
                vk::DescriptorType::INPUT_ATTACHMENT => count.input_attachment += n,
                vk::DescriptorType::ACCELERATION_STRUCTURE_KHR => count.acceleration_structure += n,
                other => log::warn!("Descriptor type {:?} is not counted for pool sizing", other),
            }
        }
        count
    }

    pub fn build(&self, device: &ash::Device) -> Result<DescriptorSetLayout> {
        let mut bindings = self.bindings.values().copied().collect::<Vec<_>>();
        bindings.sort_by_key(|b| b.binding);

        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&info, None)? };

        Ok(DescriptorSetLayout {
            layout,
            descriptor_count: self.descriptor_count(),
        })
    }
}

/// A built layout together with the per-set descriptor totals used to allocate sets from it
pub struct DescriptorSetLayout {
    pub layout: vk::DescriptorSetLayout,
    pub descriptor_count: DescriptorTotalCount,
}

impl DescriptorSetLayout {
    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            device.destroy_descriptor_set_layout(self.layout, None);
        }
        self.layout = vk::DescriptorSetLayout::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_descriptors_per_type() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::ALL_GRAPHICS, 1)
            .and_then(|b| {
                b.add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT, 4)
            })
            .and_then(|b| {
                b.add_binding(2, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX, 2)
            })
            .unwrap();

        let count = builder.descriptor_count();
        assert_eq!(count.uniform_buffer, 3);
        assert_eq!(count.combined_image_sampler, 4);
        assert_eq!(count.storage_buffer, 0);
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let result = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX, 1)
            .and_then(|b| {
                b.add_binding(0, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX, 1)
            });
        assert!(result.is_err());
    }
}
