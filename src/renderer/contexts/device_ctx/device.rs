use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_descriptor::{DescriptorAllocator, DescriptorSet, DescriptorSetLayoutCreateFlags, DescriptorTotalCount};
use crate::renderer::contexts::device_ctx::descriptor_device::DescriptorAshDevice;
use crate::renderer::contexts::device_ctx::instance::{RenderInstance, RenderSurface};
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamily, QueueFamilyIndices};
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;

/// Logical device, its queues and the allocators everything else draws from
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,

    // May be the same queue when one family can do both
    pub graphics_queue: Arc<Queue>,
    pub present_queue: Arc<Queue>,

    instance: ash::Instance,
    command_pool: vk::CommandPool,
    memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    descriptor_allocator: Mutex<DescriptorAllocator<vk::DescriptorPool, vk::DescriptorSet>>,
    transfer_context: ManuallyDrop<TransferContext>,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: &RenderSurface,
    ) -> Result<Self> {
        let (physical, indices) = Self::select_physical_device(&instance.instance, surface)?;
        let properties = unsafe {
            instance.instance.get_physical_device_properties(physical)
        };
        log::info!(
            "Using physical device {:?} ({:?})",
            properties.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            properties.device_type,
        );

        let (logical, graphics_queue, present_queue) = Self::create_logical_device(
            &instance.instance,
            physical,
            indices,
        )?;

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: logical.clone(),
            physical_device: physical,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: true,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let logical = Arc::new(logical);
        let graphics_queue = Arc::new(graphics_queue);
        let present_queue = Arc::new(present_queue);

        let command_pool = {
            let info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_queue.family.index)
                .flags(
                    vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                        | vk::CommandPoolCreateFlags::TRANSIENT,
                );
            unsafe { logical.create_command_pool(&info, None)? }
        };

        let transfer_context = TransferContext::new(
            graphics_queue.clone(),
            logical.clone(),
        )?;

        Ok(Self {
            logical,
            physical,
            properties,

            graphics_queue,
            present_queue,

            instance: instance.instance.clone(),
            command_pool,
            memory_allocator: ManuallyDrop::new(Arc::new(Mutex::new(memory_allocator))),
            descriptor_allocator: Mutex::new(DescriptorAllocator::new(0)),
            transfer_context: ManuallyDrop::new(transfer_context),
        })
    }

    pub fn memory_allocator(&self) -> Arc<Mutex<Allocator>> {
        Arc::clone(&self.memory_allocator)
    }

    pub fn immediate_submit<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        self.transfer_context.immediate_submit(func)
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.logical.device_wait_idle()? };
        Ok(())
    }

    /// Whether `format` supports `features` for images created with `tiling`.
    pub fn format_supports(
        &self,
        format: vk::Format,
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> bool {
        let props = unsafe {
            self.instance.get_physical_device_format_properties(self.physical, format)
        };
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    }

    /// First format in `candidates` that supports `features` for `tiling`.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Result<vk::Format> {
        first_supported_format(candidates, |format| self.format_supports(format, tiling, features))
            .ok_or_eyre("Failed to find a supported format")
    }

    pub fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        Ok(unsafe { self.logical.allocate_command_buffers(&info)? })
    }

    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe {
            self.logical.free_command_buffers(self.command_pool, command_buffers);
        }
    }

    pub fn allocate_descriptor_sets(
        &self,
        layout: vk::DescriptorSetLayout,
        layout_descriptor_count: &DescriptorTotalCount,
        count: u32,
    ) -> Result<Vec<DescriptorSet<vk::DescriptorSet>>> {
        let mut allocator = self.descriptor_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?;
        let sets = unsafe {
            allocator.allocate(
                &DescriptorAshDevice::from(&*self.logical),
                &layout,
                DescriptorSetLayoutCreateFlags::empty(),
                layout_descriptor_count,
                count,
            )
        }
            .map_err(|e| eyre!("Failed to allocate descriptor sets: {:?}", e))?;
        Ok(sets)
    }

    pub fn free_descriptor_sets(
        &self,
        sets: impl IntoIterator<Item = DescriptorSet<vk::DescriptorSet>>,
    ) -> Result<()> {
        let mut allocator = self.descriptor_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?;
        unsafe {
            allocator.free(&DescriptorAshDevice::from(&*self.logical), sets);
        }
        Ok(())
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: &RenderSurface,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let required_exts = Self::get_required_device_extensions();

        let candidates = unsafe { instance.enumerate_physical_devices()? };
        candidates
            .into_iter()
            // Filter out devices that do not contain the required device extensions
            .filter(|&device| {
                let supported = unsafe {
                    instance
                        .enumerate_device_extension_properties(device)
                        .unwrap_or_default()
                };
                required_exts.iter().all(|req| {
                    let found = supported
                        .iter()
                        .any(|ext| ext.extension_name_as_c_str() == Ok(*req));
                    if !found {
                        log::debug!("Device extension not supported: {:?}", req);
                    }
                    found
                })
            })
            // Filter out devices that cannot present to the surface at all
            .filter(|&device| {
                let has_formats = surface.formats(device).is_ok_and(|f| !f.is_empty());
                let has_modes = surface.present_modes(device).is_ok_and(|m| !m.is_empty());
                has_formats && has_modes
            })
            // Filter out devices that do not contain the required queues
            .filter_map(|device| {
                let families = unsafe {
                    instance.get_physical_device_queue_family_properties(device)
                };
                let indices = QueueFamilyIndices::find(&families, |i| {
                    surface.supports_present(device, i)
                });
                indices.is_complete().then_some((device, indices))
            })
            .min_by_key(|(device, _)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                device_type_rank(props.device_type)
            })
            .ok_or_eyre("No suitable physical device found")
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        indices: QueueFamilyIndices,
    ) -> Result<(ash::Device, Queue, Queue)> {
        let graphics_index = indices.graphics.ok_or_eyre("No graphics queue family")?;
        let present_index = indices.present.ok_or_eyre("No present queue family")?;

        let queue_priorities = [1.0];
        let queue_create_infos = indices
            .unique()
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&queue_priorities)
            })
            .collect::<Vec<_>>();

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default();

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);
        let device = unsafe {
            instance.create_device(physical, &device_create_info, None)?
        };

        let families = unsafe {
            instance.get_physical_device_queue_family_properties(physical)
        };
        let make_queue = |index: u32| -> Result<Queue> {
            let props = families
                .get(index as usize)
                .copied()
                .ok_or_eyre("Queue family index out of range")?;
            let handle = unsafe { device.get_device_queue(index, 0) };
            Ok(Queue::new(QueueFamily::new(index, props), handle))
        };
        let graphics_queue = make_queue(graphics_index)?;
        let present_queue = make_queue(present_index)?;

        Ok((device, graphics_queue, present_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        #[allow(unused_mut)]
        let mut exts = vec![ash::khr::swapchain::NAME];
        #[cfg(target_os = "macos")]
        exts.push(ash::khr::portability_subset::NAME);
        exts
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.logical.device_wait_idle() {
                log::error!("Failed to wait for device idle on shutdown: {}", e);
            }

            ManuallyDrop::drop(&mut self.transfer_context);
            self.logical.destroy_command_pool(self.command_pool, None);

            match self.descriptor_allocator.lock() {
                Ok(mut allocator) => allocator.cleanup(&DescriptorAshDevice::from(&*self.logical)),
                Err(e) => log::error!("Descriptor allocator poisoned: {}", e),
            }

            // Memory blocks have to be returned before the device goes away
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.logical.destroy_device(None);
        }
    }
}

pub fn first_supported_format(
    candidates: &[vk::Format],
    supports: impl Fn(vk::Format) -> bool,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|format| supports(*format))
}

/// Lower ranks are preferred when picking a physical device.
pub fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        vk::PhysicalDeviceType::OTHER => 4,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_gpus_rank_first() {
        let mut types = vec![
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::VIRTUAL_GPU,
        ];
        types.sort_by_key(|t| device_type_rank(*t));
        assert_eq!(types[0], vk::PhysicalDeviceType::DISCRETE_GPU);
        assert_eq!(types[1], vk::PhysicalDeviceType::INTEGRATED_GPU);
        assert_eq!(types[3], vk::PhysicalDeviceType::CPU);
    }

    #[test]
    fn first_supported_format_keeps_candidate_order() {
        let candidates = [vk::Format::D32_SFLOAT, vk::Format::D24_UNORM_S8_UINT];
        assert_eq!(first_supported_format(&candidates, |_| true), Some(vk::Format::D32_SFLOAT));
        assert_eq!(
            first_supported_format(&candidates, |f| f == vk::Format::D24_UNORM_S8_UINT),
            Some(vk::Format::D24_UNORM_S8_UINT),
        );
        assert_eq!(first_supported_format(&candidates, |_| false), None);
    }
}
