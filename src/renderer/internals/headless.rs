//! A windowless device for tests that need real Vulkan objects.

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};

pub struct HeadlessDevice {
    pub device: Arc<ash::Device>,
    pub memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    instance: ash::Instance,
    _entry: ash::Entry,
}

impl HeadlessDevice {
    pub fn new() -> Result<Self> {
        let entry = ash::Entry::linked();
        let application_info = vk::ApplicationInfo::default()
            .application_name(c"Sable tests")
            .api_version(vk::API_VERSION_1_1);
        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&application_info);
        let instance = unsafe { entry.create_instance(&instance_info, None)? };

        let physical = unsafe { instance.enumerate_physical_devices()? }
            .into_iter()
            .next()
            .ok_or_eyre("No Vulkan device available")?;

        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(0)
            .queue_priorities(&priorities)];
        let device_info = vk::DeviceCreateInfo::default().queue_create_infos(&queue_infos);
        let device = unsafe { instance.create_device(physical, &device_info, None)? };

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device: physical,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        Ok(Self {
            device: Arc::new(device),
            memory_allocator: ManuallyDrop::new(Arc::new(Mutex::new(memory_allocator))),
            instance,
            _entry: entry,
        })
    }

    pub fn allocator(&self) -> Arc<Mutex<Allocator>> {
        Arc::clone(&self.memory_allocator)
    }

    /// Leaves the allocator mutex poisoned, as if a thread panicked while holding it.
    pub fn poison_allocator(&self) {
        let allocator = self.allocator();
        let _ = std::thread::spawn(move || {
            let _guard = allocator.lock();
            panic!("allocator user panicked");
        })
        .join();
    }
}

impl Drop for HeadlessDevice {
    fn drop(&mut self) {
        unsafe {
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
