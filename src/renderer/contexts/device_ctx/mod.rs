pub mod descriptor_device;
pub mod device;
pub mod instance;
pub mod queue;
pub mod transfer_ctx;

use std::sync::Arc;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::{RenderInstance, RenderSurface};

/// Responsibilities:
/// - Manage the Vulkan instance, window surface, device, and queues
/// - Hand out command buffers, descriptor sets and GPU memory
/// - Run one-off uploads outside of the frame loop
///
/// Fields drop in declaration order: device, then surface, then instance.
pub struct RenderDeviceContext {
    pub device: RenderDevice,
    pub surface: RenderSurface,
    pub instance: RenderInstance,
}

impl RenderDeviceContext {
    pub fn new(window: &Arc<Window>) -> Result<Self> {
        let instance = RenderInstance::new(window)?;
        let surface = instance.create_surface(window)?;
        let device = RenderDevice::new(&instance, &surface)?;

        Ok(Self {
            device,
            surface,
            instance,
        })
    }
}
