//! Low-level Vulkan objects the renderer and resources are built from.

pub mod buffer;
#[cfg(test)]
pub(crate) mod headless;
pub mod image;
pub mod swapchain;
