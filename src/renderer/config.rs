use ash::vk;

/// Number of frames the CPU may record ahead of the GPU.
/// Command buffers, sync objects and per-frame uniforms are sized by this, never by the swapchain image count.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum PresentModePreference {
    /// Low latency triple buffering, falls back to FIFO when the surface lacks it
    #[default]
    Mailbox,
    /// Vsync, always available
    Fifo,
    /// No vsync, may tear; falls back to FIFO when the surface lacks it
    Immediate,
}

impl PresentModePreference {
    pub fn as_vk(&self) -> vk::PresentModeKHR {
        match self {
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// Contains configuration options for the renderer like the present mode and clear values
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub present_mode: PresentModePreference,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            present_mode: PresentModePreference::default(),
            clear_color: [0.01, 0.01, 0.01, 1.0],
            clear_depth: 1.0,
        }
    }
}
