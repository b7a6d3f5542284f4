use crate::renderer::config::RenderConfig;

/// Window, camera and timing options for the driver
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Vertical field of view in degrees
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Seconds per fixed tick
    pub fixed_step: f32,
    pub render: RenderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Sable".to_owned(),
            width: 1920,
            height: 1080,
            fov_y: 60.0,
            near: 0.01,
            far: 100.0,
            fixed_step: 1.0 / 60.0,
            render: RenderConfig::default(),
        }
    }
}
