mod config;
mod input_state;
mod keyboard_controller;
mod time;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use glam::Vec3;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};
use crate::app::input_state::InputState;
use crate::app::keyboard_controller::KeyboardController;
use crate::app::time::TimeManager;
use crate::renderer::camera::Camera;
use crate::renderer::render_system::RenderSystem;
use crate::renderer::resources::mesh::{Mesh, MeshBuilder};
use crate::renderer::shader_data::GlobalUbo;
use crate::renderer::window::PresentationWindow;
use crate::renderer::Renderer;
use crate::scene::entity::EntityId;
use crate::scene::transform::Transform;
use crate::scene::Scene;

const SHADER_NAME: &str = "basic";
const SPIN_SPEED: f32 = 0.5;

/// Window side of the app, the part winit calls back into while events are pumped
struct WindowState {
    title: String,
    size: PhysicalSize<u32>,
    window: Option<Arc<Window>>,
    input: InputState,
    resized: bool,
    close_requested: bool,
    error: Option<color_eyre::Report>,
}

impl WindowState {
    fn new(config: &AppConfig) -> Self {
        Self {
            title: config.title.clone(),
            size: PhysicalSize::new(config.width, config.height),
            window: None,
            input: InputState::default(),
            resized: false,
            close_requested: false,
            error: None,
        }
    }

    fn extent(&self) -> vk::Extent2D {
        self.window
            .as_ref()
            .map(|window| {
                let size = window.inner_size();
                vk::Extent2D {
                    width: size.width,
                    height: size.height,
                }
            })
            .unwrap_or_default()
    }

    /// Polls once there is a window to draw to. Before the first resume there is nothing to do
    /// but wait, so the pump blocks.
    fn pump_timeout(&self) -> Option<Duration> {
        self.window.as_ref().map(|_| Duration::ZERO)
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.title.as_str())
            .with_inner_size(self.size);
        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => {
                self.error = Some(e.into());
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
            return;
        }

        self.input.process_window_events(&event);

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                self.resized = true;
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    physical_key: PhysicalKey::Code(KeyCode::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                self.close_requested = true;
            }
            _ => {}
        }

        if self.close_requested {
            event_loop.exit();
        }
    }
}

/// Lends the event loop and window state to the renderer for the length of one call
struct Presentation<'a> {
    event_loop: &'a mut EventLoop<()>,
    state: &'a mut WindowState,
}

impl PresentationWindow for Presentation<'_> {
    fn extent(&self) -> vk::Extent2D {
        self.state.extent()
    }

    fn was_resized(&self) -> bool {
        self.state.resized
    }

    fn reset_resized_flag(&mut self) {
        self.state.resized = false;
    }

    fn wait_events(&mut self) {
        if let PumpStatus::Exit(_) = self.event_loop.pump_app_events(None, &mut *self.state) {
            self.state.close_requested = true;
        }
    }

    fn is_closing(&self) -> bool {
        self.state.close_requested
    }
}

/// Everything that lives on the GPU. Fields drop in declaration order, the renderer last.
struct Graphics {
    scene: Scene,
    viewer_id: EntityId,
    render_system: RenderSystem,
    renderer: Renderer,
}

pub struct App {
    config: AppConfig,
    event_loop: EventLoop<()>,
    window_state: WindowState,
    graphics: Option<Graphics>,

    camera: Camera,
    controller: KeyboardController,
    time: TimeManager<Scene>,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        let window_state = WindowState::new(&config);
        let time = TimeManager::new(config.fixed_step);

        Ok(Self {
            config,
            event_loop,
            window_state,
            graphics: None,

            camera: Camera::new(),
            controller: KeyboardController::default(),
            time,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        loop {
            let timeout = self.window_state.pump_timeout();
            let status = self
                .event_loop
                .pump_app_events(timeout, &mut self.window_state);

            if let Some(error) = self.window_state.error.take() {
                return Err(error);
            }
            if let PumpStatus::Exit(code) = status {
                log::info!("Event loop exited with code {}", code);
                break;
            }
            if self.window_state.close_requested {
                break;
            }

            if self.graphics.is_none() {
                // The window shows up on the first resume
                if self.window_state.window.is_none() {
                    continue;
                }
                self.init_graphics()?;
            }

            self.tick()?;
        }

        log::info!("Shutting down");
        if let Some(graphics) = &self.graphics {
            graphics.renderer.device().wait_idle()?;
        }
        self.graphics = None;

        Ok(())
    }

    fn init_graphics(&mut self) -> Result<()> {
        let window = self.window_state.window.clone().ok_or_eyre("No window to render to")?;
        let mut presentation = Presentation {
            event_loop: &mut self.event_loop,
            state: &mut self.window_state,
        };

        let renderer = Renderer::new(&window, &mut presentation, self.config.render.clone())?;
        let render_system = RenderSystem::new(&renderer, SHADER_NAME)?;

        let mut scene = Scene::new();
        let cube = Arc::new(Mesh::new(renderer.device(), &MeshBuilder::cube(Vec3::ZERO))?);

        let spinning = scene.spawn();
        spinning.transform = Transform::from_translation(Vec3::new(0.0, 0.0, 2.5))
            .with_scale(Vec3::splat(0.5));
        spinning.mesh = Some(cube.clone());
        let spinning_id = spinning.id();

        let resting = scene.spawn();
        resting.transform = Transform::from_translation(Vec3::new(1.5, 0.0, 3.5))
            .with_scale(Vec3::splat(0.5));
        resting.mesh = Some(cube);

        let viewer_id = scene.spawn().id();

        self.time.ticks.add(move |scene: &mut Scene, step| {
            if let Some(entity) = scene.get_mut(spinning_id) {
                entity.transform.rotate_by(Vec3::new(0.0, SPIN_SPEED * step, 0.0));
            }
        });

        log::info!("Scene ready with {} entities", scene.len());
        self.graphics = Some(Graphics {
            scene,
            viewer_id,
            render_system,
            renderer,
        });

        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        let Some(graphics) = self.graphics.as_mut() else {
            return Ok(());
        };

        let delta_time = self.time.update(&mut graphics.scene);

        if let Some(viewer) = graphics.scene.get_mut(graphics.viewer_id) {
            self.controller
                .move_in_plane_xz(&self.window_state.input, delta_time, &mut viewer.transform);
            self.camera
                .set_view_yxz(viewer.transform.translation, viewer.transform.rotation);
        }

        let aspect = graphics.renderer.aspect_ratio()?;
        self.camera.set_perspective_projection(
            self.config.fov_y.to_radians(),
            aspect,
            self.config.near,
            self.config.far,
        );

        let mut presentation = Presentation {
            event_loop: &mut self.event_loop,
            state: &mut self.window_state,
        };

        let Some(command_buffer) = graphics.renderer.begin_frame(&mut presentation)? else {
            return Ok(());
        };

        graphics.render_system.sync_render_pass(&graphics.renderer)?;
        graphics.renderer.update_global_ubo(&GlobalUbo {
            projection_view: self.camera.get_projection_view(),
            ..Default::default()
        })?;

        let frame_info = graphics.renderer.frame_info(command_buffer, delta_time, &self.camera)?;
        graphics.renderer.begin_swap_chain_render_pass(command_buffer)?;
        graphics.render_system.render(&frame_info, graphics.scene.iter());
        graphics.renderer.end_swap_chain_render_pass(command_buffer)?;
        graphics.renderer.end_frame(&mut presentation)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_on_events_until_window_exists() {
        let state = WindowState::new(&AppConfig::default());
        assert_eq!(state.pump_timeout(), None);
        assert_eq!(state.extent(), vk::Extent2D::default());
    }
}
