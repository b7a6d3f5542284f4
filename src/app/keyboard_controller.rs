use glam::Vec3;
use winit::keyboard::KeyCode;
use crate::app::input_state::InputState;
use crate::scene::transform::Transform;

#[derive(Debug, Copy, Clone)]
pub struct KeyMappings {
    pub move_left: KeyCode,
    pub move_right: KeyCode,
    pub move_forward: KeyCode,
    pub move_backward: KeyCode,
    pub move_up: KeyCode,
    pub move_down: KeyCode,
    pub look_left: KeyCode,
    pub look_right: KeyCode,
    pub look_up: KeyCode,
    pub look_down: KeyCode,
}

impl Default for KeyMappings {
    fn default() -> Self {
        Self {
            move_left: KeyCode::KeyA,
            move_right: KeyCode::KeyD,
            move_forward: KeyCode::KeyW,
            move_backward: KeyCode::KeyS,
            move_up: KeyCode::KeyE,
            move_down: KeyCode::KeyQ,
            look_left: KeyCode::ArrowLeft,
            look_right: KeyCode::ArrowRight,
            look_up: KeyCode::ArrowUp,
            look_down: KeyCode::ArrowDown,
        }
    }
}

/// Flies a transform around with the keyboard, yaw and pitch on the arrow keys
#[derive(Debug, Clone)]
pub struct KeyboardController {
    pub keys: KeyMappings,
    pub move_speed: f32,
    pub look_speed: f32,
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self {
            keys: KeyMappings::default(),
            move_speed: 3.0,
            look_speed: 1.5,
        }
    }
}

impl KeyboardController {
    pub fn move_in_plane_xz(&self, input: &InputState, delta_time: f32, transform: &mut Transform) {
        let keys = &self.keys;

        let rotate = Vec3::new(
            input.axis(keys.look_up) - input.axis(keys.look_down),
            input.axis(keys.look_right) - input.axis(keys.look_left),
            0.0,
        );
        if rotate.length_squared() > f32::EPSILON {
            transform.rotate_by(self.look_speed * delta_time * rotate.normalize());
        }

        // Directions come from the rotation after this frame's look input
        let forward = transform.forward();
        let right = transform.right();
        let up = transform.up();

        let move_dir = forward * (input.axis(keys.move_forward) - input.axis(keys.move_backward))
            + right * (input.axis(keys.move_right) - input.axis(keys.move_left))
            + up * (input.axis(keys.move_up) - input.axis(keys.move_down));
        if move_dir.length_squared() > f32::EPSILON {
            transform.translate_by(self.move_speed * delta_time * move_dir.normalize());
        }
    }
}
