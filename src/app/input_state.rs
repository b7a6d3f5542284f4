use std::collections::HashSet;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Keys currently held down, tracked by physical location so layouts don't change the controls
#[derive(Debug, Default)]
pub struct InputState {
    pressed: HashSet<KeyCode>,
}

impl InputState {
    pub fn process_window_events(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    physical_key: PhysicalKey::Code(code),
                    state,
                    ..
                },
                ..
            } => match state {
                ElementState::Pressed => self.press(*code),
                ElementState::Released => self.release(*code),
            },
            // Keys released while unfocused never report it
            WindowEvent::Focused(false) => self.pressed.clear(),
            _ => {}
        }
    }

    pub fn press(&mut self, key: KeyCode) {
        self.pressed.insert(key);
    }

    pub fn release(&mut self, key: KeyCode) {
        self.pressed.remove(&key);
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// 1.0 if the key is held, 0.0 otherwise
    pub fn axis(&self, key: KeyCode) -> f32 {
        if self.is_pressed(key) { 1.0 } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_press_and_release() {
        let mut input = InputState::default();
        input.press(KeyCode::KeyW);
        input.press(KeyCode::KeyW);
        assert!(input.is_pressed(KeyCode::KeyW));
        assert_eq!(input.axis(KeyCode::KeyW), 1.0);

        input.release(KeyCode::KeyW);
        assert!(!input.is_pressed(KeyCode::KeyW));
        assert_eq!(input.axis(KeyCode::KeyW), 0.0);
    }

    #[test]
    fn losing_focus_releases_everything() {
        let mut input = InputState::default();
        input.press(KeyCode::KeyA);
        input.press(KeyCode::ArrowUp);
        input.process_window_events(&WindowEvent::Focused(false));
        assert!(!input.is_pressed(KeyCode::KeyA));
        assert!(!input.is_pressed(KeyCode::ArrowUp));
    }
}
