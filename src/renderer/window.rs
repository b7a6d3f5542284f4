use ash::vk;

/// What the renderer needs from the window it presents to.
///
/// The window side owns the event loop, so anything that has to pump events (waiting out a
/// minimized window) goes through here.
pub trait PresentationWindow {
    /// Current drawable size in pixels, zero while minimized on most platforms.
    fn extent(&self) -> vk::Extent2D;

    fn was_resized(&self) -> bool;

    fn reset_resized_flag(&mut self);

    /// Blocks until at least one new window event has been processed.
    fn wait_events(&mut self);

    /// Set once the user asked to close, so nothing waits on a window that is going away.
    fn is_closing(&self) -> bool {
        false
    }
}

/// Blocks on window events while the window has no area.
/// Returns `None` if the window started closing in the meantime.
pub fn wait_for_drawable_extent(window: &mut dyn PresentationWindow) -> Option<vk::Extent2D> {
    let mut extent = window.extent();
    if extent.width == 0 || extent.height == 0 {
        log::debug!("Window has no drawable area, waiting for it to be restored");
    }
    while extent.width == 0 || extent.height == 0 {
        if window.is_closing() {
            return None;
        }
        window.wait_events();
        extent = window.extent();
    }
    Some(extent)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reports the queued extents one per processed event, then sticks to the last one
    struct ScriptedWindow {
        extents: Vec<vk::Extent2D>,
        events_waited: usize,
        close_after: Option<usize>,
    }

    impl ScriptedWindow {
        fn new(extents: &[(u32, u32)]) -> Self {
            Self {
                extents: extents
                    .iter()
                    .map(|&(width, height)| vk::Extent2D { width, height })
                    .collect(),
                events_waited: 0,
                close_after: None,
            }
        }
    }

    impl PresentationWindow for ScriptedWindow {
        fn extent(&self) -> vk::Extent2D {
            let i = self.events_waited.min(self.extents.len() - 1);
            self.extents[i]
        }

        fn was_resized(&self) -> bool {
            false
        }

        fn reset_resized_flag(&mut self) {}

        fn wait_events(&mut self) {
            self.events_waited += 1;
        }

        fn is_closing(&self) -> bool {
            self.close_after.is_some_and(|n| self.events_waited >= n)
        }
    }

    #[test]
    fn returns_immediately_for_visible_window() {
        let mut window = ScriptedWindow::new(&[(800, 600)]);
        let extent = wait_for_drawable_extent(&mut window);
        assert_eq!(extent, Some(vk::Extent2D { width: 800, height: 600 }));
        assert_eq!(window.events_waited, 0);
    }

    #[test]
    fn waits_out_minimized_window() {
        let mut window = ScriptedWindow::new(&[(0, 0), (0, 600), (800, 0), (1024, 768)]);
        let extent = wait_for_drawable_extent(&mut window);
        assert_eq!(extent, Some(vk::Extent2D { width: 1024, height: 768 }));
        assert_eq!(window.events_waited, 3);
    }

    #[test]
    fn stops_waiting_when_window_closes() {
        let mut window = ScriptedWindow::new(&[(0, 0)]);
        window.close_after = Some(2);
        assert_eq!(wait_for_drawable_extent(&mut window), None);
        assert_eq!(window.events_waited, 2);
    }
}
