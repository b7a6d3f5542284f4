use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::config::MAX_FRAMES_IN_FLIGHT;

/// Where the renderer is within one frame.
/// Submission sends the frame straight back to `Idle`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    Recording,
    InRenderPass,
}

/// Enforces the begin/end ordering of a frame and cycles the frame-in-flight slot.
#[derive(Debug, Default, Clone)]
pub struct FrameTracker {
    state: FrameState,
    frame_index: usize,
    image_index: u32,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.state != FrameState::Idle
    }

    /// Slot of the frame being recorded, or of the next one while idle.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn image_index(&self) -> Result<u32> {
        if !self.is_frame_in_progress() {
            return Err(eyre!("Cannot get image index when frame is not in progress"));
        }
        Ok(self.image_index)
    }

    /// Errors if a frame is being recorded. `action` names what the caller was about to do.
    pub fn ensure_idle(&self, action: &str) -> Result<()> {
        if self.is_frame_in_progress() {
            return Err(eyre!(
                "Can't {} while a frame is already in progress ({:?})",
                action,
                self.state,
            ));
        }
        Ok(())
    }

    pub fn begin_frame(&mut self, image_index: u32) -> Result<()> {
        self.ensure_idle("call begin_frame")?;
        self.image_index = image_index;
        self.state = FrameState::Recording;
        Ok(())
    }

    pub fn begin_render_pass(&mut self) -> Result<()> {
        self.require_state(FrameState::Recording, "begin a render pass")?;
        self.state = FrameState::InRenderPass;
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        self.require_state(FrameState::InRenderPass, "end a render pass")?;
        self.state = FrameState::Recording;
        Ok(())
    }

    /// Closes the frame and returns the image it targeted.
    pub fn end_frame(&mut self) -> Result<u32> {
        self.require_state(FrameState::Recording, "end a frame")?;
        self.state = FrameState::Idle;
        self.frame_index = (self.frame_index + 1) % MAX_FRAMES_IN_FLIGHT;
        Ok(self.image_index)
    }

    fn require_state(&self, expected: FrameState, action: &str) -> Result<()> {
        if self.state != expected {
            return Err(eyre!(
                "Can't {} while the frame is {:?}, expected {:?}",
                action,
                self.state,
                expected,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use ash::vk;
    use ash::vk::Handle;
    use super::*;
    use crate::renderer::contexts::frame_ctx::images_in_flight::ImagesInFlight;

    fn run_frame(tracker: &mut FrameTracker, image_index: u32) -> Result<u32> {
        tracker.begin_frame(image_index)?;
        tracker.begin_render_pass()?;
        tracker.end_render_pass()?;
        tracker.end_frame()
    }

    #[test]
    fn full_frame_returns_to_idle() {
        let mut tracker = FrameTracker::new();
        assert_eq!(run_frame(&mut tracker, 1).ok(), Some(1));
        assert_eq!(tracker.state(), FrameState::Idle);
        assert_eq!(tracker.frame_index(), 1);
    }

    #[test]
    fn double_begin_frame_is_an_error() {
        let mut tracker = FrameTracker::new();
        assert!(tracker.begin_frame(0).is_ok());
        let err = tracker.begin_frame(1).unwrap_err();
        assert!(err.to_string().contains("already in progress"));
        // The frame that was already running is untouched
        assert_eq!(tracker.state(), FrameState::Recording);
        assert_eq!(tracker.image_index().ok(), Some(0));
    }

    #[test]
    fn pass_calls_out_of_order_are_errors() {
        let mut tracker = FrameTracker::new();
        assert!(tracker.begin_render_pass().is_err());
        assert!(tracker.end_render_pass().is_err());
        assert!(tracker.end_frame().is_err());

        tracker.begin_frame(0).unwrap();
        assert!(tracker.end_render_pass().is_err());
        tracker.begin_render_pass().unwrap();
        assert!(tracker.begin_render_pass().is_err());
        // Frame can't end with the pass still open
        assert!(tracker.end_frame().is_err());
        assert_eq!(tracker.state(), FrameState::InRenderPass);
    }

    #[test]
    fn image_index_only_while_in_progress() {
        let mut tracker = FrameTracker::new();
        assert!(tracker.image_index().is_err());
        tracker.begin_frame(2).unwrap();
        assert_eq!(tracker.image_index().ok(), Some(2));
    }

    #[test]
    fn swapchain_recreation_needs_an_idle_frame() {
        let mut tracker = FrameTracker::new();
        assert!(tracker.ensure_idle("recreate the swapchain").is_ok());

        tracker.begin_frame(0).unwrap();
        let err = tracker.ensure_idle("recreate the swapchain").unwrap_err();
        assert!(err.to_string().contains("recreate the swapchain"));

        tracker.begin_render_pass().unwrap();
        assert!(tracker.ensure_idle("recreate the swapchain").is_err());
        // Rejection leaves the open pass alone
        assert_eq!(tracker.state(), FrameState::InRenderPass);

        tracker.end_render_pass().unwrap();
        tracker.end_frame().unwrap();
        assert!(tracker.ensure_idle("recreate the swapchain").is_ok());
    }

    #[test]
    fn command_buffer_slots_do_not_depend_on_image_count() {
        let frames = 12;
        let expected: Vec<usize> = (0..frames).map(|frame| frame % MAX_FRAMES_IN_FLIGHT).collect();

        for image_count in [2u32, 3, 4] {
            let mut tracker = FrameTracker::new();
            let mut slots = Vec::new();
            for frame in 0..frames {
                slots.push(tracker.frame_index());
                run_frame(&mut tracker, (frame as u32 * 7 + 1) % image_count).unwrap();
            }

            assert_eq!(slots, expected, "slot order changed with {} images", image_count);
            let distinct: HashSet<_> = slots.iter().copied().collect();
            assert_eq!(distinct.len(), MAX_FRAMES_IN_FLIGHT);
        }
    }

    #[test]
    fn image_reacquired_by_other_slot_waits_on_previous_owner() {
        // Image 0 is acquired twice in a row, so slot 1 inherits slot 0's fence for it
        let slot_fences = [vk::Fence::from_raw(100), vk::Fence::from_raw(101)];
        let mut tracker = FrameTracker::new();
        let mut images_in_flight = ImagesInFlight::new(3);

        let mut waited_on = Vec::new();
        for image_index in [0u32, 0, 2] {
            let fence = slot_fences[tracker.frame_index()];
            waited_on.push(images_in_flight.claim(image_index, fence));
            run_frame(&mut tracker, image_index).unwrap();
        }

        assert_eq!(waited_on, vec![None, Some(slot_fences[0]), None]);
        assert_eq!(images_in_flight.owner(0), Some(slot_fences[1]));
        assert_eq!(images_in_flight.owner(2), Some(slot_fences[0]));
    }
}
