use ash::vk;

/// Remembers which frame slot's fence last claimed each swapchain image.
///
/// With fewer frame slots than images (or an out of order acquire), two slots can end up
/// targeting the same image. The fence recorded here must be waited on before the image is reused.
#[derive(Debug, Clone)]
pub struct ImagesInFlight {
    fences: Vec<vk::Fence>,
}

impl ImagesInFlight {
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![vk::Fence::null(); image_count],
        }
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }

    /// Records `fence` as the owner of `image_index` and returns the previous owner, if any.
    /// The caller has to wait on the returned fence before submitting work for the image.
    pub fn claim(&mut self, image_index: u32, fence: vk::Fence) -> Option<vk::Fence> {
        let slot = self.fences.get_mut(image_index as usize)?;
        let previous = std::mem::replace(slot, fence);
        (previous != vk::Fence::null()).then_some(previous)
    }

    pub fn owner(&self, image_index: u32) -> Option<vk::Fence> {
        self.fences
            .get(image_index as usize)
            .copied()
            .filter(|fence| *fence != vk::Fence::null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    #[test]
    fn starts_with_no_owners() {
        let table = ImagesInFlight::new(3);
        assert_eq!(table.len(), 3);
        assert!((0..3).all(|i| table.owner(i).is_none()));
    }

    #[test]
    fn first_claim_needs_no_wait() {
        let mut table = ImagesInFlight::new(3);
        assert_eq!(table.claim(1, fence(10)), None);
        assert_eq!(table.owner(1), Some(fence(10)));
    }

    #[test]
    fn reclaiming_an_image_returns_the_fence_to_wait_on() {
        let mut table = ImagesInFlight::new(3);
        table.claim(2, fence(10));
        // Another slot acquires the same image while slot 10 may still be in flight
        assert_eq!(table.claim(2, fence(20)), Some(fence(10)));
        assert_eq!(table.owner(2), Some(fence(20)));
    }

    #[test]
    fn every_reuse_is_preceded_by_a_wait_on_the_last_owner() {
        // Two frame slots cycling over three images, acquired in a scrambled order
        let slots = [fence(1), fence(2)];
        let acquired = [0u32, 1, 2, 2, 0, 1, 1, 0];
        let mut table = ImagesInFlight::new(3);
        let mut last_owner: [Option<vk::Fence>; 3] = [None; 3];

        for (frame, image) in acquired.into_iter().enumerate() {
            let slot_fence = slots[frame % slots.len()];
            let must_wait = table.claim(image, slot_fence);
            assert_eq!(must_wait, last_owner[image as usize]);
            last_owner[image as usize] = Some(slot_fence);
        }
    }

    #[test]
    fn out_of_range_image_is_ignored() {
        let mut table = ImagesInFlight::new(2);
        assert_eq!(table.claim(5, fence(1)), None);
        assert_eq!(table.owner(5), None);
    }
}
