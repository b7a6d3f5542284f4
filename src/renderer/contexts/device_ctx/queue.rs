use std::hash::Hash;
use ash::vk;

pub struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(family: QueueFamily, handle: vk::Queue) -> Self {
        Self { family, handle }
    }
}

#[derive(Debug, Clone)]
pub struct QueueFamily {
    pub index: u32,
    pub properties: vk::QueueFamilyProperties,
}

impl QueueFamily {
    pub fn new(index: u32, properties: vk::QueueFamilyProperties) -> Self {
        Self { index, properties }
    }
}

impl PartialEq for QueueFamily {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for QueueFamily {}

impl Hash for QueueFamily {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

/// Family indices for the graphics and present queues, which may coincide
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Picks a graphics family and a present family, preferring one family that does both.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        supports_present: impl Fn(u32) -> bool,
    ) -> Self {
        let graphics_families = families
            .iter()
            .enumerate()
            .filter(|(_, props)| {
                props.queue_count > 0 && props.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .map(|(i, _)| i as u32)
            .collect::<Vec<_>>();

        if let Some(shared) = graphics_families.iter().copied().find(|&i| supports_present(i)) {
            return Self {
                graphics: Some(shared),
                present: Some(shared),
            };
        }

        let present = families
            .iter()
            .enumerate()
            .filter(|(_, props)| props.queue_count > 0)
            .map(|(i, _)| i as u32)
            .find(|&i| supports_present(i));

        Self {
            graphics: graphics_families.first().copied(),
            present,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Unique family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        let mut indices = Vec::with_capacity(2);
        for index in [self.graphics, self.present].into_iter().flatten() {
            if !indices.contains(&index) {
                indices.push(index);
            }
        }
        indices
    }
}

/// How swapchain images are shared between the graphics and present families.
pub fn image_sharing(graphics: u32, present: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics == present {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, vec![graphics, present])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_family_that_graphics_and_presents() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let indices = QueueFamilyIndices::find(&families, |i| i != 0);
        assert_eq!(indices.graphics, Some(2));
        assert_eq!(indices.present, Some(2));
        assert_eq!(indices.unique(), vec![2]);
    }

    #[test]
    fn allows_separate_present_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::find(&families, |i| i == 1);
        assert!(indices.is_complete());
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.unique(), vec![0, 1]);
    }

    #[test]
    fn incomplete_without_present_support() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::find(&families, |_| false);
        assert!(!indices.is_complete());
    }

    #[test]
    fn separate_families_share_images_concurrently() {
        assert_eq!(image_sharing(0, 0), (vk::SharingMode::EXCLUSIVE, vec![]));
        assert_eq!(image_sharing(0, 2), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }
}
