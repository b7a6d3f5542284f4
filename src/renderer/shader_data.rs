use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Data unique to each frame passed into the global uniform buffer
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct GlobalUbo {
    pub projection_view: Mat4,
    pub light_direction: Vec4,
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection_view: Mat4::IDENTITY,
            light_direction: Vec4::new(1.0, -3.0, -1.0, 0.0).normalize(),
        }
    }
}

/// Data unique to each draw call passed as a push constant
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct PushConstants {
    pub mesh_matrix: Mat4,
    pub normal_matrix: Mat4,
}

impl Default for PushConstants {
    fn default() -> Self {
        Self {
            mesh_matrix: Mat4::IDENTITY,
            normal_matrix: Mat4::IDENTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constants_fit_guaranteed_range() {
        // Every implementation guarantees at least 128 bytes of push constants
        assert!(size_of::<PushConstants>() <= 128);
        assert_eq!(size_of::<PushConstants>(), 128);
    }
}
