use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::mem::offset_of;

/// Data unique to each vertex passed as elements into a vertex buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self {
            position,
            color,
            ..Default::default()
        }
    }

    /// Bitwise identity of the vertex, usable as a hash key.
    pub fn key(&self) -> [u32; 11] {
        bytemuck::cast(*self)
    }

    pub fn input_description() -> VertexInputDescription {
        let bindings = vec![
            vk::VertexInputBindingDescription::default()
                .binding(0)
                .stride(size_of::<Vertex>() as u32)
                .input_rate(vk::VertexInputRate::VERTEX),
        ];

        let attribute = |location: u32, format: vk::Format, offset: usize| {
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(location)
                .format(format)
                .offset(offset as u32)
        };
        let attributes = vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
        ];

        VertexInputDescription {
            bindings,
            attributes,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct VertexInputDescription {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 11 * size_of::<f32>());
    }

    #[test]
    fn attributes_follow_field_layout() {
        let desc = Vertex::input_description();
        assert_eq!(desc.bindings.len(), 1);
        assert_eq!(desc.bindings[0].stride, 44);

        let offsets = desc.attributes.iter().map(|a| a.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 12, 24, 36]);
        assert_eq!(desc.attributes[3].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn equal_vertices_share_a_key() {
        let a = Vertex::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE);
        let b = Vertex::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE);
        let c = Vertex::new(Vec3::new(1.0, 2.0, 3.5), Vec3::ONE);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }
}
