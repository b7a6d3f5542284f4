use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use glam::{Vec2, Vec3};
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::internals::buffer::Buffer;
use crate::renderer::resources::vertex::Vertex;

/// CPU side geometry, either written by hand or loaded from an OBJ file
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshBuilder {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshBuilder {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn from_obj_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: false,
                ..Default::default()
            },
        )
            .map_err(|e| eyre!("Failed to load {:?}: {}", path, e))?;

        let builder = Self::from_obj_meshes(models.iter().map(|model| &model.mesh));
        log::debug!(
            "Loaded {:?}: {} vertices, {} indices",
            path,
            builder.vertices.len(),
            builder.indices.len(),
        );
        Ok(builder)
    }

    /// Flattens OBJ meshes into one vertex list, reusing vertices that are identical in every attribute.
    pub fn from_obj_meshes<'a>(meshes: impl IntoIterator<Item = &'a tobj::Mesh>) -> Self {
        let mut builder = Self::default();
        let mut unique_vertices: HashMap<[u32; 11], u32> = HashMap::new();

        for mesh in meshes {
            for (i, &position_index) in mesh.indices.iter().enumerate() {
                let p = position_index as usize;
                let vertex = Vertex {
                    position: vec3_at(&mesh.positions, p).unwrap_or(Vec3::ZERO),
                    color: vec3_at(&mesh.vertex_color, p).unwrap_or(Vec3::ONE),
                    normal: mesh.normal_indices
                        .get(i)
                        .and_then(|&n| vec3_at(&mesh.normals, n as usize))
                        .unwrap_or(Vec3::ZERO),
                    uv: mesh.texcoord_indices
                        .get(i)
                        .and_then(|&t| vec2_at(&mesh.texcoords, t as usize))
                        .unwrap_or(Vec2::ZERO),
                };

                let index = *unique_vertices.entry(vertex.key()).or_insert_with(|| {
                    builder.vertices.push(vertex);
                    (builder.vertices.len() - 1) as u32
                });
                builder.indices.push(index);
            }
        }

        builder
    }

    /// Unit cube centered on `offset`, one flat color per face.
    pub fn cube(offset: Vec3) -> Self {
        // (normal, color) per face; y points down so -Y is the top
        let faces = [
            (Vec3::NEG_X, Vec3::new(0.9, 0.9, 0.9)),
            (Vec3::X, Vec3::new(0.8, 0.8, 0.1)),
            (Vec3::NEG_Y, Vec3::new(0.9, 0.6, 0.1)),
            (Vec3::Y, Vec3::new(0.8, 0.1, 0.1)),
            (Vec3::Z, Vec3::new(0.1, 0.1, 0.8)),
            (Vec3::NEG_Z, Vec3::new(0.1, 0.8, 0.1)),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, color) in faces {
            // Two axes spanning the face
            let u = if normal.x != 0.0 { Vec3::Y } else { Vec3::X };
            let v = normal.cross(u);
            let base = vertices.len() as u32;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                vertices.push(Vertex {
                    position: offset + normal * 0.5 + u * su + v * sv,
                    color,
                    normal,
                    uv: Vec2::new(su + 0.5, sv + 0.5),
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self { vertices, indices }
    }
}

fn vec3_at(data: &[f32], index: usize) -> Option<Vec3> {
    data.get(3 * index..3 * index + 3).map(Vec3::from_slice)
}

fn vec2_at(data: &[f32], index: usize) -> Option<Vec2> {
    data.get(2 * index..2 * index + 2).map(Vec2::from_slice)
}

/// Geometry living in device local vertex and index buffers
pub struct Mesh {
    vertex_buffer: Buffer,
    vertex_count: u32,
    index_buffer: Option<Buffer>,
    index_count: u32,
    device: Arc<ash::Device>,
}

impl Mesh {
    /// Uploads the geometry and waits for the copy to finish, so the mesh is drawable as soon as this returns.
    pub fn new(dev: &RenderDevice, builder: &MeshBuilder) -> Result<Self> {
        if builder.vertices.len() < 3 {
            return Err(eyre!("Vertex count must be at least 3, got {}", builder.vertices.len()));
        }

        let vertex_buffer = upload_buffer(
            dev,
            &builder.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "Vertex Buffer",
        )?;
        let index_buffer = if builder.indices.is_empty() {
            None
        } else {
            Some(upload_buffer(
                dev,
                &builder.indices,
                vk::BufferUsageFlags::INDEX_BUFFER,
                "Index Buffer",
            )?)
        };

        Ok(Self {
            vertex_buffer,
            vertex_count: builder.vertices.len() as u32,
            index_buffer,
            index_count: builder.indices.len() as u32,
            device: dev.logical.clone(),
        })
    }

    pub fn from_obj_file(dev: &RenderDevice, path: impl AsRef<Path>) -> Result<Self> {
        Self::new(dev, &MeshBuilder::from_obj_file(path)?)
    }

    pub fn has_index_buffer(&self) -> bool {
        self.index_buffer.is_some()
    }

    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[self.vertex_buffer.buffer],
                &[0],
            );
            if let Some(index_buffer) = &self.index_buffer {
                self.device.cmd_bind_index_buffer(
                    command_buffer,
                    index_buffer.buffer,
                    0,
                    vk::IndexType::UINT32,
                );
            }
        }
    }

    pub fn draw(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            if self.has_index_buffer() {
                self.device.cmd_draw_indexed(command_buffer, self.index_count, 1, 0, 0, 0);
            } else {
                self.device.cmd_draw(command_buffer, self.vertex_count, 1, 0, 0);
            }
        }
    }
}

/// Copies `data` into a new GPU-only buffer through a host visible staging buffer.
fn upload_buffer<T: bytemuck::Pod>(
    dev: &RenderDevice,
    data: &[T],
    usage: vk::BufferUsageFlags,
    name: &str,
) -> Result<Buffer> {
    let size = size_of_val(data) as vk::DeviceSize;

    let mut staging = Buffer::new(
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        "Staging Buffer",
        MemoryLocation::CpuToGpu,
        dev.memory_allocator(),
        dev.logical.clone(),
    )?;
    staging.write(data, 0)?;

    let buffer = Buffer::new(
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        name,
        MemoryLocation::GpuOnly,
        dev.memory_allocator(),
        dev.logical.clone(),
    )?;

    dev.immediate_submit(|cmd, device| {
        let region = vk::BufferCopy::default().size(size);
        unsafe {
            device.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
        }
        Ok(())
    })?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj_mesh(positions: Vec<f32>, indices: Vec<u32>) -> tobj::Mesh {
        tobj::Mesh {
            positions,
            indices,
            ..Default::default()
        }
    }

    #[test]
    fn shared_obj_vertices_are_deduplicated() {
        // Quad as two triangles sharing an edge
        let mesh = obj_mesh(
            vec![
                0.0, 0.0, 0.0,
                1.0, 0.0, 0.0,
                1.0, 1.0, 0.0,
                0.0, 1.0, 0.0,
            ],
            vec![0, 1, 2, 0, 2, 3],
        );
        let builder = MeshBuilder::from_obj_meshes([&mesh]);
        assert_eq!(builder.vertices.len(), 4);
        assert_eq!(builder.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(builder.vertices[2].position, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn vertices_differing_in_normal_stay_separate() {
        let mut mesh = obj_mesh(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], vec![0, 1, 2, 0, 1, 2]);
        mesh.normals = vec![0.0, 0.0, 1.0, 0.0, 0.0, -1.0];
        mesh.normal_indices = vec![0, 0, 0, 1, 1, 1];

        let builder = MeshBuilder::from_obj_meshes([&mesh]);
        assert_eq!(builder.vertices.len(), 6);
        assert_eq!(builder.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(builder.vertices[3].normal, Vec3::NEG_Z);
    }

    #[test]
    fn missing_vertex_colors_default_to_white() {
        let mesh = obj_mesh(vec![0.0; 9], vec![0, 1, 2]);
        let builder = MeshBuilder::from_obj_meshes([&mesh]);
        assert!(builder.vertices.iter().all(|v| v.color == Vec3::ONE));
    }

    #[test]
    fn cube_has_six_flat_faces() {
        let cube = MeshBuilder::cube(Vec3::ZERO);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for v in &cube.vertices {
            assert!(v.position.abs().max_element() <= 0.5 + f32::EPSILON);
            // Every vertex sits on the face its normal points out of
            assert!((v.position.dot(v.normal) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn cube_is_offset() {
        let offset = Vec3::new(1.0, 2.0, 3.0);
        let centered = MeshBuilder::cube(Vec3::ZERO);
        let moved = MeshBuilder::cube(offset);
        for (a, b) in centered.vertices.iter().zip(&moved.vertices) {
            assert_eq!(a.position + offset, b.position);
        }
    }
}
