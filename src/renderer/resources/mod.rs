//! Objects the app creates and hands to the renderer: meshes, their vertex layout, and shaders.

pub mod mesh;
pub mod shader;
pub mod vertex;
