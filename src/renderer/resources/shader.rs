use std::path::{Path, PathBuf};
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

const SHADERS_DIR: &str = "shaders-built";

/// Vertex and fragment modules for one graphics pipeline
pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    /// Loads `<name>.vert.spv` and `<name>.frag.spv` produced by the build script.
    pub fn new(shader_name: &str, device: Arc<ash::Device>) -> Result<Self> {
        let (vert_path, frag_path) = spirv_paths(Path::new(SHADERS_DIR), shader_name);
        let vert_mod = create_shader_module(&vert_path, &device)?;
        let frag_mod = match create_shader_module(&frag_path, &device) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_mod, None) };
                return Err(e);
            }
        };
        Ok(Self { vert_mod, frag_mod, device })
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

fn spirv_paths(dir: &Path, shader_name: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{}.vert.spv", shader_name)),
        dir.join(format!("{}.frag.spv", shader_name)),
    )
}

fn create_shader_module(filepath: &Path, device: &ash::Device) -> Result<vk::ShaderModule> {
    let bytes = std::fs::read(filepath)
        .map_err(|e| eyre!("Failed to read shader {:?}: {}", filepath, e))?;
    // Copies into u32 words, the file contents are not guaranteed to be aligned
    let code = ash::util::read_spv(&mut std::io::Cursor::new(&bytes))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&code);
    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_is_part_of_the_file_name() {
        let (vert, frag) = spirv_paths(Path::new("shaders-built"), "basic");
        assert_eq!(vert, Path::new("shaders-built/basic.vert.spv"));
        assert_eq!(frag, Path::new("shaders-built/basic.frag.spv"));
    }
}
