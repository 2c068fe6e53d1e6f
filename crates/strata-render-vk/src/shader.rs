// SPDX-License-Identifier: CEPL-1.0
use ash::util::read_spv;
use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CallExt, RenderError, Result};
use crate::gpu::Gpu;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// On-disk name under a shader directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Vertex => "vert.spv",
            Self::Fragment => "frag.spv",
        }
    }
}

/// Supplies SPIR-V for each stage. Every stage's entry point is `main`.
pub trait ShaderSource {
    fn spirv(&self, stage: ShaderStage) -> Result<Vec<u32>>;
}

fn words(name: &str, bytes: &[u8]) -> Result<Vec<u32>> {
    read_spv(&mut Cursor::new(bytes)).map_err(|source| RenderError::ShaderUnavailable {
        op: "read_spv",
        name: name.to_owned(),
        source,
    })
}

/// Shaders compiled by the build script and baked into the binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedShaders;

impl ShaderSource for EmbeddedShaders {
    fn spirv(&self, stage: ShaderStage) -> Result<Vec<u32>> {
        match stage {
            ShaderStage::Vertex => words(
                "quad.vert.spv",
                include_bytes!(concat!(env!("OUT_DIR"), "/quad.vert.spv")),
            ),
            ShaderStage::Fragment => words(
                "quad.frag.spv",
                include_bytes!(concat!(env!("OUT_DIR"), "/quad.frag.spv")),
            ),
        }
    }
}

/// Reads `vert.spv` / `frag.spv` from a directory at pipeline build time.
#[derive(Clone, Debug)]
pub struct FileShaders {
    dir: PathBuf,
}

impl FileShaders {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ShaderSource for FileShaders {
    fn spirv(&self, stage: ShaderStage) -> Result<Vec<u32>> {
        let path = self.dir.join(stage.file_name());
        let name = path.display().to_string();
        let bytes = std::fs::read(&path).map_err(|source| RenderError::ShaderUnavailable {
            op: "read shader file",
            name: name.clone(),
            source,
        })?;
        words(&name, &bytes)
    }
}

pub fn load_shader<G: Gpu>(
    gpu: &G,
    source: &dyn ShaderSource,
    stage: ShaderStage,
) -> Result<vk::ShaderModule> {
    let code = source.spirv(stage)?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    let module = gpu.create_shader_module(&ci).call("vkCreateShaderModule")?;
    debug!(?stage, words = code.len(), "shader module created");
    Ok(module)
}
