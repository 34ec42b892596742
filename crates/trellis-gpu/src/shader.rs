//! SPIR-V shader modules.

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{GpuError, Result};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Words in a SPIR-V header.
const HEADER_WORDS: usize = 5;

/// Entry point used for every stage.
pub const ENTRY_POINT: &CStr = c"main";

/// Check the SPIR-V header of an already word-aligned module.
pub fn validate_spirv(words: &[u32]) -> Result<()> {
    match words.first() {
        None => Err(GpuError::InvalidSpirv("empty module".to_string())),
        Some(&magic) if magic != SPIRV_MAGIC => Err(GpuError::InvalidSpirv(format!(
            "bad magic number {magic:#010x}"
        ))),
        Some(_) if words.len() < HEADER_WORDS => Err(GpuError::InvalidSpirv(format!(
            "truncated header ({} words)",
            words.len()
        ))),
        Some(_) => Ok(()),
    }
}

/// Decode SPIR-V bytes into words.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(GpuError::InvalidSpirv(format!(
            "length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let words = ash::util::read_spv(&mut Cursor::new(bytes))?;
    validate_spirv(&words)?;
    Ok(words)
}

/// A shader module, destroyed on drop.
pub struct ShaderModule {
    device: Arc<Device>,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Load a `.spv` file.
    pub fn from_file(device: &Arc<Device>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        debug!("Loading shader {}", path.display());
        Self::from_spirv_bytes(device, &bytes)
    }

    pub fn from_spirv_bytes(device: &Arc<Device>, bytes: &[u8]) -> Result<Self> {
        let words = spirv_words(bytes)?;
        Self::from_words(device, &words)
    }

    pub fn from_words(device: &Arc<Device>, words: &[u32]) -> Result<Self> {
        validate_spirv(words)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(words);
        let module = unsafe { device.raw().create_shader_module(&create_info, None) }
            .map_err(|e| GpuError::ShaderCompilation(e.to_string()))?;
        Ok(Self {
            device: Arc::clone(device),
            module,
        })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage info using the `main` entry point.
    pub fn stage_info(
        &self,
        stage: vk::ShaderStageFlags,
    ) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_shader_module(self.module, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<u32> {
        // magic, version 1.0, generator, bound, schema
        vec![SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
    }

    #[test]
    fn accepts_valid_header() {
        assert!(validate_spirv(&header()).is_ok());
    }

    #[test]
    fn rejects_bad_magic_and_empty() {
        let mut words = header();
        words[0] = 0xdead_beef;
        assert!(matches!(validate_spirv(&words), Err(GpuError::InvalidSpirv(_))));
        assert!(validate_spirv(&[]).is_err());
        assert!(validate_spirv(&[SPIRV_MAGIC]).is_err());
    }

    #[test]
    fn decodes_little_endian_bytes() {
        let bytes: Vec<u8> = header().iter().flat_map(|w| w.to_le_bytes()).collect();
        assert_eq!(spirv_words(&bytes).unwrap(), header());
    }

    #[test]
    fn rejects_unaligned_bytes() {
        let mut bytes: Vec<u8> = header().iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes.push(0);
        assert!(matches!(spirv_words(&bytes), Err(GpuError::InvalidSpirv(_))));
    }

    #[test]
    fn rejects_text() {
        assert!(spirv_words(b"#version 450\n\0\0\0").is_err());
    }
}
