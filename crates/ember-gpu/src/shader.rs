//! Loading precompiled SPIR-V shaders.

use crate::error::{GpuError, Result};
use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Path of the compiled shader `name` inside `dir`.
pub fn shader_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.spv"))
}

/// Read a SPIR-V binary into words.
///
/// Missing files and binaries whose size is not a multiple of four bytes
/// are reported as errors rather than truncated.
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| GpuError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.len() % 4 != 0 {
        return Err(GpuError::ShaderMalformed {
            path: path.to_path_buf(),
            len: bytes.len(),
        });
    }

    ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(|source| GpuError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a SPIR-V file and create a shader module from it.
///
/// # Safety
/// The device must be valid.
pub unsafe fn load_shader_module(device: &ash::Device, path: &Path) -> Result<vk::ShaderModule> {
    let code = read_spirv(path)?;
    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

    let module = unsafe { device.create_shader_module(&create_info, None)? };
    tracing::debug!("Loaded shader {}", path.display());
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ember-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn names_resolve_to_spv_files() {
        assert_eq!(
            shader_path(Path::new("shaders"), "sky.comp"),
            PathBuf::from("shaders/sky.comp.spv")
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let path = std::env::temp_dir().join("ember-does-not-exist.spv");
        let err = read_spirv(&path).unwrap_err();

        assert!(matches!(err, GpuError::ShaderLoad { .. }));
        let message = err.to_string();
        assert!(!message.is_empty());
        assert!(message.contains("ember-does-not-exist.spv"));
    }

    #[test]
    fn partial_word_is_malformed() {
        let path = temp_file("partial.spv", &[0x03, 0x02, 0x23, 0x07, 0x00]);
        let err = read_spirv(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(err, GpuError::ShaderMalformed { len: 5, .. }));
    }

    #[test]
    fn whole_words_are_read() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x0723_0203_u32.to_le_bytes());
        bytes.extend_from_slice(&0x0001_0000_u32.to_le_bytes());
        let path = temp_file("valid.spv", &bytes);

        let words = read_spirv(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }
}
