//! Binding layout generation for WGSL.
//!
//! Generates `@group/@binding` declarations from kernel parameters. Binding 0
//! is always the dispatch-data uniform; resources follow in parameter order,
//! and the shared sampler, when any texture is sampled, comes last.

use std::borrow::Cow;

use kernelforge_core::kernel::{BindingDescriptor, BindingKind, TextureDimension};
use kernelforge_core::layout::BufferKind;
use kernelforge_core::types::TexelFormat;
use kernelforge_core::DISPATCH_DATA_BINDING;

use crate::dispatch::DATA;
use crate::{Result, TranspileError};

/// Name of the dispatch-data struct.
pub const DISPATCH_DATA_STRUCT: &str = "_KfDispatchData";
/// Name of the shared sampler.
pub const SAMPLER: &str = "_kf_sampler";
/// Prefix of constant-buffer wrapper structs.
pub const CONSTANT_WRAPPER_PREFIX: &str = "_KfConstant_";

/// Access mode for storage bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access.
    Read,
    /// Read-write access.
    ReadWrite,
}

impl AccessMode {
    /// Get the WGSL access mode string.
    pub fn to_wgsl(&self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::ReadWrite => "read_write",
        }
    }
}

/// Description of one binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingLayout {
    /// Binding group.
    pub group: u32,
    /// Binding number within the group.
    pub binding: u32,
    /// Kernel parameter name.
    pub name: String,
    /// Variable name in the shader.
    pub wgsl_name: String,
    /// Resource kind.
    pub kind: BindingKind,
    /// WGSL element type of a buffer.
    pub element: String,
}

impl BindingLayout {
    /// The dispatch-data uniform.
    pub fn dispatch_data(group: u32) -> Self {
        Self {
            group,
            binding: DISPATCH_DATA_BINDING,
            name: DATA.to_string(),
            wgsl_name: DATA.to_string(),
            kind: BindingKind::DispatchData,
            element: DISPATCH_DATA_STRUCT.to_string(),
        }
    }

    /// A storage buffer. Constant buffers take the wrapper struct as element.
    pub fn buffer(
        group: u32,
        binding: u32,
        name: &str,
        wgsl_name: &str,
        kind: BufferKind,
        element: &str,
    ) -> Self {
        Self {
            group,
            binding,
            name: name.to_string(),
            wgsl_name: wgsl_name.to_string(),
            kind: BindingKind::Buffer(kind),
            element: element.to_string(),
        }
    }

    /// A sampled or storage texture.
    pub fn texture(
        group: u32,
        binding: u32,
        name: &str,
        wgsl_name: &str,
        dimension: TextureDimension,
        format: TexelFormat,
        read_write: bool,
    ) -> Result<Self> {
        if read_write && format.storage_format().is_none() {
            return Err(TranspileError::WgslLimitation(format!(
                "`{format:?}` cannot back a read-write texture"
            )));
        }
        Ok(Self {
            group,
            binding,
            name: name.to_string(),
            wgsl_name: wgsl_name.to_string(),
            kind: BindingKind::Texture {
                dimension,
                format,
                read_write,
            },
            element: String::new(),
        })
    }

    /// The shared sampler.
    pub fn sampler(group: u32, binding: u32, filtering: bool) -> Self {
        Self {
            group,
            binding,
            name: SAMPLER.to_string(),
            wgsl_name: SAMPLER.to_string(),
            kind: BindingKind::Sampler { filtering },
            element: String::new(),
        }
    }

    /// Storage access mode, for storage bindings.
    pub fn access(&self) -> Option<AccessMode> {
        match self.kind {
            BindingKind::Buffer(BufferKind::ReadWrite) => Some(AccessMode::ReadWrite),
            BindingKind::Buffer(_) => Some(AccessMode::Read),
            BindingKind::Texture {
                read_write: true, ..
            } => Some(AccessMode::ReadWrite),
            _ => None,
        }
    }

    /// Generate the WGSL binding declaration.
    pub fn to_wgsl(&self) -> String {
        let prefix = format!("@group({}) @binding({})", self.group, self.binding);
        match self.kind {
            BindingKind::DispatchData => {
                format!("{prefix} var<uniform> {}: {};", self.wgsl_name, self.element)
            }
            BindingKind::Buffer(_) => format!(
                "{prefix} var<storage, {}> {}: array<{}>;",
                self.access().unwrap_or(AccessMode::Read).to_wgsl(),
                self.wgsl_name,
                self.element
            ),
            BindingKind::Texture {
                dimension,
                format,
                read_write,
            } => {
                let rank = dimension.rank();
                match format.storage_format().filter(|_| read_write) {
                    Some(storage) => format!(
                        "{prefix} var {}: texture_storage_{rank}d<{storage}, read_write>;",
                        self.wgsl_name
                    ),
                    None => format!(
                        "{prefix} var {}: texture_{rank}d<{}>;",
                        self.wgsl_name,
                        format.sample_kind().wgsl_scalar()
                    ),
                }
            }
            BindingKind::Sampler { .. } => format!("{prefix} var {}: sampler;", self.wgsl_name),
        }
    }

    /// Runtime descriptor for this binding.
    pub fn descriptor(&self) -> BindingDescriptor {
        BindingDescriptor {
            binding: self.binding,
            name: Cow::Owned(self.name.clone()),
            kind: self.kind,
        }
    }
}

/// Generate binding declarations.
pub fn generate_bindings(bindings: &[BindingLayout]) -> String {
    bindings
        .iter()
        .map(|b| b.to_wgsl())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Name of the wrapper struct for constant-buffer elements of `element`.
pub fn constant_wrapper_name(element: &str) -> String {
    format!("{CONSTANT_WRAPPER_PREFIX}{element}")
}

/// Declaration of a constant-buffer wrapper struct padded to `stride`.
pub fn constant_wrapper(element: &str, element_wgsl: &str, stride: usize) -> String {
    format!(
        "struct {} {{\n    @size({stride}) value: {element_wgsl},\n}}",
        constant_wrapper_name(element)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_data_binding() {
        assert_eq!(
            BindingLayout::dispatch_data(0).to_wgsl(),
            "@group(0) @binding(0) var<uniform> _kf_data: _KfDispatchData;"
        );
    }

    #[test]
    fn test_storage_read_binding() {
        let binding = BindingLayout::buffer(0, 1, "input", "input", BufferKind::ReadOnly, "f32");
        assert_eq!(
            binding.to_wgsl(),
            "@group(0) @binding(1) var<storage, read> input: array<f32>;"
        );
    }

    #[test]
    fn test_storage_read_write_binding() {
        let binding =
            BindingLayout::buffer(1, 2, "output", "output", BufferKind::ReadWrite, "vec4<f32>");
        assert_eq!(
            binding.to_wgsl(),
            "@group(1) @binding(2) var<storage, read_write> output: array<vec4<f32>>;"
        );
        assert_eq!(binding.access(), Some(AccessMode::ReadWrite));
    }

    #[test]
    fn test_constant_buffer_uses_wrapper() {
        let binding = BindingLayout::buffer(
            0,
            1,
            "weights",
            "weights",
            BufferKind::Constant,
            &constant_wrapper_name("f32"),
        );
        assert_eq!(
            binding.to_wgsl(),
            "@group(0) @binding(1) var<storage, read> weights: array<_KfConstant_f32>;"
        );
        assert_eq!(
            constant_wrapper("f32", "f32", 16),
            "struct _KfConstant_f32 {\n    @size(16) value: f32,\n}"
        );
    }

    #[test]
    fn test_texture_bindings() {
        let sampled = BindingLayout::texture(
            0,
            1,
            "image",
            "image",
            TextureDimension::D2,
            TexelFormat::Rgba8Unorm,
            false,
        )
        .unwrap();
        assert_eq!(
            sampled.to_wgsl(),
            "@group(0) @binding(1) var image: texture_2d<f32>;"
        );

        let storage = BindingLayout::texture(
            0,
            2,
            "volume",
            "volume",
            TextureDimension::D3,
            TexelFormat::R32Float,
            true,
        )
        .unwrap();
        assert_eq!(
            storage.to_wgsl(),
            "@group(0) @binding(2) var volume: texture_storage_3d<r32float, read_write>;"
        );

        let ints = BindingLayout::texture(
            0,
            3,
            "labels",
            "labels",
            TextureDimension::D2,
            TexelFormat::R32Uint,
            false,
        )
        .unwrap();
        assert!(ints.to_wgsl().ends_with("texture_2d<u32>;"));

        assert!(BindingLayout::texture(
            0,
            4,
            "mask",
            "mask",
            TextureDimension::D2,
            TexelFormat::R8Unorm,
            true
        )
        .is_err());
    }

    #[test]
    fn test_descriptor() {
        let binding = BindingLayout::sampler(0, 5, true);
        assert_eq!(binding.to_wgsl(), "@group(0) @binding(5) var _kf_sampler: sampler;");
        let descriptor = binding.descriptor();
        assert_eq!(descriptor.binding, 5);
        assert_eq!(descriptor.kind, BindingKind::Sampler { filtering: true });
    }

    #[test]
    fn test_generate_bindings() {
        let bindings = vec![
            BindingLayout::dispatch_data(0),
            BindingLayout::buffer(0, 1, "input", "input", BufferKind::ReadOnly, "f32"),
        ];
        let wgsl = generate_bindings(&bindings);
        assert!(wgsl.contains("@binding(0)"));
        assert!(wgsl.contains("@binding(1)"));
    }
}
