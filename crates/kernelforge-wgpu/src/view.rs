//! Resource view descriptors.
//!
//! Every bindable resource creates exactly one view. A view is the
//! `(format, dimension, element stride)` triple kernels interpret the
//! allocation through, together with its access kind. The element stride of a
//! buffer view always comes from the layout engine's padded stride.

use kernelforge_core::error::{ForgeError, Result};
use kernelforge_core::kernel::{BindingKind, TextureDimension};
use kernelforge_core::layout::BufferKind;
use kernelforge_core::types::{TexelFormat, TexelSampleKind};

/// How a kernel accesses a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// Constant-buffer view.
    Constant,
    /// Read-only shader-resource view.
    ShaderResource,
    /// Read-write unordered-access view.
    UnorderedAccess,
}

impl ViewKind {
    /// The view a buffer of `kind` creates, if any.
    pub fn for_buffer(kind: BufferKind) -> Option<Self> {
        match kind {
            BufferKind::Constant => Some(ViewKind::Constant),
            BufferKind::ReadOnly => Some(ViewKind::ShaderResource),
            BufferKind::ReadWrite => Some(ViewKind::UnorderedAccess),
            BufferKind::ReadBack | BufferKind::Transfer => None,
        }
    }
}

/// Element format of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewFormat {
    /// Structured buffer elements.
    Structured,
    /// Texels of a texture.
    Texel(TexelFormat),
}

/// Shape of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewDimension {
    /// Linear buffer.
    Buffer,
    /// 2D texture.
    Texture2D,
    /// 3D texture.
    Texture3D,
}

/// The single view a resource exposes to kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewDescriptor {
    kind: ViewKind,
    format: ViewFormat,
    dimension: ViewDimension,
    element_stride: usize,
    binding: BindingKind,
}

impl ViewDescriptor {
    /// View over buffer elements `element_stride` bytes apart.
    pub fn buffer(kind: ViewKind, element_stride: usize) -> Self {
        let buffer_kind = match kind {
            ViewKind::Constant => BufferKind::Constant,
            ViewKind::ShaderResource => BufferKind::ReadOnly,
            ViewKind::UnorderedAccess => BufferKind::ReadWrite,
        };
        Self {
            kind,
            format: ViewFormat::Structured,
            dimension: ViewDimension::Buffer,
            element_stride,
            binding: BindingKind::Buffer(buffer_kind),
        }
    }

    /// View over the texels of a texture.
    ///
    /// Textures only create shader-resource or unordered-access views.
    pub fn texture(dimension: TextureDimension, format: TexelFormat, read_write: bool) -> Self {
        Self {
            kind: if read_write {
                ViewKind::UnorderedAccess
            } else {
                ViewKind::ShaderResource
            },
            format: ViewFormat::Texel(format),
            dimension: match dimension {
                TextureDimension::D2 => ViewDimension::Texture2D,
                TextureDimension::D3 => ViewDimension::Texture3D,
            },
            element_stride: format.bytes_per_texel(),
            binding: BindingKind::Texture {
                dimension,
                format,
                read_write,
            },
        }
    }

    /// Access kind.
    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    /// Element format.
    pub fn format(&self) -> ViewFormat {
        self.format
    }

    /// Shape.
    pub fn dimension(&self) -> ViewDimension {
        self.dimension
    }

    /// Bytes between consecutive elements as the device sees them.
    pub fn element_stride(&self) -> usize {
        self.element_stride
    }

    /// The kernel binding kind this view satisfies.
    pub fn binding_kind(&self) -> BindingKind {
        self.binding
    }

    /// Whether this view can be bound where a kernel expects `expected`.
    ///
    /// A read-write buffer may stand in for a read-only one since both share
    /// the natural element stride; everything else must match exactly.
    pub fn satisfies(&self, expected: &BindingKind) -> bool {
        match (expected, &self.binding) {
            (
                BindingKind::Buffer(BufferKind::ReadOnly),
                BindingKind::Buffer(BufferKind::ReadWrite),
            ) => true,
            (expected, actual) => expected == actual,
        }
    }
}

/// wgpu texture format backing a texel format.
pub fn texture_format(format: TexelFormat) -> wgpu::TextureFormat {
    match format {
        TexelFormat::R32Float => wgpu::TextureFormat::R32Float,
        TexelFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        TexelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TexelFormat::R32Sint => wgpu::TextureFormat::R32Sint,
        TexelFormat::R32Uint => wgpu::TextureFormat::R32Uint,
        TexelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TexelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TexelFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
    }
}

fn view_dimension(dimension: TextureDimension) -> wgpu::TextureViewDimension {
    match dimension {
        TextureDimension::D2 => wgpu::TextureViewDimension::D2,
        TextureDimension::D3 => wgpu::TextureViewDimension::D3,
    }
}

/// Bind group layout entry type for a kernel binding.
pub fn binding_type(kind: &BindingKind) -> Result<wgpu::BindingType> {
    Ok(match *kind {
        BindingKind::DispatchData => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingKind::Buffer(buffer_kind) => {
            let read_only = match ViewKind::for_buffer(buffer_kind) {
                Some(ViewKind::UnorderedAccess) => false,
                Some(_) => true,
                None => {
                    return Err(ForgeError::InvalidOperation(format!(
                        "{:?} buffers cannot be bound to a kernel",
                        buffer_kind
                    )))
                }
            };
            // Constant buffers are read-only storage arrays of padded elements.
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            }
        }
        BindingKind::Texture {
            dimension,
            format,
            read_write: false,
        } => wgpu::BindingType::Texture {
            sample_type: match format.sample_kind() {
                TexelSampleKind::Float => wgpu::TextureSampleType::Float {
                    filterable: format.is_filterable(),
                },
                TexelSampleKind::Sint => wgpu::TextureSampleType::Sint,
                TexelSampleKind::Uint => wgpu::TextureSampleType::Uint,
            },
            view_dimension: view_dimension(dimension),
            multisampled: false,
        },
        BindingKind::Texture {
            dimension,
            format,
            read_write: true,
        } => {
            if format.storage_format().is_none() {
                return Err(ForgeError::UnsupportedType(format!(
                    "{:?} cannot back a read-write texture",
                    format
                )));
            }
            wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::ReadWrite,
                format: texture_format(format),
                view_dimension: view_dimension(dimension),
            }
        }
        BindingKind::Sampler { filtering } => wgpu::BindingType::Sampler(if filtering {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernelforge_core::layout::ElementLayout;

    #[test]
    fn test_one_view_per_buffer_kind() {
        assert_eq!(
            ViewKind::for_buffer(BufferKind::Constant),
            Some(ViewKind::Constant)
        );
        assert_eq!(
            ViewKind::for_buffer(BufferKind::ReadOnly),
            Some(ViewKind::ShaderResource)
        );
        assert_eq!(
            ViewKind::for_buffer(BufferKind::ReadWrite),
            Some(ViewKind::UnorderedAccess)
        );
        assert_eq!(ViewKind::for_buffer(BufferKind::ReadBack), None);
        assert_eq!(ViewKind::for_buffer(BufferKind::Transfer), None);
    }

    #[test]
    fn test_buffer_view_uses_padded_stride() {
        let layout = ElementLayout::new(12, BufferKind::Constant);
        let view = ViewDescriptor::buffer(ViewKind::Constant, layout.padded_stride);
        assert_eq!(view.element_stride(), 16);
        assert_eq!(view.format(), ViewFormat::Structured);
        assert_eq!(view.dimension(), ViewDimension::Buffer);
        assert_eq!(
            view.binding_kind(),
            BindingKind::Buffer(BufferKind::Constant)
        );
    }

    #[test]
    fn test_texture_view() {
        let view = ViewDescriptor::texture(TextureDimension::D3, TexelFormat::Rgba8Unorm, true);
        assert_eq!(view.kind(), ViewKind::UnorderedAccess);
        assert_eq!(view.dimension(), ViewDimension::Texture3D);
        assert_eq!(view.element_stride(), 4);
        assert_eq!(view.format(), ViewFormat::Texel(TexelFormat::Rgba8Unorm));
    }

    #[test]
    fn test_satisfies() {
        let read_write = ViewDescriptor::buffer(ViewKind::UnorderedAccess, 4);
        let constant = ViewDescriptor::buffer(ViewKind::Constant, 16);
        assert!(read_write.satisfies(&BindingKind::Buffer(BufferKind::ReadOnly)));
        assert!(read_write.satisfies(&BindingKind::Buffer(BufferKind::ReadWrite)));
        assert!(!constant.satisfies(&BindingKind::Buffer(BufferKind::ReadOnly)));

        let texture = ViewDescriptor::texture(TextureDimension::D2, TexelFormat::R32Float, false);
        assert!(!texture.satisfies(&BindingKind::Texture {
            dimension: TextureDimension::D2,
            format: TexelFormat::R32Float,
            read_write: true,
        }));
    }

    #[test]
    fn test_binding_types() {
        assert!(matches!(
            binding_type(&BindingKind::DispatchData).unwrap(),
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                ..
            }
        ));
        assert!(matches!(
            binding_type(&BindingKind::Buffer(BufferKind::Constant)).unwrap(),
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                ..
            }
        ));
        assert!(binding_type(&BindingKind::Buffer(BufferKind::ReadBack)).is_err());
        assert!(matches!(
            binding_type(&BindingKind::Texture {
                dimension: TextureDimension::D2,
                format: TexelFormat::R32Float,
                read_write: false,
            })
            .unwrap(),
            wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            }
        ));
        assert!(binding_type(&BindingKind::Texture {
            dimension: TextureDimension::D2,
            format: TexelFormat::R8Unorm,
            read_write: true,
        })
        .is_err());
    }
}
