//! Kernel arguments.
//!
//! Resources bind by kernel parameter name. By-value parameters are packed
//! into the dispatch-data uniform at the offsets the transpiler assigned.

use kernelforge_core::error::{ForgeError, Result};
use kernelforge_core::kernel::{BindingKind, KernelDescriptor};
use kernelforge_core::layout::GpuType;
use kernelforge_core::types::PixelFormat;

use crate::access::{ShaderAccess, TextureAccess};
use crate::buffer::Buffer;
use crate::texture::{Texture2D, Texture3D};
use crate::view::ViewDescriptor;

/// Bytes of the dispatch size header (`dispatch_x`, `dispatch_y`, `dispatch_z`).
const DISPATCH_HEADER_SIZE: usize = 12;

/// A resource that can be bound to a kernel parameter.
pub trait Bindable {
    /// The view the resource exposes.
    fn view(&self) -> ViewDescriptor;

    /// The wgpu resource to place in the bind group.
    fn binding_resource(&self) -> wgpu::BindingResource<'_>;
}

impl<T: GpuType, A: ShaderAccess> Bindable for Buffer<T, A> {
    fn view(&self) -> ViewDescriptor {
        self.shader_view()
    }

    fn binding_resource(&self) -> wgpu::BindingResource<'_> {
        self.as_entire_binding()
    }
}

impl<T: PixelFormat, A: TextureAccess> Bindable for Texture2D<T, A> {
    fn view(&self) -> ViewDescriptor {
        Texture2D::view(self)
    }

    fn binding_resource(&self) -> wgpu::BindingResource<'_> {
        self.as_binding()
    }
}

impl<T: PixelFormat, A: TextureAccess> Bindable for Texture3D<T, A> {
    fn view(&self) -> ViewDescriptor {
        Texture3D::view(self)
    }

    fn binding_resource(&self) -> wgpu::BindingResource<'_> {
        self.as_binding()
    }
}

struct BoundResource<'a> {
    name: String,
    resource: &'a dyn Bindable,
}

struct CapturedValue {
    name: String,
    ty: &'static str,
    bytes: Vec<u8>,
}

/// Arguments for one kernel dispatch.
///
/// ```no_run
/// # async fn run() -> kernelforge_core::Result<()> {
/// use kernelforge_wgpu::{DeviceConfig, GpuDevice, KernelArgs, ReadWriteBuffer};
///
/// let device = GpuDevice::new(&DeviceConfig::from_env()).await?;
/// let values = ReadWriteBuffer::from_slice(&device, &[1.0f32, 2.0, 3.0])?;
/// let args = KernelArgs::new().bind("values", &values).value("factor", 2.0f32);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct KernelArgs<'a> {
    resources: Vec<BoundResource<'a>>,
    values: Vec<CapturedValue>,
}

impl<'a> KernelArgs<'a> {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `resource` to the parameter `name`, replacing an earlier binding.
    pub fn bind<R: Bindable>(mut self, name: &str, resource: &'a R) -> Self {
        self.resources.retain(|bound| bound.name != name);
        self.resources.push(BoundResource {
            name: name.to_string(),
            resource,
        });
        self
    }

    /// Set the by-value parameter `name`, replacing an earlier value.
    pub fn value<T: GpuType>(mut self, name: &str, value: T) -> Self {
        self.values.retain(|captured| captured.name != name);
        self.values.push(CapturedValue {
            name: name.to_string(),
            ty: T::NAME,
            bytes: bytemuck::bytes_of(&value).to_vec(),
        });
        self
    }

    /// Resource bound to `name`.
    pub(crate) fn resource(&self, name: &str) -> Result<&'a dyn Bindable> {
        self.resources
            .iter()
            .find(|bound| bound.name == name)
            .map(|bound| bound.resource)
            .ok_or_else(|| ForgeError::MissingArgument(name.to_string()))
    }

    /// Check every resource parameter of `descriptor` has a compatible
    /// binding and that no argument names an unknown parameter.
    pub(crate) fn check_resources(&self, descriptor: &KernelDescriptor) -> Result<()> {
        for binding in descriptor.bindings.iter() {
            if !matches!(
                binding.kind,
                BindingKind::Buffer(_) | BindingKind::Texture { .. }
            ) {
                continue;
            }
            let view = self.resource(&binding.name)?.view();
            if !view.satisfies(&binding.kind) {
                return Err(ForgeError::ArgumentMismatch {
                    name: binding.name.to_string(),
                    reason: format!(
                        "expected {:?}, got {:?}",
                        binding.kind,
                        view.binding_kind()
                    ),
                });
            }
        }

        for bound in &self.resources {
            if descriptor.binding(&bound.name).is_none() {
                return Err(ForgeError::ArgumentMismatch {
                    name: bound.name.clone(),
                    reason: format!("`{}` has no resource parameter with this name", descriptor.name),
                });
            }
        }
        Ok(())
    }

    /// Build the dispatch-data uniform contents for a dispatch of `threads`.
    pub(crate) fn pack_dispatch_data(
        &self,
        descriptor: &KernelDescriptor,
        threads: [u32; 3],
    ) -> Result<Vec<u8>> {
        let layout = &descriptor.dispatch_data;
        let mut data = vec![0u8; layout.size as usize];
        if data.len() < DISPATCH_HEADER_SIZE {
            return Err(ForgeError::InvalidOperation(format!(
                "dispatch data of `{}` is {} bytes, smaller than its header",
                descriptor.name, layout.size
            )));
        }

        for (axis, &count) in threads.iter().enumerate() {
            let count = i32::try_from(count).map_err(|_| {
                ForgeError::InvalidOperation(format!("dispatch size {} exceeds i32", count))
            })?;
            data[axis * 4..axis * 4 + 4].copy_from_slice(&count.to_le_bytes());
        }

        for field in layout.fields.iter() {
            let value = self
                .values
                .iter()
                .find(|value| value.name == field.name)
                .ok_or_else(|| ForgeError::MissingArgument(field.name.to_string()))?;

            if value.ty != field.ty || value.bytes.len() != field.size as usize {
                return Err(ForgeError::ArgumentMismatch {
                    name: field.name.to_string(),
                    reason: format!(
                        "expected `{}` ({} bytes), got `{}` ({} bytes)",
                        field.ty,
                        field.size,
                        value.ty,
                        value.bytes.len()
                    ),
                });
            }

            let start = field.offset as usize;
            let end = start + value.bytes.len();
            if end > data.len() {
                return Err(ForgeError::BufferOverflow {
                    required: end,
                    available: data.len(),
                });
            }
            data[start..end].copy_from_slice(&value.bytes);
        }

        for value in &self.values {
            if descriptor.data_field(&value.name).is_none() {
                return Err(ForgeError::ArgumentMismatch {
                    name: value.name.clone(),
                    reason: format!("`{}` has no value parameter with this name", descriptor.name),
                });
            }
        }

        tracing::trace!(kernel = %descriptor.name, bytes = data.len(), "packed dispatch data");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use kernelforge_core::kernel::{BindingDescriptor, DataField, DispatchDataLayout};
    use kernelforge_core::layout::BufferKind;
    use kernelforge_core::types::Float4;

    use super::*;

    const INTEGRATE: KernelDescriptor = KernelDescriptor {
        name: Cow::Borrowed("integrate"),
        entry_point: Cow::Borrowed("integrate"),
        wgsl: Cow::Borrowed(""),
        workgroup_size: [64, 1, 1],
        bind_group: 0,
        bindings: Cow::Borrowed(&[
            BindingDescriptor {
                binding: 0,
                name: Cow::Borrowed("_kf_data"),
                kind: BindingKind::DispatchData,
            },
            BindingDescriptor {
                binding: 1,
                name: Cow::Borrowed("bodies"),
                kind: BindingKind::Buffer(BufferKind::ReadWrite),
            },
        ]),
        dispatch_data: DispatchDataLayout {
            size: 48,
            fields: Cow::Borrowed(&[
                DataField {
                    name: Cow::Borrowed("gravity"),
                    ty: Cow::Borrowed("Float4"),
                    offset: 16,
                    size: 16,
                },
                DataField {
                    name: Cow::Borrowed("dt"),
                    ty: Cow::Borrowed("f32"),
                    offset: 32,
                    size: 4,
                },
            ]),
        },
    };

    #[test]
    fn test_pack_dispatch_data() {
        let args = KernelArgs::new()
            .value("dt", 0.5f32)
            .value("gravity", Float4::new(0.0, -9.8, 0.0, 0.0));
        let data = args.pack_dispatch_data(&INTEGRATE, [100, 1, 1]).unwrap();

        assert_eq!(data.len(), 48);
        assert_eq!(&data[0..4], &100i32.to_le_bytes());
        assert_eq!(&data[4..8], &1i32.to_le_bytes());
        assert_eq!(&data[8..12], &1i32.to_le_bytes());
        assert_eq!(&data[12..16], &[0; 4]);
        assert_eq!(&data[20..24], &(-9.8f32).to_le_bytes());
        assert_eq!(&data[32..36], &0.5f32.to_le_bytes());
    }

    #[test]
    fn test_missing_value() {
        let args = KernelArgs::new().value("dt", 0.5f32);
        assert!(matches!(
            args.pack_dispatch_data(&INTEGRATE, [1, 1, 1]),
            Err(ForgeError::MissingArgument(name)) if name == "gravity"
        ));
    }

    #[test]
    fn test_value_type_mismatch() {
        let args = KernelArgs::new()
            .value("dt", 1u32)
            .value("gravity", Float4::splat(0.0));
        let err = args.pack_dispatch_data(&INTEGRATE, [1, 1, 1]).unwrap_err();
        match err {
            ForgeError::ArgumentMismatch { name, reason } => {
                assert_eq!(name, "dt");
                assert!(reason.contains("`f32`"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_value() {
        let args = KernelArgs::new()
            .value("dt", 1.0f32)
            .value("gravity", Float4::splat(0.0))
            .value("drag", 0.1f32);
        assert!(matches!(
            args.pack_dispatch_data(&INTEGRATE, [1, 1, 1]),
            Err(ForgeError::ArgumentMismatch { name, .. }) if name == "drag"
        ));
    }

    #[test]
    fn test_later_value_replaces_earlier() {
        let args = KernelArgs::new()
            .value("dt", 1.0f32)
            .value("gravity", Float4::splat(0.0))
            .value("dt", 2.0f32);
        let data = args.pack_dispatch_data(&INTEGRATE, [1, 1, 1]).unwrap();
        assert_eq!(&data[32..36], &2.0f32.to_le_bytes());
    }

    #[test]
    fn test_missing_resource() {
        let args = KernelArgs::new();
        assert!(matches!(
            args.check_resources(&INTEGRATE),
            Err(ForgeError::MissingArgument(name)) if name == "bodies"
        ));
    }
}
