//! Compiled kernel descriptors.
//!
//! A [`KernelDescriptor`] is everything the runtime needs to build a compute
//! pipeline: the generated WGSL, the entry point, the workgroup size and the
//! binding table. The build-time macro emits descriptors as `const` items, so
//! every field borrows `'static` data through [`Cow`]; the runtime transpiler
//! produces the same type with owned data.

use std::borrow::Cow;

use crate::layout::BufferKind;
use crate::types::TexelFormat;

/// Binding index reserved for the dispatch-data uniform.
pub const DISPATCH_DATA_BINDING: u32 = 0;

/// Texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    /// Two-dimensional texture.
    D2,
    /// Three-dimensional texture.
    D3,
}

impl TextureDimension {
    /// Number of coordinate axes.
    pub const fn rank(&self) -> usize {
        match self {
            TextureDimension::D2 => 2,
            TextureDimension::D3 => 3,
        }
    }
}

/// What a binding slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// The dispatch-data uniform (dispatch size and captured values).
    DispatchData,
    /// A storage buffer.
    Buffer(BufferKind),
    /// A sampled (read-only) or storage (read-write) texture.
    Texture {
        /// 2D or 3D.
        dimension: TextureDimension,
        /// Texel format.
        format: TexelFormat,
        /// Bound as a read-write storage texture.
        read_write: bool,
    },
    /// The shared linear sampler used by `sample` calls.
    Sampler {
        /// Whether every sampled texture is filterable.
        filtering: bool,
    },
}

/// One entry of a kernel's bind group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDescriptor {
    /// Binding index within the group.
    pub binding: u32,
    /// Kernel parameter name (or a reserved name for generated bindings).
    pub name: Cow<'static, str>,
    /// Resource kind.
    pub kind: BindingKind,
}

/// A by-value kernel parameter packed into the dispatch-data uniform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataField {
    /// Kernel parameter name.
    pub name: Cow<'static, str>,
    /// Host type name.
    pub ty: Cow<'static, str>,
    /// Byte offset inside the uniform.
    pub offset: u32,
    /// Host size in bytes.
    pub size: u32,
}

/// Layout of the dispatch-data uniform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchDataLayout {
    /// Total uniform size in bytes (a multiple of 16).
    pub size: u32,
    /// Captured values in declaration order.
    pub fields: Cow<'static, [DataField]>,
}

/// A transpiled compute kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDescriptor {
    /// Kernel name.
    pub name: Cow<'static, str>,
    /// WGSL entry point.
    pub entry_point: Cow<'static, str>,
    /// Generated WGSL module.
    pub wgsl: Cow<'static, str>,
    /// `@workgroup_size`.
    pub workgroup_size: [u32; 3],
    /// Bind group index.
    pub bind_group: u32,
    /// Bindings ordered by index.
    pub bindings: Cow<'static, [BindingDescriptor]>,
    /// Dispatch-data uniform layout.
    pub dispatch_data: DispatchDataLayout,
}

impl KernelDescriptor {
    /// Find a binding by kernel parameter name.
    pub fn binding(&self, name: &str) -> Option<&BindingDescriptor> {
        self.bindings.iter().find(|b| b.name == name)
    }

    /// Find a captured value by kernel parameter name.
    pub fn data_field(&self, name: &str) -> Option<&DataField> {
        self.dispatch_data.fields.iter().find(|f| f.name == name)
    }

    /// Number of workgroups needed to cover `threads` along each axis.
    pub fn workgroup_count(&self, threads: [u32; 3]) -> [u32; 3] {
        let mut groups = [0; 3];
        for axis in 0..3 {
            let size = self.workgroup_size[axis].max(1);
            groups[axis] = threads[axis].div_ceil(size);
        }
        groups
    }
}
