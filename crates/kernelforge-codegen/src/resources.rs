//! Resource types kernels bind and the tables describing their element access.
//!
//! Three tables are generated from the resource list:
//!
//! - indexers, keyed `"kernelforge::ReadWriteTexture2D<T>[i32, i32]"`, give
//!   the WGSL coordinate type of an element access
//! - samplers, keyed `"kernelforge::ReadOnlyTexture2D<T>::sample(f32, f32)"`,
//!   give the coordinate constructor, or `None` when the argument is already a
//!   vector and passes through unchanged
//! - size accessors, keyed `"kernelforge::ReadOnlyTexture3D<T>::depth"`, give
//!   the `(rank, axis)` the member reads

use kernelforge_core::kernel::TextureDimension;
use kernelforge_core::layout::BufferKind;

use crate::registry::ROOT;

/// A resource type a kernel parameter can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// `ConstantBuffer<T>`.
    ConstantBuffer,
    /// `ReadOnlyBuffer<T>`.
    ReadOnlyBuffer,
    /// `ReadWriteBuffer<T>`.
    ReadWriteBuffer,
    /// `ReadOnlyTexture2D<T>`.
    ReadOnlyTexture2D,
    /// `ReadWriteTexture2D<T>`.
    ReadWriteTexture2D,
    /// `ReadOnlyTexture3D<T>`.
    ReadOnlyTexture3D,
    /// `ReadWriteTexture3D<T>`.
    ReadWriteTexture3D,
}

/// Every resource type.
pub const RESOURCE_TYPES: &[ResourceType] = &[
    ResourceType::ConstantBuffer,
    ResourceType::ReadOnlyBuffer,
    ResourceType::ReadWriteBuffer,
    ResourceType::ReadOnlyTexture2D,
    ResourceType::ReadWriteTexture2D,
    ResourceType::ReadOnlyTexture3D,
    ResourceType::ReadWriteTexture3D,
];

impl ResourceType {
    /// Host type name without generics.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceType::ConstantBuffer => "ConstantBuffer",
            ResourceType::ReadOnlyBuffer => "ReadOnlyBuffer",
            ResourceType::ReadWriteBuffer => "ReadWriteBuffer",
            ResourceType::ReadOnlyTexture2D => "ReadOnlyTexture2D",
            ResourceType::ReadWriteTexture2D => "ReadWriteTexture2D",
            ResourceType::ReadOnlyTexture3D => "ReadOnlyTexture3D",
            ResourceType::ReadWriteTexture3D => "ReadWriteTexture3D",
        }
    }

    /// Look up a resource type by host name.
    pub fn from_name(name: &str) -> Option<Self> {
        RESOURCE_TYPES.iter().copied().find(|r| r.name() == name)
    }

    /// Fully-qualified generic name, e.g. `kernelforge::ReadOnlyBuffer<T>`.
    pub fn generic_name(&self) -> String {
        format!("{ROOT}::{}<T>", self.name())
    }

    /// Number of coordinate axes.
    pub fn rank(&self) -> usize {
        match self {
            ResourceType::ConstantBuffer
            | ResourceType::ReadOnlyBuffer
            | ResourceType::ReadWriteBuffer => 1,
            ResourceType::ReadOnlyTexture2D | ResourceType::ReadWriteTexture2D => 2,
            ResourceType::ReadOnlyTexture3D | ResourceType::ReadWriteTexture3D => 3,
        }
    }

    /// Whether this is a texture.
    pub fn is_texture(&self) -> bool {
        self.rank() > 1
    }

    /// Whether kernels may write through this resource.
    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            ResourceType::ReadWriteBuffer
                | ResourceType::ReadWriteTexture2D
                | ResourceType::ReadWriteTexture3D
        )
    }

    /// Buffer kind, for buffers.
    pub fn buffer_kind(&self) -> Option<BufferKind> {
        match self {
            ResourceType::ConstantBuffer => Some(BufferKind::Constant),
            ResourceType::ReadOnlyBuffer => Some(BufferKind::ReadOnly),
            ResourceType::ReadWriteBuffer => Some(BufferKind::ReadWrite),
            _ => None,
        }
    }

    /// Texture dimension, for textures.
    pub fn texture_dimension(&self) -> Option<TextureDimension> {
        match self.rank() {
            2 => Some(TextureDimension::D2),
            3 => Some(TextureDimension::D3),
            _ => None,
        }
    }

    /// Size accessor members and the axis each reads.
    pub fn size_accessors(&self) -> &'static [(&'static str, u8)] {
        match self.rank() {
            1 => &[("length", 0)],
            2 => &[("width", 0), ("height", 1)],
            _ => &[("width", 0), ("height", 1), ("depth", 2)],
        }
    }
}

/// Build the indexer table: `(key, coordinate token)`.
pub fn indexer_entries() -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for resource in RESOURCE_TYPES {
        let owner = resource.generic_name();
        match resource.rank() {
            1 => {
                entries.push((format!("{owner}[i32]"), "i32".to_string()));
                entries.push((format!("{owner}[u32]"), "u32".to_string()));
            }
            rank => {
                let coord = format!("vec{rank}<i32>");
                let ints = vec!["i32"; rank].join(", ");
                let uints = vec!["u32"; rank].join(", ");
                entries.push((format!("{owner}[{ints}]"), coord.clone()));
                entries.push((format!("{owner}[{uints}]"), coord.clone()));
                entries.push((format!("{owner}[Int{rank}]"), coord.clone()));
                entries.push((format!("{owner}[UInt{rank}]"), coord));
            }
        }
    }
    entries
}

/// Build the sampler table: `(key, coordinate token or pass-through)`.
///
/// Only read-only textures can be sampled.
pub fn sampler_entries() -> Vec<(String, Option<String>)> {
    let mut entries = Vec::new();
    for resource in RESOURCE_TYPES {
        if !resource.is_texture() || resource.is_writable() {
            continue;
        }
        let owner = resource.generic_name();
        let rank = resource.rank();
        let floats = vec!["f32"; rank].join(", ");
        entries.push((
            format!("{owner}::sample({floats})"),
            Some(format!("vec{rank}<f32>")),
        ));
        entries.push((format!("{owner}::sample(Float{rank})"), None));
    }
    entries
}

/// Build the size accessor table: `(key, (rank, axis))`.
pub fn size_accessor_entries() -> Vec<(String, (u8, u8))> {
    let mut entries = Vec::new();
    for resource in RESOURCE_TYPES {
        let owner = resource.generic_name();
        for (member, axis) in resource.size_accessors() {
            entries.push((
                format!("{owner}::{member}"),
                (resource.rank() as u8, *axis),
            ));
        }
    }
    entries
}
