//! GPU memory layout engine.
//!
//! Computes the GPU-required size and alignment ("pack") of every host value
//! type and the padded per-element stride a buffer uses on the device.
//!
//! # Layout table
//!
//! | Host type | Size | Pack |
//! |-----------|------|------|
//! | `Bool`, `i32`, `u32`, `f32` | 4 | 4 |
//! | `Int2`, `UInt2`, `Float2` | 8 | 4 |
//! | `Int3`, `UInt3`, `Float3` | 12 | 4 |
//! | `Int4`, `UInt4`, `Float4` | 16 | 4 |
//! | `Float2x2` | 16 | 4 |
//! | `Float3x3` | 36 | 4 |
//! | `Float4x4` | 64 | 4 |
//! | `Rgba8`, `Bgra8` | 4 | 1 |
//! | `R8` | 1 | 1 |
//!
//! Three-component vectors are not widened to four components: a `Float3` is
//! 12 bytes with a pack of 4. Callers choosing padding must not assume 16.

use crate::error::{ForgeError, Result};

/// Element stride alignment required by constant buffers.
pub const CONSTANT_BUFFER_ALIGNMENT: usize = 16;

/// Size and alignment of a host value type as the GPU sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeLayout {
    /// Size in bytes.
    pub size: usize,
    /// Alignment in bytes.
    pub pack: usize,
}

impl TypeLayout {
    /// Create a layout.
    pub const fn new(size: usize, pack: usize) -> Self {
        Self { size, pack }
    }

    /// Largest pack among a set of member layouts (1 for an empty set).
    pub const fn max_pack(members: &[TypeLayout]) -> usize {
        let mut pack = 1;
        let mut i = 0;
        while i < members.len() {
            if members[i].pack > pack {
                pack = members[i].pack;
            }
            i += 1;
        }
        pack
    }
}

/// Kinds of GPU buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Constant buffer; element strides are 16-byte aligned.
    Constant,
    /// Read-only structured buffer.
    ReadOnly,
    /// Read-write structured buffer.
    ReadWrite,
    /// Host-visible buffer the GPU copies results into.
    ReadBack,
    /// Host-visible staging buffer used to upload data.
    Transfer,
}

impl BufferKind {
    /// Whether the buffer can be bound to a kernel.
    pub fn is_bindable(&self) -> bool {
        matches!(
            self,
            BufferKind::Constant | BufferKind::ReadOnly | BufferKind::ReadWrite
        )
    }

    /// Whether the buffer lives in host-visible memory.
    pub fn is_host_visible(&self) -> bool {
        matches!(self, BufferKind::ReadBack | BufferKind::Transfer)
    }
}

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Device-side element stride for a buffer of the given kind.
///
/// Constant buffers round the natural size up to the next multiple of 16;
/// every other kind uses the natural size unchanged.
#[inline]
pub const fn padded_stride(natural_size: usize, kind: BufferKind) -> usize {
    match kind {
        BufferKind::Constant => (natural_size + 15) & !15,
        _ => natural_size,
    }
}

/// Host and device strides of one buffer element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementLayout {
    /// Natural (unpadded) size of the element on the host.
    pub natural_size: usize,
    /// Stride of the element in device memory.
    pub padded_stride: usize,
}

impl ElementLayout {
    /// Compute the element layout for a natural size and buffer kind.
    pub const fn new(natural_size: usize, kind: BufferKind) -> Self {
        Self {
            natural_size,
            padded_stride: padded_stride(natural_size, kind),
        }
    }

    /// Whether device elements carry trailing padding.
    pub const fn has_padding(&self) -> bool {
        self.padded_stride > self.natural_size
    }

    /// Bytes occupied on the device by `count` elements.
    pub const fn device_size(&self, count: usize) -> usize {
        count * self.padded_stride
    }
}

/// A host value type with a known GPU layout.
///
/// Implemented for every entry of the layout table and derivable for
/// `#[repr(C)]` user structs with `#[derive(GpuType)]`.
pub trait GpuType: bytemuck::Pod {
    /// Host type name as kernels refer to it (e.g. `"Float3"`).
    const NAME: &'static str;
    /// GPU size and pack.
    const LAYOUT: TypeLayout;

    /// Element layout of this type inside a buffer of `kind`.
    fn element_layout(kind: BufferKind) -> ElementLayout {
        debug_assert_eq!(Self::LAYOUT.size, std::mem::size_of::<Self>());
        ElementLayout::new(std::mem::size_of::<Self>(), kind)
    }
}

const LAYOUT_TABLE: &[(&str, TypeLayout)] = &[
    ("Bool", TypeLayout::new(4, 4)),
    ("i32", TypeLayout::new(4, 4)),
    ("u32", TypeLayout::new(4, 4)),
    ("f32", TypeLayout::new(4, 4)),
    ("Int2", TypeLayout::new(8, 4)),
    ("Int3", TypeLayout::new(12, 4)),
    ("Int4", TypeLayout::new(16, 4)),
    ("UInt2", TypeLayout::new(8, 4)),
    ("UInt3", TypeLayout::new(12, 4)),
    ("UInt4", TypeLayout::new(16, 4)),
    ("Float2", TypeLayout::new(8, 4)),
    ("Float3", TypeLayout::new(12, 4)),
    ("Float4", TypeLayout::new(16, 4)),
    ("Float2x2", TypeLayout::new(16, 4)),
    ("Float3x3", TypeLayout::new(36, 4)),
    ("Float4x4", TypeLayout::new(64, 4)),
    ("Rgba8", TypeLayout::new(4, 1)),
    ("Bgra8", TypeLayout::new(4, 1)),
    ("R8", TypeLayout::new(1, 1)),
];

/// Look up a table type by host name.
pub fn known_layout(name: &str) -> Option<TypeLayout> {
    LAYOUT_TABLE
        .iter()
        .find(|(entry, _)| *entry == name)
        .map(|(_, layout)| *layout)
}

/// Look up a table type by host name, failing for types outside the table.
pub fn get_layout(name: &str) -> Result<TypeLayout> {
    known_layout(name).ok_or_else(|| ForgeError::UnsupportedType(name.to_string()))
}

/// Every host type name with a table layout.
pub fn known_type_names() -> impl Iterator<Item = &'static str> {
    LAYOUT_TABLE.iter().map(|(name, _)| *name)
}

/// Offset of one member inside a host struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberOffset {
    /// Member name.
    pub name: String,
    /// Byte offset from the start of the struct.
    pub offset: usize,
    /// Member layout.
    pub layout: TypeLayout,
}

/// Host (`repr(C)`) layout of a struct built from member layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    /// Members in declaration order.
    pub members: Vec<MemberOffset>,
    /// Size and pack of the whole struct.
    pub layout: TypeLayout,
}

impl StructLayout {
    /// Lay out members sequentially, aligning each to its pack and rounding
    /// the total up to the largest pack.
    pub fn compute<'a, I>(members: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, TypeLayout)>,
    {
        let mut offset = 0;
        let mut pack = 1;
        let mut placed = Vec::new();

        for (name, layout) in members {
            offset = align_up(offset, layout.pack);
            placed.push(MemberOffset {
                name: name.to_string(),
                offset,
                layout,
            });
            offset += layout.size;
            pack = pack.max(layout.pack);
        }

        Self {
            members: placed,
            layout: TypeLayout::new(align_up(offset, pack), pack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_layouts() {
        for name in ["Bool", "i32", "u32", "f32"] {
            assert_eq!(get_layout(name).unwrap(), TypeLayout::new(4, 4), "{name}");
        }
    }

    #[test]
    fn test_vector_layouts() {
        for prefix in ["Int", "UInt", "Float"] {
            assert_eq!(
                get_layout(&format!("{prefix}2")).unwrap(),
                TypeLayout::new(8, 4)
            );
            assert_eq!(
                get_layout(&format!("{prefix}4")).unwrap(),
                TypeLayout::new(16, 4)
            );
        }
    }

    #[test]
    fn test_three_component_vectors_are_not_widened() {
        for name in ["Int3", "UInt3", "Float3"] {
            let layout = get_layout(name).unwrap();
            assert_eq!(layout.size, 12, "{name} must stay 12 bytes");
            assert_eq!(layout.pack, 4, "{name} packs like its component");
            assert_ne!(layout.size, 16);
        }
    }

    #[test]
    fn test_matrix_and_texel_layouts() {
        assert_eq!(get_layout("Float2x2").unwrap(), TypeLayout::new(16, 4));
        assert_eq!(get_layout("Float3x3").unwrap(), TypeLayout::new(36, 4));
        assert_eq!(get_layout("Float4x4").unwrap(), TypeLayout::new(64, 4));
        assert_eq!(get_layout("Rgba8").unwrap(), TypeLayout::new(4, 1));
        assert_eq!(get_layout("R8").unwrap(), TypeLayout::new(1, 1));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(matches!(
            get_layout("f64"),
            Err(ForgeError::UnsupportedType(name)) if name == "f64"
        ));
        assert!(known_layout("Particle").is_none());
    }

    #[test]
    fn test_constant_stride_rounds_to_16() {
        for size in 1..=256usize {
            let expected = (size + 15) & !15;
            assert_eq!(padded_stride(size, BufferKind::Constant), expected);
            assert_eq!(padded_stride(size, BufferKind::Constant) % 16, 0);
        }
        assert_eq!(padded_stride(5, BufferKind::Constant), 16);
        assert_eq!(padded_stride(16, BufferKind::Constant), 16);
        assert_eq!(padded_stride(17, BufferKind::Constant), 32);
    }

    #[test]
    fn test_other_kinds_use_natural_size() {
        for kind in [
            BufferKind::ReadOnly,
            BufferKind::ReadWrite,
            BufferKind::ReadBack,
            BufferKind::Transfer,
        ] {
            for size in 1..=256usize {
                assert_eq!(padded_stride(size, kind), size);
                assert!(!ElementLayout::new(size, kind).has_padding());
            }
        }
    }

    #[test]
    fn test_has_padding() {
        let layout = ElementLayout::new(12, BufferKind::Constant);
        assert!(layout.has_padding());
        assert_eq!(layout.padded_stride, 16);
        assert_eq!(layout.device_size(3), 48);

        let layout = ElementLayout::new(32, BufferKind::Constant);
        assert!(!layout.has_padding());
    }

    #[test]
    fn test_struct_layout() {
        let layout = StructLayout::compute([
            ("position", TypeLayout::new(12, 4)),
            ("flag", TypeLayout::new(1, 1)),
            ("mass", TypeLayout::new(4, 4)),
        ]);
        let offsets: Vec<_> = layout.members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 12, 16]);
        assert_eq!(layout.layout, TypeLayout::new(20, 4));
    }

    #[test]
    fn test_max_pack() {
        assert_eq!(TypeLayout::max_pack(&[]), 1);
        assert_eq!(
            TypeLayout::max_pack(&[TypeLayout::new(1, 1), TypeLayout::new(8, 4)]),
            4
        );
    }
}
