//! Host value types shared between kernels and host code.
//!
//! Every type here is `#[repr(C)]` and `bytemuck::Pod`, so a slice of them can
//! be handed to the marshalling routines as raw bytes. Sizes and packs match
//! the layout table in [`crate::layout`].

use bytemuck::{Pod, Zeroable};

use crate::layout::{GpuType, TypeLayout};

macro_rules! vector_type {
    ($(#[$meta:meta])* $name:ident, $scalar:ty, $($field:ident),+) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
        pub struct $name {
            $(
                #[allow(missing_docs)]
                pub $field: $scalar,
            )+
        }

        impl $name {
            /// Create a vector from its components.
            #[inline]
            pub const fn new($($field: $scalar),+) -> Self {
                Self { $($field),+ }
            }

            /// Create a vector with every component set to `value`.
            #[inline]
            pub const fn splat(value: $scalar) -> Self {
                Self { $($field: value),+ }
            }
        }

        impl From<[$scalar; vector_type!(@count $($field),+)]> for $name {
            #[inline]
            fn from(value: [$scalar; vector_type!(@count $($field),+)]) -> Self {
                bytemuck::cast(value)
            }
        }

        impl GpuType for $name {
            const NAME: &'static str = stringify!($name);
            const LAYOUT: TypeLayout = TypeLayout::new(
                std::mem::size_of::<$name>(),
                std::mem::align_of::<$scalar>(),
            );
        }
    };
    (@count $($field:ident),+) => { <[()]>::len(&[$(vector_type!(@unit $field)),+]) };
    (@unit $field:ident) => { () };
}

vector_type!(
    /// Two-component `f32` vector (`vec2<f32>`).
    Float2, f32, x, y
);
vector_type!(
    /// Three-component `f32` vector (`vec3<f32>`). 12 bytes, not 16.
    Float3, f32, x, y, z
);
vector_type!(
    /// Four-component `f32` vector (`vec4<f32>`).
    Float4, f32, x, y, z, w
);
vector_type!(
    /// Two-component `i32` vector (`vec2<i32>`).
    Int2, i32, x, y
);
vector_type!(
    /// Three-component `i32` vector (`vec3<i32>`).
    Int3, i32, x, y, z
);
vector_type!(
    /// Four-component `i32` vector (`vec4<i32>`).
    Int4, i32, x, y, z, w
);
vector_type!(
    /// Two-component `u32` vector (`vec2<u32>`).
    UInt2, u32, x, y
);
vector_type!(
    /// Three-component `u32` vector (`vec3<u32>`).
    UInt3, u32, x, y, z
);
vector_type!(
    /// Four-component `u32` vector (`vec4<u32>`).
    UInt4, u32, x, y, z, w
);

macro_rules! matrix_type {
    ($(#[$meta:meta])* $name:ident, $column:ident, $n:literal) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
        pub struct $name {
            /// Matrix columns.
            pub columns: [$column; $n],
        }

        impl $name {
            /// Create a matrix from its columns.
            #[inline]
            pub const fn from_columns(columns: [$column; $n]) -> Self {
                Self { columns }
            }
        }

        impl GpuType for $name {
            const NAME: &'static str = stringify!($name);
            const LAYOUT: TypeLayout = TypeLayout::new(std::mem::size_of::<$name>(), 4);
        }
    };
}

matrix_type!(
    /// Column-major 2x2 `f32` matrix (`mat2x2<f32>`).
    Float2x2, Float2, 2
);
matrix_type!(
    /// Column-major 3x3 `f32` matrix. 36 bytes on the host.
    Float3x3, Float3, 3
);
matrix_type!(
    /// Column-major 4x4 `f32` matrix (`mat4x4<f32>`).
    Float4x4, Float4, 4
);

impl Float4x4 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self::from_columns([
        Float4::new(1.0, 0.0, 0.0, 0.0),
        Float4::new(0.0, 1.0, 0.0, 0.0),
        Float4::new(0.0, 0.0, 1.0, 0.0),
        Float4::new(0.0, 0.0, 0.0, 1.0),
    ]);
}

/// Four-byte boolean.
///
/// WGSL `bool` is not host-shareable, so buffer and struct members use this
/// type, which kernels see as `u32` (0 or 1).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Bool(u32);

impl Bool {
    /// `true`.
    pub const TRUE: Self = Self(1);
    /// `false`.
    pub const FALSE: Self = Self(0);

    /// Host value.
    #[inline]
    pub const fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for Bool {
    fn from(value: bool) -> Self {
        Self(value as u32)
    }
}

impl From<Bool> for bool {
    fn from(value: Bool) -> Self {
        value.get()
    }
}

impl GpuType for Bool {
    const NAME: &'static str = "Bool";
    const LAYOUT: TypeLayout = TypeLayout::new(4, 4);
}

macro_rules! scalar_type {
    ($($ty:ty),+) => {
        $(
            impl GpuType for $ty {
                const NAME: &'static str = stringify!($ty);
                const LAYOUT: TypeLayout = TypeLayout::new(4, 4);
            }
        )+
    };
}

scalar_type!(f32, i32, u32);

/// Packed 8-bit RGBA texel, normalized to `Float4` inside kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Rgba8 {
    #[allow(missing_docs)]
    pub r: u8,
    #[allow(missing_docs)]
    pub g: u8,
    #[allow(missing_docs)]
    pub b: u8,
    #[allow(missing_docs)]
    pub a: u8,
}

impl Rgba8 {
    /// Create a texel from its channels.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Packed 8-bit BGRA texel (swap-chain order), normalized to `Float4`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Bgra8 {
    #[allow(missing_docs)]
    pub b: u8,
    #[allow(missing_docs)]
    pub g: u8,
    #[allow(missing_docs)]
    pub r: u8,
    #[allow(missing_docs)]
    pub a: u8,
}

impl Bgra8 {
    /// Create a texel from its channels.
    pub const fn new(b: u8, g: u8, r: u8, a: u8) -> Self {
        Self { b, g, r, a }
    }
}

/// Single 8-bit channel texel, normalized to `f32`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct R8(pub u8);

impl GpuType for Rgba8 {
    const NAME: &'static str = "Rgba8";
    const LAYOUT: TypeLayout = TypeLayout::new(4, 1);
}

impl GpuType for Bgra8 {
    const NAME: &'static str = "Bgra8";
    const LAYOUT: TypeLayout = TypeLayout::new(4, 1);
}

impl GpuType for R8 {
    const NAME: &'static str = "R8";
    const LAYOUT: TypeLayout = TypeLayout::new(1, 1);
}

/// Pixel formats a texture can store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    /// `f32` texels.
    R32Float,
    /// `Float2` texels.
    Rg32Float,
    /// `Float4` texels.
    Rgba32Float,
    /// `i32` texels.
    R32Sint,
    /// `u32` texels.
    R32Uint,
    /// `Rgba8` texels.
    Rgba8Unorm,
    /// `Bgra8` texels.
    Bgra8Unorm,
    /// `R8` texels.
    R8Unorm,
}

/// Scalar family a texel is sampled as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelSampleKind {
    /// `f32` (including normalized formats).
    Float,
    /// `i32`.
    Sint,
    /// `u32`.
    Uint,
}

impl TexelFormat {
    /// Map a host texel type name to its format.
    pub fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "f32" => TexelFormat::R32Float,
            "Float2" => TexelFormat::Rg32Float,
            "Float4" => TexelFormat::Rgba32Float,
            "i32" => TexelFormat::R32Sint,
            "u32" => TexelFormat::R32Uint,
            "Rgba8" => TexelFormat::Rgba8Unorm,
            "Bgra8" => TexelFormat::Bgra8Unorm,
            "R8" => TexelFormat::R8Unorm,
            _ => return None,
        })
    }

    /// Bytes per texel on the host.
    pub const fn bytes_per_texel(&self) -> usize {
        match self {
            TexelFormat::R8Unorm => 1,
            TexelFormat::R32Float
            | TexelFormat::R32Sint
            | TexelFormat::R32Uint
            | TexelFormat::Rgba8Unorm
            | TexelFormat::Bgra8Unorm => 4,
            TexelFormat::Rg32Float => 8,
            TexelFormat::Rgba32Float => 16,
        }
    }

    /// Host type name of the value a kernel reads from a texel.
    pub const fn value_type_name(&self) -> &'static str {
        match self {
            TexelFormat::R32Float | TexelFormat::R8Unorm => "f32",
            TexelFormat::Rg32Float => "Float2",
            TexelFormat::Rgba32Float | TexelFormat::Rgba8Unorm | TexelFormat::Bgra8Unorm => {
                "Float4"
            }
            TexelFormat::R32Sint => "i32",
            TexelFormat::R32Uint => "u32",
        }
    }

    /// Number of components in the kernel-visible value.
    pub const fn components(&self) -> usize {
        match self {
            TexelFormat::R32Float
            | TexelFormat::R8Unorm
            | TexelFormat::R32Sint
            | TexelFormat::R32Uint => 1,
            TexelFormat::Rg32Float => 2,
            TexelFormat::Rgba32Float | TexelFormat::Rgba8Unorm | TexelFormat::Bgra8Unorm => 4,
        }
    }

    /// Scalar family the texel is sampled as.
    pub const fn sample_kind(&self) -> TexelSampleKind {
        match self {
            TexelFormat::R32Sint => TexelSampleKind::Sint,
            TexelFormat::R32Uint => TexelSampleKind::Uint,
            _ => TexelSampleKind::Float,
        }
    }

    /// Whether a filtering sampler may read this format.
    pub const fn is_filterable(&self) -> bool {
        matches!(
            self,
            TexelFormat::Rgba8Unorm | TexelFormat::Bgra8Unorm | TexelFormat::R8Unorm
        )
    }

    /// WGSL storage texel format, if the format can back a storage texture.
    pub const fn storage_format(&self) -> Option<&'static str> {
        match self {
            TexelFormat::R32Float => Some("r32float"),
            TexelFormat::Rg32Float => Some("rg32float"),
            TexelFormat::Rgba32Float => Some("rgba32float"),
            TexelFormat::R32Sint => Some("r32sint"),
            TexelFormat::R32Uint => Some("r32uint"),
            TexelFormat::Rgba8Unorm => Some("rgba8unorm"),
            TexelFormat::Bgra8Unorm => Some("bgra8unorm"),
            TexelFormat::R8Unorm => None,
        }
    }
}

impl TexelSampleKind {
    /// WGSL scalar token.
    pub const fn wgsl_scalar(&self) -> &'static str {
        match self {
            TexelSampleKind::Float => "f32",
            TexelSampleKind::Sint => "i32",
            TexelSampleKind::Uint => "u32",
        }
    }
}

/// A host type a texture can hold.
pub trait PixelFormat: GpuType {
    /// Texel format of the texture.
    const FORMAT: TexelFormat;
}

macro_rules! pixel_format {
    ($($ty:ty => $format:ident),+ $(,)?) => {
        $(
            impl PixelFormat for $ty {
                const FORMAT: TexelFormat = TexelFormat::$format;
            }
        )+
    };
}

pixel_format! {
    f32 => R32Float,
    Float2 => Rg32Float,
    Float4 => Rgba32Float,
    i32 => R32Sint,
    u32 => R32Uint,
    Rgba8 => Rgba8Unorm,
    Bgra8 => Bgra8Unorm,
    R8 => R8Unorm,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::get_layout;

    fn assert_table_layout<T: GpuType>() {
        assert_eq!(T::LAYOUT, get_layout(T::NAME).unwrap(), "{}", T::NAME);
        assert_eq!(T::LAYOUT.size, std::mem::size_of::<T>(), "{}", T::NAME);
    }

    #[test]
    fn test_host_types_match_layout_table() {
        assert_table_layout::<Bool>();
        assert_table_layout::<f32>();
        assert_table_layout::<i32>();
        assert_table_layout::<u32>();
        assert_table_layout::<Float2>();
        assert_table_layout::<Float3>();
        assert_table_layout::<Float4>();
        assert_table_layout::<Int2>();
        assert_table_layout::<Int3>();
        assert_table_layout::<Int4>();
        assert_table_layout::<UInt2>();
        assert_table_layout::<UInt3>();
        assert_table_layout::<UInt4>();
        assert_table_layout::<Float2x2>();
        assert_table_layout::<Float3x3>();
        assert_table_layout::<Float4x4>();
        assert_table_layout::<Rgba8>();
        assert_table_layout::<Bgra8>();
        assert_table_layout::<R8>();
    }

    #[test]
    fn test_vector_constructors() {
        let v = Float3::new(1.0, 2.0, 3.0);
        assert_eq!(v.z, 3.0);
        assert_eq!(Int2::splat(7), Int2::new(7, 7));
        assert_eq!(Float4::from([1.0, 2.0, 3.0, 4.0]).w, 4.0);
    }

    #[test]
    fn test_bool_roundtrip() {
        assert!(Bool::from(true).get());
        assert!(!bool::from(Bool::FALSE));
        assert_eq!(bytemuck::bytes_of(&Bool::TRUE), &[1, 0, 0, 0]);
    }

    #[test]
    fn test_texel_formats() {
        assert_eq!(TexelFormat::from_type_name("Rgba8"), Some(TexelFormat::Rgba8Unorm));
        assert_eq!(TexelFormat::from_type_name("Float3"), None);
        assert_eq!(<R8 as PixelFormat>::FORMAT.bytes_per_texel(), 1);
        assert_eq!(TexelFormat::Rgba8Unorm.value_type_name(), "Float4");
        assert!(TexelFormat::R8Unorm.storage_format().is_none());
        assert!(!TexelFormat::R32Float.is_filterable());
        for format in [TexelFormat::R32Float, TexelFormat::Rgba32Float, TexelFormat::R32Uint] {
            assert_eq!(
                format.bytes_per_texel(),
                get_layout(match format {
                    TexelFormat::R32Float => "f32",
                    TexelFormat::Rgba32Float => "Float4",
                    _ => "u32",
                })
                .unwrap()
                .size
            );
        }
    }
}
