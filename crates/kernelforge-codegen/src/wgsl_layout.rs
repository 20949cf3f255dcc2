//! Host and WGSL layout agreement.
//!
//! Host structs are `repr(C)` with the packs from the core layout table, while
//! WGSL aligns `vec3` and `vec4` to 16 bytes and `vec2` to 8. A struct whose
//! field offsets differ between the two would be read back shifted, so every
//! disagreement is rejected at build time, naming the first offending field.
//!
//! | WGSL type | Size | Align |
//! |-----------|------|-------|
//! | `f32`, `i32`, `u32` | 4 | 4 |
//! | `vec2<T>` | 8 | 8 |
//! | `vec3<T>` | 12 | 16 |
//! | `vec4<T>` | 16 | 16 |
//! | `mat2x2<f32>` | 16 | 8 |
//! | `mat3x3<f32>` | 48 | 16 |
//! | `mat4x4<f32>` | 64 | 16 |
//! | `array<E, N>` | `N * roundUp(align(E), size(E))` | `align(E)` |
//! | struct | `roundUp(align, end)` | max member align |

use kernelforge_core::layout::{align_up, known_layout, padded_stride, BufferKind, StructLayout, TypeLayout};

use crate::explorer::{StructDef, TypeGraph};
use crate::registry::known_names;
use crate::types::KernelType;
use crate::{Result, TranspileError};

/// Size and alignment of a type in WGSL host-shareable memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WgslLayout {
    /// Size in bytes.
    pub size: usize,
    /// Alignment in bytes.
    pub align: usize,
}

impl WgslLayout {
    const fn new(size: usize, align: usize) -> Self {
        Self { size, align }
    }

    /// Element stride when this type is an array element.
    pub const fn array_stride(&self) -> usize {
        align_up(self.size, self.align)
    }
}

fn token_layout(token: &str) -> Option<WgslLayout> {
    Some(match token {
        "f32" | "i32" | "u32" => WgslLayout::new(4, 4),
        "mat2x2<f32>" => WgslLayout::new(16, 8),
        "mat3x3<f32>" => WgslLayout::new(48, 16),
        "mat4x4<f32>" => WgslLayout::new(64, 16),
        t if t.starts_with("vec2<") => WgslLayout::new(8, 8),
        t if t.starts_with("vec3<") => WgslLayout::new(12, 16),
        t if t.starts_with("vec4<") => WgslLayout::new(16, 16),
        _ => return None,
    })
}

fn is_texel_only(name: &str) -> bool {
    matches!(name, "Rgba8" | "Bgra8" | "R8")
}

/// WGSL layout of a storable type.
pub fn wgsl_layout<G: TypeGraph + ?Sized>(ty: &KernelType, graph: &G) -> Result<WgslLayout> {
    match ty {
        KernelType::Value(name) => {
            if let Some(def) = graph.struct_def(name) {
                return Ok(struct_layouts(def, graph)?.1);
            }
            if is_texel_only(name) {
                return Err(TranspileError::WgslLimitation(format!(
                    "`{name}` is a texel type and cannot be stored in buffers or structs"
                )));
            }
            known_names()
                .resolve_type(name)
                .and_then(token_layout)
                .ok_or_else(|| {
                    TranspileError::WgslLimitation(format!("`{name}` is not host-shareable"))
                })
        }
        KernelType::Array { element, len } => {
            let element = wgsl_layout(element, graph)?;
            Ok(WgslLayout::new(len * element.array_stride(), element.align))
        }
        _ => Err(TranspileError::Type(format!(
            "`{}` has no memory layout",
            ty.host_name()
        ))),
    }
}

/// Host (`repr(C)`) layout of a storable type.
pub fn host_layout<G: TypeGraph + ?Sized>(ty: &KernelType, graph: &G) -> Result<TypeLayout> {
    match ty {
        KernelType::Value(name) => {
            if let Some(def) = graph.struct_def(name) {
                return Ok(struct_layouts(def, graph)?.0.layout);
            }
            known_layout(name).ok_or_else(|| {
                TranspileError::Type(format!("`{name}` has no host layout"))
            })
        }
        KernelType::Array { element, len } => {
            let element = host_layout(element, graph)?;
            Ok(TypeLayout::new(len * element.size, element.pack))
        }
        _ => Err(TranspileError::Type(format!(
            "`{}` has no memory layout",
            ty.host_name()
        ))),
    }
}

/// Host and WGSL layouts of a struct, checking that every field agrees.
fn struct_layouts<G: TypeGraph + ?Sized>(
    def: &StructDef,
    graph: &G,
) -> Result<(StructLayout, WgslLayout)> {
    let mut members = Vec::with_capacity(def.fields.len());
    for field in &def.fields {
        members.push((field.name.as_str(), host_layout(&field.ty, graph)?));
    }
    let host = StructLayout::compute(members);

    let mut offset = 0;
    let mut align = 4;
    for (field, placed) in def.fields.iter().zip(&host.members) {
        let layout = wgsl_layout(&field.ty, graph)?;
        offset = align_up(offset, layout.align);
        if offset != placed.offset {
            return Err(TranspileError::WgslLimitation(format!(
                "field `{}::{}` is at offset {} on the host but {} in WGSL; \
                 reorder fields or add explicit padding",
                def.name, field.name, placed.offset, offset
            )));
        }
        offset += layout.size;
        align = align.max(layout.align);
    }

    let wgsl = WgslLayout::new(align_up(offset, align), align);
    if wgsl.size != host.layout.size {
        return Err(TranspileError::WgslLimitation(format!(
            "struct `{}` is {} bytes on the host but {} in WGSL; add trailing padding",
            def.name, host.layout.size, wgsl.size
        )));
    }
    Ok((host, wgsl))
}

/// Check a custom struct's host and WGSL layouts agree.
pub fn check_struct<G: TypeGraph + ?Sized>(def: &StructDef, graph: &G) -> Result<WgslLayout> {
    struct_layouts(def, graph).map(|(_, wgsl)| wgsl)
}

/// Check a storage-buffer element type; its WGSL array stride must equal
/// the host size.
pub fn check_storage_element<G: TypeGraph + ?Sized>(element: &str, graph: &G) -> Result<()> {
    let ty = KernelType::Value(element.to_string());
    let host = host_layout(&ty, graph)?;
    let wgsl = wgsl_layout(&ty, graph)?;
    if wgsl.array_stride() != host.size {
        return Err(TranspileError::WgslLimitation(format!(
            "`{element}` has a {}-byte stride in WGSL storage but {} bytes on the host{}",
            wgsl.array_stride(),
            host.size,
            if element.ends_with('3') {
                "; use the 4-component type"
            } else {
                ""
            }
        )));
    }
    Ok(())
}

/// Check a constant-buffer element type and return the padded stride its
/// `_KfConstant_<T>` wrapper is declared with.
pub fn check_constant_element<G: TypeGraph + ?Sized>(element: &str, graph: &G) -> Result<usize> {
    let ty = KernelType::Value(element.to_string());
    let host = host_layout(&ty, graph)?;
    let wgsl = wgsl_layout(&ty, graph)?;
    let stride = padded_stride(host.size, BufferKind::Constant);
    if wgsl.size > stride {
        return Err(TranspileError::WgslLimitation(format!(
            "`{element}` needs {} bytes in WGSL but the constant stride is {stride}",
            wgsl.size
        )));
    }
    Ok(stride)
}
