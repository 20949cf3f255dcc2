//! Dispatch-data uniform packing.
//!
//! Every kernel reads its logical dispatch size and its by-value parameters
//! from one uniform struct at binding 0:
//!
//! ```text
//! struct _KfDispatchData {
//!     dispatch_x: i32,     // offset 0
//!     dispatch_y: i32,     // offset 4
//!     dispatch_z: i32,     // offset 8
//!     factor: f32,         // offset 12
//!     @align(16) @size(32) particle: Particle,
//! }
//! ```
//!
//! Offsets follow WGSL uniform rules: struct members are aligned to 16 and
//! padded to a multiple of 16, arrays need a 16-byte element stride. The
//! host packs each value's bytes at the recorded offset.

use std::borrow::Cow;

use kernelforge_core::kernel::{DataField, DispatchDataLayout};
use kernelforge_core::layout::align_up;

use crate::bindings::DISPATCH_DATA_STRUCT;
use crate::explorer::TypeGraph;
use crate::types::{KernelType, TypeMapper};
use crate::wgsl_layout::{host_layout, wgsl_layout};
use crate::{Result, TranspileError};

const UNIFORM_ALIGN: usize = 16;
const AXIS_FIELDS: [&str; 3] = ["dispatch_x", "dispatch_y", "dispatch_z"];

/// One captured value in the uniform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMember {
    /// Kernel parameter name.
    pub name: String,
    /// WGSL member name.
    pub wgsl_name: String,
    /// Host type name.
    pub ty: String,
    /// WGSL type.
    pub wgsl_ty: String,
    /// Byte offset.
    pub offset: usize,
    /// Host size in bytes.
    pub size: usize,
    /// `@align(16) @size(n)` attributes, for struct members.
    pub padded_size: Option<usize>,
}

/// The packed dispatch-data uniform of one kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchData {
    /// Captured values in parameter order.
    pub members: Vec<DataMember>,
    /// Total size, a multiple of 16.
    pub size: usize,
}

impl DispatchData {
    /// Lay out `captured` values (parameter name, WGSL name, type) after the
    /// dispatch size.
    pub fn build<G: TypeGraph + ?Sized>(
        captured: &[(String, String, KernelType)],
        mapper: &TypeMapper,
        graph: &G,
    ) -> Result<Self> {
        let mut offset = AXIS_FIELDS.len() * 4;
        let mut members = Vec::with_capacity(captured.len());

        for (name, wgsl_name, ty) in captured {
            let wgsl = wgsl_layout(ty, graph)?;
            let host = host_layout(ty, graph)?;

            let is_struct = matches!(ty, KernelType::Value(n) if graph.struct_def(n).is_some());
            if let KernelType::Array { element, .. } = ty {
                let stride = wgsl_layout(element, graph)?.array_stride();
                if stride % UNIFORM_ALIGN != 0 {
                    return Err(TranspileError::WgslLimitation(format!(
                        "captured array `{name}` has a {stride}-byte element stride; \
                         uniform arrays need a multiple of 16"
                    )));
                }
            }

            let (align, padded_size) = if is_struct || matches!(ty, KernelType::Array { .. }) {
                (
                    align_up(wgsl.align, UNIFORM_ALIGN),
                    Some(align_up(wgsl.size, UNIFORM_ALIGN)),
                )
            } else {
                (wgsl.align, None)
            };

            offset = align_up(offset, align);
            members.push(DataMember {
                name: name.clone(),
                wgsl_name: wgsl_name.clone(),
                ty: ty.host_name(),
                wgsl_ty: mapper.wgsl_type(ty)?,
                offset,
                size: host.size,
                padded_size: padded_size.filter(|_| is_struct),
            });
            offset += padded_size.unwrap_or(wgsl.size);
        }

        Ok(Self {
            members,
            size: align_up(offset, UNIFORM_ALIGN),
        })
    }

    /// WGSL struct declaration.
    pub fn to_wgsl(&self) -> String {
        let mut out = format!("struct {DISPATCH_DATA_STRUCT} {{\n");
        for axis in AXIS_FIELDS {
            out.push_str(&format!("    {axis}: i32,\n"));
        }
        for member in &self.members {
            let attrs = match member.padded_size {
                Some(size) => format!("@align(16) @size({size}) "),
                None => String::new(),
            };
            out.push_str(&format!(
                "    {attrs}{}: {},\n",
                member.wgsl_name, member.wgsl_ty
            ));
        }
        out.push('}');
        out
    }

    /// Runtime layout.
    pub fn layout(&self) -> DispatchDataLayout {
        DispatchDataLayout {
            size: self.size as u32,
            fields: Cow::Owned(
                self.members
                    .iter()
                    .map(|m| DataField {
                        name: Cow::Owned(m.name.clone()),
                        ty: Cow::Owned(m.ty.clone()),
                        offset: m.offset as u32,
                        size: m.size as u32,
                    })
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::StructTable;
    use syn::parse_quote;

    fn captured(name: &str, ty: KernelType) -> (String, String, KernelType) {
        (name.to_string(), name.to_string(), ty)
    }

    fn value(name: &str) -> KernelType {
        KernelType::Value(name.to_string())
    }

    #[test]
    fn test_empty_uniform_is_sixteen_bytes() {
        let data = DispatchData::build(&[], &TypeMapper::new(), &StructTable::new()).unwrap();
        assert_eq!(data.size, 16);
        assert!(data.to_wgsl().contains("dispatch_z: i32,"));
    }

    #[test]
    fn test_scalar_and_vector_offsets() {
        let data = DispatchData::build(
            &[
                captured("factor", value("f32")),
                captured("offset", value("Float2")),
                captured("tint", value("Float4")),
                captured("count", value("u32")),
            ],
            &TypeMapper::new(),
            &StructTable::new(),
        )
        .unwrap();
        let offsets: Vec<_> = data.members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![12, 16, 32, 48]);
        assert_eq!(data.size, 64);

        let layout = data.layout();
        assert_eq!(layout.fields[2].name, "tint");
        assert_eq!(layout.fields[2].size, 16);
    }

    #[test]
    fn test_struct_members_are_aligned_to_sixteen() {
        let mut mapper = TypeMapper::new();
        let items: Vec<syn::ItemStruct> = vec![parse_quote! {
            #[repr(C)]
            struct Light { intensity: f32, range: f32 }
        }];
        let graph = StructTable::from_items(&items, &mut mapper).unwrap();
        let data = DispatchData::build(
            &[captured("scale", value("f32")), captured("light", value("Light"))],
            &mapper,
            &graph,
        )
        .unwrap();
        assert_eq!(data.members[1].offset, 16);
        assert_eq!(data.members[1].size, 8);
        assert_eq!(data.size, 32);
        assert!(data
            .to_wgsl()
            .contains("@align(16) @size(16) light: Light,"));
    }

    #[test]
    fn test_uniform_arrays_need_sixteen_byte_stride() {
        let floats = KernelType::Array {
            element: Box::new(value("f32")),
            len: 4,
        };
        assert!(DispatchData::build(
            &[captured("weights", floats)],
            &TypeMapper::new(),
            &StructTable::new()
        )
        .is_err());

        let vectors = KernelType::Array {
            element: Box::new(value("Float4")),
            len: 2,
        };
        let data = DispatchData::build(
            &[captured("planes", vectors)],
            &TypeMapper::new(),
            &StructTable::new(),
        )
        .unwrap();
        assert_eq!(data.members[0].offset, 16);
        assert_eq!(data.size, 48);
    }
}
