//! Dispatch-context mapping generator.
//!
//! Expands the members of the dispatch-context types (`ThreadIds`,
//! `GroupSize`, ...) into WGSL expressions. Members are named by the axes they
//! read (`x`, `xy`, `xyz`), so every variant is generated from the per-axis
//! component expressions rather than written out by hand:
//!
//! | Member | Plain | Normalized |
//! |--------|-------|------------|
//! | `x` | component | `(f32(c) / f32(d))` |
//! | `xy` | `vec2<i32>(x, y)` | `vec2<f32>(x, y)` |
//! | `xyz` | `vec3<i32>(x, y, z)` | `vec3<f32>(x, y, z)` |
//! | `count` | `(dx * dy * dz)` | - |
//!
//! Multi-axis members are built from the single-axis expressions, so an `xy`
//! entry always contains the `x` and `y` entries verbatim.

use crate::registry::{Lowering, MemberMapping};

/// Private global holding `global_invocation_id`.
pub const GLOBAL_ID: &str = "_kf_global_id";
/// Private global holding `local_invocation_id`.
pub const LOCAL_ID: &str = "_kf_local_id";
/// Private global holding `workgroup_id`.
pub const WORKGROUP_ID: &str = "_kf_workgroup_id";
/// Hidden parameter holding `local_invocation_index`.
pub const GROUP_INDEX: &str = "_kf_group_index";
/// Dispatch-data uniform variable.
pub const DATA: &str = "_kf_data";
/// Prefix of the per-kernel workgroup size constants.
pub const GROUP_SIZE_PREFIX: &str = "_kf_group_size_";

/// Where a context type reads its per-axis components from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentSource {
    /// Global invocation id.
    GlobalId,
    /// Invocation id within the workgroup.
    LocalId,
    /// Workgroup id.
    WorkgroupId,
    /// Compile-time workgroup size.
    GroupSize,
    /// Logical dispatch size from the dispatch-data uniform.
    DispatchSize,
    /// Global id divided by the dispatch size.
    Normalized,
}

/// A dispatch-context type and its declared members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextType {
    /// Host type name.
    pub name: &'static str,
    /// WGSL token for the whole context value.
    pub target: &'static str,
    /// Declared members.
    pub members: &'static [&'static str],
    /// Component source.
    pub source: ComponentSource,
}

/// Every dispatch-context type.
pub const CONTEXT_TYPES: &[ContextType] = &[
    ContextType {
        name: "ThreadIds",
        target: "vec3<i32>",
        members: &["x", "y", "z", "xy", "xyz"],
        source: ComponentSource::GlobalId,
    },
    ContextType {
        name: "GroupIds",
        target: "vec3<i32>",
        members: &["x", "y", "z", "xy", "xyz", "index"],
        source: ComponentSource::LocalId,
    },
    ContextType {
        name: "WorkgroupIds",
        target: "vec3<i32>",
        members: &["x", "y", "z", "xy", "xyz"],
        source: ComponentSource::WorkgroupId,
    },
    ContextType {
        name: "GroupSize",
        target: "vec3<i32>",
        members: &["x", "y", "z", "xy", "xyz", "count"],
        source: ComponentSource::GroupSize,
    },
    ContextType {
        name: "DispatchSize",
        target: "vec3<i32>",
        members: &["x", "y", "z", "xy", "xyz", "count"],
        source: ComponentSource::DispatchSize,
    },
    ContextType {
        name: "ThreadIdsNormalized",
        target: "vec3<f32>",
        members: &["x", "y", "z", "xy", "xyz"],
        source: ComponentSource::Normalized,
    },
];

const AXES: [char; 3] = ['x', 'y', 'z'];

fn component(source: ComponentSource, axis: char) -> String {
    match source {
        ComponentSource::GlobalId => format!("i32({GLOBAL_ID}.{axis})"),
        ComponentSource::LocalId => format!("i32({LOCAL_ID}.{axis})"),
        ComponentSource::WorkgroupId => format!("i32({WORKGROUP_ID}.{axis})"),
        ComponentSource::GroupSize => format!("{GROUP_SIZE_PREFIX}{axis}"),
        ComponentSource::DispatchSize => format!("{DATA}.dispatch_{axis}"),
        ComponentSource::Normalized => format!(
            "(f32({}) / f32({}))",
            component(ComponentSource::GlobalId, axis),
            component(ComponentSource::DispatchSize, axis)
        ),
    }
}

impl ComponentSource {
    fn scalar(&self) -> &'static str {
        match self {
            ComponentSource::Normalized => "f32",
            _ => "i32",
        }
    }

    fn has_count(&self) -> bool {
        matches!(self, ComponentSource::GroupSize | ComponentSource::DispatchSize)
    }
}

fn vector_type_name(scalar: &str, n: usize) -> &'static str {
    match (scalar, n) {
        ("f32", 2) => "Float2",
        ("f32", 3) => "Float3",
        ("i32", 2) => "Int2",
        ("i32", 3) => "Int3",
        ("f32", _) => "f32",
        _ => "i32",
    }
}

/// Distinct axes in increasing order (`x`, `z`, `xy`, `xyz`, ...).
fn is_axis_member(member: &str) -> bool {
    let mut last = None;
    for c in member.chars() {
        let Some(axis) = AXES.iter().position(|a| *a == c) else {
            return false;
        };
        if last.is_some_and(|prev| axis <= prev) {
            return false;
        }
        last = Some(axis);
    }
    last.is_some()
}

impl ContextType {
    /// Look up a context type by host name.
    pub fn find(name: &str) -> Option<&'static ContextType> {
        CONTEXT_TYPES.iter().find(|t| t.name == name)
    }

    /// Expand one member into its lowering.
    pub fn expand(&self, member: &str) -> Result<MemberMapping, String> {
        if member == "index" && self.source == ComponentSource::LocalId {
            return Ok(MemberMapping {
                lowering: Lowering::HiddenParameter(GROUP_INDEX),
                ty: "i32",
            });
        }

        if member == "count" && self.source.has_count() {
            let product: Vec<_> = AXES.iter().map(|a| component(self.source, *a)).collect();
            return Ok(MemberMapping {
                lowering: Lowering::Expression(format!("({})", product.join(" * "))),
                ty: "i32",
            });
        }

        let n = member.len();
        if !self.members.contains(&member) || !is_axis_member(member) {
            return Err(format!("{}::{member} is not an axis member", self.name));
        }

        let scalar = self.source.scalar();
        let parts: Vec<_> = member.chars().map(|a| component(self.source, a)).collect();
        let expression = if n == 1 {
            parts.concat()
        } else {
            format!("vec{n}<{scalar}>({})", parts.join(", "))
        };

        Ok(MemberMapping {
            lowering: Lowering::Expression(expression),
            ty: vector_type_name(scalar, n),
        })
    }

    /// Expand every declared member, in declaration order.
    pub fn expand_all(&self) -> Result<Vec<(&'static str, MemberMapping)>, String> {
        self.members
            .iter()
            .map(|m| self.expand(m).map(|mapping| (*m, mapping)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expression(mapping: &MemberMapping) -> &str {
        match &mapping.lowering {
            Lowering::Expression(e) => e,
            Lowering::HiddenParameter(p) => p,
        }
    }

    #[test]
    fn test_every_declared_member_expands() {
        for ty in CONTEXT_TYPES {
            let expanded = ty.expand_all().unwrap();
            assert_eq!(expanded.len(), ty.members.len(), "{}", ty.name);
        }
    }

    #[test]
    fn test_dispatch_size_produces_six_entries() {
        let ty = ContextType::find("DispatchSize").unwrap();
        let entries = ty.expand_all().unwrap();
        assert_eq!(entries.len(), 6);

        let get = |name: &str| {
            entries
                .iter()
                .find(|(m, _)| *m == name)
                .map(|(_, e)| expression(e).to_string())
                .unwrap()
        };
        let (x, y, z) = (get("x"), get("y"), get("z"));
        assert_eq!(x, "_kf_data.dispatch_x");
        assert!(get("xy").contains(&x) && get("xy").contains(&y));
        for part in [&x, &y, &z] {
            assert!(get("xyz").contains(part.as_str()));
            assert!(get("count").contains(part.as_str()));
        }
        assert_eq!(get("xy"), "vec2<i32>(_kf_data.dispatch_x, _kf_data.dispatch_y)");
    }

    #[test]
    fn test_multi_axis_members_contain_single_axis_entries() {
        for ty in CONTEXT_TYPES {
            let single: Vec<String> = ["x", "y", "z"]
                .iter()
                .map(|m| expression(&ty.expand(m).unwrap()).to_string())
                .collect();
            let xy = ty.expand("xy").unwrap();
            let xyz = ty.expand("xyz").unwrap();
            assert!(expression(&xy).contains(&single[0]) && expression(&xy).contains(&single[1]));
            for s in &single {
                assert!(expression(&xyz).contains(s.as_str()), "{}", ty.name);
            }
        }
    }

    #[test]
    fn test_normalized_members_are_float() {
        let ty = ContextType::find("ThreadIdsNormalized").unwrap();
        let x = ty.expand("x").unwrap();
        assert_eq!(x.ty, "f32");
        assert_eq!(
            expression(&x),
            "(f32(i32(_kf_global_id.x)) / f32(_kf_data.dispatch_x))"
        );
        assert_eq!(ty.expand("xy").unwrap().ty, "Float2");
        assert!(expression(&ty.expand("xyz").unwrap()).starts_with("vec3<f32>("));
    }

    #[test]
    fn test_group_index_is_hidden_parameter() {
        let ty = ContextType::find("GroupIds").unwrap();
        let index = ty.expand("index").unwrap();
        assert_eq!(index.lowering, Lowering::HiddenParameter(GROUP_INDEX));
        assert_eq!(index.ty, "i32");
    }

    #[test]
    fn test_single_axis_members_expand() {
        for ty in CONTEXT_TYPES {
            for (member, axis) in [("x", 'x'), ("y", 'y'), ("z", 'z')] {
                let mapping = ty.expand(member).unwrap();
                assert_eq!(expression(&mapping), component(ty.source, axis), "{}", ty.name);
            }
        }
    }

    #[test]
    fn test_axis_member_shape() {
        for member in ["x", "y", "z", "xy", "xz", "yz", "xyz"] {
            assert!(is_axis_member(member), "{member}");
        }
        for member in ["", "yx", "xx", "zyx", "xw", "xyzx"] {
            assert!(!is_axis_member(member), "{member}");
        }
    }

    #[test]
    fn test_invalid_members_rejected() {
        let ty = ContextType::find("ThreadIds").unwrap();
        assert!(ty.expand("yx").is_err());
        assert!(ty.expand("w").is_err());
        assert!(ty.expand("count").is_err());
        assert!(ty.expand("xyzw").is_err());
    }
}
