//! Intrinsic library surface.
//!
//! Kernels call GPU intrinsics through `kernelforge::intrinsics::*` (or the
//! bare name). The surface below is the declared signature list of that
//! library; the registry derives its method table from it by applying each
//! entry's [`Naming`] rule. Primitive and vector methods (`f32::sqrt`,
//! `Float3::dot`, ...) live in a separate fixed table.

/// How a declared intrinsic name becomes a WGSL function name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// Keep the declared spelling verbatim.
    Preserve,
    /// Lower-case, joining snake segments in lowerCamelCase
    /// (`inverse_sqrt` becomes `inverseSqrt`).
    Convert,
}

/// Result type of a call, used for local type inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnRule {
    /// Same type as the first argument.
    SameAsFirst,
    /// Component type of the first argument (`dot`, `length`).
    ComponentOfFirst,
    /// A fixed host type.
    Fixed(&'static str),
    /// No value.
    Void,
}

/// One declared intrinsic signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrinsicDecl {
    /// Declared name.
    pub name: &'static str,
    /// Parameter list as declared, e.g. `"(Float3, Float3)"`.
    pub params: &'static str,
    /// Naming rule.
    pub naming: Naming,
    /// Result type rule.
    pub returns: ReturnRule,
}

impl IntrinsicDecl {
    /// WGSL function name for this declaration.
    pub fn target_name(&self) -> String {
        match self.naming {
            Naming::Preserve => self.name.to_string(),
            Naming::Convert => convert_name(self.name),
        }
    }
}

/// Apply the [`Naming::Convert`] rule.
pub fn convert_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, segment) in name.split('_').filter(|s| !s.is_empty()).enumerate() {
        let lower = segment.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

macro_rules! decl {
    ($name:literal $params:literal => $returns:expr) => {
        IntrinsicDecl {
            name: $name,
            params: $params,
            naming: Naming::Convert,
            returns: $returns,
        }
    };
    (preserve $name:literal $params:literal => $returns:expr) => {
        IntrinsicDecl {
            name: $name,
            params: $params,
            naming: Naming::Preserve,
            returns: $returns,
        }
    };
}

use ReturnRule::{ComponentOfFirst, Fixed, SameAsFirst, Void};

/// Declared surface of `kernelforge::intrinsics`, overloads included.
pub const INTRINSIC_SURFACE: &[IntrinsicDecl] = &[
    decl!("abs" "(f32)" => SameAsFirst),
    decl!("abs" "(i32)" => SameAsFirst),
    decl!("acos" "(f32)" => SameAsFirst),
    decl!("asin" "(f32)" => SameAsFirst),
    decl!("atan" "(f32)" => SameAsFirst),
    decl!("atan2" "(f32, f32)" => SameAsFirst),
    decl!("ceil" "(f32)" => SameAsFirst),
    decl!("clamp" "(f32, f32, f32)" => SameAsFirst),
    decl!("clamp" "(i32, i32, i32)" => SameAsFirst),
    decl!("cos" "(f32)" => SameAsFirst),
    decl!("cosh" "(f32)" => SameAsFirst),
    decl!("cross" "(Float3, Float3)" => Fixed("Float3")),
    decl!("degrees" "(f32)" => SameAsFirst),
    decl!("determinant" "(Float4x4)" => Fixed("f32")),
    decl!("distance" "(Float3, Float3)" => ComponentOfFirst),
    decl!("dot" "(Float2, Float2)" => ComponentOfFirst),
    decl!("dot" "(Float3, Float3)" => ComponentOfFirst),
    decl!("dot" "(Float4, Float4)" => ComponentOfFirst),
    decl!("exp" "(f32)" => SameAsFirst),
    decl!("exp2" "(f32)" => SameAsFirst),
    decl!("floor" "(f32)" => SameAsFirst),
    decl!("fma" "(f32, f32, f32)" => SameAsFirst),
    decl!("fract" "(f32)" => SameAsFirst),
    decl!("inverse_sqrt" "(f32)" => SameAsFirst),
    decl!("length" "(Float2)" => ComponentOfFirst),
    decl!("length" "(Float3)" => ComponentOfFirst),
    decl!("length" "(Float4)" => ComponentOfFirst),
    decl!("log" "(f32)" => SameAsFirst),
    decl!("log2" "(f32)" => SameAsFirst),
    decl!("max" "(f32, f32)" => SameAsFirst),
    decl!("max" "(i32, i32)" => SameAsFirst),
    decl!("min" "(f32, f32)" => SameAsFirst),
    decl!("min" "(i32, i32)" => SameAsFirst),
    decl!("mix" "(f32, f32, f32)" => SameAsFirst),
    decl!("normalize" "(Float3)" => SameAsFirst),
    decl!("pow" "(f32, f32)" => SameAsFirst),
    decl!("radians" "(f32)" => SameAsFirst),
    decl!("reflect" "(Float3, Float3)" => SameAsFirst),
    decl!("refract" "(Float3, Float3, f32)" => SameAsFirst),
    decl!("round" "(f32)" => SameAsFirst),
    decl!("saturate" "(f32)" => SameAsFirst),
    decl!("sign" "(f32)" => SameAsFirst),
    decl!("sin" "(f32)" => SameAsFirst),
    decl!("sinh" "(f32)" => SameAsFirst),
    decl!("smoothstep" "(f32, f32, f32)" => SameAsFirst),
    decl!("sqrt" "(f32)" => SameAsFirst),
    decl!("step" "(f32, f32)" => SameAsFirst),
    decl!("tan" "(f32)" => SameAsFirst),
    decl!("tanh" "(f32)" => SameAsFirst),
    decl!("transpose" "(Float4x4)" => SameAsFirst),
    decl!("trunc" "(f32)" => SameAsFirst),
    decl!("count_one_bits" "(u32)" => SameAsFirst),
    decl!("count_leading_zeros" "(u32)" => SameAsFirst),
    decl!("count_trailing_zeros" "(u32)" => SameAsFirst),
    decl!("reverse_bits" "(u32)" => SameAsFirst),
    decl!("first_leading_bit" "(u32)" => SameAsFirst),
    decl!("workgroup_barrier" "()" => Void),
    decl!("storage_barrier" "()" => Void),
    decl!(preserve "pack4x8unorm" "(Float4)" => Fixed("u32")),
    decl!(preserve "unpack4x8unorm" "(u32)" => Fixed("Float4")),
    decl!(preserve "pack4x8snorm" "(Float4)" => Fixed("u32")),
    decl!(preserve "unpack4x8snorm" "(u32)" => Fixed("Float4")),
    decl!(preserve "pack2x16float" "(Float2)" => Fixed("u32")),
    decl!(preserve "unpack2x16float" "(u32)" => Fixed("Float2")),
];

/// Intrinsics that synchronize a workgroup.
pub const BARRIERS: &[&str] = &["workgroupBarrier", "storageBarrier"];

/// Fixed table of primitive numeric methods: `(host path, WGSL name, result)`.
pub const NUMERIC_METHODS: &[(&str, &str, ReturnRule)] = &[
    ("f32::abs", "abs", SameAsFirst),
    ("f32::acos", "acos", SameAsFirst),
    ("f32::asin", "asin", SameAsFirst),
    ("f32::atan", "atan", SameAsFirst),
    ("f32::atan2", "atan2", SameAsFirst),
    ("f32::ceil", "ceil", SameAsFirst),
    ("f32::clamp", "clamp", SameAsFirst),
    ("f32::cos", "cos", SameAsFirst),
    ("f32::cosh", "cosh", SameAsFirst),
    ("f32::exp", "exp", SameAsFirst),
    ("f32::exp2", "exp2", SameAsFirst),
    ("f32::floor", "floor", SameAsFirst),
    ("f32::fract", "fract", SameAsFirst),
    ("f32::ln", "log", SameAsFirst),
    ("f32::log2", "log2", SameAsFirst),
    ("f32::max", "max", SameAsFirst),
    ("f32::min", "min", SameAsFirst),
    ("f32::mul_add", "fma", SameAsFirst),
    ("f32::powf", "pow", SameAsFirst),
    ("f32::round", "round", SameAsFirst),
    ("f32::signum", "sign", SameAsFirst),
    ("f32::sin", "sin", SameAsFirst),
    ("f32::sinh", "sinh", SameAsFirst),
    ("f32::sqrt", "sqrt", SameAsFirst),
    ("f32::tan", "tan", SameAsFirst),
    ("f32::tanh", "tanh", SameAsFirst),
    ("f32::to_degrees", "degrees", SameAsFirst),
    ("f32::to_radians", "radians", SameAsFirst),
    ("f32::trunc", "trunc", SameAsFirst),
    ("i32::abs", "abs", SameAsFirst),
    ("i32::clamp", "clamp", SameAsFirst),
    ("i32::max", "max", SameAsFirst),
    ("i32::min", "min", SameAsFirst),
    ("i32::signum", "sign", SameAsFirst),
    ("i32::count_ones", "countOneBits", SameAsFirst),
    ("u32::clamp", "clamp", SameAsFirst),
    ("u32::max", "max", SameAsFirst),
    ("u32::min", "min", SameAsFirst),
    ("u32::count_ones", "countOneBits", SameAsFirst),
    ("u32::leading_zeros", "countLeadingZeros", SameAsFirst),
    ("u32::trailing_zeros", "countTrailingZeros", SameAsFirst),
    ("u32::reverse_bits", "reverseBits", SameAsFirst),
];

/// Methods available on every vector type: `(method, WGSL name, result)`.
pub const VECTOR_METHODS: &[(&str, &str, ReturnRule)] = &[
    ("abs", "abs", SameAsFirst),
    ("clamp", "clamp", SameAsFirst),
    ("max", "max", SameAsFirst),
    ("min", "min", SameAsFirst),
];

/// Methods available on float vector types only.
pub const FLOAT_VECTOR_METHODS: &[(&str, &str, ReturnRule)] = &[
    ("ceil", "ceil", SameAsFirst),
    ("distance", "distance", ComponentOfFirst),
    ("dot", "dot", ComponentOfFirst),
    ("floor", "floor", SameAsFirst),
    ("fract", "fract", SameAsFirst),
    ("length", "length", ComponentOfFirst),
    ("lerp", "mix", SameAsFirst),
    ("normalize", "normalize", SameAsFirst),
    ("round", "round", SameAsFirst),
    ("sqrt", "sqrt", SameAsFirst),
];

/// Methods available on square matrix types.
pub const MATRIX_METHODS: &[(&str, &str, ReturnRule)] = &[
    ("determinant", "determinant", Fixed("f32")),
    ("transpose", "transpose", SameAsFirst),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_name() {
        assert_eq!(convert_name("saturate"), "saturate");
        assert_eq!(convert_name("Saturate"), "saturate");
        assert_eq!(convert_name("inverse_sqrt"), "inverseSqrt");
        assert_eq!(convert_name("count_leading_zeros"), "countLeadingZeros");
        assert_eq!(convert_name("workgroup_barrier"), "workgroupBarrier");
    }

    #[test]
    fn test_preserve_keeps_spelling() {
        let decl = IntrinsicDecl {
            name: "Foo_Bar",
            params: "()",
            naming: Naming::Preserve,
            returns: ReturnRule::Void,
        };
        assert_eq!(decl.target_name(), "Foo_Bar");

        let decl = IntrinsicDecl {
            naming: Naming::Convert,
            ..decl
        };
        assert_eq!(decl.target_name(), "fooBar");
    }

    #[test]
    fn test_surface_targets_are_unique_per_name() {
        use std::collections::HashMap;
        let mut targets: HashMap<&str, String> = HashMap::new();
        for decl in INTRINSIC_SURFACE {
            let target = decl.target_name();
            if let Some(existing) = targets.get(decl.name) {
                assert_eq!(existing, &target, "{} overloads disagree", decl.name);
            }
            targets.insert(decl.name, target);
        }
        assert!(targets.len() < INTRINSIC_SURFACE.len(), "surface has overloads");
    }

    #[test]
    fn test_barriers_are_declared() {
        for barrier in BARRIERS {
            assert!(INTRINSIC_SURFACE
                .iter()
                .any(|d| d.target_name() == *barrier));
        }
    }
}
