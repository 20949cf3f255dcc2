//! Type mapping from Rust to WGSL.
//!
//! Kernel types are classified into plain values, fixed-size arrays and
//! resources. WGSL tokens come from the type registry; custom structs must be
//! registered with the mapper before they can be named.
//!
//! # Type Mappings
//!
//! | Rust Type | WGSL Type | Notes |
//! |-----------|-----------|-------|
//! | `f32` / `i32` / `u32` | same | Direct mapping |
//! | `bool` | `bool` | Locals only, not host-shareable |
//! | `Bool` | `u32` | 4-byte host-shareable boolean |
//! | `usize` | `u32` | Locals and casts only |
//! | `Float3` | `vec3<f32>` | Also `Int*`, `UInt*` |
//! | `Float4x4` | `mat4x4<f32>` | Column-major |
//! | `[T; N]` | `array<T, N>` | Literal length only |
//! | `ReadWriteBuffer<T>` | `array<T>` | Storage buffer binding |
//! | `f64`, `i64`, `u64` | - | Rejected |

use std::collections::HashSet;

use proc_macro2::Span;
use syn::spanned::Spanned;

use kernelforge_core::types::TexelFormat;

use crate::registry::known_names;
use crate::resources::ResourceType;
use crate::{Result, TranspileError};

/// A classified kernel type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelType {
    /// A value type, by host name (`f32`, `Float3`, `Particle`).
    Value(String),
    /// A fixed-size array.
    Array {
        /// Element type.
        element: Box<KernelType>,
        /// Length.
        len: usize,
    },
    /// A bindable resource.
    Resource {
        /// Resource kind.
        resource: ResourceType,
        /// Host name of the element type.
        element: String,
    },
    /// `()`.
    Unit,
}

impl KernelType {
    /// Host type string used for local type inference (`f32`, `[Float3; 4]`).
    pub fn host_name(&self) -> String {
        match self {
            KernelType::Value(name) => name.clone(),
            KernelType::Array { element, len } => format!("[{}; {len}]", element.host_name()),
            KernelType::Resource { resource, element } => {
                format!("{}<{element}>", resource.name())
            }
            KernelType::Unit => "()".to_string(),
        }
    }

    /// Whether this is a resource.
    pub fn is_resource(&self) -> bool {
        matches!(self, KernelType::Resource { .. })
    }
}

const REJECTED: &[(&str, &str)] = &[
    ("f64", "WGSL has no 64-bit floats; use f32"),
    ("i64", "WGSL has no 64-bit integers; use i32"),
    ("u64", "WGSL has no 64-bit integers; use u32"),
    ("i128", "WGSL has no 128-bit integers"),
    ("u128", "WGSL has no 128-bit integers"),
    ("i8", "WGSL has no 8-bit integers"),
    ("u8", "WGSL has no 8-bit integers; use R8 for texels"),
    ("i16", "WGSL has no 16-bit integers"),
    ("u16", "WGSL has no 16-bit integers"),
    ("isize", "use i32"),
    ("char", "WGSL has no characters"),
];

/// Type mapper for converting Rust types to WGSL types.
#[derive(Debug, Clone, Default)]
pub struct TypeMapper {
    structs: HashSet<String>,
}

impl TypeMapper {
    /// Create a mapper that knows only the built-in types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom struct name.
    pub fn register_struct(&mut self, name: &str) {
        self.structs.insert(name.to_string());
    }

    /// Whether `name` is a registered custom struct.
    pub fn is_struct(&self, name: &str) -> bool {
        self.structs.contains(name)
    }

    /// Map a Rust type.
    pub fn map_type(&self, ty: &syn::Type) -> Result<KernelType> {
        match ty {
            syn::Type::Path(type_path) => self.map_type_path(type_path),
            syn::Type::Array(type_array) => self.map_array(type_array),
            syn::Type::Paren(paren) => self.map_type(&paren.elem),
            syn::Type::Tuple(tuple) if tuple.elems.is_empty() => Ok(KernelType::Unit),
            syn::Type::Reference(_) => Err(TranspileError::Unsupported(
                "references in kernel types; pass resources and values by value".to_string(),
            )),
            _ => Err(TranspileError::UnsupportedType {
                name: type_text(ty),
                span: ty.span(),
            }),
        }
    }

    /// Map a type that crosses the host/device boundary: buffer elements,
    /// struct fields and captured values.
    ///
    /// `bool` and `usize` are rejected because they are not host-shareable.
    pub fn map_storable(&self, ty: &syn::Type) -> Result<KernelType> {
        let mapped = self.map_type(ty)?;
        self.check_storable(&mapped, ty.span())?;
        Ok(mapped)
    }

    fn check_storable(&self, ty: &KernelType, span: Span) -> Result<()> {
        match ty {
            KernelType::Value(name) if name == "bool" => Err(TranspileError::WgslLimitation(
                "`bool` is not host-shareable; use `Bool`".to_string(),
            )),
            KernelType::Value(name) if name == "usize" => Err(TranspileError::UnsupportedType {
                name: name.clone(),
                span,
            }),
            KernelType::Array { element, .. } => self.check_storable(element, span),
            KernelType::Resource { .. } | KernelType::Unit => Err(TranspileError::Type(format!(
                "`{}` cannot be stored in a buffer or struct",
                ty.host_name()
            ))),
            KernelType::Value(_) => Ok(()),
        }
    }

    fn map_type_path(&self, type_path: &syn::TypePath) -> Result<KernelType> {
        let segment = type_path
            .path
            .segments
            .last()
            .ok_or_else(|| TranspileError::Type("empty type path".to_string()))?;
        let ident = segment.ident.to_string();

        if let Some((_, reason)) = REJECTED.iter().find(|(name, _)| *name == ident) {
            return Err(TranspileError::WgslLimitation(format!(
                "`{ident}` is not supported: {reason}"
            )));
        }

        if let Some(resource) = ResourceType::from_name(&ident) {
            let element = self.resource_element(segment, resource)?;
            return Ok(KernelType::Resource { resource, element });
        }

        if !segment.arguments.is_empty() {
            return Err(TranspileError::UnsupportedType {
                name: type_text(&syn::Type::Path(type_path.clone())),
                span: type_path.span(),
            });
        }

        if self.structs.contains(&ident) || known_names().resolve_type(&ident).is_some() {
            return Ok(KernelType::Value(ident));
        }

        Err(TranspileError::UnsupportedType {
            name: ident,
            span: segment.ident.span(),
        })
    }

    fn resource_element(&self, segment: &syn::PathSegment, resource: ResourceType) -> Result<String> {
        let element = match &segment.arguments {
            syn::PathArguments::AngleBracketed(args) => match args.args.first() {
                Some(syn::GenericArgument::Type(ty)) => self.map_storable(ty)?,
                _ => {
                    return Err(TranspileError::Type(format!(
                        "`{}` needs an element type",
                        resource.name()
                    )))
                }
            },
            _ => {
                return Err(TranspileError::Type(format!(
                    "`{}` needs an element type",
                    resource.name()
                )))
            }
        };

        let name = match element {
            KernelType::Value(name) => name,
            other => {
                return Err(TranspileError::Type(format!(
                    "`{}` elements must be plain values, found `{}`",
                    resource.name(),
                    other.host_name()
                )))
            }
        };

        if resource.is_texture() && TexelFormat::from_type_name(&name).is_none() {
            return Err(TranspileError::UnsupportedType {
                name: format!("{}<{name}>", resource.name()),
                span: segment.ident.span(),
            });
        }
        Ok(name)
    }

    fn map_array(&self, type_array: &syn::TypeArray) -> Result<KernelType> {
        let element = self.map_type(&type_array.elem)?;
        let len = match &type_array.len {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Int(lit),
                ..
            }) => lit
                .base10_parse::<usize>()
                .map_err(|e| TranspileError::Type(e.to_string()))?,
            _ => {
                return Err(TranspileError::Unsupported(
                    "array length must be a literal integer".to_string(),
                ))
            }
        };
        Ok(KernelType::Array {
            element: Box::new(element),
            len,
        })
    }

    /// WGSL spelling of a mapped type. Resources map to their element type.
    pub fn wgsl_type(&self, ty: &KernelType) -> Result<String> {
        match ty {
            KernelType::Value(name) => self.wgsl_value(name),
            KernelType::Array { element, len } => {
                Ok(format!("array<{}, {len}>", self.wgsl_type(element)?))
            }
            KernelType::Resource { element, .. } => self.wgsl_value(element),
            KernelType::Unit => Ok(String::new()),
        }
    }

    /// WGSL spelling of a value type by host name.
    pub fn wgsl_value(&self, name: &str) -> Result<String> {
        if self.structs.contains(name) {
            return Ok(known_names().wgsl_identifier(name));
        }
        known_names()
            .resolve_type(name)
            .map(str::to_string)
            .ok_or_else(|| TranspileError::UnsupportedType {
                name: name.to_string(),
                span: Span::call_site(),
            })
    }
}

/// Source text of a type, for diagnostics.
pub fn type_text(ty: &syn::Type) -> String {
    quote::quote!(#ty).to_string().replace(' ', "")
}

/// Scalar and component count of a vector host type.
pub fn vector_info(name: &str) -> Option<(&'static str, usize)> {
    let (scalar, rest) = if let Some(rest) = name.strip_prefix("Float") {
        ("f32", rest)
    } else if let Some(rest) = name.strip_prefix("UInt") {
        ("u32", rest)
    } else if let Some(rest) = name.strip_prefix("Int") {
        ("i32", rest)
    } else {
        return None;
    };
    match rest {
        "2" => Some((scalar, 2)),
        "3" => Some((scalar, 3)),
        "4" => Some((scalar, 4)),
        _ => None,
    }
}

/// Dimension of a square matrix host type.
pub fn matrix_dim(name: &str) -> Option<usize> {
    match name {
        "Float2x2" => Some(2),
        "Float3x3" => Some(3),
        "Float4x4" => Some(4),
        _ => None,
    }
}

/// Host name of an `n`-component vector of `scalar`, or the scalar itself.
pub fn vector_name(scalar: &str, n: usize) -> String {
    if n == 1 {
        return scalar.to_string();
    }
    let prefix = match scalar {
        "f32" => "Float",
        "u32" => "UInt",
        _ => "Int",
    };
    format!("{prefix}{n}")
}

/// Component type of a vector or matrix, or the type itself.
pub fn component_type(name: &str) -> String {
    if let Some((scalar, _)) = vector_info(name) {
        return scalar.to_string();
    }
    if let Some(n) = matrix_dim(name) {
        return format!("Float{n}");
    }
    if let Some(element) = array_element(name) {
        return element.to_string();
    }
    name.to_string()
}

/// Element type of an array host string `[T; N]`.
pub fn array_element(name: &str) -> Option<&str> {
    let inner = name.strip_prefix('[')?.strip_suffix(']')?;
    let (element, _) = inner.rsplit_once(';')?;
    Some(element.trim())
}

/// Whether `name` is a numeric scalar.
pub fn is_scalar(name: &str) -> bool {
    matches!(name, "f32" | "i32" | "u32" | "usize")
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_primitive_types() {
        let mapper = TypeMapper::new();
        for (ty, wgsl) in [
            (parse_quote!(f32), "f32"),
            (parse_quote!(i32), "i32"),
            (parse_quote!(u32), "u32"),
            (parse_quote!(bool), "bool"),
            (parse_quote!(Bool), "u32"),
            (parse_quote!(kernelforge::Float3), "vec3<f32>"),
            (parse_quote!(Float4x4), "mat4x4<f32>"),
        ] {
            let ty: syn::Type = ty;
            let mapped = mapper.map_type(&ty).unwrap();
            assert_eq!(mapper.wgsl_type(&mapped).unwrap(), wgsl);
        }
    }

    #[test]
    fn test_f64_rejected() {
        let mapper = TypeMapper::new();
        let ty: syn::Type = parse_quote!(f64);
        let err = mapper.map_type(&ty).unwrap_err();
        assert!(err.to_string().contains("f64"));
    }

    #[test]
    fn test_unknown_type_carries_span() {
        let mapper = TypeMapper::new();
        let ty: syn::Type = parse_quote!(Particle);
        let err = mapper.map_type(&ty).unwrap_err();
        assert!(matches!(err, TranspileError::UnsupportedType { ref name, .. } if name == "Particle"));
        assert!(err.span().is_some());
    }

    #[test]
    fn test_custom_structs() {
        let mut mapper = TypeMapper::new();
        mapper.register_struct("Particle");
        let ty: syn::Type = parse_quote!(Particle);
        let mapped = mapper.map_type(&ty).unwrap();
        assert_eq!(mapped, KernelType::Value("Particle".to_string()));
        assert_eq!(mapper.wgsl_type(&mapped).unwrap(), "Particle");
    }

    #[test]
    fn test_arrays() {
        let mapper = TypeMapper::new();
        let ty: syn::Type = parse_quote!([Float3; 4]);
        let mapped = mapper.map_type(&ty).unwrap();
        assert_eq!(mapped.host_name(), "[Float3; 4]");
        assert_eq!(mapper.wgsl_type(&mapped).unwrap(), "array<vec3<f32>, 4>");
        assert_eq!(component_type(&mapped.host_name()), "Float3");
    }

    #[test]
    fn test_resources() {
        let mapper = TypeMapper::new();
        let ty: syn::Type = parse_quote!(ReadWriteBuffer<Float4>);
        assert_eq!(
            mapper.map_type(&ty).unwrap(),
            KernelType::Resource {
                resource: ResourceType::ReadWriteBuffer,
                element: "Float4".to_string()
            }
        );

        let ty: syn::Type = parse_quote!(ReadOnlyTexture2D<Rgba8>);
        assert!(mapper.map_type(&ty).unwrap().is_resource());

        let ty: syn::Type = parse_quote!(ReadOnlyTexture2D<Float3>);
        assert!(mapper.map_type(&ty).is_err());

        let ty: syn::Type = parse_quote!(ReadOnlyBuffer<bool>);
        assert!(mapper.map_type(&ty).is_err());
    }

    #[test]
    fn test_storable_rejects_bool_and_usize() {
        let mapper = TypeMapper::new();
        let ty: syn::Type = parse_quote!(bool);
        assert!(mapper.map_storable(&ty).is_err());
        let ty: syn::Type = parse_quote!([usize; 2]);
        assert!(mapper.map_storable(&ty).is_err());
        let ty: syn::Type = parse_quote!(Bool);
        assert!(mapper.map_storable(&ty).is_ok());
    }

    #[test]
    fn test_vector_helpers() {
        assert_eq!(vector_info("Float3"), Some(("f32", 3)));
        assert_eq!(vector_info("UInt2"), Some(("u32", 2)));
        assert_eq!(vector_info("Int4"), Some(("i32", 4)));
        assert_eq!(vector_info("Float4x4"), None);
        assert_eq!(vector_name("i32", 2), "Int2");
        assert_eq!(vector_name("f32", 1), "f32");
        assert_eq!(component_type("Float4x4"), "Float4");
        assert_eq!(matrix_dim("Float3x3"), Some(3));
    }
}
