//! Type graph explorer.
//!
//! Finds every custom struct reachable from a kernel's parameter and local
//! types, so each gets exactly one WGSL declaration. Registry types are
//! leaves. Output order is the depth-first pre-order of the first visit,
//! which makes generated modules reproducible for the same input.

use std::collections::HashSet;

use proc_macro2::Span;
use syn::spanned::Spanned;

use crate::registry::known_names;
use crate::types::{KernelType, TypeMapper};
use crate::{Result, TranspileError};

/// One field of a custom struct.
#[derive(Debug, Clone)]
pub struct StructField {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: KernelType,
    /// Source location of the field type.
    pub span: Span,
}

/// A custom struct a kernel may reference.
#[derive(Debug, Clone)]
pub struct StructDef {
    /// Struct name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<StructField>,
    /// Source location of the struct name.
    pub span: Span,
}

impl StructDef {
    /// Build a definition from a parsed struct. Field types are resolved with
    /// `mapper`, which must already know every struct name in the module.
    pub fn from_item(item: &syn::ItemStruct, mapper: &TypeMapper) -> Result<Self> {
        let name = item.ident.to_string();

        if known_names().resolve_type(&name).is_some() {
            return Err(TranspileError::ShadowsBuiltin {
                name,
                span: item.ident.span(),
            });
        }
        if !item.generics.params.is_empty() {
            return Err(TranspileError::Unsupported(format!(
                "generic struct `{name}`"
            )));
        }
        if !has_repr_c(&item.attrs) {
            return Err(TranspileError::WgslLimitation(format!(
                "struct `{name}` must be #[repr(C)] to share a layout with the GPU"
            )));
        }

        let named = match &item.fields {
            syn::Fields::Named(named) => named,
            syn::Fields::Unit => {
                return Err(TranspileError::WgslLimitation(format!(
                    "struct `{name}` has no fields"
                )))
            }
            syn::Fields::Unnamed(_) => {
                return Err(TranspileError::Unsupported(format!(
                    "tuple struct `{name}`; use named fields"
                )))
            }
        };

        let fields = named
            .named
            .iter()
            .map(|field| {
                let ident = field
                    .ident
                    .as_ref()
                    .ok_or_else(|| TranspileError::Parse("unnamed field".to_string()))?;
                Ok(StructField {
                    name: ident.to_string(),
                    span: field.ty.span(),
                    ty: mapper.map_storable(&field.ty).map_err(|e| match e {
                        TranspileError::UnsupportedType { name, .. } => {
                            TranspileError::UnsupportedType {
                                name,
                                span: field.ty.span(),
                            }
                        }
                        other => other,
                    })?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name,
            fields,
            span: item.ident.span(),
        })
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn has_repr_c(attrs: &[syn::Attribute]) -> bool {
    let mut found = false;
    for attr in attrs.iter().filter(|a| a.path().is_ident("repr")) {
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("C") {
                found = true;
            }
            if meta.input.peek(syn::token::Paren) {
                let args;
                syn::parenthesized!(args in meta.input);
                args.parse::<proc_macro2::TokenStream>()?;
            }
            Ok(())
        });
    }
    found
}

/// Source of struct definitions for the explorer.
pub trait TypeGraph {
    /// Definition of a custom struct, if the graph has one.
    fn struct_def(&self, name: &str) -> Option<&StructDef>;
}

/// The structs declared in a kernel module, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct StructTable {
    defs: Vec<StructDef>,
}

impl StructTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a set of struct items. Names are registered with `mapper`
    /// before any field is resolved so structs may reference each other.
    pub fn from_items(items: &[syn::ItemStruct], mapper: &mut TypeMapper) -> Result<Self> {
        for item in items {
            mapper.register_struct(&item.ident.to_string());
        }
        let mut table = Self::new();
        for item in items {
            table.insert(StructDef::from_item(item, mapper)?)?;
        }
        Ok(table)
    }

    /// Add a definition. Duplicate names are rejected.
    pub fn insert(&mut self, def: StructDef) -> Result<()> {
        if self.struct_def(&def.name).is_some() {
            return Err(TranspileError::Type(format!(
                "struct `{}` is declared twice",
                def.name
            )));
        }
        self.defs.push(def);
        Ok(())
    }

    /// Definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &StructDef> {
        self.defs.iter()
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl TypeGraph for StructTable {
    fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.defs.iter().find(|d| d.name == name)
    }
}

/// Discover every custom struct reachable from `roots`.
///
/// Registry types are never returned and no struct is returned twice. A type
/// that is neither in the registry nor in `graph` is an error.
pub fn discover<'a, G, I>(roots: I, graph: &G) -> Result<Vec<String>>
where
    G: TypeGraph + ?Sized,
    I: IntoIterator<Item = &'a KernelType>,
{
    discover_spanned(roots.into_iter().map(|ty| (ty, Span::call_site())), graph)
}

/// [`discover`] with the source location each root was written at, used for
/// errors about that root.
pub fn discover_spanned<'a, G, I>(roots: I, graph: &G) -> Result<Vec<String>>
where
    G: TypeGraph + ?Sized,
    I: IntoIterator<Item = (&'a KernelType, Span)>,
{
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    for (root, span) in roots {
        visit(root, span, graph, &mut visited, &mut order)?;
    }
    tracing::trace!(structs = order.len(), "explored type graph");
    Ok(order)
}

fn visit<G: TypeGraph + ?Sized>(
    ty: &KernelType,
    span: Span,
    graph: &G,
    visited: &mut HashSet<String>,
    order: &mut Vec<String>,
) -> Result<()> {
    let name = match ty {
        KernelType::Value(name) => name,
        KernelType::Resource { element, .. } => element,
        KernelType::Array { element, .. } => return visit(element, span, graph, visited, order),
        KernelType::Unit => return Ok(()),
    };

    if visited.contains(name) || known_names().resolve_type(name).is_some() {
        return Ok(());
    }
    let Some(def) = graph.struct_def(name) else {
        return Err(TranspileError::UnsupportedType {
            name: name.clone(),
            span,
        });
    };

    visited.insert(name.clone());
    order.push(name.clone());
    for field in &def.fields {
        visit(&field.ty, field.span, graph, visited, order)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn table(items: Vec<syn::ItemStruct>) -> StructTable {
        let mut mapper = TypeMapper::new();
        StructTable::from_items(&items, &mut mapper).unwrap()
    }

    fn value(name: &str) -> KernelType {
        KernelType::Value(name.to_string())
    }

    #[test]
    fn test_known_root_is_empty() {
        let graph = StructTable::new();
        assert!(discover(&[value("Float3")], &graph).unwrap().is_empty());
        assert!(discover(&[value("f32")], &graph).unwrap().is_empty());
    }

    #[test]
    fn test_struct_without_custom_fields() {
        let graph = table(vec![parse_quote! {
            #[repr(C)]
            struct Particle { position: Float3, mass: f32 }
        }]);
        assert_eq!(discover(&[value("Particle")], &graph).unwrap(), vec!["Particle"]);
    }

    #[test]
    fn test_nested_structs_are_deduplicated() {
        let graph = table(vec![
            parse_quote! {
                #[repr(C)]
                struct Ray { origin: Point, direction: Point }
            },
            parse_quote! {
                #[repr(C)]
                struct Point { x: f32, y: f32 }
            },
            parse_quote! {
                #[repr(C)]
                struct Hit { ray: Ray, points: [Point; 2], distance: f32 }
            },
        ]);
        let found = discover(&[value("Hit"), value("Ray")], &graph).unwrap();
        assert_eq!(found, vec!["Hit", "Ray", "Point"]);
    }

    #[test]
    fn test_order_is_stable() {
        let items: Vec<syn::ItemStruct> = vec![
            parse_quote! { #[repr(C)] struct A { b: B, c: C } },
            parse_quote! { #[repr(C)] struct B { c: C } },
            parse_quote! { #[repr(C)] struct C { v: f32 } },
        ];
        let first = discover(&[value("A")], &table(items.clone())).unwrap();
        let second = discover(&[value("A")], &table(items)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_cycles_terminate() {
        let mut graph = StructTable::new();
        graph
            .insert(StructDef {
                name: "Left".to_string(),
                fields: vec![StructField {
                    name: "right".to_string(),
                    ty: value("Right"),
                    span: Span::call_site(),
                }],
                span: Span::call_site(),
            })
            .unwrap();
        graph
            .insert(StructDef {
                name: "Right".to_string(),
                fields: vec![StructField {
                    name: "left".to_string(),
                    ty: value("Left"),
                    span: Span::call_site(),
                }],
                span: Span::call_site(),
            })
            .unwrap();
        assert_eq!(discover(&[value("Left")], &graph).unwrap(), vec!["Left", "Right"]);
    }

    #[test]
    fn test_resource_elements_are_roots() {
        let graph = table(vec![parse_quote! {
            #[repr(C)]
            struct Particle { position: Float4 }
        }]);
        let root = KernelType::Resource {
            resource: crate::ResourceType::ReadWriteBuffer,
            element: "Particle".to_string(),
        };
        assert_eq!(discover(&[root], &graph).unwrap(), vec!["Particle"]);
    }

    #[test]
    fn test_unknown_type_is_error() {
        let graph = StructTable::new();
        assert!(discover(&[value("Missing")], &graph).is_err());
    }

    #[test]
    fn test_unknown_field_type_points_at_field() {
        let item: syn::ItemStruct = parse_quote! {
            #[repr(C)]
            struct Holder { inner: Missing }
        };
        let field_span = match &item.fields {
            syn::Fields::Named(named) => named.named[0].ty.span(),
            _ => unreachable!(),
        };

        // A graph whose definitions were built without checking field types.
        let mut graph = StructTable::new();
        graph
            .insert(StructDef {
                name: "Holder".to_string(),
                fields: vec![StructField {
                    name: "inner".to_string(),
                    ty: value("Missing"),
                    span: field_span,
                }],
                span: item.ident.span(),
            })
            .unwrap();

        let root_span = item.ident.span();
        let err = discover_spanned([(&value("Holder"), root_span)], &graph).unwrap_err();
        assert!(matches!(&err, TranspileError::UnsupportedType { name, .. } if name == "Missing"));
        assert_eq!(format!("{:?}", err.span()), format!("{:?}", Some(field_span)));

        let err = discover_spanned([(&value("Missing"), root_span)], &graph).unwrap_err();
        assert_eq!(format!("{:?}", err.span()), format!("{:?}", Some(root_span)));
    }

    #[test]
    fn test_struct_named_like_builtin_rejected() {
        let mut mapper = TypeMapper::new();
        let items: Vec<syn::ItemStruct> =
            vec![parse_quote! { #[repr(C)] struct Float3 { x: f32, y: f32, z: f32 } }];
        let err = StructTable::from_items(&items, &mut mapper).unwrap_err();
        assert!(matches!(&err, TranspileError::ShadowsBuiltin { name, .. } if name == "Float3"));
        assert!(err.span().is_some());

        let items: Vec<syn::ItemStruct> =
            vec![parse_quote! { #[repr(C)] struct ThreadIds { x: i32 } }];
        assert!(StructTable::from_items(&items, &mut mapper).is_err());
    }

    #[test]
    fn test_registry_types_stay_leaves() {
        // Even a graph that carries a definition under a registry name
        // never reports that name as custom.
        let mut graph = StructTable::new();
        graph
            .insert(StructDef {
                name: "Float4".to_string(),
                fields: vec![],
                span: Span::call_site(),
            })
            .unwrap();
        assert!(discover(&[value("Float4")], &graph).unwrap().is_empty());
    }

    #[test]
    fn test_repr_c_required() {
        let mut mapper = TypeMapper::new();
        let items: Vec<syn::ItemStruct> = vec![parse_quote! { struct Loose { v: f32 } }];
        assert!(StructTable::from_items(&items, &mut mapper).is_err());

        let items: Vec<syn::ItemStruct> =
            vec![parse_quote! { #[repr(C, align(16))] struct Tight { v: f32 } }];
        assert!(StructTable::from_items(&items, &mut mapper).is_ok());
    }

    #[test]
    fn test_bool_field_rejected() {
        let mut mapper = TypeMapper::new();
        let items: Vec<syn::ItemStruct> =
            vec![parse_quote! { #[repr(C)] struct Flags { on: bool } }];
        assert!(StructTable::from_items(&items, &mut mapper).is_err());
    }
}
