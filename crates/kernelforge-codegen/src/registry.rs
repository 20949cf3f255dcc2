//! Known-name registries.
//!
//! Process-wide tables mapping fully-qualified host names to WGSL tokens.
//! They are built once, on first use, and never change afterwards, so any
//! number of transpiler threads can read them without locking.
//!
//! | Category | Key | Value |
//! |----------|-----|-------|
//! | Type | `kernelforge::Float3` | `vec3<f32>` |
//! | Method | `f32::sqrt`, `kernelforge::intrinsics::saturate` | WGSL function |
//! | Member | `kernelforge::ThreadIds::xy`, `f32::consts::PI` | expression |
//! | Keyword | `loop`, `vec3`, `sqrt`, `ThreadIds` | reserved |
//! | ResourceIndexer | `kernelforge::ReadWriteTexture2D<T>[i32, i32]` | coordinate type |
//! | ResourceSampler | `kernelforge::ReadOnlyTexture2D<T>::sample(f32, f32)` | coordinate constructor |
//! | SizeAccessor | `kernelforge::ReadOnlyTexture3D<T>::depth` | `(rank, axis)` |
//!
//! Host identifiers that collide with a keyword are not rejected; they are
//! rewritten with [`RESERVED_PREFIX`] through [`KnownNames::rewrite_identifier`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use kernelforge_core::layout::known_type_names;

use crate::dispatch::{ContextType, CONTEXT_TYPES};
use crate::intrinsics::{
    ReturnRule, FLOAT_VECTOR_METHODS, INTRINSIC_SURFACE, MATRIX_METHODS, NUMERIC_METHODS,
    VECTOR_METHODS,
};
use crate::resources::{indexer_entries, sampler_entries, size_accessor_entries};

/// Root path of every host-side kernel name.
pub const ROOT: &str = "kernelforge";

/// Module path of the intrinsic library.
pub const INTRINSICS_PATH: &str = "kernelforge::intrinsics";

/// Prefix given to host identifiers that collide with a reserved name.
pub const RESERVED_PREFIX: &str = "_reserved_";

/// Prefix of every generated (hidden) WGSL name.
pub const HIDDEN_PREFIX: &str = "_kf_";

/// Registry categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Value types.
    Type,
    /// Functions and methods.
    Method,
    /// Members, constants and dispatch-context values.
    Member,
    /// Reserved words.
    Keyword,
    /// Resource element access.
    ResourceIndexer,
    /// Resource sampling.
    ResourceSampler,
    /// Resource dimension queries.
    SizeAccessor,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Type => "type",
            Category::Method => "method",
            Category::Member => "member",
            Category::Keyword => "keyword",
            Category::ResourceIndexer => "resource indexer",
            Category::ResourceSampler => "resource sampler",
            Category::SizeAccessor => "size accessor",
        };
        f.write_str(name)
    }
}

/// How a member is lowered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lowering {
    /// A WGSL expression.
    Expression(String),
    /// A hidden entry-point parameter, referenced by name.
    HiddenParameter(&'static str),
}

/// A resolved member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMapping {
    /// Lowering.
    pub lowering: Lowering,
    /// Host type of the value.
    pub ty: &'static str,
}

/// A resolved method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMapping {
    /// WGSL function or constructor.
    pub target: String,
    /// Result type rule.
    pub returns: ReturnRule,
}

/// Result of [`KnownNames::try_resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// WGSL type token.
    Type(&'a str),
    /// Method mapping.
    Method(&'a MethodMapping),
    /// Member mapping.
    Member(&'a MemberMapping),
    /// The name is reserved.
    Keyword,
    /// Coordinate type of an element access.
    Indexer(&'a str),
    /// Coordinate constructor, or `None` to pass the argument through.
    Sampler(Option<&'a str>),
    /// Rank and axis read by a size accessor.
    SizeAccessor {
        /// Resource rank.
        rank: u8,
        /// Axis read.
        axis: u8,
    },
}

/// The process-wide known-name tables.
#[derive(Debug)]
pub struct KnownNames {
    types: HashMap<String, String>,
    methods: HashMap<String, MethodMapping>,
    members: HashMap<String, MemberMapping>,
    keywords: HashSet<String>,
    indexers: HashMap<String, String>,
    samplers: HashMap<String, Option<String>>,
    size_accessors: HashMap<String, (u8, u8)>,
}

/// WGSL keywords, reserved words and predeclared type names.
const WGSL_RESERVED: &[&str] = &[
    // keywords
    "alias", "break", "case", "const", "const_assert", "continue", "continuing", "default",
    "diagnostic", "discard", "else", "enable", "false", "fn", "for", "if", "let", "loop",
    "override", "requires", "return", "struct", "switch", "true", "var", "while",
    // reserved words
    "NULL", "Self", "abstract", "active", "alignas", "alignof", "as", "asm", "asm_fragment",
    "async", "attribute", "auto", "await", "become", "binding_array", "cast", "catch", "class",
    "co_await", "co_return", "co_yield", "coherent", "column_major", "common", "compile",
    "compile_fragment", "concept", "const_cast", "consteval", "constexpr", "constinit", "crate",
    "debugger", "decltype", "delete", "demote", "demote_to_helper", "do", "dynamic_cast", "enum",
    "explicit", "export", "extends", "extern", "external", "fallthrough", "filter", "final",
    "finally", "friend", "from", "fxgroup", "get", "goto", "groupshared", "highp", "impl",
    "implements", "import", "inline", "instanceof", "interface", "layout", "lowp", "macro",
    "macro_rules", "match", "mediump", "meta", "mod", "module", "move", "mut", "mutable",
    "namespace", "new", "nil", "noexcept", "noinline", "nointerpolation", "noperspective",
    "null", "nullptr", "of", "operator", "package", "packoffset", "partition", "pass", "patch",
    "pixelfragment", "precise", "precision", "premerge", "priv", "protected", "pub", "public",
    "readonly", "ref", "regardless", "register", "reinterpret_cast", "require", "resource",
    "restrict", "self", "set", "shared", "sizeof", "smooth", "snorm", "static", "static_assert",
    "static_cast", "std", "subroutine", "super", "target", "template", "this", "thread_local",
    "throw", "trait", "try", "type", "typedef", "typeid", "typename", "typeof", "union",
    "unless", "unorm", "unsafe", "unsized", "use", "using", "varying", "virtual", "volatile",
    "wgsl", "where", "with", "writeonly", "yield",
    // predeclared types
    "array", "atomic", "bool", "f16", "f32", "i32", "u32", "mat2x2", "mat2x3", "mat2x4",
    "mat3x2", "mat3x3", "mat3x4", "mat4x2", "mat4x3", "mat4x4", "ptr", "sampler",
    "sampler_comparison", "texture_1d", "texture_2d", "texture_2d_array", "texture_3d",
    "texture_cube", "texture_storage_2d", "texture_storage_3d", "vec2", "vec3", "vec4",
    // builtins referenced by generated code
    "arrayLength", "select", "textureDimensions", "textureLoad", "textureSampleLevel",
    "textureStore",
];

/// Host types with a direct WGSL token.
const TYPE_TABLE: &[(&str, &str)] = &[
    ("f32", "f32"),
    ("i32", "i32"),
    ("u32", "u32"),
    ("bool", "bool"),
    ("usize", "u32"),
    ("kernelforge::Bool", "u32"),
    ("kernelforge::Float2", "vec2<f32>"),
    ("kernelforge::Float3", "vec3<f32>"),
    ("kernelforge::Float4", "vec4<f32>"),
    ("kernelforge::Int2", "vec2<i32>"),
    ("kernelforge::Int3", "vec3<i32>"),
    ("kernelforge::Int4", "vec4<i32>"),
    ("kernelforge::UInt2", "vec2<u32>"),
    ("kernelforge::UInt3", "vec3<u32>"),
    ("kernelforge::UInt4", "vec4<u32>"),
    ("kernelforge::Float2x2", "mat2x2<f32>"),
    ("kernelforge::Float3x3", "mat3x3<f32>"),
    ("kernelforge::Float4x4", "mat4x4<f32>"),
    ("kernelforge::Rgba8", "vec4<f32>"),
    ("kernelforge::Bgra8", "vec4<f32>"),
    ("kernelforge::R8", "f32"),
];

/// Numeric constants: `(path, WGSL literal, host type)`.
const CONSTANTS: &[(&str, &str, &str)] = &[
    ("f32::consts::PI", "3.1415927", "f32"),
    ("f32::consts::TAU", "6.2831855", "f32"),
    ("f32::consts::E", "2.7182817", "f32"),
    ("f32::consts::FRAC_PI_2", "1.5707964", "f32"),
    ("f32::consts::FRAC_PI_4", "0.7853982", "f32"),
    ("f32::consts::FRAC_1_PI", "0.31830987", "f32"),
    ("f32::consts::SQRT_2", "1.4142135", "f32"),
    ("f32::consts::LN_2", "0.6931472", "f32"),
    ("f32::MAX", "3.4028235e38", "f32"),
    ("f32::MIN", "-3.4028235e38", "f32"),
    ("f32::EPSILON", "1.1920929e-7", "f32"),
    ("i32::MAX", "2147483647i", "i32"),
    ("i32::MIN", "i32(-2147483648)", "i32"),
    ("u32::MAX", "4294967295u", "u32"),
    ("u32::MIN", "0u", "u32"),
    ("kernelforge::Bool::TRUE", "1u", "Bool"),
    ("kernelforge::Bool::FALSE", "0u", "Bool"),
];

/// Vector host types: `(name, scalar, components)`.
const VECTOR_TYPES: &[(&str, &str, usize)] = &[
    ("Float2", "f32", 2),
    ("Float3", "f32", 3),
    ("Float4", "f32", 4),
    ("Int2", "i32", 2),
    ("Int3", "i32", 3),
    ("Int4", "i32", 4),
    ("UInt2", "u32", 2),
    ("UInt3", "u32", 3),
    ("UInt4", "u32", 4),
];

const MATRIX_TYPES: &[&str] = &["Float2x2", "Float3x3", "Float4x4"];

static KNOWN_NAMES: OnceLock<KnownNames> = OnceLock::new();

/// The process-wide registry, built on first use.
pub fn known_names() -> &'static KnownNames {
    KNOWN_NAMES.get_or_init(KnownNames::build)
}

/// Candidate fully-qualified names for a path as written in a kernel.
///
/// The path itself is tried first, then rooted at `kernelforge`, then inside
/// the intrinsic library.
pub fn qualify(path: &str) -> Vec<String> {
    if path.starts_with(ROOT) {
        return vec![path.to_string()];
    }
    let path = path
        .strip_prefix("std::")
        .or_else(|| path.strip_prefix("core::"))
        .unwrap_or(path);
    vec![
        path.to_string(),
        format!("{ROOT}::{path}"),
        format!("{INTRINSICS_PATH}::{path}"),
    ]
}

impl KnownNames {
    /// Build every table. Malformed static entries trip a debug assertion.
    fn build() -> Self {
        let mut names = Self {
            types: HashMap::new(),
            methods: HashMap::new(),
            members: HashMap::new(),
            keywords: WGSL_RESERVED.iter().map(|s| s.to_string()).collect(),
            indexers: indexer_entries().into_iter().collect(),
            samplers: sampler_entries().into_iter().collect(),
            size_accessors: size_accessor_entries().into_iter().collect(),
        };

        for (host, target) in TYPE_TABLE {
            names.types.insert(host.to_string(), target.to_string());
        }

        for context in CONTEXT_TYPES {
            names.add_context_type(context);
        }

        for (path, target, returns) in NUMERIC_METHODS {
            names.add_method(path.to_string(), target.to_string(), *returns);
        }

        for decl in INTRINSIC_SURFACE {
            let target = decl.target_name();
            names.keywords.insert(target.clone());
            names.add_method(format!("{INTRINSICS_PATH}::{}", decl.name), target, decl.returns);
        }

        for (name, scalar, n) in VECTOR_TYPES {
            let owner = format!("{ROOT}::{name}");
            let constructor = format!("vec{n}<{scalar}>");
            for ctor in ["new", "splat"] {
                names.add_method(
                    format!("{owner}::{ctor}"),
                    constructor.clone(),
                    ReturnRule::Fixed(name),
                );
            }
            let float_methods = if *scalar == "f32" { FLOAT_VECTOR_METHODS } else { &[] };
            for (method, target, returns) in VECTOR_METHODS.iter().chain(float_methods) {
                names.add_method(format!("{owner}::{method}"), target.to_string(), *returns);
            }
            if *name == "Float3" {
                names.add_method(
                    format!("{owner}::cross"),
                    "cross".to_string(),
                    ReturnRule::Fixed("Float3"),
                );
            }
        }

        for name in MATRIX_TYPES {
            let owner = format!("{ROOT}::{name}");
            let n = &name[5..6];
            names.add_method(
                format!("{owner}::from_columns"),
                format!("mat{n}x{n}<f32>"),
                ReturnRule::Fixed(name),
            );
            for (method, target, returns) in MATRIX_METHODS {
                names.add_method(format!("{owner}::{method}"), target.to_string(), *returns);
            }
        }

        for (path, literal, ty) in CONSTANTS {
            names.members.insert(
                path.to_string(),
                MemberMapping {
                    lowering: Lowering::Expression(literal.to_string()),
                    ty,
                },
            );
        }

        for name in known_type_names() {
            debug_assert!(
                names.resolve_type(name).is_some(),
                "layout table type {name} has no WGSL token"
            );
        }

        tracing::debug!(
            types = names.types.len(),
            methods = names.methods.len(),
            members = names.members.len(),
            keywords = names.keywords.len(),
            "built known-name registry"
        );

        names
    }

    fn add_context_type(&mut self, context: &ContextType) {
        let owner = format!("{ROOT}::{}", context.name);
        self.types.insert(owner.clone(), context.target.to_string());
        self.keywords.insert(context.name.to_string());

        for member in context.members {
            match context.expand(member) {
                Ok(mapping) => {
                    self.members.insert(format!("{owner}::{member}"), mapping);
                }
                Err(e) => {
                    debug_assert!(false, "dispatch-context table is malformed: {e}");
                    tracing::error!(error = %e, "skipping malformed dispatch-context member");
                }
            }
        }
    }

    /// Overloads collapse onto one entry; the first declaration wins.
    fn add_method(&mut self, key: String, target: String, returns: ReturnRule) {
        self.methods
            .entry(key)
            .or_insert(MethodMapping { target, returns });
    }

    /// Resolve a name in one category.
    pub fn try_resolve(&self, category: Category, name: &str) -> Option<Resolution<'_>> {
        match category {
            Category::Type => self.resolve_type(name).map(Resolution::Type),
            Category::Method => self.resolve_method(name).map(Resolution::Method),
            Category::Member => self.resolve_member(name).map(Resolution::Member),
            Category::Keyword => self.is_keyword(name).then_some(Resolution::Keyword),
            Category::ResourceIndexer => self.resolve_indexer(name).map(Resolution::Indexer),
            Category::ResourceSampler => self.resolve_sampler(name).map(Resolution::Sampler),
            Category::SizeAccessor => self
                .resolve_size_accessor(name)
                .map(|(rank, axis)| Resolution::SizeAccessor { rank, axis }),
        }
    }

    /// WGSL token of a value type, trying every qualification of `name`.
    pub fn resolve_type(&self, name: &str) -> Option<&str> {
        qualify(name)
            .iter()
            .find_map(|candidate| self.types.get(candidate))
            .map(String::as_str)
    }

    /// Fully-qualified key of a value type, if the registry knows it.
    pub fn qualified_type(&self, name: &str) -> Option<String> {
        qualify(name)
            .into_iter()
            .find(|candidate| self.types.contains_key(candidate))
    }

    /// Method mapping, trying every qualification of `name`.
    pub fn resolve_method(&self, name: &str) -> Option<&MethodMapping> {
        qualify(name)
            .iter()
            .find_map(|candidate| self.methods.get(candidate))
    }

    /// Member mapping, trying every qualification of `name`.
    pub fn resolve_member(&self, name: &str) -> Option<&MemberMapping> {
        qualify(name)
            .iter()
            .find_map(|candidate| self.members.get(candidate))
    }

    /// Whether `name` is reserved in WGSL or by the generated code.
    pub fn is_keyword(&self, name: &str) -> bool {
        self.keywords.contains(name)
    }

    /// Coordinate type for an indexer key.
    pub fn resolve_indexer(&self, key: &str) -> Option<&str> {
        self.indexers.get(key).map(String::as_str)
    }

    /// Sampler coordinate constructor for a sampler key.
    pub fn resolve_sampler(&self, key: &str) -> Option<Option<&str>> {
        self.samplers.get(key).map(Option::as_deref)
    }

    /// Rank and axis for a size accessor key.
    pub fn resolve_size_accessor(&self, key: &str) -> Option<(u8, u8)> {
        self.size_accessors.get(key).copied()
    }

    /// Rewrite a host identifier that would collide with a reserved name.
    ///
    /// Returns `None` when the identifier can be used verbatim.
    pub fn rewrite_identifier(&self, ident: &str) -> Option<String> {
        let collides = self.is_keyword(ident)
            || ident.starts_with("__")
            || ident.starts_with(RESERVED_PREFIX)
            || ident.starts_with(HIDDEN_PREFIX);
        collides.then(|| format!("{RESERVED_PREFIX}{ident}"))
    }

    /// The WGSL spelling of a host identifier.
    pub fn wgsl_identifier(&self, ident: &str) -> String {
        self.rewrite_identifier(ident)
            .unwrap_or_else(|| ident.to_string())
    }

    /// Number of entries per category.
    pub fn len(&self, category: Category) -> usize {
        match category {
            Category::Type => self.types.len(),
            Category::Method => self.methods.len(),
            Category::Member => self.members.len(),
            Category::Keyword => self.keywords.len(),
            Category::ResourceIndexer => self.indexers.len(),
            Category::ResourceSampler => self.samplers.len(),
            Category::SizeAccessor => self.size_accessors.len(),
        }
    }

    /// Whether a category is empty.
    pub fn is_empty(&self, category: Category) -> bool {
        self.len(category) == 0
    }
}
