//! WGSL code generation from Rust kernels for KernelForge.
//!
//! This crate translates ordinary Rust functions into WGSL compute shaders and
//! decides how every name a kernel uses maps onto WGSL.
//!
//! # Overview
//!
//! - [`registry`]: process-wide known-name tables (types, methods, members,
//!   keywords, resource indexers, samplers and size accessors)
//! - [`dispatch`]: expansion of dispatch-context members (`ThreadIds::xy`,
//!   `DispatchSize::count`, ...) into WGSL expressions
//! - [`explorer`]: discovery of the custom structs a kernel references
//! - [`wgsl_layout`]: agreement checks between host and WGSL struct layouts
//! - [`transpiler`]: the statement and expression emitter
//!
//! # Example
//!
//! ```ignore
//! use kernelforge_codegen::{transpile_kernel, KernelConfig};
//! use syn::parse_quote;
//!
//! let func: syn::ItemFn = parse_quote! {
//!     fn scale(values: ReadWriteBuffer<f32>, factor: f32) {
//!         let i = ThreadIds::x();
//!         values[i] = values[i] * factor;
//!     }
//! };
//!
//! let kernel = transpile_kernel(&func, &KernelConfig::new("scale"))?;
//! assert!(kernel.wgsl.contains("@compute @workgroup_size(64, 1, 1)"));
//! ```
//!
//! # WGSL Limitations
//!
//! - **No f64**: `f64` is rejected rather than downcast
//! - **No `bool` in buffers**: use `Bool`, which is a `u32` on the GPU
//! - **No recursion**: helper functions may not call themselves
//! - **Three-component vectors**: WGSL aligns `vec3` to 16 bytes, so a
//!   `Float3` followed by another `Float3` in a struct is rejected

pub mod bindings;
pub mod config;
pub mod dispatch;
pub mod dispatch_data;
pub mod explorer;
pub mod intrinsics;
pub mod loops;
pub mod module;
pub mod registry;
pub mod resources;
pub mod transpiler;
pub mod types;
pub mod validation;
pub mod wgsl_layout;

pub use bindings::{AccessMode, BindingLayout};
pub use config::KernelConfig;
pub use dispatch::{ContextType, CONTEXT_TYPES};
pub use explorer::{discover, discover_spanned, StructDef, StructTable, TypeGraph};
pub use intrinsics::{IntrinsicDecl, Naming, ReturnRule};
pub use loops::{LoopPattern, RangeInfo};
pub use module::KernelModule;
pub use registry::{known_names, Category, KnownNames, Lowering, MemberMapping, Resolution};
pub use resources::ResourceType;
pub use transpiler::{transpile_kernel, WgslTranspiler};
pub use types::{KernelType, TypeMapper};
pub use validation::{ValidationError, ValidationMode};

use proc_macro2::Span;
use thiserror::Error;

/// Errors that can occur during transpilation.
#[derive(Error, Debug)]
pub enum TranspileError {
    /// Failed to parse Rust code.
    #[error("Parse error: {0}")]
    Parse(String),

    /// DSL constraint violation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Unsupported Rust construct.
    #[error("Unsupported construct: {0}")]
    Unsupported(String),

    /// Type mapping failure.
    #[error("Type error: {0}")]
    Type(String),

    /// WGSL-specific limitation.
    #[error("WGSL limitation: {0}")]
    WgslLimitation(String),

    /// A name the kernel needs has no registry entry.
    #[error("Unknown {category}: `{name}`")]
    UnknownIdentifier {
        /// Registry category that was searched.
        category: Category,
        /// Name as written in the kernel.
        name: String,
        /// Source location.
        span: Span,
    },

    /// A custom struct reuses the name of a built-in type.
    #[error("Struct `{name}` shadows the built-in type of the same name")]
    ShadowsBuiltin {
        /// Struct name.
        name: String,
        /// Source location of the struct name.
        span: Span,
    },

    /// A type has no GPU layout.
    #[error("Unsupported type: `{name}` has no GPU representation")]
    UnsupportedType {
        /// Type as written in the kernel.
        name: String,
        /// Source location.
        span: Span,
    },
}

impl TranspileError {
    /// Source location of the error, if it carries one.
    pub fn span(&self) -> Option<Span> {
        match self {
            TranspileError::UnknownIdentifier { span, .. }
            | TranspileError::ShadowsBuiltin { span, .. }
            | TranspileError::UnsupportedType { span, .. } => Some(*span),
            _ => None,
        }
    }

    /// Convert into a `syn::Error` pointing at the offending source location.
    pub fn to_syn_error(&self) -> syn::Error {
        syn::Error::new(self.span().unwrap_or_else(Span::call_site), self.to_string())
    }
}

/// Result type for transpilation operations.
pub type Result<T> = std::result::Result<T, TranspileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpile_error_display() {
        let err = TranspileError::Parse("unexpected token".to_string());
        assert!(err.to_string().contains("Parse error"));

        let err = TranspileError::WgslLimitation("no f64".to_string());
        assert!(err.to_string().contains("WGSL limitation"));

        let err = TranspileError::UnknownIdentifier {
            category: Category::Method,
            name: "Float3::frobnicate".to_string(),
            span: Span::call_site(),
        };
        assert_eq!(err.to_string(), "Unknown method: `Float3::frobnicate`");
        assert!(err.span().is_some());
    }

    #[test]
    fn test_syn_error_conversion() {
        let err = TranspileError::Unsupported("closures".to_string());
        assert!(err.to_syn_error().to_string().contains("closures"));
    }
}
