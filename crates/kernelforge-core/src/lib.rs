//! Core types for KernelForge.
//!
//! This crate holds the pieces shared by the code generator and the GPU
//! runtime:
//!
//! - Host value types (`Float3`, `Int2`, `Bool`, texel types) and their GPU
//!   layout ([`types`], [`layout`])
//! - The marshalling routines that move data between unpadded host memory and
//!   padded or pitched device memory ([`marshal`])
//! - Kernel descriptors produced by the transpiler ([`kernel`])
//! - Dispatch-context marker types ([`context`])
//!
//! # Layout
//!
//! ```
//! use kernelforge_core::layout::{padded_stride, BufferKind, GpuType};
//! use kernelforge_core::types::Float3;
//!
//! assert_eq!(Float3::LAYOUT.size, 12);
//! assert_eq!(Float3::LAYOUT.pack, 4);
//! assert_eq!(padded_stride(12, BufferKind::Constant), 16);
//! assert_eq!(padded_stride(12, BufferKind::ReadOnly), 12);
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod kernel;
pub mod layout;
pub mod marshal;
pub mod types;

pub use context::{
    DispatchSize, GroupIds, GroupSize, ThreadIds, ThreadIdsNormalized, WorkgroupIds,
};
pub use error::{ForgeError, Result};
pub use kernel::{
    BindingDescriptor, BindingKind, DataField, DispatchDataLayout, KernelDescriptor,
    TextureDimension, DISPATCH_DATA_BINDING,
};
pub use layout::{
    get_layout, padded_stride, BufferKind, ElementLayout, GpuType, StructLayout, TypeLayout,
};
pub use types::{
    Bgra8, Bool, Float2, Float2x2, Float3, Float3x3, Float4, Float4x4, Int2, Int3, Int4,
    PixelFormat, R8, Rgba8, TexelFormat, TexelSampleKind, UInt2, UInt3, UInt4,
};
