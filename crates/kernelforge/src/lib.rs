//! # KernelForge
//!
//! Write GPU compute kernels as ordinary Rust functions and run them through
//! wgpu.
//!
//! Kernels are transpiled to WGSL at build time by `#[kernel_module]`, or at
//! run time with [`codegen::transpile_kernel`]. Host data moves through typed
//! buffers and textures that take care of the device layout (constant-buffer
//! element padding, texture row pitch) so host slices stay tightly packed.
//!
//! ## Quick Start
//!
//! ```ignore
//! use kernelforge::prelude::*;
//!
//! #[kernel_module]
//! mod kernels {
//!     use kernelforge::prelude::*;
//!
//!     #[kernel(workgroup_size(64))]
//!     fn saxpy(x: ReadOnlyBuffer<f32>, y: ReadWriteBuffer<f32>, a: f32) {
//!         let i = ThreadIds::x();
//!         y[i] = a * x[i] + y[i];
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let device = GpuDevice::shared(&DeviceConfig::from_env()).await?;
//!     let shader = ComputeShader::new(&device, &kernels::SAXPY).await?;
//!
//!     let x = ReadOnlyBuffer::from_slice(&device, &[1.0f32; 1024])?;
//!     let y = ReadWriteBuffer::from_slice(&device, &[2.0f32; 1024])?;
//!
//!     let args = KernelArgs::new().bind("x", &x).bind("y", &y).value("a", 3.0f32);
//!     shader.dispatch(&args, 1024, 1, 1)?;
//!
//!     assert!(y.get_data()?.iter().all(|v| *v == 5.0));
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! - `kernelforge-core` - host value types, layout engine, marshalling
//! - `kernelforge-codegen` - Rust to WGSL transpiler (re-exported as [`codegen`])
//! - `kernelforge-derive` - `#[derive(GpuType)]` and `#[kernel_module]`
//! - `kernelforge-wgpu` - devices, resources and dispatch (`wgpu` feature, on by default)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(hidden_glob_reexports)]

// Re-export core types
pub use kernelforge_core::*;

// Re-export derive macros
pub use kernelforge_derive::*;

// Re-export the wgpu runtime
#[cfg(feature = "wgpu")]
pub use kernelforge_wgpu::*;

// Re-export codegen
pub use kernelforge_codegen as codegen;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use kernelforge_core::{
        Bgra8, Bool, DispatchSize, Float2, Float2x2, Float3, Float3x3, Float4, Float4x4,
        ForgeError, GpuType, GroupIds, GroupSize, Int2, Int3, Int4, PixelFormat, Result, R8,
        Rgba8, ThreadIds, ThreadIdsNormalized, UInt2, UInt3, UInt4, WorkgroupIds,
    };
    pub use kernelforge_derive::*;

    #[cfg(feature = "wgpu")]
    pub use kernelforge_wgpu::{
        ComputeShader, ConstantBuffer, DeviceConfig, GpuDevice, KernelArgs, ReadBackBuffer,
        ReadOnlyBuffer, ReadOnlyTexture2D, ReadOnlyTexture3D, ReadWriteBuffer,
        ReadWriteTexture2D, ReadWriteTexture3D, UploadBuffer,
    };
}

/// Intrinsic functions callable from kernel bodies.
///
/// Intrinsics exist only inside kernels: a call such as
/// `kernelforge::intrinsics::saturate(v)` or the bare `saturate(v)` is
/// rewritten by the transpiler to the WGSL builtin of the same name
/// (`inverse_sqrt` becomes `inverseSqrt`). [`SURFACE`] lists every declared
/// overload.
///
/// ```
/// use kernelforge::intrinsics::SURFACE;
///
/// let saturate = SURFACE.iter().find(|d| d.name == "saturate").unwrap();
/// assert_eq!(saturate.target_name(), "saturate");
/// ```
pub mod intrinsics {
    pub use kernelforge_codegen::intrinsics::{
        IntrinsicDecl, Naming, ReturnRule, BARRIERS, INTRINSIC_SURFACE as SURFACE,
    };
}

/// Items used by the code the macros expand to.
#[doc(hidden)]
pub mod __private {
    pub use bytemuck;
    pub use kernelforge_core::kernel::{
        BindingDescriptor, BindingKind, DataField, DispatchDataLayout, KernelDescriptor,
        TextureDimension,
    };
    pub use kernelforge_core::layout::{BufferKind, GpuType, TypeLayout};
    pub use kernelforge_core::types::TexelFormat;
}
