//! wgpu runtime for KernelForge.
//!
//! This crate owns the device-side half of a kernel's life:
//!
//! - [`GpuDevice`] and the process-wide [`DeviceCache`]
//! - Typed buffers ([`ConstantBuffer`], [`ReadWriteBuffer`], ...) whose
//!   element strides come from the layout engine
//! - 2D and 3D textures with pitched transfers
//! - [`ComputeShader`], which builds a pipeline from a [`KernelDescriptor`]
//!   and dispatches it with [`KernelArgs`]
//!
//! # Example
//!
//! ```no_run
//! use kernelforge_core::KernelDescriptor;
//! use kernelforge_wgpu::{ComputeShader, DeviceConfig, GpuDevice, KernelArgs, ReadWriteBuffer};
//!
//! # async fn run(descriptor: &KernelDescriptor) -> kernelforge_core::Result<()> {
//! let device = GpuDevice::shared(&DeviceConfig::from_env()).await?;
//! let values = ReadWriteBuffer::from_slice(&device, &[1.0f32, 2.0, 3.0, 4.0])?;
//!
//! let shader = ComputeShader::new(&device, descriptor).await?;
//! shader.dispatch(&KernelArgs::new().bind("values", &values), 4, 1, 1)?;
//!
//! let scaled = values.get_data()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod access;
mod args;
mod buffer;
mod device;
mod shader;
mod texture;
pub mod view;

pub use args::{Bindable, KernelArgs};
pub use buffer::{
    Buffer, ConstantBuffer, ReadBackBuffer, ReadOnlyBuffer, ReadWriteBuffer, UploadBuffer,
};
pub use device::{enumerate_adapters, is_gpu_available, AdapterId, DeviceCache, DeviceConfig, GpuDevice};
pub use kernelforge_core::kernel::KernelDescriptor;
pub use shader::ComputeShader;
pub use texture::{
    ReadOnlyTexture2D, ReadOnlyTexture3D, ReadWriteTexture2D, ReadWriteTexture3D, Texture2D,
    Texture3D,
};
pub use view::{ViewDescriptor, ViewDimension, ViewFormat, ViewKind};
