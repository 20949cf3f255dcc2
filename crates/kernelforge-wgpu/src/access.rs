//! Type-level access modes for buffers and textures.
//!
//! The marker chosen for a resource fixes its [`BufferKind`], its wgpu usage
//! flags and the single view it exposes to kernels.

use kernelforge_core::layout::BufferKind;

use crate::view::ViewKind;

mod sealed {
    pub trait Sealed {}
}

/// Constant buffer elements (16-byte element stride).
#[derive(Debug, Clone, Copy)]
pub enum Constant {}

/// Read-only in kernels.
#[derive(Debug, Clone, Copy)]
pub enum ReadOnly {}

/// Readable and writable in kernels.
#[derive(Debug, Clone, Copy)]
pub enum ReadWrite {}

/// Host-mappable destination for downloads; not visible to kernels.
#[derive(Debug, Clone, Copy)]
pub enum ReadBack {}

/// Host-mappable source for uploads; not visible to kernels.
#[derive(Debug, Clone, Copy)]
pub enum Upload {}

impl sealed::Sealed for Constant {}
impl sealed::Sealed for ReadOnly {}
impl sealed::Sealed for ReadWrite {}
impl sealed::Sealed for ReadBack {}
impl sealed::Sealed for Upload {}

/// Access mode of a [`Buffer`](crate::Buffer).
pub trait BufferAccess: sealed::Sealed + 'static {
    /// Buffer kind driving the element stride.
    const KIND: BufferKind;
    /// wgpu usage flags of the allocation.
    const USAGE: wgpu::BufferUsages;
}

/// Buffer access modes a kernel can bind.
pub trait ShaderAccess: BufferAccess {
    /// The view created for the buffer.
    const VIEW: ViewKind;
}

/// Access mode of a texture.
pub trait TextureAccess: sealed::Sealed + 'static {
    /// Bound as a read-write storage texture.
    const READ_WRITE: bool;
    /// The view created for the texture.
    const VIEW: ViewKind;
    /// wgpu usage flags of the allocation.
    const USAGE: wgpu::TextureUsages;
}

const STORAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_DST)
    .union(wgpu::BufferUsages::COPY_SRC);

impl BufferAccess for Constant {
    const KIND: BufferKind = BufferKind::Constant;
    const USAGE: wgpu::BufferUsages = STORAGE;
}

impl BufferAccess for ReadOnly {
    const KIND: BufferKind = BufferKind::ReadOnly;
    const USAGE: wgpu::BufferUsages = STORAGE;
}

impl BufferAccess for ReadWrite {
    const KIND: BufferKind = BufferKind::ReadWrite;
    const USAGE: wgpu::BufferUsages = STORAGE;
}

impl BufferAccess for ReadBack {
    const KIND: BufferKind = BufferKind::ReadBack;
    const USAGE: wgpu::BufferUsages = wgpu::BufferUsages::MAP_READ.union(wgpu::BufferUsages::COPY_DST);
}

impl BufferAccess for Upload {
    const KIND: BufferKind = BufferKind::Transfer;
    const USAGE: wgpu::BufferUsages =
        wgpu::BufferUsages::MAP_WRITE.union(wgpu::BufferUsages::COPY_SRC);
}

impl ShaderAccess for Constant {
    const VIEW: ViewKind = ViewKind::Constant;
}

impl ShaderAccess for ReadOnly {
    const VIEW: ViewKind = ViewKind::ShaderResource;
}

impl ShaderAccess for ReadWrite {
    const VIEW: ViewKind = ViewKind::UnorderedAccess;
}

impl TextureAccess for ReadOnly {
    const READ_WRITE: bool = false;
    const VIEW: ViewKind = ViewKind::ShaderResource;
    const USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
        .union(wgpu::TextureUsages::COPY_DST)
        .union(wgpu::TextureUsages::COPY_SRC);
}

impl TextureAccess for ReadWrite {
    const READ_WRITE: bool = true;
    const VIEW: ViewKind = ViewKind::UnorderedAccess;
    const USAGE: wgpu::TextureUsages = wgpu::TextureUsages::STORAGE_BINDING
        .union(wgpu::TextureUsages::COPY_DST)
        .union(wgpu::TextureUsages::COPY_SRC);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_visible_kinds_are_mappable() {
        assert!(<ReadBack as BufferAccess>::USAGE.contains(wgpu::BufferUsages::MAP_READ));
        assert!(<Upload as BufferAccess>::USAGE.contains(wgpu::BufferUsages::MAP_WRITE));
        assert!(!<ReadWrite as BufferAccess>::USAGE.intersects(
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::MAP_WRITE
        ));
    }

    #[test]
    fn test_kinds_match_markers() {
        assert_eq!(<Constant as BufferAccess>::KIND, BufferKind::Constant);
        assert_eq!(<Upload as BufferAccess>::KIND, BufferKind::Transfer);
        assert!(<Upload as BufferAccess>::KIND.is_host_visible());
        assert!(<ReadWrite as BufferAccess>::KIND.is_bindable());
    }
}
