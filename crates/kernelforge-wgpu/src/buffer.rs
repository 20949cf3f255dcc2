//! Typed device buffers.
//!
//! A [`Buffer`] owns one wgpu allocation of `len` elements laid out at the
//! padded stride of its access mode. Uploads and downloads go through the
//! element marshalling routines, so the host always sees tightly packed
//! elements.
//!
//! Buffers expose no element accessor on the host. Indexing is only meaningful
//! inside a kernel body, where the transpiler lowers it:
//!
//! ```compile_fail
//! # async fn host(device: &kernelforge_wgpu::GpuDevice) {
//! let values = kernelforge_wgpu::ReadWriteBuffer::<f32>::new(device, 4).unwrap();
//! let first = values[0];
//! # }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use kernelforge_core::error::{ForgeError, Result};
use kernelforge_core::layout::{align_up, BufferKind, ElementLayout, GpuType};
use kernelforge_core::marshal::{pad_elements, unpad_elements};

use crate::access::{self, BufferAccess, ShaderAccess};
use crate::device::GpuDevice;
use crate::view::{ViewDescriptor, ViewKind};

/// Buffer of constant elements padded to 16-byte strides.
pub type ConstantBuffer<T> = Buffer<T, access::Constant>;
/// Buffer kernels read.
pub type ReadOnlyBuffer<T> = Buffer<T, access::ReadOnly>;
/// Buffer kernels read and write.
pub type ReadWriteBuffer<T> = Buffer<T, access::ReadWrite>;
/// Host-mappable buffer results are copied into.
pub type ReadBackBuffer<T> = Buffer<T, access::ReadBack>;
/// Host-mappable staging buffer.
pub type UploadBuffer<T> = Buffer<T, access::Upload>;

/// Typed GPU buffer.
pub struct Buffer<T: GpuType, A: BufferAccess> {
    buffer: wgpu::Buffer,
    len: usize,
    layout: ElementLayout,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    _marker: PhantomData<fn() -> (T, A)>,
}

impl<T: GpuType, A: BufferAccess> Buffer<T, A> {
    /// Allocate a zero-initialized buffer of `len` elements.
    pub fn new(device: &GpuDevice, len: usize) -> Result<Self> {
        let layout = T::element_layout(A::KIND);
        let size = allocation_size(layout.device_size(len));

        let max = device.limits().max_buffer_size;
        if size > max {
            return Err(ForgeError::BufferOverflow {
                required: size as usize,
                available: max as usize,
            });
        }

        let buffer = device.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(T::NAME),
            size,
            usage: A::USAGE,
            mapped_at_creation: false,
        });

        tracing::debug!(
            ty = T::NAME,
            kind = ?A::KIND,
            len,
            stride = layout.padded_stride,
            "Allocated buffer"
        );

        Ok(Self {
            buffer,
            len,
            layout,
            device: Arc::clone(device.device()),
            queue: Arc::clone(device.queue()),
            _marker: PhantomData,
        })
    }

    /// Allocate a buffer holding `data`.
    pub fn from_slice(device: &GpuDevice, data: &[T]) -> Result<Self> {
        let mut buffer = Self::new(device, data.len())?;
        buffer.set_data(data)?;
        Ok(buffer)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no element.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffer kind of the access mode.
    pub fn kind(&self) -> BufferKind {
        A::KIND
    }

    /// Host and device element strides.
    pub fn element_layout(&self) -> ElementLayout {
        self.layout
    }

    /// Device bytes occupied by the elements.
    pub fn size_in_bytes(&self) -> usize {
        self.layout.device_size(self.len)
    }

    /// The view kernels see, or `None` for host-visible kinds.
    pub fn view(&self) -> Option<ViewDescriptor> {
        ViewKind::for_buffer(A::KIND)
            .map(|kind| ViewDescriptor::buffer(kind, self.layout.padded_stride))
    }

    /// Get the underlying wgpu buffer.
    pub fn inner(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Replace the buffer contents with `data`.
    ///
    /// `data` must hold exactly [`len`](Self::len) elements.
    pub fn set_data(&mut self, data: &[T]) -> Result<()> {
        self.check_len(data.len())?;
        if self.len == 0 {
            return Ok(());
        }

        let bytes = self.to_device_bytes(data)?;
        if A::USAGE.contains(wgpu::BufferUsages::MAP_WRITE) {
            self.write_mapped(&bytes)
        } else {
            self.queue.write_buffer(&self.buffer, 0, &bytes);
            // Flush the staged write so a later map observes it.
            self.queue.submit(std::iter::empty());
            Ok(())
        }
    }

    /// Read the buffer contents back to the host.
    ///
    /// Waits for all submitted GPU work to finish first.
    pub fn get_data(&self) -> Result<Vec<T>> {
        let mut data = vec![T::zeroed(); self.len];
        self.get_data_into(&mut data)?;
        Ok(data)
    }

    /// Read the buffer contents into `dst`, which must hold exactly
    /// [`len`](Self::len) elements.
    pub fn get_data_into(&self, dst: &mut [T]) -> Result<()> {
        self.check_len(dst.len())?;
        if self.len == 0 {
            return Ok(());
        }

        let size = self.buffer.size();
        let bytes = if A::USAGE.contains(wgpu::BufferUsages::MAP_READ) {
            map_read(&self.device, &self.buffer, size)?
        } else {
            read_through_staging(&self.device, &self.queue, &self.buffer, size)?
        };

        unpad_elements(&bytes, bytemuck::cast_slice_mut(dst), self.layout, self.len)?;
        Ok(())
    }

    /// Copy every element into `dst`.
    ///
    /// Buffers with equal strides copy on the device; otherwise the elements
    /// are re-padded through host memory.
    pub fn copy_to<B: BufferAccess>(&self, dst: &mut Buffer<T, B>) -> Result<()> {
        if dst.len != self.len {
            return Err(ForgeError::LengthMismatch {
                expected: self.len,
                actual: dst.len,
            });
        }
        if self.len == 0 {
            return Ok(());
        }

        let device_copy = self.layout == dst.layout
            && A::USAGE.contains(wgpu::BufferUsages::COPY_SRC)
            && B::USAGE.contains(wgpu::BufferUsages::COPY_DST);

        if !device_copy {
            tracing::trace!(from = ?A::KIND, to = ?B::KIND, "buffer copy: through host");
            let data = self.get_data()?;
            return dst.set_data(&data);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("KernelForge Buffer Copy"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &dst.buffer, 0, self.buffer.size());
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn check_len(&self, actual: usize) -> Result<()> {
        if actual != self.len {
            return Err(ForgeError::LengthMismatch {
                expected: self.len,
                actual,
            });
        }
        Ok(())
    }

    /// Host elements expanded to the device layout, zero-filled up to the
    /// allocation size.
    fn to_device_bytes(&self, data: &[T]) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; self.buffer.size() as usize];
        pad_elements(bytemuck::cast_slice(data), &mut bytes, self.layout, data.len())?;
        Ok(bytes)
    }

    fn write_mapped(&self, bytes: &[u8]) -> Result<()> {
        let slice = self.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Write, move |result| {
            let _ = tx.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| ForgeError::TransferError(format!("Channel error: {}", e)))?
            .map_err(|e| ForgeError::TransferError(format!("Map error: {}", e)))?;

        slice.get_mapped_range_mut().copy_from_slice(bytes);
        self.buffer.unmap();
        Ok(())
    }
}

impl<T: GpuType, A: ShaderAccess> Buffer<T, A> {
    /// The view this buffer binds through.
    pub fn shader_view(&self) -> ViewDescriptor {
        ViewDescriptor::buffer(A::VIEW, self.layout.padded_stride)
    }

    /// Binding resource covering the whole allocation.
    pub fn as_entire_binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

impl<T: GpuType, A: BufferAccess> std::fmt::Debug for Buffer<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("ty", &T::NAME)
            .field("kind", &A::KIND)
            .field("len", &self.len)
            .field("layout", &self.layout)
            .finish()
    }
}

/// Allocation size for `bytes` of payload.
///
/// wgpu copies and mappings work in 4-byte units, and an empty buffer still
/// gets a minimal allocation.
fn allocation_size(bytes: usize) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    align_up(bytes, align).max(align) as u64
}

/// Map a `MAP_READ` buffer and copy out its first `size` bytes.
pub(crate) fn map_read(device: &wgpu::Device, buffer: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
    let slice = buffer.slice(..size);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|e| ForgeError::TransferError(format!("Channel error: {}", e)))?
        .map_err(|e| ForgeError::TransferError(format!("Map error: {}", e)))?;

    let bytes = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(bytes)
}

/// Copy `size` bytes of `source` into a staging buffer and read them back.
pub(crate) fn read_through_staging(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    size: u64,
) -> Result<Vec<u8>> {
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("KernelForge Staging Buffer"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("KernelForge Read Back"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
    queue.submit(Some(encoder.finish()));

    map_read(device, &staging, size)
}
