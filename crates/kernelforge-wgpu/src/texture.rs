//! 2D and 3D textures.
//!
//! Texture rows are pitched to [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`] in every
//! host transfer, so uploads and downloads go through the row and slice
//! marshalling routines. Dimensions are fixed at construction.

use std::marker::PhantomData;
use std::sync::Arc;

use kernelforge_core::error::{ForgeError, Result};
use kernelforge_core::kernel::TextureDimension;
use kernelforge_core::layout::align_up;
use kernelforge_core::marshal::{
    copy_rows_from_pitched, copy_rows_to_pitched, copy_slices_from_pitched,
    copy_slices_to_pitched,
};
use kernelforge_core::types::PixelFormat;

use crate::access::{self, TextureAccess};
use crate::buffer::map_read;
use crate::device::GpuDevice;
use crate::view::{texture_format, ViewDescriptor};

/// 2D texture kernels sample or load from.
pub type ReadOnlyTexture2D<T> = Texture2D<T, access::ReadOnly>;
/// 2D storage texture kernels read and write.
pub type ReadWriteTexture2D<T> = Texture2D<T, access::ReadWrite>;
/// 3D texture kernels sample or load from.
pub type ReadOnlyTexture3D<T> = Texture3D<T, access::ReadOnly>;
/// 3D storage texture kernels read and write.
pub type ReadWriteTexture3D<T> = Texture3D<T, access::ReadWrite>;

/// Allocation and pitch shared by both texture dimensionalities.
struct TextureStorage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    extent: wgpu::Extent3d,
    row_pitch: usize,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl TextureStorage {
    fn new<T: PixelFormat, A: TextureAccess>(
        device: &GpuDevice,
        dimension: TextureDimension,
        extent: wgpu::Extent3d,
    ) -> Result<Self> {
        if extent.width == 0 || extent.height == 0 || extent.depth_or_array_layers == 0 {
            return Err(ForgeError::InvalidOperation(format!(
                "texture dimensions must be non-zero, got {}x{}x{}",
                extent.width, extent.height, extent.depth_or_array_layers
            )));
        }

        let limits = device.limits();
        let max = match dimension {
            TextureDimension::D2 => limits.max_texture_dimension_2d,
            TextureDimension::D3 => limits.max_texture_dimension_3d,
        };
        let largest = extent
            .width
            .max(extent.height)
            .max(extent.depth_or_array_layers);
        if largest > max {
            return Err(ForgeError::InvalidOperation(format!(
                "texture dimension {} exceeds the device limit {}",
                largest, max
            )));
        }

        if A::READ_WRITE && T::FORMAT.storage_format().is_none() {
            return Err(ForgeError::UnsupportedType(format!(
                "{} cannot back a read-write texture",
                T::NAME
            )));
        }

        let texture = device.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(T::NAME),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: match dimension {
                TextureDimension::D2 => wgpu::TextureDimension::D2,
                TextureDimension::D3 => wgpu::TextureDimension::D3,
            },
            format: texture_format(T::FORMAT),
            usage: A::USAGE,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let row_pitch = align_up(
            extent.width as usize * T::FORMAT.bytes_per_texel(),
            wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize,
        );

        tracing::debug!(
            ty = T::NAME,
            width = extent.width,
            height = extent.height,
            depth = extent.depth_or_array_layers,
            row_pitch,
            "Allocated texture"
        );

        Ok(Self {
            texture,
            view,
            extent,
            row_pitch,
            device: Arc::clone(device.device()),
            queue: Arc::clone(device.queue()),
        })
    }

    fn slice_pitch(&self) -> usize {
        self.row_pitch * self.extent.height as usize
    }

    fn pitched_size(&self) -> usize {
        self.slice_pitch() * self.extent.depth_or_array_layers as usize
    }

    fn texel_count(&self) -> usize {
        self.extent.width as usize
            * self.extent.height as usize
            * self.extent.depth_or_array_layers as usize
    }

    fn check_len(&self, actual: usize) -> Result<()> {
        let expected = self.texel_count();
        if actual != expected {
            return Err(ForgeError::LengthMismatch { expected, actual });
        }
        Ok(())
    }

    fn data_layout(&self) -> wgpu::ImageDataLayout {
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(self.row_pitch as u32),
            rows_per_image: Some(self.extent.height),
        }
    }

    fn upload(&self, pitched: &[u8]) {
        self.queue.write_texture(
            self.texture.as_image_copy(),
            pitched,
            self.data_layout(),
            self.extent,
        );
    }

    fn download(&self) -> Result<Vec<u8>> {
        let size = self.pitched_size() as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("KernelForge Texture Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("KernelForge Texture Read Back"),
            });
        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: self.data_layout(),
            },
            self.extent,
        );
        self.queue.submit(Some(encoder.finish()));

        map_read(&self.device, &staging, size)
    }
}

/// Two-dimensional texture of `T` texels.
pub struct Texture2D<T: PixelFormat, A: TextureAccess> {
    storage: TextureStorage,
    _marker: PhantomData<fn() -> (T, A)>,
}

impl<T: PixelFormat, A: TextureAccess> Texture2D<T, A> {
    /// Allocate a `width` x `height` texture.
    pub fn new(device: &GpuDevice, width: u32, height: u32) -> Result<Self> {
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        Ok(Self {
            storage: TextureStorage::new::<T, A>(device, TextureDimension::D2, extent)?,
            _marker: PhantomData,
        })
    }

    /// Allocate a texture holding `data` in row-major order.
    pub fn from_slice(device: &GpuDevice, width: u32, height: u32, data: &[T]) -> Result<Self> {
        let mut texture = Self::new(device, width, height)?;
        texture.set_data(data)?;
        Ok(texture)
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.storage.extent.width
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.storage.extent.height
    }

    /// Bytes between rows in transfer memory.
    pub fn row_pitch(&self) -> usize {
        self.storage.row_pitch
    }

    /// The view kernels see.
    pub fn view(&self) -> ViewDescriptor {
        ViewDescriptor::texture(TextureDimension::D2, T::FORMAT, A::READ_WRITE)
    }

    /// Get the underlying wgpu texture.
    pub fn inner(&self) -> &wgpu::Texture {
        &self.storage.texture
    }

    /// Binding resource for the texture view.
    pub fn as_binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::TextureView(&self.storage.view)
    }

    /// Replace every texel; `data` is row-major with `width * height` texels.
    pub fn set_data(&mut self, data: &[T]) -> Result<()> {
        self.storage.check_len(data.len())?;
        let width = self.width() as usize * T::FORMAT.bytes_per_texel();
        let height = self.height() as usize;

        let mut pitched = vec![0u8; self.storage.pitched_size()];
        copy_rows_to_pitched(
            bytemuck::cast_slice(data),
            &mut pitched,
            width,
            self.storage.row_pitch,
            height,
        )?;
        self.storage.upload(&pitched);
        Ok(())
    }

    /// Read every texel back in row-major order.
    pub fn get_data(&self) -> Result<Vec<T>> {
        let width = self.width() as usize * T::FORMAT.bytes_per_texel();
        let height = self.height() as usize;

        let pitched = self.storage.download()?;
        let mut data = vec![T::zeroed(); self.storage.texel_count()];
        copy_rows_from_pitched(
            &pitched,
            bytemuck::cast_slice_mut(&mut data),
            width,
            self.storage.row_pitch,
            height,
        )?;
        Ok(data)
    }
}

/// Three-dimensional texture of `T` texels.
pub struct Texture3D<T: PixelFormat, A: TextureAccess> {
    storage: TextureStorage,
    _marker: PhantomData<fn() -> (T, A)>,
}

impl<T: PixelFormat, A: TextureAccess> Texture3D<T, A> {
    /// Allocate a `width` x `height` x `depth` texture.
    pub fn new(device: &GpuDevice, width: u32, height: u32, depth: u32) -> Result<Self> {
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };
        Ok(Self {
            storage: TextureStorage::new::<T, A>(device, TextureDimension::D3, extent)?,
            _marker: PhantomData,
        })
    }

    /// Allocate a texture holding `data`, slice by slice in row-major order.
    pub fn from_slice(
        device: &GpuDevice,
        width: u32,
        height: u32,
        depth: u32,
        data: &[T],
    ) -> Result<Self> {
        let mut texture = Self::new(device, width, height, depth)?;
        texture.set_data(data)?;
        Ok(texture)
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.storage.extent.width
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.storage.extent.height
    }

    /// Depth in texels.
    pub fn depth(&self) -> u32 {
        self.storage.extent.depth_or_array_layers
    }

    /// Bytes between rows in transfer memory.
    pub fn row_pitch(&self) -> usize {
        self.storage.row_pitch
    }

    /// Bytes between depth slices in transfer memory.
    pub fn slice_pitch(&self) -> usize {
        self.storage.slice_pitch()
    }

    /// The view kernels see.
    pub fn view(&self) -> ViewDescriptor {
        ViewDescriptor::texture(TextureDimension::D3, T::FORMAT, A::READ_WRITE)
    }

    /// Get the underlying wgpu texture.
    pub fn inner(&self) -> &wgpu::Texture {
        &self.storage.texture
    }

    /// Binding resource for the texture view.
    pub fn as_binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::TextureView(&self.storage.view)
    }

    /// Replace every texel; `data` holds `depth` slices of `width * height`.
    pub fn set_data(&mut self, data: &[T]) -> Result<()> {
        self.storage.check_len(data.len())?;
        let width = self.width() as usize * T::FORMAT.bytes_per_texel();

        let mut pitched = vec![0u8; self.storage.pitched_size()];
        copy_slices_to_pitched(
            bytemuck::cast_slice(data),
            &mut pitched,
            width,
            self.storage.row_pitch,
            self.height() as usize,
            self.storage.slice_pitch(),
            self.depth() as usize,
        )?;
        self.storage.upload(&pitched);
        Ok(())
    }

    /// Read every texel back, slice by slice.
    pub fn get_data(&self) -> Result<Vec<T>> {
        let width = self.width() as usize * T::FORMAT.bytes_per_texel();

        let pitched = self.storage.download()?;
        let mut data = vec![T::zeroed(); self.storage.texel_count()];
        copy_slices_from_pitched(
            &pitched,
            bytemuck::cast_slice_mut(&mut data),
            width,
            self.storage.row_pitch,
            self.height() as usize,
            self.storage.slice_pitch(),
            self.depth() as usize,
        )?;
        Ok(data)
    }
}

impl<T: PixelFormat, A: TextureAccess> std::fmt::Debug for Texture2D<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture2D")
            .field("ty", &T::NAME)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("read_write", &A::READ_WRITE)
            .finish()
    }
}

impl<T: PixelFormat, A: TextureAccess> std::fmt::Debug for Texture3D<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture3D")
            .field("ty", &T::NAME)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("depth", &self.depth())
            .field("read_write", &A::READ_WRITE)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernelforge_core::types::{Float4, Rgba8, R8};

    async fn device() -> GpuDevice {
        GpuDevice::new(&crate::DeviceConfig::from_env())
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore] // May not have GPU in CI
    async fn test_texture_2d_round_trip() {
        let device = device().await;
        // 5 * 4 bytes per row forces a pitched transfer.
        let data: Vec<f32> = (0..15).map(|i| i as f32).collect();
        let texture = ReadOnlyTexture2D::from_slice(&device, 5, 3, &data).unwrap();
        assert_eq!(texture.row_pitch(), 256);
        assert_eq!(texture.get_data().unwrap(), data);
    }

    #[tokio::test]
    #[ignore] // May not have GPU in CI
    async fn test_texture_3d_round_trip() {
        let device = device().await;
        let data: Vec<Rgba8> = (0..4 * 2 * 3)
            .map(|i| Rgba8::new(i as u8, 0, 255 - i as u8, 255))
            .collect();
        let texture = ReadOnlyTexture3D::from_slice(&device, 4, 2, 3, &data).unwrap();
        assert_eq!(texture.slice_pitch(), 256 * 2);
        assert_eq!(texture.depth(), 3);
        assert_eq!(texture.get_data().unwrap(), data);
    }

    #[tokio::test]
    #[ignore] // May not have GPU in CI
    async fn test_texture_validation() {
        let device = device().await;
        assert!(matches!(
            ReadOnlyTexture2D::<f32>::new(&device, 0, 4),
            Err(ForgeError::InvalidOperation(_))
        ));
        assert!(matches!(
            ReadWriteTexture2D::<R8>::new(&device, 4, 4),
            Err(ForgeError::UnsupportedType(_))
        ));

        let mut texture = ReadWriteTexture2D::<Float4>::new(&device, 2, 2).unwrap();
        assert!(matches!(
            texture.set_data(&[Float4::splat(0.0); 3]),
            Err(ForgeError::LengthMismatch { expected: 4, actual: 3 })
        ));
    }
}
