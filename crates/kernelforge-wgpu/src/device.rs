//! Device creation and the process-wide device cache.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use kernelforge_core::error::{ForgeError, Result};
use parking_lot::RwLock;

/// Settings used to pick an adapter and create a device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Preferred adapter class.
    pub power_preference: wgpu::PowerPreference,
    /// Backends the instance may use.
    pub backends: wgpu::Backends,
    /// Debug label for the device.
    pub label: String,
    /// Force a software adapter.
    pub force_fallback_adapter: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            backends: wgpu::Backends::all(),
            label: "KernelForge Device".to_string(),
            force_fallback_adapter: false,
        }
    }
}

impl DeviceConfig {
    /// Default configuration overridden by `WGPU_BACKEND` and
    /// `WGPU_POWER_PREF` when they are set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            power_preference: wgpu::util::power_preference_from_env()
                .unwrap_or(defaults.power_preference),
            backends: wgpu::util::backend_bits_from_env().unwrap_or(defaults.backends),
            ..defaults
        }
    }

    /// Set the adapter power preference.
    pub fn with_power_preference(mut self, preference: wgpu::PowerPreference) -> Self {
        self.power_preference = preference;
        self
    }

    /// Restrict the backends the instance may use.
    pub fn with_backends(mut self, backends: wgpu::Backends) -> Self {
        self.backends = backends;
        self
    }

    /// Set the device label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Request a software adapter.
    pub fn with_fallback_adapter(mut self, force: bool) -> Self {
        self.force_fallback_adapter = force;
        self
    }
}

/// Identity of a physical adapter, used as the device cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdapterId {
    /// PCI vendor id (0 when the backend does not report one).
    pub vendor: u32,
    /// PCI device id.
    pub device: u32,
    /// Backend the adapter was opened through.
    pub backend: wgpu::Backend,
    /// Adapter name.
    pub name: String,
}

impl From<&wgpu::AdapterInfo> for AdapterId {
    fn from(info: &wgpu::AdapterInfo) -> Self {
        Self {
            vendor: info.vendor,
            device: info.device,
            backend: info.backend,
            name: info.name.clone(),
        }
    }
}

impl std::fmt::Display for AdapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:?}, {:04x}:{:04x})",
            self.name, self.backend, self.vendor, self.device
        )
    }
}

/// A wgpu device and queue opened on one adapter.
pub struct GpuDevice {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: wgpu::AdapterInfo,
    id: AdapterId,
}

impl GpuDevice {
    /// Open a new device that is not registered in the device cache.
    pub async fn new(config: &DeviceConfig) -> Result<Self> {
        let (instance, adapter) = request_adapter(config).await?;
        Self::open(instance, adapter, config).await
    }

    /// Return the cached device for the adapter `config` selects, opening and
    /// registering one on first use.
    pub async fn shared(config: &DeviceConfig) -> Result<Arc<Self>> {
        let (instance, adapter) = request_adapter(config).await?;
        let id = AdapterId::from(&adapter.get_info());

        let cache = DeviceCache::global();
        if let Some(device) = cache.get(&id) {
            return Ok(device);
        }

        let device = Self::open(instance, adapter, config).await?;
        Ok(cache.insert(Arc::new(device)))
    }

    async fn open(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        config: &DeviceConfig,
    ) -> Result<Self> {
        let info = adapter.get_info();

        // Read-write storage textures need adapter-specific format support.
        let required_features =
            adapter.features() & wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(config.label.as_str()),
                    required_features,
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| ForgeError::BackendError(format!("Failed to create device: {}", e)))?;

        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            "Created wgpu device"
        );

        let id = AdapterId::from(&info);
        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            info,
            id,
        })
    }

    /// Remove this device from the device cache.
    ///
    /// Resources created on the device stay valid; later calls to
    /// [`GpuDevice::shared`] open a fresh device.
    pub fn dispose(&self) {
        DeviceCache::global().evict(&self.id);
    }

    /// Adapter identity.
    pub fn id(&self) -> &AdapterId {
        &self.id
    }

    /// Get the adapter name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Get the backend type.
    pub fn backend(&self) -> wgpu::Backend {
        self.info.backend
    }

    /// Get device type.
    pub fn device_type(&self) -> wgpu::DeviceType {
        self.info.device_type
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Get the command queue.
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Get device limits.
    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Features enabled on the device.
    pub fn features(&self) -> wgpu::Features {
        self.device.features()
    }

    /// Per-format capabilities reported by the adapter.
    pub fn format_features(&self, format: wgpu::TextureFormat) -> wgpu::TextureFormatFeatures {
        self.adapter.get_texture_format_features(format)
    }

    /// Poll the device for completed work.
    pub fn poll(&self, maintain: wgpu::Maintain) -> wgpu::MaintainResult {
        self.device.poll(maintain)
    }

    /// Block until every submitted command buffer has completed.
    pub fn wait(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

impl std::fmt::Debug for GpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuDevice").field("id", &self.id).finish()
    }
}

async fn request_adapter(config: &DeviceConfig) -> Result<(wgpu::Instance, wgpu::Adapter)> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: config.backends,
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            compatible_surface: None,
            force_fallback_adapter: config.force_fallback_adapter,
        })
        .await
        .ok_or_else(|| ForgeError::BackendUnavailable("No wgpu adapter found".to_string()))?;

    Ok((instance, adapter))
}

/// Process-wide map from adapter identity to its open device.
///
/// Entries are added by [`GpuDevice::shared`] and removed by
/// [`GpuDevice::dispose`], [`DeviceCache::evict`] or [`DeviceCache::clear`]
/// (for example after a device-lost notification).
#[derive(Default)]
pub struct DeviceCache {
    devices: RwLock<HashMap<AdapterId, Arc<GpuDevice>>>,
}

static DEVICE_CACHE: OnceLock<DeviceCache> = OnceLock::new();

impl DeviceCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> &'static DeviceCache {
        DEVICE_CACHE.get_or_init(DeviceCache::new)
    }

    /// Cached device for `id`.
    pub fn get(&self, id: &AdapterId) -> Option<Arc<GpuDevice>> {
        self.devices.read().get(id).cloned()
    }

    /// Register `device`, returning the entry that ends up cached.
    ///
    /// When another caller registered the same adapter first, its device is
    /// kept and returned instead.
    pub fn insert(&self, device: Arc<GpuDevice>) -> Arc<GpuDevice> {
        let mut devices = self.devices.write();
        if let Some(existing) = devices.get(device.id()) {
            tracing::warn!(
                adapter = %device.id(),
                "Device opened concurrently; keeping the cached one"
            );
            return Arc::clone(existing);
        }
        devices.insert(device.id().clone(), Arc::clone(&device));
        device
    }

    /// Remove the entry for `id`.
    pub fn evict(&self, id: &AdapterId) -> Option<Arc<GpuDevice>> {
        let removed = self.devices.write().remove(id);
        if removed.is_some() {
            tracing::info!(adapter = %id, "Evicted device from cache");
        }
        removed
    }

    /// Remove every entry, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut devices = self.devices.write();
        let count = devices.len();
        devices.clear();
        if count > 0 {
            tracing::info!(count, "Cleared device cache");
        }
        count
    }

    /// Number of cached devices.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Whether the cache holds no device.
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

/// Identities of every adapter reachable through `backends`.
pub fn enumerate_adapters(backends: wgpu::Backends) -> Vec<AdapterId> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends,
        ..Default::default()
    });

    instance
        .enumerate_adapters(backends)
        .into_iter()
        .map(|adapter| AdapterId::from(&adapter.get_info()))
        .collect()
}

/// Whether at least one adapter is available.
pub fn is_gpu_available() -> bool {
    !enumerate_adapters(wgpu::Backends::all()).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_id(name: &str) -> AdapterId {
        AdapterId {
            vendor: 0x10de,
            device: 0x2684,
            backend: wgpu::Backend::Vulkan,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_config_builder() {
        let config = DeviceConfig::default()
            .with_power_preference(wgpu::PowerPreference::LowPower)
            .with_backends(wgpu::Backends::VULKAN)
            .with_label("Test Device");
        assert_eq!(config.power_preference, wgpu::PowerPreference::LowPower);
        assert_eq!(config.backends, wgpu::Backends::VULKAN);
        assert_eq!(config.label, "Test Device");
        assert!(!config.force_fallback_adapter);
    }

    #[test]
    fn test_adapter_id_identity() {
        let a = adapter_id("GPU");
        let mut b = adapter_id("GPU");
        assert_eq!(a, b);
        b.backend = wgpu::Backend::Dx12;
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "GPU (Vulkan, 10de:2684)");
    }

    #[test]
    fn test_empty_cache() {
        let cache = DeviceCache::new();
        assert!(cache.is_empty());
        assert!(cache.get(&adapter_id("GPU")).is_none());
        assert!(cache.evict(&adapter_id("GPU")).is_none());
        assert_eq!(cache.clear(), 0);
    }

    #[tokio::test]
    #[ignore] // May not have GPU in CI
    async fn test_shared_device_is_cached() {
        let config = DeviceConfig::from_env();
        let first = GpuDevice::shared(&config).await.unwrap();
        let second = GpuDevice::shared(&config).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first.dispose();
        assert!(DeviceCache::global().get(first.id()).is_none());

        let third = GpuDevice::shared(&config).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        third.dispose();
    }
}
