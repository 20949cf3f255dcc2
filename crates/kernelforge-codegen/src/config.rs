//! Kernel configuration.

use crate::{Result, TranspileError};

/// Default workgroup size along x.
pub const DEFAULT_WORKGROUP_SIZE: u32 = 64;

/// WebGPU default limits for `@workgroup_size`.
const MAX_WORKGROUP_SIZE: (u32, u32, u32) = (256, 256, 64);
const MAX_INVOCATIONS: u32 = 256;

/// Configuration for a single compute kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Kernel name.
    pub name: String,
    /// `@workgroup_size(x, y, z)`.
    pub workgroup_size: (u32, u32, u32),
    /// Bind group holding every kernel binding.
    pub bind_group: u32,
    /// WGSL entry point; defaults to the kernel name.
    pub entry_point: Option<String>,
}

impl KernelConfig {
    /// Create a configuration with a 64x1x1 workgroup in bind group 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workgroup_size: (DEFAULT_WORKGROUP_SIZE, 1, 1),
            bind_group: 0,
            entry_point: None,
        }
    }

    /// Set the workgroup size.
    pub fn with_workgroup_size(mut self, x: u32, y: u32, z: u32) -> Self {
        self.workgroup_size = (x, y, z);
        self
    }

    /// Set the bind group.
    pub fn with_bind_group(mut self, group: u32) -> Self {
        self.bind_group = group;
        self
    }

    /// Override the WGSL entry point name.
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    /// Entry point name.
    pub fn entry_point(&self) -> &str {
        self.entry_point.as_deref().unwrap_or(&self.name)
    }

    /// Generate the WGSL attribute line.
    pub fn workgroup_size_annotation(&self) -> String {
        let (x, y, z) = self.workgroup_size;
        format!("@compute @workgroup_size({x}, {y}, {z})")
    }

    /// Total threads per workgroup.
    pub fn threads_per_workgroup(&self) -> u32 {
        let (x, y, z) = self.workgroup_size;
        x * y * z
    }

    /// Check the workgroup size against the default device limits.
    pub fn validate(&self) -> Result<()> {
        let (x, y, z) = self.workgroup_size;
        let (max_x, max_y, max_z) = MAX_WORKGROUP_SIZE;
        if x == 0 || y == 0 || z == 0 {
            return Err(TranspileError::WgslLimitation(format!(
                "kernel `{}` has an empty workgroup ({x}, {y}, {z})",
                self.name
            )));
        }
        if x > max_x || y > max_y || z > max_z {
            return Err(TranspileError::WgslLimitation(format!(
                "kernel `{}` workgroup ({x}, {y}, {z}) exceeds ({max_x}, {max_y}, {max_z})",
                self.name
            )));
        }
        let total = u64::from(x) * u64::from(y) * u64::from(z);
        if total > u64::from(MAX_INVOCATIONS) {
            return Err(TranspileError::WgslLimitation(format!(
                "kernel `{}` workgroup has {total} invocations; the limit is {MAX_INVOCATIONS}",
                self.name
            )));
        }
        Ok(())
    }
}
