//! Compute pipelines built from kernel descriptors.

use std::sync::Arc;

use kernelforge_core::error::{ForgeError, Result};
use kernelforge_core::kernel::{BindingKind, KernelDescriptor};
use wgpu::util::DeviceExt;

use crate::args::KernelArgs;
use crate::device::GpuDevice;
use crate::view::binding_type;

/// A compiled kernel ready for dispatch.
pub struct ComputeShader {
    descriptor: KernelDescriptor,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    /// Empty groups below `descriptor.bind_group`.
    empty_groups: Vec<wgpu::BindGroup>,
    sampler: Option<wgpu::Sampler>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl ComputeShader {
    /// Compile `descriptor` into a compute pipeline.
    ///
    /// Shader validation failures are reported as [`ForgeError::BackendError`].
    pub async fn new(device: &GpuDevice, descriptor: &KernelDescriptor) -> Result<Self> {
        let wgpu_device = device.device();

        let entries = descriptor
            .bindings
            .iter()
            .map(|binding| {
                Ok(wgpu::BindGroupLayoutEntry {
                    binding: binding.binding,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: binding_type(&binding.kind)?,
                    count: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        wgpu_device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader_module = wgpu_device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(descriptor.name.as_ref()),
            source: wgpu::ShaderSource::Wgsl(descriptor.wgsl.clone()),
        });

        let bind_group_layout =
            wgpu_device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("KernelForge Bind Group Layout"),
                entries: &entries,
            });

        let empty_layout = wgpu_device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("KernelForge Empty Bind Group Layout"),
            entries: &[],
        });
        let mut layouts: Vec<&wgpu::BindGroupLayout> =
            vec![&empty_layout; descriptor.bind_group as usize];
        layouts.push(&bind_group_layout);

        let empty_groups = (0..descriptor.bind_group)
            .map(|_| {
                wgpu_device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("KernelForge Empty Bind Group"),
                    layout: &empty_layout,
                    entries: &[],
                })
            })
            .collect();

        let pipeline_layout = wgpu_device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("KernelForge Pipeline Layout"),
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });

        let pipeline = wgpu_device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(descriptor.name.as_ref()),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: descriptor.entry_point.as_ref(),
        });

        let sampler = descriptor.bindings.iter().find_map(|binding| match binding.kind {
            BindingKind::Sampler { filtering } => Some(create_sampler(wgpu_device, filtering)),
            _ => None,
        });

        if let Some(error) = wgpu_device.pop_error_scope().await {
            return Err(ForgeError::BackendError(format!(
                "Failed to compile kernel `{}`: {}",
                descriptor.name, error
            )));
        }

        tracing::debug!(
            kernel = %descriptor.name,
            bindings = descriptor.bindings.len(),
            "Created compute pipeline"
        );

        Ok(Self {
            descriptor: descriptor.clone(),
            pipeline,
            bind_group_layout,
            empty_groups,
            sampler,
            device: Arc::clone(wgpu_device),
            queue: Arc::clone(device.queue()),
        })
    }

    /// The descriptor the shader was built from.
    pub fn descriptor(&self) -> &KernelDescriptor {
        &self.descriptor
    }

    /// Get the pipeline.
    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    /// Get bind group layout.
    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Get workgroup size.
    pub fn workgroup_size(&self) -> [u32; 3] {
        self.descriptor.workgroup_size
    }

    /// Run the kernel over `x * y * z` logical threads.
    ///
    /// The dispatch is submitted and not awaited; reading a resource back
    /// waits for it.
    pub fn dispatch(&self, args: &KernelArgs<'_>, x: u32, y: u32, z: u32) -> Result<()> {
        let threads = [x, y, z];
        args.check_resources(&self.descriptor)?;
        let data = args.pack_dispatch_data(&self.descriptor, threads)?;

        let data_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("KernelForge Dispatch Data"),
                contents: &data,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut entries = Vec::with_capacity(self.descriptor.bindings.len());
        for binding in self.descriptor.bindings.iter() {
            let resource = match binding.kind {
                BindingKind::DispatchData => data_buffer.as_entire_binding(),
                BindingKind::Buffer(_) | BindingKind::Texture { .. } => {
                    args.resource(&binding.name)?.binding_resource()
                }
                BindingKind::Sampler { .. } => {
                    let sampler = self.sampler.as_ref().ok_or_else(|| {
                        ForgeError::InvalidOperation("sampler binding without a sampler".into())
                    })?;
                    wgpu::BindingResource::Sampler(sampler)
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding.binding,
                resource,
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("KernelForge Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let [groups_x, groups_y, groups_z] = self.descriptor.workgroup_count(threads);
        tracing::trace!(
            kernel = %self.descriptor.name,
            groups_x,
            groups_y,
            groups_z,
            "dispatch"
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("KernelForge Dispatch"),
            });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("KernelForge Compute Pass"),
                timestamp_writes: None,
            });

            compute_pass.set_pipeline(&self.pipeline);
            for (index, group) in self.empty_groups.iter().enumerate() {
                compute_pass.set_bind_group(index as u32, group, &[]);
            }
            compute_pass.set_bind_group(self.descriptor.bind_group, &bind_group, &[]);
            compute_pass.dispatch_workgroups(groups_x, groups_y, groups_z);
        }

        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

impl std::fmt::Debug for ComputeShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeShader")
            .field("kernel", &self.descriptor.name)
            .field("workgroup_size", &self.descriptor.workgroup_size)
            .finish()
    }
}

fn create_sampler(device: &wgpu::Device, filtering: bool) -> wgpu::Sampler {
    let filter = if filtering {
        wgpu::FilterMode::Linear
    } else {
        wgpu::FilterMode::Nearest
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("KernelForge Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}
