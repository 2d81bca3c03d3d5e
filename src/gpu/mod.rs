//! wgpu implementation of [`ComputeDevice`].
//!
//! [`WgpuDevice`] records every dispatch into one command encoder, each in its
//! own compute pass, and hands the encoder to the queue on
//! [`ComputeDevice::submit`]. Per-dispatch kernel arguments live in a ring of
//! 256-byte uniform slots bound at group 1 with a dynamic offset; the ring is
//! flushed with an early submit if a single tick ever fills it.

pub mod kernels;

use std::sync::mpsc;

use crate::device::{
    Access, Binding, BufferDesc, BufferId, BufferUsage, ComputeDevice, DeviceBuffer, DeviceLimits,
    KernelSet, KernelStage,
};
use crate::error::{GpuError, ResourceError};
use crate::uniforms::KernelArgs;

const ARGS_SLOT_SIZE: u64 = KernelArgs::MAX_BYTES as u64;
const ARGS_SLOTS: u64 = 64;

/// A GPU allocation. Dropping it destroys the buffer.
pub struct GpuBuffer {
    id: BufferId,
    size: u64,
    buffer: wgpu::Buffer,
}

impl GpuBuffer {
    /// Whole-buffer binding resource for a renderer's bind group. Pair it with
    /// [`read_only_layout_entry`]; the simulation owns every write.
    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

/// Bind group layout entry for reading simulation output from `visibility`.
pub fn read_only_layout_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        visibility,
        ..layout_entry(binding, Access::ReadOnly)
    }
}

fn layout_entry(slot: u32, access: Access) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: slot,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: match access {
                Access::Uniform => wgpu::BufferBindingType::Uniform,
                Access::ReadOnly => wgpu::BufferBindingType::Storage { read_only: true },
                Access::ReadWrite => wgpu::BufferBindingType::Storage { read_only: false },
            },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl DeviceBuffer for GpuBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

/// A compiled compute pipeline for one stage.
pub struct WgpuKernel {
    stage: KernelStage,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    workgroup_size: [u32; 3],
}

impl WgpuKernel {
    pub fn stage(&self) -> KernelStage {
        self.stage
    }
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    device_limits: wgpu::Limits,
    limits: DeviceLimits,
    encoder: Option<wgpu::CommandEncoder>,
    args_buffer: wgpu::Buffer,
    args_layout: wgpu::BindGroupLayout,
    args_bind_group: wgpu::BindGroup,
    args_cursor: u64,
    next_id: u64,
    barriers: u64,
}

impl WgpuDevice {
    /// Create a device with no surface, requesting the adapter's full limits.
    pub fn new_headless() -> Result<Self, GpuError> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let info = adapter.get_info();
        let device_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("sporefield"),
                    required_features: wgpu::Features::empty(),
                    required_limits: device_limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        log::info!("using adapter {} ({:?})", info.name, info.backend);

        let limits = DeviceLimits {
            max_workgroup_count: [device_limits.max_compute_workgroups_per_dimension; 3],
            max_workgroup_size: [
                device_limits.max_compute_workgroup_size_x,
                device_limits.max_compute_workgroup_size_y,
                device_limits.max_compute_workgroup_size_z,
            ],
        };

        let args_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kernel-args"),
            size: ARGS_SLOT_SIZE * ARGS_SLOTS,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let args_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel-args layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let args_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel-args"),
            layout: &args_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &args_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(ARGS_SLOT_SIZE),
                }),
            }],
        });

        Ok(Self {
            device,
            queue,
            info,
            device_limits,
            limits,
            encoder: None,
            args_buffer,
            args_layout,
            args_bind_group,
            args_cursor: 0,
            next_id: 0,
            barriers: 0,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Barriers requested since creation.
    pub fn barriers(&self) -> u64 {
        self.barriers
    }

    /// Compile the built-in kernel for every stage.
    pub fn build_kernels(&self) -> Result<KernelSet<WgpuKernel>, GpuError> {
        let mut set = KernelSet::new();
        for stage in KernelStage::ALL {
            set.insert(stage, self.build_kernel(stage)?);
        }
        Ok(set)
    }

    fn build_kernel(&self, stage: KernelStage) -> Result<WgpuKernel, GpuError> {
        let source = kernels::source(stage);
        let workgroup_size = kernels::reflect_workgroup_size(&source)
            .map_err(|message| GpuError::Shader { stage, message })?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(stage.name()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let entries: Vec<wgpu::BindGroupLayoutEntry> = stage
            .layout()
            .iter()
            .map(|binding| layout_entry(binding.slot, binding.access))
            .collect();
        let layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(stage.name()),
            entries: &entries,
        });

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(stage.name()),
            bind_group_layouts: &[&layout, &self.args_layout],
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(stage.name()),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuError::Shader {
                stage,
                message: error.to_string(),
            });
        }

        log::debug!("built {} kernel, workgroup size {:?}", stage, workgroup_size);
        Ok(WgpuKernel {
            stage,
            pipeline,
            layout,
            workgroup_size,
        })
    }

    /// Stage `args` into the next ring slot and return its offset.
    fn push_args(&mut self, args: &KernelArgs) -> u32 {
        if self.args_cursor == ARGS_SLOTS {
            log::debug!("kernel argument ring full, submitting early");
            self.submit();
        }
        let offset = self.args_cursor * ARGS_SLOT_SIZE;
        self.args_cursor += 1;
        if !args.is_empty() {
            self.queue.write_buffer(&self.args_buffer, offset, &args.to_bytes());
        }
        offset as u32
    }
}

impl ComputeDevice for WgpuDevice {
    type Buffer = GpuBuffer;
    type Kernel = WgpuKernel;

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn workgroup_size(&self, kernel: &WgpuKernel) -> [u32; 3] {
        kernel.workgroup_size
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<GpuBuffer, ResourceError> {
        let allocation_error = |reason: String| ResourceError::Allocation {
            label: desc.label.to_string(),
            size: desc.size,
            reason,
        };

        if desc.size > self.device_limits.max_buffer_size {
            return Err(allocation_error(format!(
                "exceeds max buffer size {}",
                self.device_limits.max_buffer_size
            )));
        }
        let usage = match desc.usage {
            BufferUsage::Uniform => {
                if desc.size > self.device_limits.max_uniform_buffer_binding_size as u64 {
                    return Err(allocation_error(format!(
                        "exceeds max uniform binding size {}",
                        self.device_limits.max_uniform_buffer_binding_size
                    )));
                }
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST
            }
            BufferUsage::Storage => {
                if desc.size > self.device_limits.max_storage_buffer_binding_size as u64 {
                    return Err(allocation_error(format!(
                        "exceeds max storage binding size {}",
                        self.device_limits.max_storage_buffer_binding_size
                    )));
                }
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC
            }
        };

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size,
            usage,
            mapped_at_creation: false,
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(allocation_error(error.to_string()));
        }

        let id = BufferId(self.next_id);
        self.next_id += 1;
        Ok(GpuBuffer {
            id,
            size: desc.size,
            buffer,
        })
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, data: &[u8]) {
        self.queue.write_buffer(&buffer.buffer, 0, data);
    }

    fn dispatch(
        &mut self,
        kernel: &WgpuKernel,
        bindings: &[Binding<'_, GpuBuffer>],
        args: &KernelArgs,
        workgroups: [u32; 3],
    ) {
        let offset = self.push_args(args);

        let entries: Vec<wgpu::BindGroupEntry> = bindings
            .iter()
            .map(|binding| wgpu::BindGroupEntry {
                binding: binding.slot,
                resource: binding.buffer.buffer.as_entire_binding(),
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.stage.name()),
            layout: &kernel.layout,
            entries: &entries,
        });

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("simulation tick"),
            })
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.stage.name()),
            timestamp_writes: None,
        });
        pass.set_pipeline(&kernel.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_bind_group(1, &self.args_bind_group, &[offset]);
        pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
    }

    fn memory_barrier(&mut self) {
        // Each dispatch ends its own compute pass; wgpu orders storage
        // writes across pass boundaries.
        self.barriers += 1;
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
        self.args_cursor = 0;
    }

    fn read_buffer(&mut self, buffer: &GpuBuffer) -> Result<Vec<u8>, ResourceError> {
        self.submit();

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: buffer.size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback"),
        });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, buffer.size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| ResourceError::Readback(e.to_string()))?
            .map_err(|e| ResourceError::Readback(e.to_string()))?;

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_layout_entry_is_read_only_storage() {
        let entry = read_only_layout_entry(3, wgpu::ShaderStages::FRAGMENT);
        assert_eq!(entry.binding, 3);
        assert_eq!(entry.visibility, wgpu::ShaderStages::FRAGMENT);
        assert!(matches!(
            entry.ty,
            wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: true }, .. }
        ));
    }

    #[test]
    fn test_kernel_layout_entries_follow_access() {
        for stage in KernelStage::ALL {
            for binding in stage.layout() {
                let entry = layout_entry(binding.slot, binding.access);
                assert_eq!(entry.visibility, wgpu::ShaderStages::COMPUTE);
                let wgpu::BindingType::Buffer { ty, has_dynamic_offset: false, .. } = entry.ty else {
                    panic!("{} slot {} is not a plain buffer binding", stage, binding.slot);
                };
                let expected = match binding.access {
                    Access::Uniform => wgpu::BufferBindingType::Uniform,
                    Access::ReadOnly => wgpu::BufferBindingType::Storage { read_only: true },
                    Access::ReadWrite => wgpu::BufferBindingType::Storage { read_only: false },
                };
                assert_eq!(ty, expected);
            }
        }
    }
}
