//! The compute-device seam.
//!
//! Everything above this module talks to the GPU through [`ComputeDevice`]:
//! allocate buffers, upload bytes, issue a dispatch with explicit bindings,
//! insert a barrier, submit. The wgpu implementation lives in
//! [`crate::gpu`]; tests substitute recording or emulating devices.
//!
//! Buffers are RAII handles. Dropping a [`ComputeDevice::Buffer`] releases the
//! underlying allocation, so whoever owns the handle owns the memory.

use std::fmt;

use crate::error::ResourceError;
use crate::uniforms::KernelArgs;

/// The compute stages driven by the simulation core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelStage {
    /// Fades every trail voxel.
    Decay,
    /// Agents sense the trail, turn and advance.
    Move,
    /// Agents write into the trail at their voxel.
    Deposit,
    /// Zeroes the whole trail grid.
    ClearGrid,
    /// Gives every agent a uniformly random position and heading.
    Randomize,
    /// Seeds the distance field from occupied trail voxels.
    JfaInit,
    /// One jump-flood propagation step.
    JfaStep,
}

impl KernelStage {
    pub const ALL: [KernelStage; 7] = [
        KernelStage::Decay,
        KernelStage::Move,
        KernelStage::Deposit,
        KernelStage::ClearGrid,
        KernelStage::Randomize,
        KernelStage::JfaInit,
        KernelStage::JfaStep,
    ];

    pub fn index(self) -> usize {
        match self {
            KernelStage::Decay => 0,
            KernelStage::Move => 1,
            KernelStage::Deposit => 2,
            KernelStage::ClearGrid => 3,
            KernelStage::Randomize => 4,
            KernelStage::JfaInit => 5,
            KernelStage::JfaStep => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KernelStage::Decay => "decay",
            KernelStage::Move => "move",
            KernelStage::Deposit => "deposit",
            KernelStage::ClearGrid => "clear-grid",
            KernelStage::Randomize => "randomize",
            KernelStage::JfaInit => "jfa-init",
            KernelStage::JfaStep => "jfa-step",
        }
    }

    /// Bindings (group 0) this stage's kernel declares.
    pub fn layout(self) -> &'static [BindingLayout] {
        use slots::*;
        const PARAMS_ENTRY: BindingLayout = BindingLayout { slot: PARAMS, access: Access::Uniform };
        match self {
            KernelStage::Decay | KernelStage::ClearGrid => &[
                PARAMS_ENTRY,
                BindingLayout { slot: TRAIL_GRID, access: Access::ReadWrite },
            ],
            KernelStage::Move => &[
                PARAMS_ENTRY,
                BindingLayout { slot: AGENTS, access: Access::ReadWrite },
                BindingLayout { slot: TRAIL_GRID, access: Access::ReadOnly },
            ],
            KernelStage::Deposit => &[
                PARAMS_ENTRY,
                BindingLayout { slot: AGENTS, access: Access::ReadOnly },
                BindingLayout { slot: TRAIL_GRID, access: Access::ReadWrite },
            ],
            KernelStage::Randomize => &[
                PARAMS_ENTRY,
                BindingLayout { slot: AGENTS, access: Access::ReadWrite },
            ],
            KernelStage::JfaInit => &[
                PARAMS_ENTRY,
                BindingLayout { slot: TRAIL_GRID, access: Access::ReadOnly },
                BindingLayout { slot: FIELD_WRITE, access: Access::ReadWrite },
            ],
            KernelStage::JfaStep => &[
                PARAMS_ENTRY,
                BindingLayout { slot: FIELD_READ, access: Access::ReadOnly },
                BindingLayout { slot: FIELD_WRITE, access: Access::ReadWrite },
            ],
        }
    }
}

impl fmt::Display for KernelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binding slots shared by every kernel (group 0).
pub mod slots {
    pub const PARAMS: u32 = 0;
    pub const AGENTS: u32 = 1;
    pub const TRAIL_GRID: u32 = 2;
    pub const FIELD_READ: u32 = 3;
    pub const FIELD_WRITE: u32 = 4;
}

/// How a kernel accesses a bound buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Uniform,
    ReadOnly,
    ReadWrite,
}

impl Access {
    pub fn is_writable(self) -> bool {
        matches!(self, Access::ReadWrite)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingLayout {
    pub slot: u32,
    pub access: Access,
}

/// A buffer bound to one slot for one dispatch.
pub struct Binding<'a, B> {
    pub slot: u32,
    pub buffer: &'a B,
    pub access: Access,
}

impl<'a, B> Binding<'a, B> {
    pub fn uniform(slot: u32, buffer: &'a B) -> Self {
        Self { slot, buffer, access: Access::Uniform }
    }

    pub fn read(slot: u32, buffer: &'a B) -> Self {
        Self { slot, buffer, access: Access::ReadOnly }
    }

    pub fn read_write(slot: u32, buffer: &'a B) -> Self {
        Self { slot, buffer, access: Access::ReadWrite }
    }
}

/// Identity of a device allocation, stable for the allocation's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Common view over a backend's buffer handle.
pub trait DeviceBuffer {
    fn id(&self) -> BufferId;
    fn size(&self) -> u64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Small, CPU-written, read by every kernel.
    Uniform,
    /// Large kernel-read/written storage.
    Storage,
}

#[derive(Clone, Copy, Debug)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Compute capabilities reported by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Maximum number of workgroups per dispatch along each axis.
    pub max_workgroup_count: [u32; 3],
    /// Maximum local workgroup size along each axis.
    pub max_workgroup_size: [u32; 3],
}

impl Default for DeviceLimits {
    /// The WebGPU baseline guarantees.
    fn default() -> Self {
        Self {
            max_workgroup_count: [65_535; 3],
            max_workgroup_size: [256, 256, 64],
        }
    }
}

/// A single command stream onto a compute device.
pub trait ComputeDevice {
    type Buffer: DeviceBuffer;
    type Kernel;

    fn limits(&self) -> DeviceLimits;

    /// Local workgroup size declared by a compiled kernel.
    fn workgroup_size(&self, kernel: &Self::Kernel) -> [u32; 3];

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<Self::Buffer, ResourceError>;

    /// Replace the buffer's contents from offset 0 in one contiguous write.
    fn write_buffer(&mut self, buffer: &Self::Buffer, data: &[u8]);

    /// Record one dispatch. Validation is the caller's job.
    fn dispatch(
        &mut self,
        kernel: &Self::Kernel,
        bindings: &[Binding<'_, Self::Buffer>],
        args: &KernelArgs,
        workgroups: [u32; 3],
    );

    /// Make every write of the preceding dispatches visible to later ones.
    fn memory_barrier(&mut self);

    /// Hand all recorded work to the device.
    fn submit(&mut self);

    /// Copy a buffer back to host memory, blocking until it is available.
    fn read_buffer(&mut self, buffer: &Self::Buffer) -> Result<Vec<u8>, ResourceError>;
}

/// One compiled kernel per stage. Unset stages fail at dispatch time.
pub struct KernelSet<K> {
    kernels: [Option<K>; 7],
}

impl<K> KernelSet<K> {
    pub fn new() -> Self {
        Self {
            kernels: std::array::from_fn(|_| None),
        }
    }

    pub fn insert(&mut self, stage: KernelStage, kernel: K) {
        self.kernels[stage.index()] = Some(kernel);
    }

    pub fn with(mut self, stage: KernelStage, kernel: K) -> Self {
        self.insert(stage, kernel);
        self
    }

    pub fn get(&self, stage: KernelStage) -> Option<&K> {
        self.kernels[stage.index()].as_ref()
    }

    /// Stages with no kernel.
    pub fn missing(&self) -> Vec<KernelStage> {
        KernelStage::ALL
            .into_iter()
            .filter(|stage| self.get(*stage).is_none())
            .collect()
    }
}

impl<K> Default for KernelSet<K> {
    fn default() -> Self {
        Self::new()
    }
}
