//! GPU-resident simulation state.
//!
//! [`ResourceManager`] is the sole owner of every buffer the pipeline uses:
//! the parameter uniform, the agent array, the trail grid and the two
//! distance-field buffers. Buffers are RAII handles, so replacing one in its
//! slot releases the old allocation and dropping the manager releases all.

use bytemuck::{Pod, Zeroable};

use crate::device::{BufferDesc, BufferUsage, ComputeDevice, DeviceBuffer};
use crate::error::{ConfigError, ResourceError, SimulationError};
use crate::params::SimulationParamsGpu;

/// One simulated agent as stored on the GPU.
///
/// Matches the WGSL `Agent` struct: two `vec3<f32>` at 16-byte stride.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Agent {
    pub position: [f32; 3],
    pub _pad0: f32,
    /// Unit heading.
    pub heading: [f32; 3],
    pub _pad1: f32,
}

impl Agent {
    pub const SIZE: u64 = std::mem::size_of::<Agent>() as u64;

    /// Whether the position lies inside `[0, resolution)` on every axis.
    pub fn is_inside(&self, resolution: u32) -> bool {
        let n = resolution as f32;
        self.position.iter().all(|&c| c >= 0.0 && c < n)
    }
}

/// Bytes per trail voxel.
pub const TRAIL_VOXEL_SIZE: u64 = 4;
/// Bytes per distance-field voxel: nearest seed coordinate plus a seed flag.
pub const FIELD_VOXEL_SIZE: u64 = 16;

/// Result of [`ResourceManager::ensure_capacity`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capacity {
    /// Every buffer already matched the request.
    Unchanged,
    /// At least one buffer was released and allocated anew; its contents are undefined.
    Reallocated,
}

/// Borrowed view of a fully allocated [`ResourceManager`], with the sizes the
/// buffers were allocated for.
pub struct Buffers<'a, B> {
    pub params: &'a B,
    pub agents: &'a B,
    pub trail_grid: &'a B,
    pub fields: [&'a B; 2],
    pub agent_count: u32,
    pub grid_resolution: u32,
    pub field_resolution: u32,
}

/// Owner of all simulation buffers.
pub struct ResourceManager<B> {
    params: Option<B>,
    agents: Option<B>,
    trail_grid: Option<B>,
    fields: [Option<B>; 2],
    agent_count: u32,
    grid_resolution: u32,
    field_resolution: u32,
}

impl<B: DeviceBuffer> ResourceManager<B> {
    /// A manager with nothing allocated yet.
    pub fn new() -> Self {
        Self {
            params: None,
            agents: None,
            trail_grid: None,
            fields: [None, None],
            agent_count: 0,
            grid_resolution: 0,
            field_resolution: 0,
        }
    }

    /// Make every buffer match the requested sizes.
    ///
    /// Idempotent: a second identical call returns [`Capacity::Unchanged`] and
    /// allocates nothing. Only mismatched buffers are replaced, and each old
    /// allocation is released before its replacement is created.
    pub fn ensure_capacity<D>(
        &mut self,
        device: &mut D,
        agent_count: u32,
        grid_resolution: u32,
        reduction_factor: u32,
    ) -> Result<Capacity, SimulationError>
    where
        D: ComputeDevice<Buffer = B>,
    {
        if reduction_factor == 0 || grid_resolution % reduction_factor != 0 {
            return Err(ConfigError::InvalidReductionFactor {
                grid_resolution,
                reduction_factor,
            }
            .into());
        }
        let field_resolution = grid_resolution / reduction_factor;
        let mut capacity = Capacity::Unchanged;

        if self.params.is_none() {
            self.params = Some(device.create_buffer(&BufferDesc {
                label: "simulation-params",
                size: std::mem::size_of::<SimulationParamsGpu>() as u64,
                usage: BufferUsage::Uniform,
            })?);
        }

        if self.agents.is_none() || self.agent_count != agent_count {
            self.agents = None;
            self.agent_count = 0;
            let size = agent_count as u64 * Agent::SIZE;
            self.agents = Some(storage(device, "agents", size)?);
            self.agent_count = agent_count;
            log::info!("allocated agent buffer: {} agents ({} bytes)", agent_count, size);
            capacity = Capacity::Reallocated;
        }

        if self.trail_grid.is_none() || self.grid_resolution != grid_resolution {
            self.trail_grid = None;
            self.grid_resolution = 0;
            let size = voxels(grid_resolution) * TRAIL_VOXEL_SIZE;
            self.trail_grid = Some(storage(device, "trail-grid", size)?);
            self.grid_resolution = grid_resolution;
            log::info!("allocated trail grid: {}^3 ({} bytes)", grid_resolution, size);
            capacity = Capacity::Reallocated;
        }

        if self.fields.iter().any(Option::is_none) || self.field_resolution != field_resolution {
            self.fields = [None, None];
            self.field_resolution = 0;
            let size = voxels(field_resolution) * FIELD_VOXEL_SIZE;
            let a = storage(device, "distance-field-a", size)?;
            let b = storage(device, "distance-field-b", size)?;
            self.fields = [Some(a), Some(b)];
            self.field_resolution = field_resolution;
            log::info!("allocated distance fields: 2 x {}^3 ({} bytes each)", field_resolution, size);
            capacity = Capacity::Reallocated;
        }

        Ok(capacity)
    }

    /// Release every allocation.
    pub fn release(&mut self) {
        self.params = None;
        self.agents = None;
        self.trail_grid = None;
        self.fields = [None, None];
        self.agent_count = 0;
        self.grid_resolution = 0;
        self.field_resolution = 0;
    }

    /// Borrow every buffer at once, failing if any is missing.
    pub fn buffers(&self) -> Result<Buffers<'_, B>, ResourceError> {
        Ok(Buffers {
            params: self.params.as_ref().ok_or(ResourceError::Unallocated("simulation-params"))?,
            agents: self.agents.as_ref().ok_or(ResourceError::Unallocated("agents"))?,
            trail_grid: self.trail_grid.as_ref().ok_or(ResourceError::Unallocated("trail-grid"))?,
            fields: [
                self.fields[0].as_ref().ok_or(ResourceError::Unallocated("distance-field-a"))?,
                self.fields[1].as_ref().ok_or(ResourceError::Unallocated("distance-field-b"))?,
            ],
            agent_count: self.agent_count,
            grid_resolution: self.grid_resolution,
            field_resolution: self.field_resolution,
        })
    }

    pub fn params(&self) -> Option<&B> {
        self.params.as_ref()
    }

    pub fn agents(&self) -> Option<&B> {
        self.agents.as_ref()
    }

    pub fn trail_grid(&self) -> Option<&B> {
        self.trail_grid.as_ref()
    }

    /// Distance-field buffer in slot `index` (0 is A, 1 is B).
    pub fn field(&self, index: usize) -> Option<&B> {
        self.fields.get(index).and_then(Option::as_ref)
    }

    pub fn agent_count(&self) -> u32 {
        self.agent_count
    }

    pub fn grid_resolution(&self) -> u32 {
        self.grid_resolution
    }

    pub fn field_resolution(&self) -> u32 {
        self.field_resolution
    }
}

impl<B: DeviceBuffer> Default for ResourceManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

fn voxels(resolution: u32) -> u64 {
    let n = resolution as u64;
    n * n * n
}

fn storage<D: ComputeDevice>(device: &mut D, label: &str, size: u64) -> Result<D::Buffer, SimulationError> {
    let buffer = device.create_buffer(&BufferDesc {
        label,
        size,
        usage: BufferUsage::Storage,
    })?;
    Ok(buffer)
}
