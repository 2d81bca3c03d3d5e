//! The simulation context.
//!
//! [`SimulationContext`] owns every piece of simulation state: parameters,
//! camera, buffers, kernels and the stage pipelines. The device is not owned;
//! it is passed by reference into each call so the caller controls its
//! lifetime and can share it with a renderer.
//!
//! ```ignore
//! let mut device = WgpuDevice::new_headless()?;
//! let kernels = device.build_kernels()?;
//! let mut sim = SimulationContext::new(&device, kernels, SimulationParameters::default())?;
//!
//! loop {
//!     let report = sim.tick(&mut device, clock.tick())?;
//! }
//! ```

use crate::camera::OrbitCamera;
use crate::device::{ComputeDevice, KernelSet};
use crate::dispatch::Dispatcher;
use crate::error::{ConfigError, ResourceError, SimulationError};
use crate::jfa::DistanceFieldPipeline;
use crate::params::{ParameterStore, ResizeLimits, SimulationDefaults, SimulationParameters};
use crate::resize::{ResizeController, ResizeOutcome};
use crate::resources::{Agent, Capacity, ResourceManager, FIELD_VOXEL_SIZE, TRAIL_VOXEL_SIZE};
use crate::step::{StepOutcome, StepPipeline, StepState};

/// Summary of one [`SimulationContext::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub outcome: StepOutcome,
    /// Buffers were (re)allocated at the start of this tick.
    pub reallocated: bool,
    /// Parameters were uploaded this tick.
    pub uploaded: bool,
    pub jfa_steps: usize,
    /// Distance-field slot holding this tick's result.
    pub current_field: usize,
}

/// Buffers for the renderer, valid until the next tick. The renderer only
/// reads them; with wgpu, bind through [`crate::gpu::read_only_layout_entry`].
pub struct RenderResources<'a, B> {
    pub trail_grid: &'a B,
    pub distance_field: &'a B,
    pub grid_resolution: u32,
    pub field_resolution: u32,
}

pub struct SimulationContext<D: ComputeDevice> {
    store: ParameterStore,
    camera: OrbitCamera,
    resources: ResourceManager<D::Buffer>,
    kernels: KernelSet<D::Kernel>,
    dispatcher: Dispatcher,
    step: StepPipeline,
    field: DistanceFieldPipeline,
    resize: ResizeController,
    ticks: u64,
}

impl<D: ComputeDevice> SimulationContext<D> {
    /// Create a context with the default resize limits.
    ///
    /// Nothing is allocated until the first tick.
    pub fn new(
        device: &D,
        kernels: KernelSet<D::Kernel>,
        params: SimulationParameters,
    ) -> Result<Self, ConfigError> {
        Self::with_limits(device, kernels, params, ResizeLimits::default())
    }

    pub fn with_limits(
        device: &D,
        kernels: KernelSet<D::Kernel>,
        params: SimulationParameters,
        limits: ResizeLimits,
    ) -> Result<Self, ConfigError> {
        params.validate(&limits)?;
        let missing = kernels.missing();
        if !missing.is_empty() {
            log::warn!("no kernel for stages {:?}; dispatching them will fail", missing);
        }
        Ok(Self {
            camera: OrbitCamera::new(params.grid_resolution),
            store: ParameterStore::new(params),
            resources: ResourceManager::new(),
            kernels,
            dispatcher: Dispatcher::new(device.limits()),
            step: StepPipeline::new(),
            field: DistanceFieldPipeline::new(),
            resize: ResizeController::new(limits),
            ticks: 0,
        })
    }

    /// Deterministic agent placement on every reset.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.step.reseed(seed);
        self
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Reallocation happens only here, at the start of a tick, so no dispatch
    /// from a previous tick can see a buffer disappear.
    pub fn tick(&mut self, device: &mut D, dt: f32) -> Result<TickReport, SimulationError> {
        let grid = self.store.get().grid_resolution;
        let focus = OrbitCamera::focus(grid);
        let position = self.camera.position(grid);
        self.store.update(|p| {
            p.delta_time = dt;
            p.camera_focus = focus;
            p.camera_position = position;
        });

        let params = self.store.get();
        let capacity = self.resources.ensure_capacity(
            device,
            params.agent_count,
            params.grid_resolution,
            params.reduction_factor,
        )?;
        let reallocated = capacity == Capacity::Reallocated;
        if reallocated {
            // The uniform may be a fresh allocation too.
            self.store.mark_dirty();
            self.step.request_reset();
        }

        let buffers = self.resources.buffers()?;
        let uploaded = self.store.flush(device, buffers.params);
        let outcome = self
            .step
            .run(&mut self.dispatcher, device, &self.kernels, &buffers)?;
        self.field
            .run(&mut self.dispatcher, device, &self.kernels, &buffers)?;
        device.submit();

        self.ticks += 1;
        Ok(TickReport {
            outcome,
            reallocated,
            uploaded,
            jfa_steps: self.field.steps_last_run(),
            current_field: self.field.current(),
        })
    }

    /// Enter reset unconditionally.
    pub fn force_reset(&mut self) {
        self.step.request_reset();
    }

    pub fn set_agent_count(&mut self, count: u32) -> Result<ResizeOutcome, ConfigError> {
        let outcome = self.resize.request_agent_count(&mut self.store, count)?;
        if outcome.is_structural() {
            self.step.request_reset();
        }
        Ok(outcome)
    }

    pub fn set_grid_resolution(&mut self, resolution: u32) -> Result<ResizeOutcome, ConfigError> {
        let outcome = self
            .resize
            .request_grid_resolution(&mut self.store, &mut self.camera, resolution)?;
        if outcome.is_structural() {
            self.step.request_reset();
        }
        Ok(outcome)
    }

    pub fn set_agent_speed(&mut self, speed: f32) -> Result<(), ConfigError> {
        let max = self.store.get().max_voxel_distance();
        self.checked("agent_speed", speed, 0.0, max, |p, v| p.agent_speed = v)
    }

    pub fn set_turn_speed(&mut self, speed: f32) -> Result<(), ConfigError> {
        self.checked("turn_speed", speed, 0.0, SimulationDefaults::MAX_TURN_SPEED, |p, v| {
            p.turn_speed = v
        })
    }

    pub fn set_decay_speed(&mut self, speed: f32) -> Result<(), ConfigError> {
        self.checked("decay_speed", speed, 0.0, SimulationDefaults::MAX_DECAY_SPEED, |p, v| {
            p.decay_speed = v
        })
    }

    pub fn set_sensor_distance(&mut self, distance: f32) -> Result<(), ConfigError> {
        let max = self.store.get().max_voxel_distance();
        self.checked("sensor_distance", distance, 0.0, max, |p, v| p.sensor_distance = v)
    }

    pub fn set_sensor_angle(&mut self, angle: f32) -> Result<(), ConfigError> {
        self.checked("sensor_angle", angle, 0.0, std::f32::consts::PI, |p, v| p.sensor_angle = v)
    }

    pub fn set_wrap_grid(&mut self, wrap: bool) {
        self.store.update(|p| p.wrap_grid = wrap);
    }

    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.store.update(|p| p.aspect_ratio = aspect);
    }

    fn checked(
        &mut self,
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
        apply: impl FnOnce(&mut SimulationParameters, f32),
    ) -> Result<(), ConfigError> {
        self.store.set_checked(name, value, min, max, apply).map_err(|e| {
            log::warn!("rejected edit: {}", e);
            e
        })
    }

    pub fn params(&self) -> &SimulationParameters {
        self.store.get()
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    pub fn step_state(&self) -> StepState {
        self.step.state()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Dispatches issued since creation.
    pub fn dispatches(&self) -> u64 {
        self.dispatcher.issued()
    }

    pub fn resources(&self) -> &ResourceManager<D::Buffer> {
        &self.resources
    }

    /// Trail grid and the current distance field, for the renderer.
    pub fn render_resources(&self) -> Result<RenderResources<'_, D::Buffer>, ResourceError> {
        let buffers = self.resources.buffers()?;
        Ok(RenderResources {
            trail_grid: buffers.trail_grid,
            distance_field: buffers.fields[self.field.current()],
            grid_resolution: buffers.grid_resolution,
            field_resolution: buffers.field_resolution,
        })
    }

    /// Copy the trail grid to host memory, x-fastest.
    pub fn read_trail_grid(&self, device: &mut D) -> Result<Vec<f32>, SimulationError> {
        let grid = self
            .resources
            .trail_grid()
            .ok_or(ResourceError::Unallocated("trail-grid"))?;
        let bytes = device.read_buffer(grid)?;
        Ok(bytes
            .chunks_exact(TRAIL_VOXEL_SIZE as usize)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect())
    }

    pub fn read_agents(&self, device: &mut D) -> Result<Vec<Agent>, SimulationError> {
        let agents = self
            .resources
            .agents()
            .ok_or(ResourceError::Unallocated("agents"))?;
        let bytes = device.read_buffer(agents)?;
        Ok(bytes
            .chunks_exact(Agent::SIZE as usize)
            .map(bytemuck::pod_read_unaligned::<Agent>)
            .collect())
    }

    /// Copy the current distance field to host memory. Each voxel holds the
    /// nearest seed's coordinate and `w = 1`, or `w = -1` if no seed reached it.
    pub fn read_distance_field(&self, device: &mut D) -> Result<Vec<[f32; 4]>, SimulationError> {
        let field = self
            .resources
            .field(self.field.current())
            .ok_or(ResourceError::Unallocated("distance-field"))?;
        let bytes = device.read_buffer(field)?;
        Ok(bytes
            .chunks_exact(FIELD_VOXEL_SIZE as usize)
            .map(bytemuck::pod_read_unaligned::<[f32; 4]>)
            .collect())
    }

    /// Release every buffer. The next tick reallocates and resets.
    pub fn release(&mut self) {
        self.resources.release();
    }
}
