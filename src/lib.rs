//! # sporefield
//!
//! A GPU-resident 3D slime-mold simulation with a jump-flood distance field.
//!
//! Agents move through a cubic trail grid, sensing the trail ahead of them,
//! turning toward the strongest signal and depositing as they go. Every tick
//! the trail decays, agents move and deposit, and a jump-flood pass turns the
//! occupied voxels into a reduced-resolution distance field a renderer can
//! ray-march.
//!
//! ## Quick Start
//!
//! ```ignore
//! use sporefield::prelude::*;
//!
//! fn main() -> Result<(), SimulationError> {
//!     let mut device = WgpuDevice::new_headless()?;
//!     let kernels = device.build_kernels()?;
//!     let params = SimulationParameters::default()
//!         .with_grid_resolution(200)
//!         .with_agent_count(100_000);
//!     let mut sim = SimulationContext::new(&device, kernels, params)?;
//!
//!     let mut clock = FrameClock::new();
//!     for _ in 0..600 {
//!         sim.tick(&mut device, clock.tick())?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Structure
//!
//! | Piece | Role |
//! |-------|------|
//! | [`ComputeDevice`] | The GPU seam; [`WgpuDevice`] is the real backend |
//! | [`Dispatcher`] | Ceiling-divided, limit-checked dispatch plus barrier |
//! | [`ParameterStore`] | Authoritative parameters, uploaded when dirty |
//! | [`ResourceManager`] | Owns agents, trail grid and both distance fields |
//! | [`StepPipeline`] | Decay, move, deposit; or clear and randomize on reset |
//! | [`DistanceFieldPipeline`] | Jump-flood init and ping-pong steps |
//! | [`ResizeController`] | Validates and applies agent-count and grid edits |
//! | [`SimulationContext`] | Ties it together, one `tick` per frame |
//!
//! ## Errors
//!
//! Configuration errors reject an edit and keep the previous value.
//! Everything else is fatal; see [`SimulationError::is_fatal`].

pub mod camera;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod gpu;
pub mod jfa;
pub mod params;
pub mod resize;
pub mod resources;
pub mod simulation;
pub mod step;
pub mod time;
pub mod uniforms;

pub use bytemuck;
pub use glam::{Vec2, Vec3};

pub use camera::OrbitCamera;
pub use device::{
    Access, Binding, BufferDesc, BufferId, BufferUsage, ComputeDevice, DeviceBuffer, DeviceLimits,
    KernelSet, KernelStage,
};
pub use dispatch::{workgroup_count, Dispatcher};
pub use error::{ConfigError, DeviceLimit, DispatchError, GpuError, ResourceError, SimulationError};
pub use gpu::{GpuBuffer, WgpuDevice, WgpuKernel};
pub use jfa::{step_schedule, DistanceFieldPipeline};
pub use params::{ParameterStore, ResizeLimits, SimulationDefaults, SimulationParameters, SimulationParamsGpu};
pub use resize::{ResizeController, ResizeOutcome};
pub use resources::{Agent, Buffers, Capacity, ResourceManager};
pub use simulation::{RenderResources, SimulationContext, TickReport};
pub use step::{StepOutcome, StepPipeline, StepState};
pub use time::FrameClock;
pub use uniforms::{KernelArgs, ShaderValue};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use sporefield::prelude::*;
/// ```
pub mod prelude {
    pub use crate::camera::OrbitCamera;
    pub use crate::device::{ComputeDevice, KernelStage};
    pub use crate::error::{ConfigError, SimulationError};
    pub use crate::gpu::WgpuDevice;
    pub use crate::params::{SimulationDefaults, SimulationParameters};
    pub use crate::resize::ResizeOutcome;
    pub use crate::simulation::{SimulationContext, TickReport};
    pub use crate::step::StepOutcome;
    pub use crate::time::FrameClock;
    pub use crate::{Vec2, Vec3};
}
