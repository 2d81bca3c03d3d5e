//! Structural edits: agent count and grid resolution.
//!
//! Both are validated here and applied to the parameter store. An accepted
//! change is reported as [`ResizeOutcome::Restructured`]; the caller then puts
//! the step pipeline into reset, and the buffers are reallocated by
//! `ensure_capacity` at the start of the next tick. Resolution-dependent
//! quantities (speed, sensor distance, camera radius) are in voxel units and
//! are rescaled together with the grid.

use crate::camera::OrbitCamera;
use crate::error::ConfigError;
use crate::params::{ParameterStore, ResizeLimits};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResizeOutcome {
    /// The edit resolved to the current value. Nothing to reallocate.
    Unchanged,
    /// Buffers must be reallocated and the simulation reset.
    Restructured { resize_factor: f32 },
}

impl ResizeOutcome {
    pub fn is_structural(&self) -> bool {
        matches!(self, ResizeOutcome::Restructured { .. })
    }
}

/// Largest multiple of `factor` not above `requested`.
pub fn coerce_resolution(requested: u32, factor: u32) -> u32 {
    if factor == 0 {
        return 0;
    }
    (requested / factor) * factor
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ResizeController {
    limits: ResizeLimits,
}

impl ResizeController {
    pub fn new(limits: ResizeLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ResizeLimits {
        &self.limits
    }

    /// Accept an agent count within `[1, max_agent_count]`.
    pub fn request_agent_count(
        &self,
        store: &mut ParameterStore,
        count: u32,
    ) -> Result<ResizeOutcome, ConfigError> {
        if count < 1 || count > self.limits.max_agent_count {
            let err = ConfigError::AgentCountOutOfRange {
                requested: count,
                max: self.limits.max_agent_count,
            };
            log::warn!("rejected edit: {}", err);
            return Err(err);
        }
        if store.get().agent_count == count {
            return Ok(ResizeOutcome::Unchanged);
        }

        log::info!("agent count {} -> {}", store.get().agent_count, count);
        store.update(|p| p.agent_count = count);
        Ok(ResizeOutcome::Restructured { resize_factor: 1.0 })
    }

    /// Accept a grid resolution, coerced down to a multiple of the reduction
    /// factor, and rescale everything measured in voxels.
    pub fn request_grid_resolution(
        &self,
        store: &mut ParameterStore,
        camera: &mut OrbitCamera,
        requested: u32,
    ) -> Result<ResizeOutcome, ConfigError> {
        let limits = &self.limits;
        if requested < limits.min_grid_resolution || requested > limits.max_grid_resolution {
            let err = ConfigError::GridResolutionOutOfRange {
                requested,
                min: limits.min_grid_resolution,
                max: limits.max_grid_resolution,
            };
            log::warn!("rejected edit: {}", err);
            return Err(err);
        }

        let params = store.get();
        let reduction_factor = params.reduction_factor;
        let coerced = coerce_resolution(requested, reduction_factor);
        if coerced == 0 {
            let err = ConfigError::GridResolutionNotCoercible {
                requested,
                reduction_factor,
            };
            log::warn!("rejected edit: {}", err);
            return Err(err);
        }

        let old = params.grid_resolution;
        if coerced == old {
            return Ok(ResizeOutcome::Unchanged);
        }

        let resize_factor = coerced as f32 / old as f32;
        store.update(|p| {
            p.grid_resolution = coerced;
            p.resize_factor = resize_factor;
            p.agent_speed *= resize_factor;
            p.sensor_distance *= resize_factor;
        });
        camera.rescale(resize_factor);
        log::info!(
            "grid resolution {} -> {} (requested {}), resize factor {}",
            old,
            coerced,
            requested,
            resize_factor
        );
        Ok(ResizeOutcome::Restructured { resize_factor })
    }
}
