//! Simulation parameters and their GPU mirror.
//!
//! [`SimulationParameters`] is the single authoritative copy of the
//! configuration. [`ParameterStore`] owns it, tracks whether it changed since
//! the last upload, and flushes it to the device as one contiguous write.
//!
//! Parameters are built the same way field configs are:
//!
//! ```ignore
//! let params = SimulationParameters::default()
//!     .with_grid_resolution(200)
//!     .with_agent_count(100_000)
//!     .with_decay_speed(0.5);
//! ```

use std::f32::consts::PI;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::device::ComputeDevice;
use crate::error::ConfigError;

/// Default values for a fresh simulation.
pub struct SimulationDefaults;

impl SimulationDefaults {
    pub const GRID_RESOLUTION: u32 = 400;
    pub const AGENT_COUNT: u32 = 500_000;
    pub const AGENT_SPEED: f32 = 10.0;
    pub const DECAY_SPEED: f32 = 0.33;
    pub const SENSOR_DISTANCE: f32 = 10.0;
    pub const SENSOR_ANGLE: f32 = PI / 2.0;
    pub const TURN_SPEED: f32 = 1.0;
    pub const REDUCTION_FACTOR: u32 = 2;

    pub const MAX_AGENT_COUNT: u32 = 1_000_000;
    pub const MIN_GRID_RESOLUTION: u32 = 25;
    pub const MAX_GRID_RESOLUTION: u32 = 500;

    pub const MAX_TURN_SPEED: f32 = 5.0;
    pub const MAX_DECAY_SPEED: f32 = 10.0;
}

/// Accepted ranges for structural edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeLimits {
    pub max_agent_count: u32,
    pub min_grid_resolution: u32,
    pub max_grid_resolution: u32,
}

impl Default for ResizeLimits {
    fn default() -> Self {
        Self {
            max_agent_count: SimulationDefaults::MAX_AGENT_COUNT,
            min_grid_resolution: SimulationDefaults::MIN_GRID_RESOLUTION,
            max_grid_resolution: SimulationDefaults::MAX_GRID_RESOLUTION,
        }
    }
}

/// Configuration for one simulation.
///
/// Distances and speeds are in voxel units, so they are rescaled whenever the
/// grid resolution changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    /// Side length of the cubic trail grid, in voxels.
    pub grid_resolution: u32,
    /// Divisor from trail grid to distance-field resolution.
    pub reduction_factor: u32,
    /// Number of simulated agents.
    pub agent_count: u32,
    /// Voxels per second.
    pub agent_speed: f32,
    /// Rotations per second.
    pub turn_speed: f32,
    /// How far ahead agents sense, in voxels.
    pub sensor_distance: f32,
    /// Angle between the forward and side sensors, radians.
    pub sensor_angle: f32,
    /// A trail fully decays in `1 / decay_speed` seconds.
    pub decay_speed: f32,
    /// Agents wrap around the volume instead of bouncing off its walls.
    pub wrap_grid: bool,
    /// Viewport aspect ratio, forwarded to the renderer.
    pub aspect_ratio: f32,

    #[serde(skip)]
    pub delta_time: f32,
    /// Factor applied by the most recent grid resize.
    #[serde(skip)]
    pub resize_factor: f32,
    #[serde(skip)]
    pub camera_focus: Vec3,
    #[serde(skip)]
    pub camera_position: Vec3,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            grid_resolution: SimulationDefaults::GRID_RESOLUTION,
            reduction_factor: SimulationDefaults::REDUCTION_FACTOR,
            agent_count: SimulationDefaults::AGENT_COUNT,
            agent_speed: SimulationDefaults::AGENT_SPEED,
            turn_speed: SimulationDefaults::TURN_SPEED,
            sensor_distance: SimulationDefaults::SENSOR_DISTANCE,
            sensor_angle: SimulationDefaults::SENSOR_ANGLE,
            decay_speed: SimulationDefaults::DECAY_SPEED,
            wrap_grid: true,
            aspect_ratio: 1.0,
            delta_time: 0.0,
            resize_factor: 1.0,
            camera_focus: Vec3::ZERO,
            camera_position: Vec3::ZERO,
        }
    }
}

impl SimulationParameters {
    pub fn with_grid_resolution(mut self, resolution: u32) -> Self {
        self.grid_resolution = resolution;
        self
    }

    pub fn with_reduction_factor(mut self, factor: u32) -> Self {
        self.reduction_factor = factor;
        self
    }

    pub fn with_agent_count(mut self, count: u32) -> Self {
        self.agent_count = count;
        self
    }

    pub fn with_agent_speed(mut self, speed: f32) -> Self {
        self.agent_speed = speed;
        self
    }

    pub fn with_turn_speed(mut self, speed: f32) -> Self {
        self.turn_speed = speed;
        self
    }

    pub fn with_sensor_distance(mut self, distance: f32) -> Self {
        self.sensor_distance = distance;
        self
    }

    pub fn with_sensor_angle(mut self, angle: f32) -> Self {
        self.sensor_angle = angle;
        self
    }

    pub fn with_decay_speed(mut self, speed: f32) -> Self {
        self.decay_speed = speed;
        self
    }

    pub fn with_wrap_grid(mut self, wrap: bool) -> Self {
        self.wrap_grid = wrap;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect: f32) -> Self {
        self.aspect_ratio = aspect;
        self
    }

    /// Side length of the distance field.
    pub fn field_resolution(&self) -> u32 {
        self.grid_resolution / self.reduction_factor.max(1)
    }

    /// Upper bound for speed and sensor distance edits.
    pub fn max_voxel_distance(&self) -> f32 {
        self.grid_resolution as f32 / 2.0
    }

    /// Check the whole configuration against `limits`.
    pub fn validate(&self, limits: &ResizeLimits) -> Result<(), ConfigError> {
        if self.reduction_factor == 0 || self.grid_resolution % self.reduction_factor != 0 {
            return Err(ConfigError::InvalidReductionFactor {
                grid_resolution: self.grid_resolution,
                reduction_factor: self.reduction_factor,
            });
        }
        if self.agent_count < 1 || self.agent_count > limits.max_agent_count {
            return Err(ConfigError::AgentCountOutOfRange {
                requested: self.agent_count,
                max: limits.max_agent_count,
            });
        }
        if self.grid_resolution < limits.min_grid_resolution
            || self.grid_resolution > limits.max_grid_resolution
        {
            return Err(ConfigError::GridResolutionOutOfRange {
                requested: self.grid_resolution,
                min: limits.min_grid_resolution,
                max: limits.max_grid_resolution,
            });
        }
        let max_distance = self.max_voxel_distance();
        check_range("agent_speed", self.agent_speed, 0.0, max_distance)?;
        check_range("sensor_distance", self.sensor_distance, 0.0, max_distance)?;
        check_range("turn_speed", self.turn_speed, 0.0, SimulationDefaults::MAX_TURN_SPEED)?;
        check_range("decay_speed", self.decay_speed, 0.0, SimulationDefaults::MAX_DECAY_SPEED)?;
        check_range("sensor_angle", self.sensor_angle, 0.0, PI)?;
        Ok(())
    }

    /// Parse a JSON preset. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load a JSON preset from disk.
    pub fn load_json(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Byte-for-byte GPU representation.
    pub fn to_gpu(&self) -> SimulationParamsGpu {
        SimulationParamsGpu {
            grid_resolution: self.grid_resolution,
            reduction_factor: self.reduction_factor,
            agent_count: self.agent_count,
            wrap_grid: self.wrap_grid as u32,
            agent_speed: self.agent_speed,
            turn_speed: self.turn_speed,
            sensor_distance: self.sensor_distance,
            sensor_angle: self.sensor_angle,
            decay_speed: self.decay_speed,
            delta_time: self.delta_time,
            resize_factor: self.resize_factor,
            aspect_ratio: self.aspect_ratio,
            camera_focus: self.camera_focus.extend(0.0).to_array(),
            camera_position: self.camera_position.extend(0.0).to_array(),
        }
    }
}

pub(crate) fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::ParameterOutOfRange { name, value, min, max });
    }
    Ok(())
}

/// Simulation parameters as laid out in the kernels' uniform block.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SimulationParamsGpu {
    pub grid_resolution: u32,
    pub reduction_factor: u32,
    pub agent_count: u32,
    pub wrap_grid: u32,
    pub agent_speed: f32,
    pub turn_speed: f32,
    pub sensor_distance: f32,
    pub sensor_angle: f32,
    pub decay_speed: f32,
    pub delta_time: f32,
    pub resize_factor: f32,
    pub aspect_ratio: f32,
    pub camera_focus: [f32; 4],
    pub camera_position: [f32; 4],
}

/// Owns the authoritative parameters and their upload state.
#[derive(Debug)]
pub struct ParameterStore {
    params: SimulationParameters,
    dirty: bool,
    uploads: u64,
}

impl ParameterStore {
    /// A new store is dirty: nothing has been uploaded yet.
    pub fn new(params: SimulationParameters) -> Self {
        Self {
            params,
            dirty: true,
            uploads: 0,
        }
    }

    pub fn get(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of uploads performed.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Apply an edit. The store only becomes dirty if a field actually changed.
    pub fn update(&mut self, edit: impl FnOnce(&mut SimulationParameters)) {
        let before = self.params.clone();
        edit(&mut self.params);
        if self.params != before {
            self.dirty = true;
        }
    }

    /// Range-checked edit of one non-structural field. On error nothing changes.
    pub fn set_checked(
        &mut self,
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
        apply: impl FnOnce(&mut SimulationParameters, f32),
    ) -> Result<(), ConfigError> {
        check_range(name, value, min, max)?;
        self.update(|p| apply(p, value));
        Ok(())
    }

    /// Upload the parameters if they changed. Returns whether a write happened.
    pub fn flush<D: ComputeDevice>(&mut self, device: &mut D, buffer: &D::Buffer) -> bool {
        if !self.dirty {
            return false;
        }
        let gpu = self.params.to_gpu();
        device.write_buffer(buffer, bytemuck::bytes_of(&gpu));
        self.dirty = false;
        self.uploads += 1;
        log::debug!("uploaded simulation parameters (upload #{})", self.uploads);
        true
    }

    /// Force the next flush to upload.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::{Command, RecordingDevice};
    use crate::device::{BufferDesc, BufferUsage, DeviceBuffer};

    #[test]
    fn test_gpu_layout_size() {
        assert_eq!(std::mem::size_of::<SimulationParamsGpu>(), 80);
    }

    #[test]
    fn test_defaults_are_valid() {
        let params = SimulationParameters::default();
        assert_eq!(params.field_resolution(), 200);
        assert!(params.validate(&ResizeLimits::default()).is_ok());
    }

    #[test]
    fn test_validate_reduction_factor() {
        let params = SimulationParameters::default().with_grid_resolution(401);
        assert_eq!(
            params.validate(&ResizeLimits::default()),
            Err(ConfigError::InvalidReductionFactor { grid_resolution: 401, reduction_factor: 2 })
        );

        let params = SimulationParameters::default().with_reduction_factor(0);
        assert!(matches!(
            params.validate(&ResizeLimits::default()),
            Err(ConfigError::InvalidReductionFactor { .. })
        ));
    }

    #[test]
    fn test_validate_agent_count() {
        let limits = ResizeLimits::default();
        let params = SimulationParameters::default().with_agent_count(0);
        assert!(matches!(params.validate(&limits), Err(ConfigError::AgentCountOutOfRange { .. })));
        let params = SimulationParameters::default().with_agent_count(1_000_001);
        assert!(matches!(params.validate(&limits), Err(ConfigError::AgentCountOutOfRange { .. })));
    }

    #[test]
    fn test_json_preset_fills_missing_fields() {
        let params = SimulationParameters::from_json_str(r#"{ "grid_resolution": 100, "agent_count": 2000 }"#).unwrap();
        assert_eq!(params.grid_resolution, 100);
        assert_eq!(params.agent_count, 2000);
        assert_eq!(params.reduction_factor, SimulationDefaults::REDUCTION_FACTOR);
        assert!(params.wrap_grid);

        let text = params.to_json_string().unwrap();
        assert!(!text.contains("camera_focus"));
        assert_eq!(SimulationParameters::from_json_str(&text).unwrap(), params);
    }

    #[test]
    fn test_to_gpu_copies_fields() {
        let mut params = SimulationParameters::default().with_wrap_grid(false);
        params.camera_focus = Vec3::new(1.0, 2.0, 3.0);
        let gpu = params.to_gpu();
        assert_eq!(gpu.grid_resolution, 400);
        assert_eq!(gpu.wrap_grid, 0);
        assert_eq!(gpu.camera_focus, [1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_store_flushes_once_per_change() {
        let mut device = RecordingDevice::new();
        let buffer = device
            .create_buffer(&BufferDesc { label: "params", size: 80, usage: BufferUsage::Uniform })
            .unwrap();
        let mut store = ParameterStore::new(SimulationParameters::default());

        assert!(store.flush(&mut device, &buffer));
        assert!(!store.flush(&mut device, &buffer));

        store.update(|p| p.decay_speed = 1.0);
        assert!(store.is_dirty());
        assert!(store.flush(&mut device, &buffer));
        assert_eq!(store.uploads(), 2);

        let writes: Vec<_> = device
            .commands()
            .into_iter()
            .filter(|c| matches!(c, Command::Write { .. }))
            .collect();
        assert_eq!(writes, vec![
            Command::Write { id: buffer.id(), len: 80 },
            Command::Write { id: buffer.id(), len: 80 },
        ]);
    }

    #[test]
    fn test_store_ignores_no_op_edits() {
        let mut device = RecordingDevice::new();
        let buffer = device
            .create_buffer(&BufferDesc { label: "params", size: 80, usage: BufferUsage::Uniform })
            .unwrap();
        let mut store = ParameterStore::new(SimulationParameters::default());
        store.flush(&mut device, &buffer);

        store.update(|p| p.decay_speed = SimulationDefaults::DECAY_SPEED);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_set_checked_rejects_and_retains() {
        let mut store = ParameterStore::new(SimulationParameters::default());
        let err = store
            .set_checked("turn_speed", 6.0, 0.0, 5.0, |p, v| p.turn_speed = v)
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParameterOutOfRange { name: "turn_speed", .. }));
        assert_eq!(store.get().turn_speed, SimulationDefaults::TURN_SPEED);

        store.set_checked("turn_speed", 2.5, 0.0, 5.0, |p, v| p.turn_speed = v).unwrap();
        assert_eq!(store.get().turn_speed, 2.5);
    }
}
