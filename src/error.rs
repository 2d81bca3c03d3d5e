//! Error types for sporefield.
//!
//! Errors fall into three classes. Configuration errors are rejected at the
//! mutation boundary and leave the previous parameters in place. Dispatch and
//! resource errors are fatal: the pipeline's sizing assumptions no longer hold
//! and the caller is expected to report and terminate.

use std::fmt;

use crate::device::KernelStage;

/// A rejected configuration edit. The previous valid state is retained.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Grid resolution is not a multiple of the distance-field reduction factor,
    /// or the reduction factor itself is zero.
    InvalidReductionFactor { grid_resolution: u32, reduction_factor: u32 },
    /// Requested agent count is outside `[1, max]`.
    AgentCountOutOfRange { requested: u32, max: u32 },
    /// Requested grid resolution is outside the accepted range.
    GridResolutionOutOfRange { requested: u32, min: u32, max: u32 },
    /// Coercing the resolution down to a multiple of the reduction factor yields zero.
    GridResolutionNotCoercible { requested: u32, reduction_factor: u32 },
    /// A non-structural parameter edit is outside its accepted range.
    ParameterOutOfRange { name: &'static str, value: f32, min: f32, max: f32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidReductionFactor { grid_resolution, reduction_factor } => write!(
                f,
                "Invalid reduction factor: grid resolution {} is not a multiple of {}",
                grid_resolution, reduction_factor
            ),
            ConfigError::AgentCountOutOfRange { requested, max } => {
                write!(f, "Agent count {} is outside [1, {}]", requested, max)
            }
            ConfigError::GridResolutionOutOfRange { requested, min, max } => {
                write!(f, "Grid resolution {} is outside [{}, {}]", requested, min, max)
            }
            ConfigError::GridResolutionNotCoercible { requested, reduction_factor } => write!(
                f,
                "Grid resolution {} has no positive multiple of {} at or below it",
                requested, reduction_factor
            ),
            ConfigError::ParameterOutOfRange { name, value, min, max } => {
                write!(f, "Parameter '{}' = {} is outside [{}, {}]", name, value, min, max)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Which device limit a dispatch ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLimit {
    /// Maximum number of workgroups along one axis.
    WorkgroupCount,
    /// Maximum local workgroup size along one axis.
    WorkgroupSize,
}

impl fmt::Display for DeviceLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceLimit::WorkgroupCount => write!(f, "max workgroup count"),
            DeviceLimit::WorkgroupSize => write!(f, "max local workgroup size"),
        }
    }
}

/// Errors raised while validating or issuing a compute dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// An item count along some axis was zero.
    InvalidDispatchSize { stage: KernelStage, items: [u32; 3] },
    /// The kernel for this stage is unset, or declares a zero local size.
    InvalidKernel { stage: KernelStage },
    /// A computed workgroup count or the kernel's local size exceeds the device limit.
    DeviceLimitExceeded {
        stage: KernelStage,
        limit: DeviceLimit,
        axis: usize,
        requested: u32,
        max: u32,
    },
    /// The same buffer was bound to two slots and at least one of them is writable.
    AliasedBinding { stage: KernelStage, first: u32, second: u32 },
    /// The serialized kernel arguments do not fit one argument slot.
    ArgumentsTooLarge { stage: KernelStage, size: usize, max: usize },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::InvalidDispatchSize { stage, items } => write!(
                f,
                "Invalid dispatch size for {} stage: items {:?} must all be at least 1",
                stage, items
            ),
            DispatchError::InvalidKernel { stage } => {
                write!(f, "Kernel for {} stage is unset or has an invalid local size", stage)
            }
            DispatchError::DeviceLimitExceeded { stage, limit, axis, requested, max } => write!(
                f,
                "{} stage exceeds the device {} on axis {}: {} > {}",
                stage,
                limit,
                axis_name(*axis),
                requested,
                max
            ),
            DispatchError::AliasedBinding { stage, first, second } => write!(
                f,
                "{} stage binds one buffer to slots {} and {} with write access",
                stage, first, second
            ),
            DispatchError::ArgumentsTooLarge { stage, size, max } => write!(
                f,
                "{} stage arguments take {} bytes, more than the {} byte slot",
                stage, size, max
            ),
        }
    }
}

impl std::error::Error for DispatchError {}

fn axis_name(axis: usize) -> &'static str {
    match axis {
        0 => "x",
        1 => "y",
        _ => "z",
    }
}

/// Errors raised while allocating or reading GPU memory.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// A buffer could not be allocated.
    Allocation { label: String, size: u64, reason: String },
    /// A buffer could not be mapped for reading.
    Readback(String),
    /// A stage ran before its buffer was allocated.
    Unallocated(&'static str),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Allocation { label, size, reason } => {
                write!(f, "Failed to allocate '{}' ({} bytes): {}", label, size, reason)
            }
            ResourceError::Readback(msg) => write!(f, "Failed to read back GPU buffer: {}", msg),
            ResourceError::Unallocated(label) => write!(f, "Buffer '{}' is not allocated", label),
        }
    }
}

impl std::error::Error for ResourceError {}

/// Errors that can occur during GPU initialization.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// A built-in kernel failed to parse or declares no compute entry point.
    Shader { stage: KernelStage, message: String },
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Compute support (Vulkan/Metal/DX12) is required."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::Shader { stage, message } => {
                write!(f, "Failed to build {} kernel: {}", stage, message)
            }
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Any error surfaced by the simulation core.
#[derive(Debug)]
pub enum SimulationError {
    /// A rejected edit. The previous value is still in effect.
    Config(ConfigError),
    /// A dispatch failed validation before reaching the device.
    Dispatch(DispatchError),
    /// A buffer could not be allocated or read back.
    Resource(ResourceError),
    /// Device creation or kernel compilation failed.
    Gpu(GpuError),
}

impl SimulationError {
    /// Whether the process can keep running after this error.
    ///
    /// Only configuration errors are recoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SimulationError::Config(_))
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Config(e) => write!(f, "Configuration error: {}", e),
            SimulationError::Dispatch(e) => write!(f, "Dispatch error: {}", e),
            SimulationError::Resource(e) => write!(f, "Resource error: {}", e),
            SimulationError::Gpu(e) => write!(f, "GPU error: {}", e),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Config(e) => Some(e),
            SimulationError::Dispatch(e) => Some(e),
            SimulationError::Resource(e) => Some(e),
            SimulationError::Gpu(e) => Some(e),
        }
    }
}

impl From<ConfigError> for SimulationError {
    fn from(e: ConfigError) -> Self {
        SimulationError::Config(e)
    }
}

impl From<DispatchError> for SimulationError {
    fn from(e: DispatchError) -> Self {
        SimulationError::Dispatch(e)
    }
}

impl From<ResourceError> for SimulationError {
    fn from(e: ResourceError) -> Self {
        SimulationError::Resource(e)
    }
}

impl From<GpuError> for SimulationError {
    fn from(e: GpuError) -> Self {
        SimulationError::Gpu(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_recoverable() {
        let config: SimulationError = ConfigError::AgentCountOutOfRange { requested: 0, max: 10 }.into();
        assert!(!config.is_fatal());

        let dispatch: SimulationError = DispatchError::InvalidKernel { stage: KernelStage::Move }.into();
        assert!(dispatch.is_fatal());

        let resource: SimulationError = ResourceError::Readback("lost".into()).into();
        assert!(resource.is_fatal());

        assert!(SimulationError::Gpu(GpuError::NoAdapter).is_fatal());
    }

    #[test]
    fn test_device_limit_message_names_stage_and_limit() {
        let err = DispatchError::DeviceLimitExceeded {
            stage: KernelStage::Decay,
            limit: DeviceLimit::WorkgroupCount,
            axis: 2,
            requested: 70_000,
            max: 65_535,
        };
        let msg = err.to_string();
        assert!(msg.contains("decay"));
        assert!(msg.contains("max workgroup count"));
        assert!(msg.contains("axis z"));
        assert!(msg.contains("70000 > 65535"));
    }

    #[test]
    fn test_simulation_error_keeps_its_source() {
        use std::error::Error;

        let err: SimulationError = DispatchError::ArgumentsTooLarge {
            stage: KernelStage::JfaStep,
            size: 272,
            max: 256,
        }
        .into();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Dispatch error: jfa-step stage arguments take 272 bytes, more than the 256 byte slot"
        );
        assert!(err.source().is_some());

        let err: SimulationError = ResourceError::Unallocated("agents").into();
        assert_eq!(err.to_string(), "Resource error: Buffer 'agents' is not allocated");
    }
}
