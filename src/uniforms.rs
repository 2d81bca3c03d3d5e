//! Per-dispatch kernel arguments.
//!
//! Most kernels read everything they need from the shared simulation
//! parameters. A few need a value that changes between dispatches inside one
//! tick (the jump-flood step size, the randomize seed); those travel as a
//! small [`KernelArgs`] block built from [`ShaderValue`]s.
//!
//! ```ignore
//! let args = KernelArgs::new().with(ShaderValue::I32(step_size));
//! dispatcher.dispatch(device, kernels, KernelStage::JfaStep, items, &bindings, &args)?;
//! ```

use glam::{Vec2, Vec3};

/// Supported kernel argument types.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShaderValue {
    F32(f32),
    I32(i32),
    Vec2(Vec2),
    Vec3(Vec3),
}

impl ShaderValue {
    /// Get the WGSL type name for this value.
    pub fn wgsl_type(&self) -> &'static str {
        match self {
            ShaderValue::F32(_) => "f32",
            ShaderValue::I32(_) => "i32",
            ShaderValue::Vec2(_) => "vec2<f32>",
            ShaderValue::Vec3(_) => "vec3<f32>",
        }
    }

    /// Required alignment inside a uniform block.
    pub fn alignment(&self) -> usize {
        match self {
            ShaderValue::F32(_) | ShaderValue::I32(_) => 4,
            ShaderValue::Vec2(_) => 8,
            ShaderValue::Vec3(_) => 16,
        }
    }

    /// Write this value to a byte buffer.
    pub fn write_bytes(&self, buf: &mut Vec<u8>) {
        match self {
            ShaderValue::F32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            ShaderValue::I32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            ShaderValue::Vec2(v) => {
                buf.extend_from_slice(&v.x.to_le_bytes());
                buf.extend_from_slice(&v.y.to_le_bytes());
            }
            ShaderValue::Vec3(v) => {
                buf.extend_from_slice(&v.x.to_le_bytes());
                buf.extend_from_slice(&v.y.to_le_bytes());
                buf.extend_from_slice(&v.z.to_le_bytes());
                // A following scalar may sit in the vec3's trailing 4 bytes
            }
        }
    }
}

impl From<f32> for ShaderValue {
    fn from(v: f32) -> Self {
        ShaderValue::F32(v)
    }
}

impl From<i32> for ShaderValue {
    fn from(v: i32) -> Self {
        ShaderValue::I32(v)
    }
}

impl From<Vec2> for ShaderValue {
    fn from(v: Vec2) -> Self {
        ShaderValue::Vec2(v)
    }
}

impl From<Vec3> for ShaderValue {
    fn from(v: Vec3) -> Self {
        ShaderValue::Vec3(v)
    }
}

/// Ordered argument values for one dispatch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KernelArgs {
    values: Vec<ShaderValue>,
}

impl KernelArgs {
    /// Largest argument block a dispatch may carry.
    pub const MAX_BYTES: usize = 256;

    /// Arguments for a kernel that takes none.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value.
    pub fn with<V: Into<ShaderValue>>(mut self, value: V) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[ShaderValue] {
        &self.values
    }

    /// Serialize all values with uniform-block alignment, padded to 16 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for value in &self.values {
            let align = value.alignment();
            while buf.len() % align != 0 {
                buf.push(0);
            }
            value.write_bytes(&mut buf);
        }
        let padded = (buf.len() + 15) & !15;
        buf.resize(padded.max(16), 0);
        buf
    }
}
