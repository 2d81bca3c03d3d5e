//! Built-in WGSL compute kernels.
//!
//! Each stage's source is the shared prelude, the binding declarations
//! generated from [`KernelStage::layout`], and the stage body. Generating the
//! declarations from the same table the device uses for its bind group
//! layouts keeps shader and pipeline in agreement.

use crate::device::{slots, Access, KernelStage};

/// Types and helpers shared by every kernel.
const PRELUDE: &str = r#"
struct SimulationParams {
    grid_resolution: u32,
    reduction_factor: u32,
    agent_count: u32,
    wrap_grid: u32,
    agent_speed: f32,
    turn_speed: f32,
    sensor_distance: f32,
    sensor_angle: f32,
    decay_speed: f32,
    delta_time: f32,
    resize_factor: f32,
    aspect_ratio: f32,
    camera_focus: vec4<f32>,
    camera_position: vec4<f32>,
};

struct Agent {
    position: vec3<f32>,
    heading: vec3<f32>,
};

struct KernelArgs {
    value: i32,
    _pad0: i32,
    _pad1: i32,
    _pad2: i32,
};

fn voxel_index(v: vec3<u32>, n: u32) -> u32 {
    return v.x + v.y * n + v.z * n * n;
}

fn hash(n: u32) -> u32 {
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}

// Uniform in [0, 1): the top 24 bits are exact in f32.
fn rand01(h: u32) -> f32 {
    return f32(h >> 8u) / 16777216.0;
}
"#;

const DECAY: &str = r#"
@compute @workgroup_size(8, 8, 4)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let n = params.grid_resolution;
    if id.x >= n || id.y >= n || id.z >= n {
        return;
    }
    let i = voxel_index(id, n);
    trail[i] = max(trail[i] - params.decay_speed * params.delta_time, 0.0);
}
"#;

const CLEAR_GRID: &str = r#"
@compute @workgroup_size(8, 8, 4)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let n = params.grid_resolution;
    if id.x >= n || id.y >= n || id.z >= n {
        return;
    }
    trail[voxel_index(id, n)] = 0.0;
}
"#;

const MOVE: &str = r#"
fn wrap_position(p: vec3<f32>, n: f32) -> vec3<f32> {
    var w = p - floor(p / n) * n;
    w = select(w, vec3<f32>(0.0), w >= vec3<f32>(n));
    return w;
}

// Trail value at p. Outside the volume reads as -1 so agents turn away from
// walls when wrapping is off.
fn sense(p: vec3<f32>) -> f32 {
    let nf = f32(params.grid_resolution);
    var q = p;
    if params.wrap_grid != 0u {
        q = wrap_position(p, nf);
    } else if any(p < vec3<f32>(0.0)) || any(p >= vec3<f32>(nf)) {
        return -1.0;
    }
    let v = min(vec3<u32>(floor(q)), vec3<u32>(params.grid_resolution - 1u));
    return trail[voxel_index(v, params.grid_resolution)];
}

fn safe_normalize(v: vec3<f32>, fallback: vec3<f32>) -> vec3<f32> {
    let len = length(v);
    if len < 1e-6 {
        return fallback;
    }
    return v / len;
}

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if i >= params.agent_count {
        return;
    }
    var agent = agents[i];
    let dt = params.delta_time;
    let nf = f32(params.grid_resolution);

    let forward = safe_normalize(agent.heading, vec3<f32>(0.0, 0.0, 1.0));
    var hint = vec3<f32>(0.0, 1.0, 0.0);
    if abs(forward.y) > 0.99 {
        hint = vec3<f32>(1.0, 0.0, 0.0);
    }
    let right = normalize(cross(forward, hint));
    let up = cross(right, forward);

    let c = cos(params.sensor_angle);
    let s = sin(params.sensor_angle);
    let d = params.sensor_distance;
    var dirs = array<vec3<f32>, 5>(
        forward,
        forward * c + right * s,
        forward * c - right * s,
        forward * c + up * s,
        forward * c - up * s,
    );

    var best = forward;
    var best_value = sense(agent.position + forward * d);
    for (var k = 1; k < 5; k++) {
        let value = sense(agent.position + dirs[k] * d);
        if value > best_value {
            best_value = value;
            best = dirs[k];
        }
    }

    let t = clamp(params.turn_speed * dt, 0.0, 1.0);
    var heading = safe_normalize(mix(forward, best, t), forward);
    var p = agent.position + heading * params.agent_speed * dt;

    if params.wrap_grid != 0u {
        p = wrap_position(p, nf);
    } else {
        let lo = p < vec3<f32>(0.0);
        let hi = p >= vec3<f32>(nf);
        heading = select(heading, -heading, lo | hi);
        p = clamp(p, vec3<f32>(0.0), vec3<f32>(nf - 0.001));
    }

    agent.position = p;
    agent.heading = heading;
    agents[i] = agent;
}
"#;

const DEPOSIT: &str = r#"
@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if i >= params.agent_count {
        return;
    }
    let n = i32(params.grid_resolution);
    let v = clamp(vec3<i32>(round(agents[i].position)), vec3<i32>(0), vec3<i32>(n - 1));
    trail[voxel_index(vec3<u32>(v), params.grid_resolution)] = 1.0;
}
"#;

const RANDOMIZE: &str = r#"
@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if i >= params.agent_count {
        return;
    }
    let nf = f32(params.grid_resolution);
    let h = hash(i ^ hash(u32(args.value)));
    let h1 = hash(h);
    let h2 = hash(h1);
    let h3 = hash(h2);
    let h4 = hash(h3);

    let p = vec3<f32>(rand01(h), rand01(h1), rand01(h2)) * nf;

    let z = rand01(h3) * 2.0 - 1.0;
    let phi = rand01(h4) * 6.28318530718;
    let r = sqrt(max(1.0 - z * z, 0.0));

    var agent: Agent;
    agent.position = min(p, vec3<f32>(nf - 0.001));
    agent.heading = vec3<f32>(r * cos(phi), r * sin(phi), z);
    agents[i] = agent;
}
"#;

const JFA_INIT: &str = r#"
@compute @workgroup_size(4, 4, 4)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let r = params.reduction_factor;
    let n = params.grid_resolution;
    let m = n / r;
    if id.x >= m || id.y >= m || id.z >= m {
        return;
    }

    var seeded = false;
    let base = id * r;
    for (var z = 0u; z < r; z++) {
        for (var y = 0u; y < r; y++) {
            for (var x = 0u; x < r; x++) {
                if trail[voxel_index(base + vec3<u32>(x, y, z), n)] > 0.0 {
                    seeded = true;
                }
            }
        }
    }

    var cell = vec4<f32>(-1.0);
    if seeded {
        cell = vec4<f32>(vec3<f32>(id), 1.0);
    }
    field_out[voxel_index(id, m)] = cell;
}
"#;

const JFA_STEP: &str = r#"
@compute @workgroup_size(4, 4, 4)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let m = params.grid_resolution / params.reduction_factor;
    if id.x >= m || id.y >= m || id.z >= m {
        return;
    }
    let stride = args.value;
    let here = vec3<f32>(id);
    let c = vec3<i32>(id);
    let mi = i32(m);

    var best = field_in[voxel_index(id, m)];
    var best_dist = 3.4e38;
    if best.w > 0.0 {
        let d = best.xyz - here;
        best_dist = dot(d, d);
    }

    for (var dz = -1; dz <= 1; dz++) {
        for (var dy = -1; dy <= 1; dy++) {
            for (var dx = -1; dx <= 1; dx++) {
                let q = c + vec3<i32>(dx, dy, dz) * stride;
                if any(q < vec3<i32>(0)) || any(q >= vec3<i32>(mi)) {
                    continue;
                }
                let seed = field_in[voxel_index(vec3<u32>(q), m)];
                if seed.w > 0.0 {
                    let d = seed.xyz - here;
                    let dist = dot(d, d);
                    if dist < best_dist {
                        best_dist = dist;
                        best = seed;
                    }
                }
            }
        }
    }

    field_out[voxel_index(id, m)] = best;
}
"#;

/// Whether the stage reads the per-dispatch argument block.
pub fn takes_args(stage: KernelStage) -> bool {
    matches!(stage, KernelStage::Randomize | KernelStage::JfaStep)
}

fn body(stage: KernelStage) -> &'static str {
    match stage {
        KernelStage::Decay => DECAY,
        KernelStage::Move => MOVE,
        KernelStage::Deposit => DEPOSIT,
        KernelStage::ClearGrid => CLEAR_GRID,
        KernelStage::Randomize => RANDOMIZE,
        KernelStage::JfaInit => JFA_INIT,
        KernelStage::JfaStep => JFA_STEP,
    }
}

fn binding_decl(slot: u32, access: Access) -> String {
    let (name, ty) = match slot {
        slots::PARAMS => ("params", "SimulationParams"),
        slots::AGENTS => ("agents", "array<Agent>"),
        slots::TRAIL_GRID => ("trail", "array<f32>"),
        slots::FIELD_READ => ("field_in", "array<vec4<f32>>"),
        _ => ("field_out", "array<vec4<f32>>"),
    };
    let space = match access {
        Access::Uniform => "uniform",
        Access::ReadOnly => "storage, read",
        Access::ReadWrite => "storage, read_write",
    };
    format!("@group(0) @binding({}) var<{}> {}: {};\n", slot, space, name, ty)
}

/// Complete WGSL source for one stage.
pub fn source(stage: KernelStage) -> String {
    let mut src = String::from(PRELUDE);
    src.push('\n');
    for binding in stage.layout() {
        src.push_str(&binding_decl(binding.slot, binding.access));
    }
    if takes_args(stage) {
        src.push_str("@group(1) @binding(0) var<uniform> args: KernelArgs;\n");
    }
    src.push_str(body(stage));
    src
}

/// Parse `source` and return the workgroup size of its compute entry point.
pub fn reflect_workgroup_size(source: &str) -> Result<[u32; 3], String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga::ShaderStage::Compute)
        .map(|ep| ep.workgroup_size)
        .ok_or_else(|| "no compute entry point".to_string())
}
