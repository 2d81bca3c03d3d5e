//! A host-memory compute device that runs each kernel stage on the CPU.
//!
//! Buffers are plain byte vectors. Dispatches execute the same per-invocation
//! logic as the WGSL kernels over `workgroups * local_size` invocations, so a
//! dispatch that undercounts its workgroups leaves voxels or agents untouched.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use sporefield::device::slots;
use sporefield::{
    Agent, Binding, BufferDesc, BufferId, ComputeDevice, DeviceBuffer, DeviceLimits, KernelArgs,
    KernelSet, KernelStage, ResourceError, SimulationParamsGpu, Vec3,
};

pub struct HostBuffer {
    id: BufferId,
    data: Rc<RefCell<Vec<u8>>>,
    released: Rc<RefCell<Vec<BufferId>>>,
}

impl DeviceBuffer for HostBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn size(&self) -> u64 {
        self.data.borrow().len() as u64
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        self.released.borrow_mut().push(self.id);
    }
}

pub struct HostKernel {
    pub stage: KernelStage,
    pub local_size: [u32; 3],
}

/// Kernels with the same local sizes the WGSL sources declare.
pub fn host_kernels() -> KernelSet<HostKernel> {
    let mut set = KernelSet::new();
    for stage in KernelStage::ALL {
        let local_size = match stage {
            KernelStage::Decay | KernelStage::ClearGrid => [8, 8, 4],
            KernelStage::Move | KernelStage::Deposit | KernelStage::Randomize => [64, 1, 1],
            KernelStage::JfaInit | KernelStage::JfaStep => [4, 4, 4],
        };
        set.insert(stage, HostKernel { stage, local_size });
    }
    set
}

#[derive(Default)]
pub struct HostDevice {
    pub limits: DeviceLimits,
    pub dispatched: Vec<KernelStage>,
    pub barriers: usize,
    pub submits: usize,
    pub created: usize,
    released: Rc<RefCell<Vec<BufferId>>>,
    next_id: u64,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn released(&self) -> Vec<BufferId> {
        self.released.borrow().clone()
    }

    pub fn clear_log(&mut self) {
        self.dispatched.clear();
        self.barriers = 0;
        self.submits = 0;
    }
}

fn read_f32s(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4).map(bytemuck::pod_read_unaligned::<f32>).collect()
}

fn read_agents(data: &[u8]) -> Vec<Agent> {
    data.chunks_exact(Agent::SIZE as usize)
        .map(bytemuck::pod_read_unaligned::<Agent>)
        .collect()
}

fn read_cells(data: &[u8]) -> Vec<[f32; 4]> {
    data.chunks_exact(16)
        .map(bytemuck::pod_read_unaligned::<[f32; 4]>)
        .collect()
}

fn store<T: bytemuck::Pod>(buffer: &HostBuffer, values: &[T]) {
    let mut data = buffer.data.borrow_mut();
    data.copy_from_slice(bytemuck::cast_slice(values));
}

fn voxel_index(x: u32, y: u32, z: u32, n: u32) -> usize {
    (x + y * n + z * n * n) as usize
}

fn hash(n: u32) -> u32 {
    let mut x = n;
    x ^= x >> 17;
    x = x.wrapping_mul(0xed5a_d4bb);
    x ^= x >> 11;
    x = x.wrapping_mul(0xac4c_1b51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8bab);
    x ^= x >> 14;
    x
}

fn rand01(h: u32) -> f32 {
    (h >> 8) as f32 / 16_777_216.0
}

fn wrap_position(p: Vec3, n: f32) -> Vec3 {
    let w = p - (p / n).floor() * n;
    Vec3::select(w.cmpge(Vec3::splat(n)), Vec3::ZERO, w)
}

fn sense(trail: &[f32], params: &SimulationParamsGpu, p: Vec3) -> f32 {
    let n = params.grid_resolution;
    let nf = n as f32;
    let mut q = p;
    if params.wrap_grid != 0 {
        q = wrap_position(p, nf);
    } else if p.cmplt(Vec3::ZERO).any() || p.cmpge(Vec3::splat(nf)).any() {
        return -1.0;
    }
    let v = q.floor();
    let c = |a: f32| (a as u32).min(n - 1);
    trail[voxel_index(c(v.x), c(v.y), c(v.z), n)]
}

fn safe_normalize(v: Vec3, fallback: Vec3) -> Vec3 {
    let len = v.length();
    if len < 1e-6 {
        fallback
    } else {
        v / len
    }
}

fn move_agent(agent: &mut Agent, trail: &[f32], params: &SimulationParamsGpu) {
    let dt = params.delta_time;
    let nf = params.grid_resolution as f32;
    let position = Vec3::from(agent.position);

    let forward = safe_normalize(Vec3::from(agent.heading), Vec3::Z);
    let hint = if forward.y.abs() > 0.99 { Vec3::X } else { Vec3::Y };
    let right = forward.cross(hint).normalize();
    let up = right.cross(forward);

    let (s, c) = params.sensor_angle.sin_cos();
    let d = params.sensor_distance;
    let dirs = [
        forward,
        forward * c + right * s,
        forward * c - right * s,
        forward * c + up * s,
        forward * c - up * s,
    ];

    let mut best = forward;
    let mut best_value = sense(trail, params, position + forward * d);
    for dir in &dirs[1..] {
        let value = sense(trail, params, position + *dir * d);
        if value > best_value {
            best_value = value;
            best = *dir;
        }
    }

    let t = (params.turn_speed * dt).clamp(0.0, 1.0);
    let mut heading = safe_normalize(forward.lerp(best, t), forward);
    let mut p = position + heading * params.agent_speed * dt;

    if params.wrap_grid != 0 {
        p = wrap_position(p, nf);
    } else {
        let out = p.cmplt(Vec3::ZERO) | p.cmpge(Vec3::splat(nf));
        heading = Vec3::select(out, -heading, heading);
        p = p.clamp(Vec3::ZERO, Vec3::splat(nf - 0.001));
    }

    agent.position = p.to_array();
    agent.heading = heading.to_array();
}

fn randomize_agent(i: u32, seed: i32, nf: f32) -> Agent {
    let h = hash(i ^ hash(seed as u32));
    let h1 = hash(h);
    let h2 = hash(h1);
    let h3 = hash(h2);
    let h4 = hash(h3);

    let p = Vec3::new(rand01(h), rand01(h1), rand01(h2)) * nf;
    let z = rand01(h3) * 2.0 - 1.0;
    let phi = rand01(h4) * std::f32::consts::TAU;
    let r = (1.0 - z * z).max(0.0).sqrt();

    Agent {
        position: p.min(Vec3::splat(nf - 0.001)).to_array(),
        heading: [r * phi.cos(), r * phi.sin(), z],
        ..Agent::default()
    }
}

/// Invocation extent of a dispatch, clamped to the problem size.
fn extent(workgroups: [u32; 3], local: [u32; 3], bound: [u32; 3]) -> [u32; 3] {
    [
        (workgroups[0] * local[0]).min(bound[0]),
        (workgroups[1] * local[1]).min(bound[1]),
        (workgroups[2] * local[2]).min(bound[2]),
    ]
}

fn jfa_init(trail: &[f32], params: &SimulationParamsGpu, ext: [u32; 3], out: &mut [[f32; 4]]) {
    let r = params.reduction_factor;
    let n = params.grid_resolution;
    let m = n / r;
    for z in 0..ext[2] {
        for y in 0..ext[1] {
            for x in 0..ext[0] {
                let mut seeded = false;
                for dz in 0..r {
                    for dy in 0..r {
                        for dx in 0..r {
                            let i = voxel_index(x * r + dx, y * r + dy, z * r + dz, n);
                            seeded |= trail[i] > 0.0;
                        }
                    }
                }
                out[voxel_index(x, y, z, m)] = if seeded {
                    [x as f32, y as f32, z as f32, 1.0]
                } else {
                    [-1.0; 4]
                };
            }
        }
    }
}

fn jfa_step(
    input: &[[f32; 4]],
    m: u32,
    stride: i32,
    ext: [u32; 3],
    out: &mut [[f32; 4]],
) {
    let mi = m as i32;
    let dist2 = |cell: &[f32; 4], here: [f32; 3]| {
        let d = [cell[0] - here[0], cell[1] - here[1], cell[2] - here[2]];
        d[0] * d[0] + d[1] * d[1] + d[2] * d[2]
    };
    for z in 0..ext[2] {
        for y in 0..ext[1] {
            for x in 0..ext[0] {
                let here = [x as f32, y as f32, z as f32];
                let mut best = input[voxel_index(x, y, z, m)];
                let mut best_dist = if best[3] > 0.0 { dist2(&best, here) } else { f32::MAX };
                for dz in -1..=1 {
                    for dy in -1..=1 {
                        for dx in -1..=1 {
                            let q = [
                                x as i32 + dx * stride,
                                y as i32 + dy * stride,
                                z as i32 + dz * stride,
                            ];
                            if q.iter().any(|&c| c < 0 || c >= mi) {
                                continue;
                            }
                            let seed = input[voxel_index(q[0] as u32, q[1] as u32, q[2] as u32, m)];
                            if seed[3] > 0.0 {
                                let dist = dist2(&seed, here);
                                if dist < best_dist {
                                    best_dist = dist;
                                    best = seed;
                                }
                            }
                        }
                    }
                }
                out[voxel_index(x, y, z, m)] = best;
            }
        }
    }
}

impl ComputeDevice for HostDevice {
    type Buffer = HostBuffer;
    type Kernel = HostKernel;

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn workgroup_size(&self, kernel: &HostKernel) -> [u32; 3] {
        kernel.local_size
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<HostBuffer, ResourceError> {
        let id = BufferId(self.next_id);
        self.next_id += 1;
        self.created += 1;
        Ok(HostBuffer {
            id,
            data: Rc::new(RefCell::new(vec![0; desc.size as usize])),
            released: Rc::clone(&self.released),
        })
    }

    fn write_buffer(&mut self, buffer: &HostBuffer, data: &[u8]) {
        buffer.data.borrow_mut()[..data.len()].copy_from_slice(data);
    }

    fn dispatch(
        &mut self,
        kernel: &HostKernel,
        bindings: &[Binding<'_, HostBuffer>],
        args: &KernelArgs,
        workgroups: [u32; 3],
    ) {
        self.dispatched.push(kernel.stage);
        let slot = |s: u32| {
            bindings
                .iter()
                .find(|b| b.slot == s)
                .map(|b| b.buffer)
                .unwrap_or_else(|| panic!("{} dispatched without slot {}", kernel.stage, s))
        };
        let params: SimulationParamsGpu = {
            let data = slot(slots::PARAMS).data.borrow();
            bytemuck::pod_read_unaligned(&data[..std::mem::size_of::<SimulationParamsGpu>()])
        };
        let arg = {
            let bytes = args.to_bytes();
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        };
        let n = params.grid_resolution;
        let m = n / params.reduction_factor;
        let local = kernel.local_size;

        match kernel.stage {
            KernelStage::Decay | KernelStage::ClearGrid => {
                let buffer = slot(slots::TRAIL_GRID);
                let mut trail = read_f32s(&buffer.data.borrow());
                let ext = extent(workgroups, local, [n, n, n]);
                for z in 0..ext[2] {
                    for y in 0..ext[1] {
                        for x in 0..ext[0] {
                            let v = &mut trail[voxel_index(x, y, z, n)];
                            *v = if kernel.stage == KernelStage::ClearGrid {
                                0.0
                            } else {
                                (*v - params.decay_speed * params.delta_time).max(0.0)
                            };
                        }
                    }
                }
                store(buffer, &trail);
            }
            KernelStage::Move => {
                let trail = read_f32s(&slot(slots::TRAIL_GRID).data.borrow());
                let buffer = slot(slots::AGENTS);
                let mut agents = read_agents(&buffer.data.borrow());
                let count = extent(workgroups, local, [params.agent_count, 1, 1])[0];
                for agent in agents.iter_mut().take(count as usize) {
                    move_agent(agent, &trail, &params);
                }
                store(buffer, &agents);
            }
            KernelStage::Deposit => {
                let agents = read_agents(&slot(slots::AGENTS).data.borrow());
                let buffer = slot(slots::TRAIL_GRID);
                let mut trail = read_f32s(&buffer.data.borrow());
                let count = extent(workgroups, local, [params.agent_count, 1, 1])[0];
                for agent in agents.iter().take(count as usize) {
                    let v = agent
                        .position
                        .map(|c| (c.round() as i32).clamp(0, n as i32 - 1) as u32);
                    trail[voxel_index(v[0], v[1], v[2], n)] = 1.0;
                }
                store(buffer, &trail);
            }
            KernelStage::Randomize => {
                let buffer = slot(slots::AGENTS);
                let mut agents = read_agents(&buffer.data.borrow());
                let count = extent(workgroups, local, [params.agent_count, 1, 1])[0];
                for (i, agent) in agents.iter_mut().take(count as usize).enumerate() {
                    *agent = randomize_agent(i as u32, arg, n as f32);
                }
                store(buffer, &agents);
            }
            KernelStage::JfaInit => {
                let trail = read_f32s(&slot(slots::TRAIL_GRID).data.borrow());
                let buffer = slot(slots::FIELD_WRITE);
                let mut field = read_cells(&buffer.data.borrow());
                jfa_init(&trail, &params, extent(workgroups, local, [m, m, m]), &mut field);
                store(buffer, &field);
            }
            KernelStage::JfaStep => {
                let input = read_cells(&slot(slots::FIELD_READ).data.borrow());
                let buffer = slot(slots::FIELD_WRITE);
                let mut field = read_cells(&buffer.data.borrow());
                jfa_step(&input, m, arg, extent(workgroups, local, [m, m, m]), &mut field);
                store(buffer, &field);
            }
        }
    }

    fn memory_barrier(&mut self) {
        self.barriers += 1;
    }

    fn submit(&mut self) {
        self.submits += 1;
    }

    fn read_buffer(&mut self, buffer: &HostBuffer) -> Result<Vec<u8>, ResourceError> {
        Ok(buffer.data.borrow().clone())
    }
}

/// Brute-force nearest seed distance for every cell of an `m`-sided field
/// seeded from `trail`.
pub fn nearest_seed_distances(trail: &[f32], n: u32, r: u32) -> Vec<Option<f32>> {
    let m = n / r;
    let mut seeds = Vec::new();
    for z in 0..m {
        for y in 0..m {
            for x in 0..m {
                let occupied = (0..r * r * r).any(|k| {
                    let (dx, dy, dz) = (k % r, (k / r) % r, k / (r * r));
                    trail[voxel_index(x * r + dx, y * r + dy, z * r + dz, n)] > 0.0
                });
                if occupied {
                    seeds.push(Vec3::new(x as f32, y as f32, z as f32));
                }
            }
        }
    }

    let mut out = Vec::with_capacity((m * m * m) as usize);
    for z in 0..m {
        for y in 0..m {
            for x in 0..m {
                let here = Vec3::new(x as f32, y as f32, z as f32);
                out.push(
                    seeds
                        .iter()
                        .map(|s| s.distance(here))
                        .min_by(|a, b| a.total_cmp(b)),
                );
            }
        }
    }
    out
}
