//! GPU flock state and the per-step kernel sequence.

use glam::Vec3;
use wgpu::util::DeviceExt;

use super::spatial_gpu::SpatialGpu;
use super::{
    bind_buffers, check_binding_size, create_kernel, kernel_source, read_buffer, run_kernel, storage_buffer,
    sweep_code, FlockParams, GpuContext,
};
use crate::config::{CellSweep, RuleParams, Strategy};
use crate::error::SimulationError;
use crate::ping_pong::PingPong;
use crate::spatial::GridParams;

/// Cell sweep around a focal position, in the same z, y, x order as the
/// host backend.
const NEIGHBOR_WGSL: &str = r#"
struct CellSweep {
    coord: vec3<i32>,
    lo: vec3<i32>,
    span: i32,
};

fn cell_sweep(pos: vec3<f32>) -> CellSweep {
    let scaled = grid_scaled(pos);
    let base = floor(scaled);
    if params.sweep == 0u {
        return CellSweep(vec3<i32>(base), vec3<i32>(-1), 3);
    }
    let frac = scaled - base;
    let lo = select(vec3<i32>(0), vec3<i32>(-1), frac < vec3<f32>(0.5));
    return CellSweep(vec3<i32>(base), lo, 2);
}
"#;

const BRUTE_FORCE_KERNEL: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> velocities: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> next_velocities: array<vec4<f32>>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = linear_index(gid, groups);
    if i >= params.num_particles {
        return;
    }

    var acc = rules_begin(positions[i].xyz);
    for (var j = 0u; j < params.num_particles; j += 1u) {
        if j == i {
            continue;
        }
        rules_visit(&acc, positions[j].xyz, velocities[j].xyz);
    }
    next_velocities[i] = vec4<f32>(rules_finish(acc, velocities[i].xyz), 0.0);
}
"#;

const SCATTERED_KERNEL: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> velocities: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> next_velocities: array<vec4<f32>>;
@group(0) @binding(4) var<storage, read> particle_index: array<u32>;
@group(0) @binding(5) var<storage, read> cell_head: array<u32>;
@group(0) @binding(6) var<storage, read> cell_end: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = linear_index(gid, groups);
    if i >= params.num_particles {
        return;
    }

    let focal = positions[i].xyz;
    var acc = rules_begin(focal);
    let sweep = cell_sweep(focal);
    for (var dz = 0; dz < sweep.span; dz += 1) {
        for (var dy = 0; dy < sweep.span; dy += 1) {
            for (var dx = 0; dx < sweep.span; dx += 1) {
                let cell = encode_cell(sweep.coord + sweep.lo + vec3<i32>(dx, dy, dz));
                if cell == NO_CELL {
                    continue;
                }
                let head = cell_head[cell];
                if head == EMPTY_CELL {
                    continue;
                }
                let last = cell_end[head];
                for (var s = head; s <= last; s += 1u) {
                    let j = particle_index[s];
                    if j != i {
                        rules_visit(&acc, positions[j].xyz, velocities[j].xyz);
                    }
                }
            }
        }
    }
    next_velocities[i] = vec4<f32>(rules_finish(acc, velocities[i].xyz), 0.0);
}
"#;

const COHERENT_KERNEL: &str = r#"
@group(0) @binding(1) var<storage, read> sorted_positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> sorted_velocities: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> sorted_next: array<vec4<f32>>;
@group(0) @binding(4) var<storage, read> cell_head: array<u32>;
@group(0) @binding(5) var<storage, read> cell_end: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let k = linear_index(gid, groups);
    if k >= params.num_particles {
        return;
    }

    let focal = sorted_positions[k].xyz;
    var acc = rules_begin(focal);
    let sweep = cell_sweep(focal);
    for (var dz = 0; dz < sweep.span; dz += 1) {
        for (var dy = 0; dy < sweep.span; dy += 1) {
            for (var dx = 0; dx < sweep.span; dx += 1) {
                let cell = encode_cell(sweep.coord + sweep.lo + vec3<i32>(dx, dy, dz));
                if cell == NO_CELL {
                    continue;
                }
                let head = cell_head[cell];
                if head == EMPTY_CELL {
                    continue;
                }
                let last = cell_end[head];
                for (var s = head; s <= last; s += 1u) {
                    if s != k {
                        rules_visit(&acc, sorted_positions[s].xyz, sorted_velocities[s].xyz);
                    }
                }
            }
        }
    }
    sorted_next[k] = vec4<f32>(rules_finish(acc, sorted_velocities[k].xyz), 0.0);
}
"#;

const REORDER_KERNEL: &str = r#"
@group(0) @binding(1) var<storage, read> particle_index: array<u32>;
@group(0) @binding(2) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read> velocities: array<vec4<f32>>;
@group(0) @binding(4) var<storage, read_write> sorted_positions: array<vec4<f32>>;
@group(0) @binding(5) var<storage, read_write> sorted_velocities: array<vec4<f32>>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let k = linear_index(gid, groups);
    if k >= params.num_particles {
        return;
    }
    let p = particle_index[k];
    sorted_positions[k] = positions[p];
    sorted_velocities[k] = velocities[p];
}
"#;

const INTEGRATE_KERNEL: &str = r#"
@group(0) @binding(1) var<storage, read_write> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> velocities: array<vec4<f32>>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = linear_index(gid, groups);
    if i >= params.num_particles {
        return;
    }
    let p = positions[i];
    positions[i] = vec4<f32>(wrap_position(p.xyz + velocities[i].xyz * params.dt), p.w);
}
"#;

const SCATTER_BACK_KERNEL: &str = r#"
@group(0) @binding(1) var<storage, read> particle_index: array<u32>;
@group(0) @binding(2) var<storage, read> sorted_positions: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read> sorted_next: array<vec4<f32>>;
@group(0) @binding(4) var<storage, read_write> positions: array<vec4<f32>>;
@group(0) @binding(5) var<storage, read_write> next_velocities: array<vec4<f32>>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let k = linear_index(gid, groups);
    if k >= params.num_particles {
        return;
    }
    let p = particle_index[k];
    positions[p] = sorted_positions[k];
    next_velocities[p] = sorted_next[k];
}
"#;

fn neighbor_source(body: &str) -> String {
    kernel_source(&format!("{}\n{}", NEIGHBOR_WGSL, body))
}

/// One bind group per velocity role: `(current, next)` for slot 0 then 1.
fn per_role(
    roles: [(&wgpu::Buffer, &wgpu::Buffer); 2],
    bind: impl Fn(&wgpu::Buffer, &wgpu::Buffer) -> wgpu::BindGroup,
) -> [wgpu::BindGroup; 2] {
    [bind(roles[0].0, roles[0].1), bind(roles[1].0, roles[1].1)]
}

/// Map the popped setup scopes to an error. Running out of memory usually
/// causes the validation failures that follow it, so it takes precedence.
fn setup_outcome(
    validation: Option<impl std::fmt::Display>,
    out_of_memory: Option<impl std::fmt::Display>,
    bytes: usize,
) -> Result<(), SimulationError> {
    if let Some(error) = out_of_memory {
        log::error!("GPU allocation failed: {}", error);
        return Err(SimulationError::Allocation { what: "gpu buffers", bytes });
    }
    if let Some(error) = validation {
        return Err(SimulationError::launch("gpu setup", error.to_string()));
    }
    Ok(())
}

fn to_vec4(values: &[Vec3]) -> Vec<[f32; 4]> {
    values.iter().map(|v| v.extend(0.0).to_array()).collect()
}

struct Kernels {
    brute_force: wgpu::ComputePipeline,
    scattered: wgpu::ComputePipeline,
    coherent: wgpu::ComputePipeline,
    reorder: wgpu::ComputePipeline,
    integrate: wgpu::ComputePipeline,
    scatter_back: wgpu::ComputePipeline,
}

impl Kernels {
    fn new(device: &wgpu::Device) -> Self {
        Self {
            brute_force: create_kernel(device, "Brute Force Query", &kernel_source(BRUTE_FORCE_KERNEL)),
            scattered: create_kernel(device, "Scattered Query", &neighbor_source(SCATTERED_KERNEL)),
            coherent: create_kernel(device, "Coherent Query", &neighbor_source(COHERENT_KERNEL)),
            reorder: create_kernel(device, "Reorder", &kernel_source(REORDER_KERNEL)),
            integrate: create_kernel(device, "Integrate", &kernel_source(INTEGRATE_KERNEL)),
            scatter_back: create_kernel(device, "Scatter Back", &kernel_source(SCATTER_BACK_KERNEL)),
        }
    }
}

/// Bind groups for both velocity roles, indexed by the current slot.
struct BindGroups {
    brute_force: [wgpu::BindGroup; 2],
    scattered: [wgpu::BindGroup; 2],
    reorder: [wgpu::BindGroup; 2],
    integrate: [wgpu::BindGroup; 2],
    scatter_back: [wgpu::BindGroup; 2],
    coherent: wgpu::BindGroup,
    integrate_sorted: wgpu::BindGroup,
}

/// Particle state, grid tables and kernels for the GPU backend.
#[allow(dead_code)] // Buffers used indirectly via bind groups
pub(crate) struct GpuFlock {
    context: GpuContext,
    params: FlockParams,
    params_buffer: wgpu::Buffer,
    positions: wgpu::Buffer,
    velocities: PingPong<wgpu::Buffer>,
    sorted_positions: wgpu::Buffer,
    sorted_velocities: wgpu::Buffer,
    sorted_next: wgpu::Buffer,
    spatial: SpatialGpu,
    kernels: Kernels,
    groups: BindGroups,
    num_particles: u32,
}

impl GpuFlock {
    pub(crate) fn new(
        grid: &GridParams,
        rules: &RuleParams,
        positions: &[Vec3],
        velocities: &[Vec3],
    ) -> Result<Self, SimulationError> {
        let context = GpuContext::new()?;
        let device = &context.device;

        let num_particles = positions.len() as u32;
        let padded_count = num_particles.checked_next_power_of_two().ok_or_else(|| {
            SimulationError::InvalidConfig(format!("{} particles exceed the GPU sort capacity", num_particles))
        })?;

        let vec4_bytes = check_binding_size(device, "particle state", num_particles as u64 * 16)?;
        check_binding_size(device, "sort keys", padded_count as u64 * 4)?;
        check_binding_size(device, "cell head lookup", grid.cell_count as u64 * 4)?;

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let params = FlockParams::new(grid, rules, num_particles);
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Flock Params"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let state_usage =
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        let positions_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Positions"),
            contents: bytemuck::cast_slice(&to_vec4(positions)),
            usage: state_usage,
        });
        let velocity_a = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Velocities A"),
            contents: bytemuck::cast_slice(&to_vec4(velocities)),
            usage: state_usage,
        });
        let velocity_b = storage_buffer(device, "Velocities B", vec4_bytes);

        let sorted_positions = storage_buffer(device, "Sorted Positions", vec4_bytes);
        let sorted_velocities = storage_buffer(device, "Sorted Velocities", vec4_bytes);
        let sorted_next = storage_buffer(device, "Sorted Next Velocities", vec4_bytes);

        let spatial = SpatialGpu::new(
            device,
            &params_buffer,
            &positions_buffer,
            num_particles,
            padded_count,
            grid.cell_count,
        );
        let kernels = Kernels::new(device);

        let roles = [(&velocity_a, &velocity_b), (&velocity_b, &velocity_a)];

        let groups = BindGroups {
            brute_force: per_role(roles, |current, next| {
                bind_buffers(
                    device,
                    &kernels.brute_force,
                    "Brute Force Bind Group",
                    &[&params_buffer, &positions_buffer, current, next],
                )
            }),
            scattered: per_role(roles, |current, next| {
                bind_buffers(
                    device,
                    &kernels.scattered,
                    "Scattered Bind Group",
                    &[
                        &params_buffer,
                        &positions_buffer,
                        current,
                        next,
                        &spatial.particle_index,
                        &spatial.cell_head,
                        &spatial.cell_end,
                    ],
                )
            }),
            reorder: per_role(roles, |current, _| {
                bind_buffers(
                    device,
                    &kernels.reorder,
                    "Reorder Bind Group",
                    &[
                        &params_buffer,
                        &spatial.particle_index,
                        &positions_buffer,
                        current,
                        &sorted_positions,
                        &sorted_velocities,
                    ],
                )
            }),
            integrate: per_role(roles, |_, next| {
                bind_buffers(device, &kernels.integrate, "Integrate Bind Group", &[&params_buffer, &positions_buffer, next])
            }),
            scatter_back: per_role(roles, |_, next| {
                bind_buffers(
                    device,
                    &kernels.scatter_back,
                    "Scatter Back Bind Group",
                    &[&params_buffer, &spatial.particle_index, &sorted_positions, &sorted_next, &positions_buffer, next],
                )
            }),
            coherent: bind_buffers(
                device,
                &kernels.coherent,
                "Coherent Bind Group",
                &[
                    &params_buffer,
                    &sorted_positions,
                    &sorted_velocities,
                    &sorted_next,
                    &spatial.cell_head,
                    &spatial.cell_end,
                ],
            ),
            integrate_sorted: bind_buffers(
                device,
                &kernels.integrate,
                "Integrate Sorted Bind Group",
                &[&params_buffer, &sorted_positions, &sorted_next],
            ),
        };

        // Both scopes come off the stack before either error is reported.
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        setup_outcome(validation, out_of_memory, (vec4_bytes * 6) as usize)?;

        log::debug!(
            "GPU flock ready: {} particles, {} sort slots, {} cells",
            num_particles,
            padded_count,
            grid.cell_count
        );

        Ok(Self {
            context,
            params,
            params_buffer,
            positions: positions_buffer,
            velocities: PingPong::new(velocity_a, velocity_b),
            sorted_positions,
            sorted_velocities,
            sorted_next,
            spatial,
            kernels,
            groups,
            num_particles,
        })
    }

    pub(crate) fn adapter_name(&self) -> &str {
        &self.context.adapter_info.name
    }

    /// Record and submit one step. Validation failures surface as
    /// [`SimulationError::Launch`] and leave the velocity roles unchanged.
    pub(crate) fn step(&mut self, strategy: Strategy, sweep: CellSweep, dt: f32) -> Result<(), SimulationError> {
        let device = &self.context.device;
        let queue = &self.context.queue;
        let n = self.num_particles;
        let role = self.velocities.current_index();

        self.params.dt = dt;
        self.params.sweep = sweep_code(sweep);
        queue.write_buffer(&self.params_buffer, 0, bytemuck::cast_slice(&[self.params]));

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Flock Step Encoder"),
        });

        if strategy.uses_grid() {
            self.spatial.encode(&mut encoder);
        }

        let kernels = &self.kernels;
        let groups = &self.groups;
        match strategy {
            Strategy::BruteForce => {
                run_kernel(&mut encoder, "Brute Force Query", &kernels.brute_force, &groups.brute_force[role], n);
                run_kernel(&mut encoder, "Integrate", &kernels.integrate, &groups.integrate[role], n);
            }
            Strategy::ScatteredGrid => {
                run_kernel(&mut encoder, "Scattered Query", &kernels.scattered, &groups.scattered[role], n);
                run_kernel(&mut encoder, "Integrate", &kernels.integrate, &groups.integrate[role], n);
            }
            Strategy::CoherentGrid => {
                run_kernel(&mut encoder, "Reorder", &kernels.reorder, &groups.reorder[role], n);
                run_kernel(&mut encoder, "Coherent Query", &kernels.coherent, &groups.coherent, n);
                run_kernel(&mut encoder, "Integrate", &kernels.integrate, &groups.integrate_sorted, n);
                run_kernel(&mut encoder, "Scatter Back", &kernels.scatter_back, &groups.scatter_back[role], n);
            }
        }

        queue.submit(std::iter::once(encoder.finish()));

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            log::error!("{} step rejected by the device: {}", strategy.name(), error);
            return Err(SimulationError::launch(strategy.name(), error.to_string()));
        }

        self.velocities.swap();
        Ok(())
    }

    /// Copy positions and current velocities into host vectors.
    pub(crate) fn read_state(&self, positions: &mut Vec<Vec3>, velocities: &mut Vec<Vec3>) -> Result<(), SimulationError> {
        let device = &self.context.device;
        let queue = &self.context.queue;
        let n = self.num_particles as usize;

        let raw: Vec<[f32; 4]> = read_buffer(device, queue, &self.positions, n)?;
        positions.clear();
        positions.extend(raw.iter().map(|p| Vec3::new(p[0], p[1], p[2])));

        let raw: Vec<[f32; 4]> = read_buffer(device, queue, self.velocities.current(), n)?;
        velocities.clear();
        velocities.extend(raw.iter().map(|v| Vec3::new(v[0], v[1], v[2])));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::validate_wgsl;

    #[test]
    fn test_query_kernels_validate() {
        validate_wgsl(&kernel_source(BRUTE_FORCE_KERNEL)).unwrap();
        validate_wgsl(&neighbor_source(SCATTERED_KERNEL)).unwrap();
        validate_wgsl(&neighbor_source(COHERENT_KERNEL)).unwrap();
    }

    #[test]
    fn test_data_movement_kernels_validate() {
        for body in [REORDER_KERNEL, INTEGRATE_KERNEL, SCATTER_BACK_KERNEL] {
            validate_wgsl(&kernel_source(body)).unwrap();
        }
    }

    #[test]
    fn test_setup_outcome_prefers_allocation() {
        let none: Option<&str> = None;
        assert!(setup_outcome(none, none, 64).is_ok());

        let err = setup_outcome(Some("bad binding"), none, 64).unwrap_err();
        assert!(matches!(err, SimulationError::Launch { stage: "gpu setup", .. }));

        let err = setup_outcome(Some("bad binding"), Some("out of memory"), 64).unwrap_err();
        assert!(matches!(err, SimulationError::Allocation { bytes: 64, .. }));
    }

    #[test]
    fn test_to_vec4_pads_w() {
        assert_eq!(to_vec4(&[Vec3::new(1.0, 2.0, 3.0)]), vec![[1.0, 2.0, 3.0, 0.0]]);
    }
}
