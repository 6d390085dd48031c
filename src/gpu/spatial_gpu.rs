//! GPU grid tables: cell indexing, bitonic sort, and cell range tables.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::{bind_buffers, create_kernel, kernel_source, run_kernel, storage_buffer};

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct SortStage {
    j: u32,
    k: u32,
    count: u32,
    _pad: u32,
}

/// Compare-exchange distances `(j, k)` of a bitonic network over `count`
/// elements, in dispatch order. `count` must be a power of two.
fn bitonic_stages(count: u32) -> Vec<(u32, u32)> {
    let mut stages = Vec::new();
    let mut k = 2;
    while k <= count {
        let mut j = k / 2;
        while j > 0 {
            stages.push((j, k));
            j /= 2;
        }
        k *= 2;
    }
    stages
}

const INDEX_KERNEL: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> grid_index: array<u32>;
@group(0) @binding(3) var<storage, read_write> particle_index: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = linear_index(gid, groups);
    if i >= arrayLength(&grid_index) {
        return;
    }

    if i < params.num_particles {
        grid_index[i] = encode_cell(cell_coord(positions[i].xyz));
        particle_index[i] = i;
    } else {
        // Padding sorts after every real entry
        grid_index[i] = NO_CELL;
        particle_index[i] = 0xFFFFFFFFu;
    }
}
"#;

const SORT_KERNEL: &str = r#"
struct SortStage {
    j: u32,
    k: u32,
    count: u32,
    _pad: u32,
};

@group(0) @binding(0) var<uniform> sort_stage: SortStage;
@group(0) @binding(1) var<storage, read_write> keys: array<u32>;
@group(0) @binding(2) var<storage, read_write> values: array<u32>;

fn pair_greater(key_a: u32, value_a: u32, key_b: u32, value_b: u32) -> bool {
    return key_a > key_b || (key_a == key_b && value_a > value_b);
}

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = gid.x + gid.y * groups.x * 256u;
    if i >= sort_stage.count {
        return;
    }
    let l = i ^ sort_stage.j;
    if l <= i {
        return;
    }

    let key_i = keys[i];
    let key_l = keys[l];
    let value_i = values[i];
    let value_l = values[l];

    let ascending = (i & sort_stage.k) == 0u;
    let exchange = select(
        pair_greater(key_l, value_l, key_i, value_i),
        pair_greater(key_i, value_i, key_l, value_l),
        ascending,
    );
    if exchange {
        keys[i] = key_l;
        keys[l] = key_i;
        values[i] = value_l;
        values[l] = value_i;
    }
}
"#;

const RESET_KERNEL: &str = r#"
@group(0) @binding(1) var<storage, read_write> cell_head: array<u32>;
@group(0) @binding(2) var<storage, read_write> cell_tail: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let c = linear_index(gid, groups);
    if c >= params.cell_count {
        return;
    }
    cell_head[c] = EMPTY_CELL;
    cell_tail[c] = EMPTY_CELL;
}
"#;

const BOUNDS_KERNEL: &str = r#"
@group(0) @binding(1) var<storage, read> grid_index: array<u32>;
@group(0) @binding(2) var<storage, read_write> cell_head: array<u32>;
@group(0) @binding(3) var<storage, read_write> cell_tail: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = linear_index(gid, groups);
    if i >= params.num_particles {
        return;
    }
    let key = grid_index[i];
    if key >= params.cell_count {
        return;
    }

    if i == 0u || grid_index[i - 1u] != key {
        cell_head[key] = i;
    }
    if i + 1u == params.num_particles || grid_index[i + 1u] != key {
        cell_tail[key] = i;
    }
}
"#;

const RANGES_KERNEL: &str = r#"
@group(0) @binding(1) var<storage, read> grid_index: array<u32>;
@group(0) @binding(2) var<storage, read> cell_head: array<u32>;
@group(0) @binding(3) var<storage, read> cell_tail: array<u32>;
@group(0) @binding(4) var<storage, read_write> cell_start: array<u32>;
@group(0) @binding(5) var<storage, read_write> cell_end: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = linear_index(gid, groups);
    if i >= params.num_particles {
        return;
    }
    let key = grid_index[i];
    if key >= params.cell_count {
        cell_start[i] = i;
        cell_end[i] = i;
        return;
    }
    cell_start[i] = cell_head[key];
    cell_end[i] = cell_tail[key];
}
"#;

struct SortPass {
    bind_group: wgpu::BindGroup,
    _params: wgpu::Buffer,
}

/// GPU resources for the per-step grid rebuild.
#[allow(dead_code)] // Fields used indirectly via bind groups
pub(crate) struct SpatialGpu {
    pub grid_index: wgpu::Buffer,
    pub particle_index: wgpu::Buffer,
    pub cell_start: wgpu::Buffer,
    pub cell_end: wgpu::Buffer,
    pub cell_head: wgpu::Buffer,
    cell_tail: wgpu::Buffer,

    index_pipeline: wgpu::ComputePipeline,
    sort_pipeline: wgpu::ComputePipeline,
    reset_pipeline: wgpu::ComputePipeline,
    bounds_pipeline: wgpu::ComputePipeline,
    ranges_pipeline: wgpu::ComputePipeline,

    index_bind_group: wgpu::BindGroup,
    sort_passes: Vec<SortPass>,
    reset_bind_group: wgpu::BindGroup,
    bounds_bind_group: wgpu::BindGroup,
    ranges_bind_group: wgpu::BindGroup,

    num_particles: u32,
    padded_count: u32,
    cell_count: u32,
}

impl SpatialGpu {
    /// `padded_count` is the particle count rounded up to a power of two.
    pub fn new(
        device: &wgpu::Device,
        params_buffer: &wgpu::Buffer,
        positions: &wgpu::Buffer,
        num_particles: u32,
        padded_count: u32,
        cell_count: u32,
    ) -> Self {
        let word = std::mem::size_of::<u32>() as u64;
        let grid_index = storage_buffer(device, "Grid Index", padded_count as u64 * word);
        let particle_index = storage_buffer(device, "Particle Index", padded_count as u64 * word);
        let cell_start = storage_buffer(device, "Cell Start", num_particles as u64 * word);
        let cell_end = storage_buffer(device, "Cell End", num_particles as u64 * word);
        let cell_head = storage_buffer(device, "Cell Head", cell_count as u64 * word);
        let cell_tail = storage_buffer(device, "Cell Tail", cell_count as u64 * word);

        let index_pipeline = create_kernel(device, "Index Particles", &kernel_source(INDEX_KERNEL));
        let sort_pipeline = create_kernel(device, "Bitonic Sort", SORT_KERNEL);
        let reset_pipeline = create_kernel(device, "Reset Cells", &kernel_source(RESET_KERNEL));
        let bounds_pipeline = create_kernel(device, "Cell Bounds", &kernel_source(BOUNDS_KERNEL));
        let ranges_pipeline = create_kernel(device, "Cell Ranges", &kernel_source(RANGES_KERNEL));

        let index_bind_group = bind_buffers(
            device,
            &index_pipeline,
            "Index Bind Group",
            &[params_buffer, positions, &grid_index, &particle_index],
        );

        let sort_passes = bitonic_stages(padded_count)
            .into_iter()
            .map(|(j, k)| {
                let stage = SortStage { j, k, count: padded_count, _pad: 0 };
                let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Sort Stage"),
                    contents: bytemuck::cast_slice(&[stage]),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                let bind_group = bind_buffers(
                    device,
                    &sort_pipeline,
                    "Sort Bind Group",
                    &[&params, &grid_index, &particle_index],
                );
                SortPass { bind_group, _params: params }
            })
            .collect();

        let reset_bind_group =
            bind_buffers(device, &reset_pipeline, "Reset Bind Group", &[params_buffer, &cell_head, &cell_tail]);

        let bounds_bind_group = bind_buffers(
            device,
            &bounds_pipeline,
            "Bounds Bind Group",
            &[params_buffer, &grid_index, &cell_head, &cell_tail],
        );

        let ranges_bind_group = bind_buffers(
            device,
            &ranges_pipeline,
            "Ranges Bind Group",
            &[params_buffer, &grid_index, &cell_head, &cell_tail, &cell_start, &cell_end],
        );

        Self {
            grid_index,
            particle_index,
            cell_start,
            cell_end,
            cell_head,
            cell_tail,
            index_pipeline,
            sort_pipeline,
            reset_pipeline,
            bounds_pipeline,
            ranges_pipeline,
            index_bind_group,
            sort_passes,
            reset_bind_group,
            bounds_bind_group,
            ranges_bind_group,
            num_particles,
            padded_count,
            cell_count,
        }
    }

    /// Record the full rebuild: index, sort, reset, bounds, ranges.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        run_kernel(encoder, "Index Particles", &self.index_pipeline, &self.index_bind_group, self.padded_count);

        for pass in &self.sort_passes {
            run_kernel(encoder, "Bitonic Sort", &self.sort_pipeline, &pass.bind_group, self.padded_count);
        }

        run_kernel(encoder, "Reset Cells", &self.reset_pipeline, &self.reset_bind_group, self.cell_count);
        run_kernel(encoder, "Cell Bounds", &self.bounds_pipeline, &self.bounds_bind_group, self.num_particles);
        run_kernel(encoder, "Cell Ranges", &self.ranges_pipeline, &self.ranges_bind_group, self.num_particles);
    }
}
