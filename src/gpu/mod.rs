//! Compute-shader backend.
//!
//! Every pipeline stage is a WGSL kernel dispatched in its own compute pass.
//! Pass boundaries are the global barriers between stages, so a kernel only
//! sees the previous stage's output once that stage has fully finished.
//!
//! All kernels share one [`FlockParams`] uniform at binding 0 and address
//! particles through `linear_index`, which lets a dispatch spill into a
//! second workgroup dimension once it exceeds the per-axis limit.

mod flock_gpu;
mod spatial_gpu;

use bytemuck::{Pod, Zeroable};

pub(crate) use flock_gpu::GpuFlock;

use crate::config::{CellSweep, RuleParams};
use crate::error::{GpuError, SimulationError};
use crate::integrate::WRAP_WGSL;
use crate::rules::RULES_WGSL;
use crate::spatial::{GridParams, GRID_WGSL};

const WORKGROUP_SIZE: u32 = 256;
const MAX_GROUPS_PER_AXIS: u32 = 65535;

/// Headless device and queue.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Request a high-performance adapter with no presentation surface.
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let supported = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("boidgrid device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
                        max_buffer_size: supported.max_buffer_size,
                        ..wgpu::Limits::default()
                    },
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let adapter_info = adapter.get_info();
        log::info!("GPU adapter: {} ({:?})", adapter_info.name, adapter_info.backend);

        Ok(Self { device, queue, adapter_info })
    }
}

/// Uniform block shared by every flock kernel. Layout matches
/// `FlockParams` in [`KERNEL_PRELUDE`].
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct FlockParams {
    pub grid_min: [f32; 3],
    pub inv_cell_width: f32,
    pub side_count: u32,
    pub cell_count: u32,
    pub num_particles: u32,
    /// 0 for the full 3×3×3 sweep, 1 for the octant sweep.
    pub sweep: u32,
    pub cell_width: f32,
    pub half_extent: f32,
    pub dt: f32,
    pub max_speed: f32,
    /// Cohesion, separation and alignment radii.
    pub rule_distance: [f32; 3],
    pub separation_guard: f32,
    /// Cohesion, separation and alignment scales.
    pub rule_scale: [f32; 3],
    pub _pad: f32,
}

impl FlockParams {
    pub(crate) fn new(grid: &GridParams, rules: &RuleParams, particle_count: u32) -> Self {
        Self {
            grid_min: grid.grid_min.to_array(),
            inv_cell_width: grid.inv_cell_width,
            side_count: grid.side_count,
            cell_count: grid.cell_count,
            num_particles: particle_count,
            sweep: sweep_code(CellSweep::Full),
            cell_width: grid.cell_width,
            half_extent: grid.half_extent,
            dt: 0.0,
            max_speed: rules.max_speed,
            rule_distance: [rules.cohesion_radius, rules.separation_radius, rules.alignment_radius],
            separation_guard: rules.separation_guard,
            rule_scale: [rules.cohesion_scale, rules.separation_scale, rules.alignment_scale],
            _pad: 0.0,
        }
    }
}

pub(crate) fn sweep_code(sweep: CellSweep) -> u32 {
    match sweep {
        CellSweep::Full => 0,
        CellSweep::Octant => 1,
    }
}

/// Declarations every flock kernel starts with.
pub(crate) const KERNEL_PRELUDE: &str = r#"
struct FlockParams {
    grid_min: vec3<f32>,
    inv_cell_width: f32,
    side_count: u32,
    cell_count: u32,
    num_particles: u32,
    sweep: u32,
    cell_width: f32,
    half_extent: f32,
    dt: f32,
    max_speed: f32,
    rule_distance: vec3<f32>,
    separation_guard: f32,
    rule_scale: vec3<f32>,
    _pad: f32,
};

@group(0) @binding(0) var<uniform> params: FlockParams;

fn linear_index(gid: vec3<u32>, groups: vec3<u32>) -> u32 {
    return gid.x + gid.y * groups.x * 256u;
}
"#;

/// Full source for a flock kernel: prelude, shared helpers, then `body`.
pub(crate) fn kernel_source(body: &str) -> String {
    format!("{}\n{}\n{}\n{}\n{}", KERNEL_PRELUDE, GRID_WGSL, RULES_WGSL, WRAP_WGSL, body)
}

fn create_kernel(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    create_compute_pipeline(device, &module, "main", label)
}

fn create_compute_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    entry_point: &str,
    label: &str,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None, // Auto layout
        module: shader,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Bind `buffers` to group 0 in order, starting at binding 0.
fn bind_buffers(
    device: &wgpu::Device,
    pipeline: &wgpu::ComputePipeline,
    label: &str,
    buffers: &[&wgpu::Buffer],
) -> wgpu::BindGroup {
    let layout = pipeline.get_bind_group_layout(0);
    let entries: Vec<wgpu::BindGroupEntry> = buffers
        .iter()
        .enumerate()
        .map(|(binding, buffer)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource: buffer.as_entire_binding(),
        })
        .collect();

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &layout,
        entries: &entries,
    })
}

fn storage_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

/// Reject a binding the device cannot hold before anything is created.
fn check_binding_size(device: &wgpu::Device, what: &'static str, bytes: u64) -> Result<u64, SimulationError> {
    if bytes > device.limits().max_storage_buffer_binding_size as u64 {
        log::error!("{} needs {} bytes, over the device binding limit", what, bytes);
        return Err(SimulationError::Allocation { what, bytes: bytes as usize });
    }
    Ok(bytes)
}

/// Workgroup grid covering `count` invocations.
fn dispatch_size(count: u32) -> (u32, u32) {
    let groups = count.div_ceil(WORKGROUP_SIZE).max(1);
    let x = groups.min(MAX_GROUPS_PER_AXIS);
    (x, groups.div_ceil(x))
}

fn run_kernel(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    count: u32,
) {
    let (x, y) = dispatch_size(count);
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.dispatch_workgroups(x, y, 1);
}

/// Copy the first `len` elements of `buffer` back to the host.
fn read_buffer<T: Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    len: usize,
) -> Result<Vec<T>, GpuError> {
    let size = (len * std::mem::size_of::<T>()) as u64;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let buffer_slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|e| GpuError::BufferMapping(e.to_string()))?
        .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

    let data = buffer_slice.get_mapped_range();
    let result = bytemuck::cast_slice::<u8, T>(&data).to_vec();
    drop(data);
    staging.unmap();

    Ok(result)
}

#[cfg(test)]
pub(crate) fn validate_wgsl(code: &str) -> Result<(), String> {
    let module = naga::front::wgsl::parse_str(code).map_err(|e| format!("WGSL parse error: {:?}", e))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("WGSL validation error: {:?}", e))?;

    Ok(())
}
