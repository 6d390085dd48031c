//! Error types for boidgrid.
//!
//! Configuration problems, resource exhaustion and stage launch failures are
//! reported as values so callers can shrink the particle count or fall back
//! to another backend. Misuse of the simulation lifecycle (stepping after
//! teardown) is a programming error and panics instead.

use std::collections::TryReserveError;
use std::fmt;

/// Errors that can occur while setting up the GPU backend.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
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

/// Errors that can occur when initializing or stepping a simulation.
#[derive(Debug)]
pub enum SimulationError {
    /// The configuration was rejected before anything was allocated.
    InvalidConfig(String),
    /// A particle or grid buffer could not be allocated.
    Allocation {
        /// Which buffer was being allocated.
        what: &'static str,
        /// Requested size in bytes.
        bytes: usize,
    },
    /// A parallel stage failed to execute.
    Launch {
        /// Pipeline stage that failed.
        stage: &'static str,
        /// Backend-provided diagnostic.
        message: String,
    },
    /// GPU backend setup failed.
    Gpu(GpuError),
}

impl SimulationError {
    /// Returns true for resource exhaustion, the one kind a caller can retry
    /// with a smaller particle count.
    pub fn is_allocation(&self) -> bool {
        matches!(self, SimulationError::Allocation { .. })
    }

    pub(crate) fn launch(stage: &'static str, message: impl Into<String>) -> Self {
        SimulationError::Launch { stage, message: message.into() }
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::InvalidConfig(msg) => write!(f, "Invalid simulation config: {}", msg),
            SimulationError::Allocation { what, bytes } => {
                write!(f, "Failed to allocate {} ({} bytes)", what, bytes)
            }
            SimulationError::Launch { stage, message } => {
                write!(f, "Stage '{}' failed to launch: {}", stage, message)
            }
            SimulationError::Gpu(e) => write!(f, "GPU error: {}", e),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Gpu(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GpuError> for SimulationError {
    fn from(e: GpuError) -> Self {
        SimulationError::Gpu(e)
    }
}

impl From<rayon::ThreadPoolBuildError> for SimulationError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        SimulationError::launch("worker pool", e.to_string())
    }
}

/// Allocate a vector of `len` copies of `value`, reporting exhaustion as
/// [`SimulationError::Allocation`] instead of aborting.
pub(crate) fn try_alloc<T: Clone>(what: &'static str, len: usize, value: T) -> Result<Vec<T>, SimulationError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e: TryReserveError| {
            log::error!("allocation of {} failed: {}", what, e);
            SimulationError::Allocation { what, bytes: len.saturating_mul(std::mem::size_of::<T>()) }
        })?;
    buf.resize(len, value);
    Ok(buf)
}

/// Like [`try_alloc`], building each element with `f`.
pub(crate) fn try_alloc_with<T>(
    what: &'static str,
    len: usize,
    f: impl FnMut() -> T,
) -> Result<Vec<T>, SimulationError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e: TryReserveError| {
            log::error!("allocation of {} failed: {}", what, e);
            SimulationError::Allocation { what, bytes: len.saturating_mul(std::mem::size_of::<T>()) }
        })?;
    buf.resize_with(len, f);
    Ok(buf)
}
