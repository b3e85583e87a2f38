//! GPU compute backend.
//!
//! The engine treats the GPU as a voxel coprocessor: device grids live
//! in storage buffers, and all mutation goes through compute kernels
//! dispatched by [`KernelRegistry`]. The contract matches WebGPU; any
//! `wgpu` backend works.
//!
//! Host control flow is single-threaded and cooperative. Device work
//! is asynchronous and ordered by submission; the only points that
//! block are the post-reduce readback, the wait between jump-flood
//! passes, and CPU-crossing copies in [`transfer`].

pub mod field;
pub mod grid;
pub mod kernels;
pub mod transfer;

pub use field::{AxisInterval, Boundary, FieldKernels, INVALID};
pub use grid::DeviceGrid;
pub use kernels::{CellValue, KernelRegistry, WORKGROUP_SIZE};

use thiserror::Error;

use crate::grid::{CellType, GridError};

/// Error type for GPU operations.
#[derive(Error, Debug)]
pub enum GpuError {
    /// No GPU adapter is available.
    #[error("failed to acquire a GPU adapter")]
    NoAdapter,

    /// Device creation failed.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(String),

    /// A staging-buffer mapping failed during readback.
    #[error("buffer mapping failed: {0}")]
    BufferMapping(String),

    /// A kernel name was registered twice in the same table.
    #[error("kernel {0:?} is already registered")]
    DuplicateKernel(String),

    /// A dispatch referenced a kernel name never registered.
    #[error("kernel {0:?} is not registered")]
    UnknownKernel(String),

    /// A destroyed device grid was passed to a kernel or transfer.
    #[error("device grid has been destroyed")]
    GridDestroyed,

    /// A grid's cell type does not match the kernel registration.
    #[error("grid cell type {actual:?} does not match the kernel's {expected:?}")]
    CellTypeMismatch {
        /// Cell type the kernel was registered with.
        expected: CellType,
        /// Cell type of the grid passed in.
        actual: CellType,
    },

    /// An axis-bound direction was not unit length.
    #[error("axis direction must be unit length")]
    NonUnitDirection,

    /// Structural grid error surfaced through a GPU call.
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Owned GPU device and submission queue.
pub struct GpuContext {
    /// The wgpu device.
    pub device: wgpu::Device,
    /// The device's submission queue.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Acquire a device on the highest-performance available adapter,
    /// blocking on the platform futures.
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::new_async())
    }

    /// Async variant of [`GpuContext::new`].
    pub async fn new_async() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
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

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("kerf device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

        log::debug!("acquired device: {:?}", adapter.get_info().name);
        Ok(GpuContext { device, queue })
    }

    /// Wrap an existing device and queue, for callers embedding the
    /// engine in a larger wgpu application.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        GpuContext { device, queue }
    }
}

/// Whether any GPU adapter is present. Used by tests to skip GPU
/// suites on headless machines.
pub fn has_gpu() -> bool {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())).is_some()
}
