//! Device-resident voxel grid.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::grid::GridMeta;

use super::{GpuContext, GpuError};

static NEXT_GRID_ID: AtomicU64 = AtomicU64::new(1);

/// A voxel grid backed by one GPU storage buffer.
///
/// The buffer layout matches [`crate::grid::HostGrid`] bit for bit:
/// x-fastest linear order, `cell.size()` bytes per cell (`Vec3F` cells
/// pad to 16 bytes, the storage stride of `vec3<f32>`). There is no
/// per-cell read; inspecting contents requires a copy to a host grid
/// through [`super::transfer`]. Only kernels dispatched by
/// [`super::KernelRegistry`] mutate the buffer.
pub struct DeviceGrid {
    meta: GridMeta,
    buffer: Option<wgpu::Buffer>,
    id: u64,
}

impl DeviceGrid {
    /// Allocate a zero-initialized device grid.
    pub fn new(ctx: &GpuContext, meta: GridMeta) -> Self {
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kerf device grid"),
            size: meta.byte_len(),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        DeviceGrid {
            meta,
            buffer: Some(buffer),
            id: NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Grid metadata.
    #[inline(always)]
    pub fn meta(&self) -> &GridMeta {
        &self.meta
    }

    /// The backing storage buffer, or [`GpuError::GridDestroyed`].
    pub fn buffer(&self) -> Result<&wgpu::Buffer, GpuError> {
        self.buffer.as_ref().ok_or(GpuError::GridDestroyed)
    }

    /// Release the device allocation. Any later kernel or transfer
    /// that takes this grid fails.
    pub fn destroy(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy();
        }
    }

    /// Whether [`DeviceGrid::destroy`] has run.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.buffer.is_none()
    }

    /// Identity used to detect in-place aliasing across dispatch
    /// arguments.
    #[inline(always)]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}
