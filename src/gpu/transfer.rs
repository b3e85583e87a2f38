//! Grid transfers across the CPU/GPU boundary.
//!
//! Every transfer checks byte lengths before touching the device; a
//! failed check aborts with no device-side effects. Downloads go
//! through a throwaway staging buffer with CPU-read mapping and block
//! until the device finishes, one of the engine's pinned suspension
//! points.

use crate::grid::{GridError, HostCell, HostGrid};

use super::{DeviceGrid, GpuContext, GpuError};

fn check_len(expected: u64, actual: u64) -> Result<(), GpuError> {
    if expected != actual {
        return Err(GpuError::Grid(GridError::SizeMismatch { expected, actual }));
    }
    Ok(())
}

/// Copy a host grid into a device grid via the queue.
pub fn upload<T: HostCell>(
    ctx: &GpuContext,
    src: &HostGrid<T>,
    dst: &DeviceGrid,
) -> Result<(), GpuError> {
    let buffer = dst.buffer()?;
    let bytes: &[u8] = bytemuck::cast_slice(src.cells());
    check_len(dst.meta().byte_len(), bytes.len() as u64)?;
    ctx.queue.write_buffer(buffer, 0, bytes);
    log::trace!("uploaded {} bytes", bytes.len());
    Ok(())
}

/// Copy a device grid into a host grid. Blocks until the readback
/// completes.
pub fn download<T: HostCell>(
    ctx: &GpuContext,
    src: &DeviceGrid,
    dst: &mut HostGrid<T>,
) -> Result<(), GpuError> {
    let buffer = src.buffer()?;
    let expected = (dst.cells().len() * std::mem::size_of::<T>()) as u64;
    check_len(expected, src.meta().byte_len())?;
    let bytes = read_buffer(ctx, buffer, expected)?;
    bytemuck::cast_slice_mut::<T, u8>(dst.cells_mut()).copy_from_slice(&bytes);
    Ok(())
}

/// Copy between two device grids on the queue timeline.
pub fn copy_device(ctx: &GpuContext, src: &DeviceGrid, dst: &DeviceGrid) -> Result<(), GpuError> {
    let src_buf = src.buffer()?;
    let dst_buf = dst.buffer()?;
    check_len(dst.meta().byte_len(), src.meta().byte_len())?;
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("kerf grid copy"),
        });
    encoder.copy_buffer_to_buffer(src_buf, 0, dst_buf, 0, src.meta().byte_len());
    ctx.queue.submit(std::iter::once(encoder.finish()));
    Ok(())
}

/// Copy between two host grids of the same cell type.
pub fn copy_host<T: HostCell>(src: &HostGrid<T>, dst: &mut HostGrid<T>) -> Result<(), GridError> {
    if src.cells().len() != dst.cells().len() {
        return Err(GridError::SizeMismatch {
            expected: (dst.cells().len() * std::mem::size_of::<T>()) as u64,
            actual: (src.cells().len() * std::mem::size_of::<T>()) as u64,
        });
    }
    dst.cells_mut().copy_from_slice(src.cells());
    Ok(())
}

/// Read `size` bytes from the front of a device buffer.
///
/// Allocates a MAP_READ staging buffer, copies into it on the queue,
/// waits for the device, maps, reads and unmaps. The staging buffer is
/// dropped before returning.
pub(crate) fn read_buffer(
    ctx: &GpuContext,
    buffer: &wgpu::Buffer,
    size: u64,
) -> Result<Vec<u8>, GpuError> {
    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kerf staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("kerf readback"),
        });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = futures_channel::oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    ctx.device.poll(wgpu::Maintain::Wait);

    pollster::block_on(receiver)
        .map_err(|e| GpuError::BufferMapping(format!("channel error: {e}")))?
        .map_err(|e| GpuError::BufferMapping(format!("{e:?}")))?;

    let mapped = slice.get_mapped_range();
    let bytes = mapped.to_vec();
    drop(mapped);
    staging.unmap();
    Ok(bytes)
}
