//! Integration tests: kernel dispatch, transfers, distance field and
//! axis bounds.
//!
//! Every test skips on machines without a GPU adapter.

mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use common::*;
use glam::Vec3;
use kerf::gpu::transfer::{copy_device, download, upload};
use kerf::prelude::*;

fn device_pair(
    ctx: &GpuContext,
    res: f32,
    num: [u32; 3],
    cell: CellType,
) -> (GridMeta, DeviceGrid) {
    let meta = GridMeta::new(res, num, Vec3::ZERO, cell).unwrap();
    let grid = DeviceGrid::new(ctx, meta);
    (meta, grid)
}

// ============================================================================
// Map kernels
// ============================================================================

#[test]
fn negate_map_out_of_place_and_aliased() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let mut reg = KernelRegistry::new(ctx.clone());
    reg.register_map_fn("negate", CellType::F32, CellType::F32, "vo = -vi;")
        .unwrap();

    let mut host: HostGrid<f32> = HostGrid::new(1.0, [4, 4, 4], Vec3::ZERO).unwrap();
    host.set(1, 2, 3, 2.0);

    let (meta, input) = device_pair(&ctx, 1.0, [4, 4, 4], CellType::F32);
    let output = DeviceGrid::new(&ctx, meta);
    upload(&ctx, &host, &input).unwrap();

    reg.map("negate", &input, &output).unwrap();
    let mut back: HostGrid<f32> = HostGrid::new(1.0, [4, 4, 4], Vec3::ZERO).unwrap();
    download(&ctx, &output, &mut back).unwrap();
    assert_eq!(back.get(1, 2, 3), -2.0);
    assert_eq!(back.count(), 1);

    // Same kernel in place: the dispatcher must route through a
    // shadow grid and produce the identical result.
    reg.map("negate", &input, &input).unwrap();
    download(&ctx, &input, &mut back).unwrap();
    assert_eq!(back.get(1, 2, 3), -2.0);
    assert_eq!(back.count(), 1);
}

#[test]
fn map_uses_cell_centers() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let mut reg = KernelRegistry::new(ctx.clone());
    reg.register_map_fn("center_x", CellType::F32, CellType::F32, "vo = p.x;")
        .unwrap();

    let (meta, input) = device_pair(&ctx, 0.5, [4, 2, 2], CellType::F32);
    let output = DeviceGrid::new(&ctx, meta);
    reg.map("center_x", &input, &output).unwrap();

    let mut back: HostGrid<f32> = HostGrid::new(0.5, [4, 2, 2], Vec3::ZERO).unwrap();
    download(&ctx, &output, &mut back).unwrap();
    for ix in 0..4 {
        let expected = (ix as f32 + 0.5) * 0.5;
        assert_relative_eq!(back.get(ix, 0, 0), expected, epsilon = 1e-6);
        assert_relative_eq!(back.get(ix, 1, 1), expected, epsilon = 1e-6);
    }
}

#[test]
fn map2_subtracts_tool_from_stock() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let mut reg = KernelRegistry::new(ctx.clone());
    reg.register_map2_fn(
        "erode",
        CellType::U32,
        CellType::U32,
        CellType::U32,
        "vo = select(vi1, 0u, vi2 > 0u);",
    )
    .unwrap();

    let mut stock: HostGrid<u32> = HostGrid::new(1.0, [8, 8, 8], Vec3::ZERO).unwrap();
    stock.fill(1);
    let mut tool: HostGrid<u32> = HostGrid::new(1.0, [8, 8, 8], Vec3::ZERO).unwrap();
    let bit = Shape::cylinder(Vec3::new(4.0, 4.0, 0.0), Vec3::Z, 2.0, 8.0).unwrap();
    tool.fill_shape(&bit, 1, RoundMode::Nearest);

    let (meta, d_stock) = device_pair(&ctx, 1.0, [8, 8, 8], CellType::U32);
    let d_tool = DeviceGrid::new(&ctx, meta);
    upload(&ctx, &stock, &d_stock).unwrap();
    upload(&ctx, &tool, &d_tool).unwrap();

    // In place on the stock grid.
    reg.map2("erode", &d_stock, &d_tool, &d_stock).unwrap();

    let mut back: HostGrid<u32> = HostGrid::new(1.0, [8, 8, 8], Vec3::ZERO).unwrap();
    download(&ctx, &d_stock, &mut back).unwrap();
    assert_eq!(back.count(), 512 - tool.count());
    for i in 0..512usize {
        let (x, y, z) = back.meta().coords_of(i);
        let expected = if tool.get(x, y, z) > 0 { 0 } else { 1 };
        assert_eq!(back.get(x, y, z), expected, "cell {x},{y},{z}");
    }
}

// ============================================================================
// Registry errors
// ============================================================================

#[test]
fn registry_rejects_duplicates_and_unknown_names() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let mut reg = KernelRegistry::new(ctx.clone());
    reg.register_map_fn("noop", CellType::U32, CellType::U32, "vo = vi;")
        .unwrap();
    assert!(matches!(
        reg.register_map_fn("noop", CellType::U32, CellType::U32, "vo = vi;"),
        Err(GpuError::DuplicateKernel(_))
    ));

    let (meta, a) = device_pair(&ctx, 1.0, [2, 2, 2], CellType::U32);
    let b = DeviceGrid::new(&ctx, meta);
    assert!(matches!(
        reg.map("missing", &a, &b),
        Err(GpuError::UnknownKernel(_))
    ));
}

#[test]
fn dispatch_rejects_mismatched_grids() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let mut reg = KernelRegistry::new(ctx.clone());
    reg.register_map_fn("noop", CellType::U32, CellType::U32, "vo = vi;")
        .unwrap();

    let (_, a) = device_pair(&ctx, 1.0, [2, 2, 2], CellType::U32);
    let (_, b) = device_pair(&ctx, 1.0, [2, 2, 3], CellType::U32);
    assert!(matches!(
        reg.map("noop", &a, &b),
        Err(GpuError::Grid(GridError::GeometryMismatch))
    ));

    let (_, c) = device_pair(&ctx, 1.0, [2, 2, 2], CellType::F32);
    assert!(matches!(
        reg.map("noop", &a, &c),
        Err(GpuError::CellTypeMismatch { .. })
    ));
}

#[test]
fn destroyed_grid_is_rejected() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let mut reg = KernelRegistry::new(ctx.clone());
    reg.register_map_fn("noop", CellType::U32, CellType::U32, "vo = vi;")
        .unwrap();

    let (meta, a) = device_pair(&ctx, 1.0, [2, 2, 2], CellType::U32);
    let mut b = DeviceGrid::new(&ctx, meta);
    b.destroy();
    assert!(b.is_destroyed());
    assert!(matches!(reg.map("noop", &a, &b), Err(GpuError::GridDestroyed)));

    let mut host: HostGrid<u32> = HostGrid::new(1.0, [2, 2, 2], Vec3::ZERO).unwrap();
    assert!(matches!(
        download(&ctx, &b, &mut host),
        Err(GpuError::GridDestroyed)
    ));
}

// ============================================================================
// Reduce
// ============================================================================

#[test]
fn reduce_matches_cpu_fold() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let mut reg = KernelRegistry::new(ctx.clone());
    reg.register_reduce_fn("sum", CellType::U32, "0u", "vo = a + b;")
        .unwrap();
    reg.register_reduce_fn(
        "max",
        CellType::U32,
        "0u",
        "vo = max(a, b);",
    )
    .unwrap();

    // Big enough to force several reduce rounds (17^3 = 4913 cells).
    let mut host: HostGrid<u32> = HostGrid::new(1.0, [17, 17, 17], Vec3::ZERO).unwrap();
    for i in 0..host.meta().cell_count() {
        let (x, y, z) = host.meta().coords_of(i);
        host.set(x, y, z, (i % 7) as u32);
    }

    let (_, grid) = device_pair(&ctx, 1.0, [17, 17, 17], CellType::U32);
    upload(&ctx, &host, &grid).unwrap();

    let sum: u32 = reg.reduce("sum", &grid).unwrap();
    let expected: u32 = host.cells().iter().sum();
    assert_eq!(sum, expected);

    let max: u32 = reg.reduce("max", &grid).unwrap();
    assert_eq!(max, 6);
}

// ============================================================================
// Transfers
// ============================================================================

#[test]
fn upload_download_round_trip() {
    let Some(ctx) = gpu_or_skip() else { return };
    let mut host: HostGrid<u32> = HostGrid::new(1.0, [5, 3, 7], Vec3::ZERO).unwrap();
    for i in 0..host.meta().cell_count() {
        let (x, y, z) = host.meta().coords_of(i);
        host.set(x, y, z, i as u32);
    }

    let (meta, grid) = device_pair(&ctx, 1.0, [5, 3, 7], CellType::U32);
    upload(&ctx, &host, &grid).unwrap();

    // Device-to-device, then read the copy back.
    let other = DeviceGrid::new(&ctx, meta);
    copy_device(&ctx, &grid, &other).unwrap();

    let mut back: HostGrid<u32> = HostGrid::new(1.0, [5, 3, 7], Vec3::ZERO).unwrap();
    download(&ctx, &other, &mut back).unwrap();
    assert_eq!(host.cells(), back.cells());
}

#[test]
fn transfer_rejects_byte_length_mismatch() {
    let Some(ctx) = gpu_or_skip() else { return };
    let host: HostGrid<u32> = HostGrid::new(1.0, [4, 4, 4], Vec3::ZERO).unwrap();
    let (_, small) = device_pair(&ctx, 1.0, [4, 4, 3], CellType::U32);
    assert!(matches!(
        upload(&ctx, &host, &small),
        Err(GpuError::Grid(GridError::SizeMismatch { .. }))
    ));
}

// ============================================================================
// Distance field
// ============================================================================

#[test]
fn distance_field_single_corner_seed() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let field = FieldKernels::new(ctx.clone()).unwrap();

    let res = 0.5f32;
    let mut host: HostGrid<u32> = HostGrid::new(res, [8, 8, 8], Vec3::ZERO).unwrap();
    host.set(0, 0, 0, 1);

    let seed_meta = GridMeta::new(res, [8, 8, 8], Vec3::ZERO, CellType::U32).unwrap();
    let seed = DeviceGrid::new(&ctx, seed_meta);
    upload(&ctx, &host, &seed).unwrap();
    let dist = DeviceGrid::new(
        &ctx,
        GridMeta::new(res, [8, 8, 8], Vec3::ZERO, CellType::F32).unwrap(),
    );

    field.distance_field(&seed, &dist).unwrap();

    let mut out: HostGrid<f32> = HostGrid::new(res, [8, 8, 8], Vec3::ZERO).unwrap();
    download(&ctx, &dist, &mut out).unwrap();

    // The seed cell reports zero.
    assert_eq!(out.get(0, 0, 0), 0.0);
    // The far corner is exactly the center-to-center diagonal.
    let expected = (3.0f32).sqrt() * 7.0 * res;
    assert_relative_eq!(out.get(7, 7, 7), expected, epsilon = 1e-3);
    // Spot-check an interior cell.
    let expected = ((2.0f32).powi(2) + (4.0f32).powi(2) + (6.0f32).powi(2)).sqrt() * res;
    assert_relative_eq!(out.get(2, 4, 6), expected, epsilon = 1e-3);
}

#[test]
fn distance_field_empty_seed_yields_sentinel() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let field = FieldKernels::new(ctx.clone()).unwrap();

    let meta = GridMeta::new(1.0, [4, 4, 4], Vec3::ZERO, CellType::U32).unwrap();
    let seed = DeviceGrid::new(&ctx, meta);
    let dist = DeviceGrid::new(
        &ctx,
        GridMeta::new(1.0, [4, 4, 4], Vec3::ZERO, CellType::F32).unwrap(),
    );
    field.distance_field(&seed, &dist).unwrap();

    let mut out: HostGrid<f32> = HostGrid::new(1.0, [4, 4, 4], Vec3::ZERO).unwrap();
    download(&ctx, &dist, &mut out).unwrap();
    assert!(out.cells().iter().all(|&d| d == INVALID));
}

// ============================================================================
// Axis bounds
// ============================================================================

#[test]
fn bound_of_axis_single_cell() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let mut field = FieldKernels::new(ctx.clone()).unwrap();

    let mut host: HostGrid<u32> = HostGrid::new(1.0, [8, 8, 8], Vec3::ZERO).unwrap();
    host.set(3, 5, 2, 1);
    let (_, grid) = device_pair(&ctx, 1.0, [8, 8, 8], CellType::U32);
    upload(&ctx, &host, &grid).unwrap();

    let half_diag = 3.0f32.sqrt() / 2.0;

    let b = field
        .bound_of_axis(Vec3::X, &grid, Boundary::Nearest)
        .unwrap()
        .unwrap();
    assert_relative_eq!(b.min, 3.5, epsilon = 1e-4);
    assert_relative_eq!(b.max, 3.5, epsilon = 1e-4);

    let b = field
        .bound_of_axis(Vec3::X, &grid, Boundary::Out)
        .unwrap()
        .unwrap();
    assert_relative_eq!(b.min, 3.5 - half_diag, epsilon = 1e-4);
    assert_relative_eq!(b.max, 3.5 + half_diag, epsilon = 1e-4);

    // A single cell is thinner than a cell diagonal: In is empty.
    let b = field
        .bound_of_axis(Vec3::X, &grid, Boundary::In)
        .unwrap();
    assert!(b.is_none());

    // The other axes see the matching centers.
    let b = field
        .bound_of_axis(Vec3::Y, &grid, Boundary::Nearest)
        .unwrap()
        .unwrap();
    assert_relative_eq!(b.min, 5.5, epsilon = 1e-4);
}

#[test]
fn bound_of_axis_empty_and_invalid_direction() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let mut field = FieldKernels::new(ctx.clone()).unwrap();

    let (_, grid) = device_pair(&ctx, 1.0, [4, 4, 4], CellType::U32);
    let b = field
        .bound_of_axis(Vec3::Z, &grid, Boundary::Nearest)
        .unwrap();
    assert!(b.is_none());

    assert!(matches!(
        field.bound_of_axis(Vec3::new(0.0, 0.0, 2.0), &grid, Boundary::Nearest),
        Err(GpuError::NonUnitDirection)
    ));
}

#[test]
fn bound_of_axis_arbitrary_direction() {
    let Some(ctx) = gpu_or_skip() else { return };
    let ctx = Arc::new(ctx);
    let mut field = FieldKernels::new(ctx.clone()).unwrap();

    let mut host: HostGrid<u32> = HostGrid::new(1.0, [8, 8, 8], Vec3::ZERO).unwrap();
    host.set(1, 1, 0, 1);
    host.set(6, 6, 0, 1);
    let (_, grid) = device_pair(&ctx, 1.0, [8, 8, 8], CellType::U32);
    upload(&ctx, &host, &grid).unwrap();

    let dir = Vec3::new(std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2, 0.0);
    let b = field
        .bound_of_axis(dir, &grid, Boundary::Nearest)
        .unwrap()
        .unwrap();
    assert_relative_eq!(b.min, 1.5 * 2.0 * dir.x, epsilon = 1e-4);
    assert_relative_eq!(b.max, 6.5 * 2.0 * dir.x, epsilon = 1e-4);
}
