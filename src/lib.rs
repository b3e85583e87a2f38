//! # kerf
//!
//! Voxel-and-SDF computation engine for a subtractive-machining
//! planner. The crate converts tool shapes and triangulated part
//! surfaces into dense occupancy grids, runs set-theoretic and
//! geometric queries between them, and maintains the distance field
//! that guides cutting-path planning. A small programmable GPU
//! compute framework underneath exposes shapes as signed distance
//! functions, executes user-registered per-voxel map and reduce
//! kernels, and runs a jump-flood distance-field pass.
//!
//! ## Features
//!
//! - **Shapes**: capped cylinder, extruded long-hole, oriented box;
//!   true SDFs with validating constructors
//! - **Grids**: CPU and GPU voxel grids with bit-exact layout, strict
//!   metadata checks, explicit round modes
//! - **Kernels**: named map / map2 / reduce WGSL bodies, compiled once
//!   and dispatched many times, with in-place aliasing handled by the
//!   dispatcher
//! - **Fields**: jump-flood Euclidean distance field, axis-bound
//!   reductions that ignore sentinel cells
//!
//! ## Example
//!
//! ```rust
//! use glam::Vec3;
//! use kerf::prelude::*;
//!
//! // A 1 mm grid over a 32 mm cube of stock.
//! let mut stock: HostGrid<u32> = HostGrid::new(1.0, [32, 32, 32], Vec3::ZERO).unwrap();
//!
//! // Mark the volume an electrode sweep occupies.
//! let electrode = Shape::cylinder(Vec3::new(16.0, 16.0, 4.0), Vec3::Z, 6.0, 20.0).unwrap();
//! stock.fill_shape(&electrode, 1, RoundMode::Outside);
//!
//! assert!(stock.count() > 0);
//! assert!(stock.every_inside(&electrode, RoundMode::Inside, |v| v == 1));
//! ```
//!
//! GPU work needs a [`gpu::GpuContext`]; see [`gpu::KernelRegistry`]
//! and [`gpu::FieldKernels`].

#![warn(missing_docs)]

pub mod gpu;
pub mod grid;
pub mod mesh;
pub mod shape;
pub mod traverse;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and functions.
pub mod prelude {
    pub use crate::gpu::{
        has_gpu, AxisInterval, Boundary, DeviceGrid, FieldKernels, GpuContext, GpuError,
        KernelRegistry, INVALID,
    };
    pub use crate::grid::{CellType, GridError, GridMeta, HostCell, HostGrid};
    pub use crate::mesh::dice_surface;
    pub use crate::shape::{Shape, ShapeError};
    pub use crate::traverse::{visit_selected, RoundMode};
}
