//! Voxel grid metadata and the CPU-resident grid.
//!
//! A grid is a dense 3D array of cubic cells. [`GridMeta`] carries the
//! geometry (cell edge length, cell counts, world origin, cell type)
//! shared by host and device grids; [`HostGrid`] owns the CPU buffer.
//! Host and device grids with equal metadata are bit-exact
//! correspondents: the linear cell order is x-fastest
//! (`ix + iy*nx + iz*nx*ny`) on both sides.

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shape::Shape;
use crate::traverse::{visit_selected, RoundMode};

pub(crate) const SQRT_3: f32 = 1.732_050_8;

/// Element type of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    /// 32-bit unsigned integer, typically occupancy.
    U32,
    /// 32-bit float, typically a distance.
    F32,
    /// Three floats, padded to 16 bytes (device only).
    Vec3F,
    /// Four floats (device only).
    Vec4F,
}

impl CellType {
    /// Size of one cell in bytes. `Vec3F` pads to four floats, the
    /// storage-buffer stride of `vec3<f32>`.
    pub fn size(self) -> u64 {
        match self {
            CellType::U32 | CellType::F32 => 4,
            CellType::Vec3F | CellType::Vec4F => 16,
        }
    }

    /// WGSL spelling of the cell type.
    pub fn wgsl(self) -> &'static str {
        match self {
            CellType::U32 => "u32",
            CellType::F32 => "f32",
            CellType::Vec3F => "vec3<f32>",
            CellType::Vec4F => "vec4<f32>",
        }
    }

    /// Whether [`HostGrid`] can hold this type.
    pub fn host_supported(self) -> bool {
        matches!(self, CellType::U32 | CellType::F32)
    }
}

/// Structural errors on grids and transfers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    /// Resolution or a cell count was not positive.
    #[error("grid resolution and cell counts must be positive")]
    InvalidDimensions,

    /// Two grids combined in one operation do not share geometry.
    #[error("grids do not share resolution, dimensions and origin")]
    GeometryMismatch,

    /// Byte lengths of a copy pair differ.
    #[error("byte length mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Byte length of the destination.
        expected: u64,
        /// Byte length of the source.
        actual: u64,
    },

    /// The cell type cannot live in a host grid.
    #[error("cell type {0:?} is not supported on the host")]
    UnsupportedCellType(CellType),

    /// A triangle soup's float count is not a multiple of 9.
    #[error("triangle soup length {0} is not a multiple of 9")]
    RaggedTriangleSoup(usize),
}

/// Geometry and element type of a voxel grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridMeta {
    /// Edge length of a cubic cell in world units.
    pub res: f32,
    /// Cell counts along x, y, z.
    pub num: [u32; 3],
    /// World-space position of the corner of cell (0, 0, 0).
    pub ofs: Vec3,
    /// Element type of each cell.
    pub cell: CellType,
}

impl GridMeta {
    /// Create validated grid metadata.
    pub fn new(res: f32, num: [u32; 3], ofs: Vec3, cell: CellType) -> Result<Self, GridError> {
        if !(res > 0.0) || num.iter().any(|&n| n == 0) {
            return Err(GridError::InvalidDimensions);
        }
        Ok(GridMeta {
            res,
            num,
            ofs,
            cell,
        })
    }

    /// Total number of cells.
    #[inline(always)]
    pub fn cell_count(&self) -> usize {
        self.num[0] as usize * self.num[1] as usize * self.num[2] as usize
    }

    /// Byte length of the backing buffer.
    #[inline(always)]
    pub fn byte_len(&self) -> u64 {
        self.cell_count() as u64 * self.cell.size()
    }

    /// Linear index of cell (ix, iy, iz), x-fastest.
    #[inline(always)]
    pub fn index(&self, ix: u32, iy: u32, iz: u32) -> usize {
        ix as usize
            + iy as usize * self.num[0] as usize
            + iz as usize * self.num[0] as usize * self.num[1] as usize
    }

    /// Inverse of [`GridMeta::index`].
    #[inline(always)]
    pub fn coords_of(&self, i: usize) -> (u32, u32, u32) {
        let nx = self.num[0] as usize;
        let ny = self.num[1] as usize;
        ((i % nx) as u32, ((i / nx) % ny) as u32, (i / (nx * ny)) as u32)
    }

    /// World-space center of cell (ix, iy, iz).
    #[inline(always)]
    pub fn center_of(&self, ix: u32, iy: u32, iz: u32) -> Vec3 {
        self.ofs + (Vec3::new(ix as f32, iy as f32, iz as f32) + Vec3::splat(0.5)) * self.res
    }

    /// Maximum distance from a cell center to any of its corners,
    /// `res * sqrt(3) / 2`. The round-mode offsets are built on this.
    #[inline(always)]
    pub fn half_diag(&self) -> f32 {
        self.res * SQRT_3 * 0.5
    }

    /// Whether two grids may be combined in a kernel: equal
    /// resolution, dimensions and origin. Cell types may differ.
    #[inline]
    pub fn same_geometry(&self, other: &GridMeta) -> bool {
        self.res == other.res && self.num == other.num && self.ofs == other.ofs
    }
}

/// Cell types a [`HostGrid`] can hold.
pub trait HostCell:
    Copy + Default + PartialOrd + bytemuck::Pod + Send + Sync + 'static
{
    /// The matching [`CellType`] tag.
    const CELL: CellType;
}

impl HostCell for u32 {
    const CELL: CellType = CellType::U32;
}

impl HostCell for f32 {
    const CELL: CellType = CellType::F32;
}

/// A dense CPU-resident voxel grid.
///
/// Owns a contiguous buffer of exactly `nx * ny * nz` cells,
/// zero-initialized at construction.
#[derive(Debug, Clone)]
pub struct HostGrid<T: HostCell> {
    meta: GridMeta,
    data: Vec<T>,
}

impl<T: HostCell> HostGrid<T> {
    /// Create a zero-filled grid.
    pub fn new(res: f32, num: [u32; 3], ofs: Vec3) -> Result<Self, GridError> {
        let meta = GridMeta::new(res, num, ofs, T::CELL)?;
        Ok(HostGrid {
            meta,
            data: vec![T::default(); meta.cell_count()],
        })
    }

    /// Create a zero-filled grid from existing metadata. The metadata
    /// cell type must match `T`.
    pub fn from_meta(meta: GridMeta) -> Result<Self, GridError> {
        if meta.cell != T::CELL {
            return Err(GridError::UnsupportedCellType(meta.cell));
        }
        let meta = GridMeta::new(meta.res, meta.num, meta.ofs, meta.cell)?;
        Ok(HostGrid {
            meta,
            data: vec![T::default(); meta.cell_count()],
        })
    }

    /// Grid metadata.
    #[inline(always)]
    pub fn meta(&self) -> &GridMeta {
        &self.meta
    }

    /// All cells, linear order.
    #[inline(always)]
    pub fn cells(&self) -> &[T] {
        &self.data
    }

    /// Mutable view of all cells.
    #[inline(always)]
    pub fn cells_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Read cell (ix, iy, iz). Bounds are the caller's responsibility
    /// beyond debug assertions.
    #[inline(always)]
    pub fn get(&self, ix: u32, iy: u32, iz: u32) -> T {
        debug_assert!(ix < self.meta.num[0] && iy < self.meta.num[1] && iz < self.meta.num[2]);
        self.data[self.meta.index(ix, iy, iz)]
    }

    /// Write cell (ix, iy, iz).
    #[inline(always)]
    pub fn set(&mut self, ix: u32, iy: u32, iz: u32, value: T) {
        debug_assert!(ix < self.meta.num[0] && iy < self.meta.num[1] && iz < self.meta.num[2]);
        let i = self.meta.index(ix, iy, iz);
        self.data[i] = value;
    }

    /// World-space center of a cell.
    #[inline(always)]
    pub fn center_of(&self, ix: u32, iy: u32, iz: u32) -> Vec3 {
        self.meta.center_of(ix, iy, iz)
    }

    /// Assign `value` to every cell.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Rasterize a shape into the grid, assigning `value` to every
    /// selected cell. Selection follows the round mode: `Outside`
    /// includes every cell whose volume may touch the shape, `Inside`
    /// only cells fully contained, `Nearest` decides by center
    /// membership.
    pub fn fill_shape(&mut self, shape: &Shape, value: T, mode: RoundMode) {
        let meta = self.meta;
        let offset = mode.offset(meta.res);
        visit_selected(&meta, |p| shape.sdf(p), offset, |ix, iy, iz| {
            let i = meta.index(ix, iy, iz);
            self.data[i] = value;
            false
        });
    }

    /// Number of cells holding a non-zero value.
    pub fn count(&self) -> usize {
        let zero = T::default();
        self.data.iter().filter(|&&v| v != zero).count()
    }

    /// Number of cells equal to `value`.
    pub fn count_eq(&self, value: T) -> usize {
        self.data.iter().filter(|&&v| v == value).count()
    }

    /// Number of cells strictly less than `value`.
    pub fn count_less_than(&self, value: T) -> usize {
        self.data.iter().filter(|&&v| v < value).count()
    }

    /// Largest cell value.
    pub fn max_value(&self) -> T {
        self.data
            .iter()
            .copied()
            .fold(self.data[0], |m, v| if v > m { v } else { m })
    }

    /// Occupied volume in world units: `count() * res^3`.
    pub fn volume(&self) -> f64 {
        self.count() as f64 * (self.meta.res as f64).powi(3)
    }

    /// True when `pred` holds for every cell inside the shape under
    /// the given round mode. Short-circuits on the first
    /// counterexample.
    pub fn every_inside(
        &self,
        shape: &Shape,
        mode: RoundMode,
        pred: impl Fn(T) -> bool,
    ) -> bool {
        let meta = self.meta;
        let offset = mode.offset(meta.res);
        !visit_selected(&meta, |p| shape.sdf(p), offset, |ix, iy, iz| {
            !pred(self.get(ix, iy, iz))
        })
    }

    /// True when `pred` holds for some cell inside the shape under the
    /// given round mode. Short-circuits on the first witness.
    pub fn any_inside(&self, shape: &Shape, mode: RoundMode, pred: impl Fn(T) -> bool) -> bool {
        let meta = self.meta;
        let offset = mode.offset(meta.res);
        visit_selected(&meta, |p| shape.sdf(p), offset, |ix, iy, iz| {
            pred(self.get(ix, iy, iz))
        })
    }
}

impl HostGrid<f32> {
    /// Sample the shape's signed distance at every cell center,
    /// overwriting the grid. Z-slabs are evaluated in parallel.
    pub fn fill_distance(&mut self, shape: &Shape) {
        let meta = self.meta;
        let slab = meta.num[0] as usize * meta.num[1] as usize;
        self.data
            .par_chunks_mut(slab)
            .enumerate()
            .for_each(|(iz, slice)| {
                for iy in 0..meta.num[1] {
                    let row = iy as usize * meta.num[0] as usize;
                    for ix in 0..meta.num[0] {
                        let p = meta.center_of(ix, iy, iz as u32);
                        slice[row + ix as usize] = shape.sdf(p);
                    }
                }
            });
    }
}
