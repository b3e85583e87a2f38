//! Block-hierarchical traversal of shape-selected cells.
//!
//! Walking every cell of a large grid against an SDF is wasteful when
//! the shape covers a small fraction of it. Because the primitives in
//! [`crate::shape`] are true SDFs (1-Lipschitz lower bounds of the
//! Euclidean distance), one evaluation at the center of an 8-cell
//! block can prove that no cell center in the block passes the
//! selection threshold, and the whole block is skipped.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::grid::{GridMeta, SQRT_3};

/// Cells per block edge.
pub const BLOCK: u32 = 8;

/// Policy for quantizing a continuous shape onto discrete cells.
///
/// Selection tests `sdf(center) <= offset`, with the offset derived
/// from the half-diagonal of a cell (`res * sqrt(3) / 2`): `Outside`
/// conservatively includes every cell whose volume may touch the
/// shape, `Inside` keeps only cells fully contained, `Nearest`
/// decides by the center alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundMode {
    /// Only cells fully contained in the shape.
    Inside,
    /// Every cell whose volume touches the shape.
    Outside,
    /// Cells whose center lies in the shape.
    Nearest,
}

impl RoundMode {
    /// Selection threshold offset for a grid of the given resolution.
    #[inline(always)]
    pub fn offset(self, res: f32) -> f32 {
        let half_diag = res * SQRT_3 * 0.5;
        match self {
            RoundMode::Inside => -half_diag,
            RoundMode::Outside => half_diag,
            RoundMode::Nearest => 0.0,
        }
    }
}

/// Visit every cell with `sdf(center) <= offset`.
///
/// The grid is partitioned into blocks of [`BLOCK`] cells per side; a
/// block is pruned when the SDF at its center exceeds
/// `offset + res * BLOCK * sqrt(3) / 2` (the block half-diagonal), a
/// sound rejection for any 1-Lipschitz `sdf`. Surviving blocks are
/// enumerated z-major, then y, then x. The visitor returns `true` to
/// stop; the function returns `true` iff the traversal was stopped
/// early.
pub fn visit_selected<S, V>(meta: &GridMeta, sdf: S, offset: f32, mut visit: V) -> bool
where
    S: Fn(Vec3) -> f32,
    V: FnMut(u32, u32, u32) -> bool,
{
    let [nx, ny, nz] = meta.num;
    let block_world = BLOCK as f32 * meta.res;
    let reject = offset + block_world * SQRT_3 * 0.5;

    for bz in (0..nz).step_by(BLOCK as usize) {
        for by in (0..ny).step_by(BLOCK as usize) {
            for bx in (0..nx).step_by(BLOCK as usize) {
                // Center of the full block region, even when the grid
                // clips it; the rejection radius covers the whole
                // block, so this stays conservative.
                let center = meta.ofs
                    + (Vec3::new(bx as f32, by as f32, bz as f32)
                        + Vec3::splat(BLOCK as f32 * 0.5))
                        * meta.res;
                if sdf(center) > reject {
                    continue;
                }

                for iz in bz..(bz + BLOCK).min(nz) {
                    for iy in by..(by + BLOCK).min(ny) {
                        for ix in bx..(bx + BLOCK).min(nx) {
                            if sdf(meta.center_of(ix, iy, iz)) <= offset
                                && visit(ix, iy, iz)
                            {
                                return true;
                            }
                        }
                    }
                }
            }
        }
    }
    false
}
