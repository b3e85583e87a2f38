//! Triangle-soup surface dicing.
//!
//! The planner feeds the engine triangulated part surfaces as a flat
//! float sequence (three vertices of three coordinates per triangle,
//! world units). Dicing marks every cell whose volume may touch the
//! surface: a cell is marked when its center lies within the cell
//! half-diagonal of some triangle, the same conservative bound the
//! `Outside` round mode uses for shapes.

use glam::Vec3;

use crate::grid::{GridError, HostCell, HostGrid};

/// Unsigned distance from `point` to the triangle (`v0`, `v1`, `v2`).
///
/// Face distance when the point projects inside the triangle,
/// otherwise the distance to the nearest edge. Degenerate triangles
/// fall back to edge distance.
#[inline(always)]
fn triangle_distance(point: Vec3, v0: Vec3, v1: Vec3, v2: Vec3) -> f32 {
    let e0 = v1 - v0;
    let e1 = v2 - v1;
    let e2 = v0 - v2;

    let n = e0.cross(e1);

    let p0 = point - v0;
    let p1 = point - v1;
    let p2 = point - v2;

    let n_sq = n.length_squared();
    if n_sq > 0.0 {
        let d0 = e0.cross(n).dot(p0);
        let d1 = e1.cross(n).dot(p1);
        let d2 = e2.cross(n).dot(p2);
        if d0 >= 0.0 && d1 >= 0.0 && d2 >= 0.0 {
            // Projects inside the face.
            return p0.dot(n).abs() / n_sq.sqrt();
        }
    }

    let c0 = e0 * (p0.dot(e0) / e0.dot(e0)).clamp(0.0, 1.0) - p0;
    let c1 = e1 * (p1.dot(e1) / e1.dot(e1)).clamp(0.0, 1.0) - p1;
    let c2 = e2 * (p2.dot(e2) / e2.dot(e2)).clamp(0.0, 1.0) - p2;

    c0.length_squared()
        .min(c1.length_squared())
        .min(c2.length_squared())
        .sqrt()
}

/// Mark every cell whose center lies within the cell half-diagonal of
/// the triangle soup's surface.
///
/// `soup` holds 9 floats per triangle. Cells are assigned `value`;
/// untouched cells keep their contents. Returns the number of cells
/// written (cells touched by several triangles count once per write).
pub fn dice_surface<T: HostCell>(
    grid: &mut HostGrid<T>,
    soup: &[f32],
    value: T,
) -> Result<usize, GridError> {
    if soup.len() % 9 != 0 {
        return Err(GridError::RaggedTriangleSoup(soup.len()));
    }

    let meta = *grid.meta();
    let hd = meta.half_diag();
    let mut written = 0usize;

    for tri in soup.chunks_exact(9) {
        let v0 = Vec3::new(tri[0], tri[1], tri[2]);
        let v1 = Vec3::new(tri[3], tri[4], tri[5]);
        let v2 = Vec3::new(tri[6], tri[7], tri[8]);

        let lo = v0.min(v1).min(v2) - Vec3::splat(hd);
        let hi = v0.max(v1).max(v2) + Vec3::splat(hd);

        // Cell-center index range overlapping the padded bounds.
        let mut lo_i = [0u32; 3];
        let mut hi_i = [0u32; 3];
        let mut empty = false;
        for axis in 0..3 {
            let a = ((lo[axis] - meta.ofs[axis]) / meta.res - 0.5).ceil().max(0.0);
            let b = ((hi[axis] - meta.ofs[axis]) / meta.res - 0.5).floor();
            if b < a || b < 0.0 || a >= meta.num[axis] as f32 {
                empty = true;
                break;
            }
            lo_i[axis] = a as u32;
            hi_i[axis] = (b as u32).min(meta.num[axis] - 1);
        }
        if empty {
            continue;
        }

        for iz in lo_i[2]..=hi_i[2] {
            for iy in lo_i[1]..=hi_i[1] {
                for ix in lo_i[0]..=hi_i[0] {
                    let c = meta.center_of(ix, iy, iz);
                    if triangle_distance(c, v0, v1, v2) <= hd {
                        grid.set(ix, iy, iz, value);
                        written += 1;
                    }
                }
            }
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_distance_face_and_edge() {
        let v0 = Vec3::ZERO;
        let v1 = Vec3::new(2.0, 0.0, 0.0);
        let v2 = Vec3::new(0.0, 2.0, 0.0);
        // Above the face interior.
        let d = triangle_distance(Vec3::new(0.5, 0.5, 1.0), v0, v1, v2);
        assert!((d - 1.0).abs() < 1e-6);
        // Beyond the v0-v1 edge.
        let d = triangle_distance(Vec3::new(1.0, -2.0, 0.0), v0, v1, v2);
        assert!((d - 2.0).abs() < 1e-6);
        // At a vertex.
        let d = triangle_distance(v2, v0, v1, v2);
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn ragged_soup_is_rejected() {
        let mut g: HostGrid<u32> = HostGrid::new(1.0, [4, 4, 4], Vec3::ZERO).unwrap();
        assert_eq!(
            dice_surface(&mut g, &[0.0; 7], 1),
            Err(GridError::RaggedTriangleSoup(7))
        );
    }

    #[test]
    fn dices_a_plane_slab() {
        // Triangle spanning the z = 2.0 plane across the whole grid.
        let mut g: HostGrid<u32> = HostGrid::new(1.0, [8, 8, 8], Vec3::ZERO).unwrap();
        let soup = [
            -10.0, -10.0, 2.0, //
            30.0, -10.0, 2.0, //
            -10.0, 30.0, 2.0,
        ];
        let written = dice_surface(&mut g, &soup, 1).unwrap();
        assert!(written > 0);
        // Centers at z = 1.5 and 2.5 are within half_diag (~0.866);
        // centers at z = 0.5 or 3.5 are not.
        assert_eq!(g.get(3, 3, 1), 1);
        assert_eq!(g.get(3, 3, 2), 1);
        assert_eq!(g.get(3, 3, 0), 0);
        assert_eq!(g.get(3, 3, 3), 0);
    }

    #[test]
    fn triangle_outside_grid_marks_nothing() {
        let mut g: HostGrid<u32> = HostGrid::new(1.0, [4, 4, 4], Vec3::ZERO).unwrap();
        let soup = [
            100.0, 100.0, 100.0, //
            101.0, 100.0, 100.0, //
            100.0, 101.0, 100.0,
        ];
        assert_eq!(dice_surface(&mut g, &soup, 7).unwrap(), 0);
        assert_eq!(g.count(), 0);
    }
}
