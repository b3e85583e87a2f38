//! Oriented box SDF.

use glam::Vec3;

/// Signed distance to a box centered at `center` and spanned by three
/// mutually perpendicular half-axis vectors.
///
/// The point is expressed in the frame of the normalized half-axes;
/// from there it is the standard box distance: componentwise absolute
/// value minus the half-extents, exterior length plus clamped interior
/// maximum.
#[inline(always)]
pub fn sdf_oriented_box(point: Vec3, center: Vec3, half_axes: [Vec3; 3]) -> f32 {
    let w = point - center;
    let mut q = Vec3::ZERO;
    for i in 0..3 {
        let len = half_axes[i].length();
        q[i] = (w.dot(half_axes[i]) / len).abs() - len;
    }
    q.max(Vec3::ZERO).length() + q.x.max(q.y.max(q.z)).min(0.0)
}
