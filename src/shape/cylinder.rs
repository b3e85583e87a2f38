//! Capped cylinder SDF.

use glam::{Vec2, Vec3};

/// Signed distance to a capped cylinder.
///
/// The cylinder runs from `base` to `base + height * axis` with the
/// given radius. `axis` must be unit length (the constructor in
/// [`crate::shape::Shape`] enforces this).
///
/// The point is decomposed into an axial coordinate along `axis` and a
/// radial remainder; each gives a 1D slab distance, and the two are
/// combined with the usual interior/exterior split: the interior term
/// is the larger (least negative) of the clamped distances, the
/// exterior term is the length of the positive parts.
#[inline(always)]
pub fn sdf_cylinder_between(point: Vec3, base: Vec3, axis: Vec3, radius: f32, height: f32) -> f32 {
    let w = point - base;
    let a = w.dot(axis);
    let radial = (w - axis * a).length() - radius;
    let axial = (a - height * 0.5).abs() - height * 0.5;
    axial.max(radial).min(0.0) + Vec2::new(axial.max(0.0), radial.max(0.0)).length()
}
