//! Extruded long-hole SDF.
//!
//! A long-hole is what an end mill leaves when it plunges and travels:
//! a stadium (rectangle with semicircular caps) swept along the
//! extrusion axis. The section lives in the plane perpendicular to the
//! axis; the spine of the stadium is the segment `start`–`end`.

use glam::{Vec2, Vec3};

/// Signed distance to an extruded long-hole.
///
/// `axis` must be unit length and perpendicular to `end - start`. The
/// solid spans `[0, height]` along `axis`, measured from the plane
/// containing `start`.
///
/// In-plane, the distance is the distance to the spine segment minus
/// `radius` (a stadium). The axial slab distance is combined with it
/// exactly as in [`crate::shape::sdf_cylinder_between`].
#[inline(always)]
pub fn sdf_long_hole(
    point: Vec3,
    start: Vec3,
    end: Vec3,
    axis: Vec3,
    radius: f32,
    height: f32,
) -> f32 {
    let w = point - start;
    let a = w.dot(axis);
    let planar = w - axis * a;

    let span = end - start;
    let span_sq = span.length_squared();
    let t = if span_sq > 0.0 {
        (planar.dot(span) / span_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let radial = (planar - span * t).length() - radius;
    let axial = (a - height * 0.5).abs() - height * 0.5;
    axial.max(radial).min(0.0) + Vec2::new(axial.max(0.0), radial.max(0.0)).length()
}
