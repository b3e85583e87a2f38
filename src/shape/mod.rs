//! Tool-shape primitives and their signed distance functions.
//!
//! The planner describes electrode and wheel volumes with three
//! primitives: a capped cylinder, an extruded long-hole (stadium
//! section swept along an axis) and an oriented box. Every primitive
//! evaluates to a true signed distance: negative inside, zero on the
//! boundary, positive outside, and 1-Lipschitz, so the magnitude
//! lower-bounds the Euclidean distance to the surface. Block culling
//! in [`crate::traverse`] and the round-mode offsets rely on that
//! bound being honest.

mod cylinder;
mod long_hole;
mod oriented_box;

pub use cylinder::sdf_cylinder_between;
pub use long_hole::sdf_long_hole;
pub use oriented_box::sdf_oriented_box;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance for unit-length direction checks.
const UNIT_EPS: f32 = 1e-4;
/// Tolerance for perpendicularity checks, relative to operand lengths.
const ORTHO_EPS: f32 = 1e-4;

/// Error raised by shape constructors when the supplied geometry is
/// inconsistent.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ShapeError {
    /// A direction vector was not unit length.
    #[error("direction must be unit length, got length {0}")]
    NonUnitAxis(f32),

    /// The long-hole span is not perpendicular to the extrusion axis.
    #[error("long-hole span must be perpendicular to the extrusion axis")]
    SkewedSpan,

    /// The box half-axes are not mutually perpendicular.
    #[error("box half-axes must be mutually perpendicular")]
    SkewedHalfAxes,

    /// A box half-axis has zero length.
    #[error("box half-axes must have non-zero length")]
    DegenerateHalfAxis,

    /// A radius or height was negative.
    #[error("{0} must be non-negative")]
    NegativeExtent(&'static str),
}

/// A tool-shaped region of space.
///
/// Construct through [`Shape::cylinder`], [`Shape::long_hole`] or
/// [`Shape::oriented_box`]; the constructors validate the geometric
/// invariants the distance functions depend on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Capped cylinder from `base` to `base + height * axis`.
    Cylinder {
        /// Center of the bottom cap.
        base: Vec3,
        /// Unit direction of the cylinder axis.
        axis: Vec3,
        /// Cylinder radius.
        radius: f32,
        /// Distance between the caps.
        height: f32,
    },
    /// Extruded long-hole: a stadium of `radius` around the segment
    /// `start`–`end`, extruded by `height` along `axis`.
    LongHole {
        /// One end of the stadium spine, on the bottom face.
        start: Vec3,
        /// Other end of the stadium spine.
        end: Vec3,
        /// Unit extrusion direction, perpendicular to `end - start`.
        axis: Vec3,
        /// Stadium radius.
        radius: f32,
        /// Extrusion depth.
        height: f32,
    },
    /// Box centered at `center` spanned by three mutually
    /// perpendicular half-axis vectors.
    OrientedBox {
        /// Box center.
        center: Vec3,
        /// Half-axis vectors; their lengths are the half-extents.
        half_axes: [Vec3; 3],
    },
}

fn check_unit(axis: Vec3) -> Result<(), ShapeError> {
    let len = axis.length();
    if (len - 1.0).abs() > UNIT_EPS {
        return Err(ShapeError::NonUnitAxis(len));
    }
    Ok(())
}

fn check_extent(value: f32, what: &'static str) -> Result<(), ShapeError> {
    if value < 0.0 {
        return Err(ShapeError::NegativeExtent(what));
    }
    Ok(())
}

impl Shape {
    /// Create a capped cylinder from `base` to `base + height * axis`.
    ///
    /// `axis` must be unit length; `radius` and `height` must be
    /// non-negative.
    pub fn cylinder(base: Vec3, axis: Vec3, radius: f32, height: f32) -> Result<Self, ShapeError> {
        check_unit(axis)?;
        check_extent(radius, "radius")?;
        check_extent(height, "height")?;
        Ok(Shape::Cylinder {
            base,
            axis,
            radius,
            height,
        })
    }

    /// Create an extruded long-hole.
    ///
    /// The section is a stadium of `radius` along the segment
    /// `start`–`end`; the solid is that section extruded by `height`
    /// along `axis`. `axis` must be unit length and perpendicular to
    /// `end - start`. A degenerate span (`start == end`) is allowed
    /// and yields a cylinder.
    pub fn long_hole(
        start: Vec3,
        end: Vec3,
        axis: Vec3,
        radius: f32,
        height: f32,
    ) -> Result<Self, ShapeError> {
        check_unit(axis)?;
        check_extent(radius, "radius")?;
        check_extent(height, "height")?;
        let span = end - start;
        if span.dot(axis).abs() > ORTHO_EPS * span.length().max(1.0) {
            return Err(ShapeError::SkewedSpan);
        }
        Ok(Shape::LongHole {
            start,
            end,
            axis,
            radius,
            height,
        })
    }

    /// Create an oriented box from its center and three mutually
    /// perpendicular half-axis vectors.
    pub fn oriented_box(center: Vec3, half_axes: [Vec3; 3]) -> Result<Self, ShapeError> {
        for h in &half_axes {
            if h.length_squared() == 0.0 {
                return Err(ShapeError::DegenerateHalfAxis);
            }
        }
        for i in 0..3 {
            for j in (i + 1)..3 {
                let bound = ORTHO_EPS * half_axes[i].length() * half_axes[j].length();
                if half_axes[i].dot(half_axes[j]).abs() > bound {
                    return Err(ShapeError::SkewedHalfAxes);
                }
            }
        }
        Ok(Shape::OrientedBox { center, half_axes })
    }

    /// Signed distance from `point` to the shape surface.
    ///
    /// Negative inside, positive outside, zero on the boundary.
    #[inline]
    pub fn sdf(&self, point: Vec3) -> f32 {
        match *self {
            Shape::Cylinder {
                base,
                axis,
                radius,
                height,
            } => sdf_cylinder_between(point, base, axis, radius, height),
            Shape::LongHole {
                start,
                end,
                axis,
                radius,
                height,
            } => sdf_long_hole(point, start, end, axis, radius, height),
            Shape::OrientedBox { center, half_axes } => {
                sdf_oriented_box(point, center, half_axes)
            }
        }
    }
}
