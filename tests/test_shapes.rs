//! Integration tests: shape SDF values and the Lipschitz contract.

mod common;

use approx::assert_relative_eq;
use common::*;
use glam::Vec3;
use kerf::prelude::*;

// ============================================================================
// Reference distances
// ============================================================================

#[test]
fn cylinder_reference_distances() {
    let cyl = test_cylinder();
    assert_relative_eq!(cyl.sdf(Vec3::new(0.0, 0.0, 1.0)), -1.0, epsilon = 1e-6);
    assert_relative_eq!(cyl.sdf(Vec3::new(1.0, 0.0, 1.0)), 0.0, epsilon = 1e-6);
    assert_relative_eq!(cyl.sdf(Vec3::new(2.0, 0.0, 1.0)), 1.0, epsilon = 1e-6);
    assert_relative_eq!(cyl.sdf(Vec3::new(0.0, 0.0, -0.5)), 0.5, epsilon = 1e-6);
    assert_relative_eq!(cyl.sdf(Vec3::new(0.0, 0.0, 3.0)), 1.0, epsilon = 1e-6);
}

#[test]
fn box_reference_distances() {
    let b = Shape::oriented_box(
        Vec3::ZERO,
        [Vec3::X, Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, 0.0, 3.0)],
    )
    .unwrap();
    assert_relative_eq!(b.sdf(Vec3::ZERO), -1.0, epsilon = 1e-6);
    assert_relative_eq!(b.sdf(Vec3::new(1.0, 0.0, 0.0)), 0.0, epsilon = 1e-6);
    assert_relative_eq!(b.sdf(Vec3::new(2.0, 0.0, 0.0)), 1.0, epsilon = 1e-6);
    assert_relative_eq!(
        b.sdf(Vec3::new(2.0, 3.0, 4.0)),
        3.0f32.sqrt(),
        epsilon = 1e-6
    );
}

#[test]
fn long_hole_reference_distances() {
    let lh = test_long_hole();
    // Under the spine, mid-extrusion.
    assert_relative_eq!(lh.sdf(Vec3::new(1.0, 0.0, 1.0)), -1.0, epsilon = 1e-6);
    // On the stadium cap.
    assert_relative_eq!(lh.sdf(Vec3::new(3.0, 0.0, 1.0)), 0.0, epsilon = 1e-6);
    // Past the top face.
    assert_relative_eq!(lh.sdf(Vec3::new(1.0, 0.0, 3.0)), 1.0, epsilon = 1e-6);
}

// ============================================================================
// SDF contract
// ============================================================================

#[test]
fn all_shapes_are_lipschitz() {
    let shapes = [test_cylinder(), test_box(), test_long_hole()];
    let points = scatter_points(64);
    for shape in &shapes {
        for (i, &a) in points.iter().enumerate() {
            for &b in &points[i + 1..] {
                let da = shape.sdf(a);
                let db = shape.sdf(b);
                let dist = (a - b).length();
                assert!(
                    (da - db).abs() <= dist + 1e-4,
                    "Lipschitz violation for {shape:?}: |{da} - {db}| > {dist}"
                );
            }
        }
    }
}

#[test]
fn sdf_sign_matches_membership() {
    // A point well inside each shape is negative, one far away is
    // positive and at least its distance to the shape's bounding
    // region.
    let far = Vec3::splat(100.0);
    for shape in [test_cylinder(), test_box(), test_long_hole()] {
        assert!(shape.sdf(far) > 50.0, "{shape:?} far distance too small");
    }
    assert!(test_cylinder().sdf(Vec3::new(0.0, 0.0, 1.0)) < 0.0);
    assert!(test_box().sdf(Vec3::splat(5.0)) < 0.0);
    assert!(test_long_hole().sdf(Vec3::new(1.0, 0.0, 1.0)) < 0.0);
}

// ============================================================================
// Constructor validation
// ============================================================================

#[test]
fn constructors_validate_geometry() {
    assert!(matches!(
        Shape::cylinder(Vec3::ZERO, Vec3::Z * 0.9, 1.0, 1.0),
        Err(ShapeError::NonUnitAxis(_))
    ));
    assert!(matches!(
        Shape::long_hole(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.5), Vec3::Z, 0.5, 1.0),
        Err(ShapeError::SkewedSpan)
    ));
    assert!(matches!(
        Shape::oriented_box(Vec3::ZERO, [Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Z]),
        Err(ShapeError::SkewedHalfAxes)
    ));
}
