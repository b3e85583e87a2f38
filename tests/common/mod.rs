//! Common test helpers for kerf integration tests.

use glam::Vec3;
use kerf::prelude::*;

// ============================================================================
// Standard test shapes
// ============================================================================

/// Unit-radius cylinder from the origin to (0,0,2).
#[allow(dead_code)]
pub fn test_cylinder() -> Shape {
    Shape::cylinder(Vec3::ZERO, Vec3::Z, 1.0, 2.0).unwrap()
}

/// Axis-aligned box at (5,5,5) with half-extent 2, the rasterization
/// reference case.
#[allow(dead_code)]
pub fn test_box() -> Shape {
    Shape::oriented_box(
        Vec3::splat(5.0),
        [Vec3::X * 2.0, Vec3::Y * 2.0, Vec3::Z * 2.0],
    )
    .unwrap()
}

/// Long-hole from the origin to (2,0,0), radius 1, extruded 2 along Z.
#[allow(dead_code)]
pub fn test_long_hole() -> Shape {
    Shape::long_hole(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), Vec3::Z, 1.0, 2.0).unwrap()
}

// ============================================================================
// Standard test points
// ============================================================================

/// Deterministic point cloud in [-3, 5]^3; no RNG so failures
/// reproduce.
#[allow(dead_code)]
pub fn scatter_points(count: usize) -> Vec<Vec3> {
    (0..count)
        .map(|i| {
            let t = i as f32;
            Vec3::new(
                ((t * 12.9898).sin() * 4.0) + 1.0,
                ((t * 78.233).sin() * 4.0) + 1.0,
                ((t * 37.719).sin() * 4.0) + 1.0,
            )
        })
        .collect()
}

// ============================================================================
// GPU gate
// ============================================================================

/// Skip marker for GPU suites on machines without an adapter.
#[allow(dead_code)]
pub fn gpu_or_skip() -> Option<GpuContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    if !has_gpu() {
        eprintln!("skipping GPU test: no adapter available");
        return None;
    }
    match GpuContext::new() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}
