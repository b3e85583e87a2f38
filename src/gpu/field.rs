//! Jump-flood distance field and axis-bound reductions.
//!
//! `distance_field` turns an occupancy grid into a grid of Euclidean
//! distances to the nearest occupied cell, the field the path planner
//! steers by. The algorithm is jump flooding: every cell repeatedly
//! inspects neighbors at geometrically shrinking offsets and adopts
//! the best seed it sees, recomputing the distance from its own
//! center. ⌈log₂(max dim)⌉ passes reach every cell.
//!
//! `bound_of_axis` projects the occupied cells of a grid onto a
//! direction and reduces to the min/max of the projections, widened or
//! shrunk by the cell half-diagonal per the requested boundary side.
//! Unoccupied cells contribute the [`INVALID`] sentinel, which the
//! reduce operators map to the far end of the number line so it never
//! wins.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::grid::{CellType, GridMeta};

use super::kernels::{meta_uniforms, workgroups_for, KernelRegistry, WORKGROUP_SIZE};
use super::{DeviceGrid, GpuContext, GpuError};

/// Sentinel marking "no value" in distance outputs and axis-bound
/// projections. Real projections must stay below it; the design
/// trades one word of headroom for simpler kernels.
pub const INVALID: f32 = 65536.0;

/// Which side of the occupancy boundary an axis bound describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Boundary {
    /// Shrink past cell extents: bounds certainly inside the occupancy.
    In,
    /// Expand by cell extents: bounds certainly containing it.
    Out,
    /// Raw cell-center bounds.
    Nearest,
}

/// Closed world-space interval along a direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisInterval {
    /// Lower bound of `dot(dir, center)`.
    pub min: f32,
    /// Upper bound.
    pub max: f32,
}

const FLOOD_SHADER: &str = "\
struct GridDims {
    num: vec4<u32>,
};

struct GridFrame {
    ofs_res: vec4<f32>,
};

@group(0) @binding(0) var<storage, read_write> df: array<vec4<f32>>;
@group(0) @binding(1) var<uniform> dims: GridDims;
@group(0) @binding(2) var<uniform> frame: GridFrame;

// df cell layout: xyz = adopted seed center, w = distance to it.
// w == 0 marks a seed, w < 0 marks no seed known yet.
@compute @workgroup_size(128)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    let n = dims.num.x * dims.num.y * dims.num.z;
    if (i >= n) {
        return;
    }
    var cur = df[i];
    if (cur.w == 0.0) {
        return;
    }

    let nx = i32(dims.num.x);
    let ny = i32(dims.num.y);
    let nz = i32(dims.num.z);
    let ix = i32(i % dims.num.x);
    let iy = i32((i / dims.num.x) % dims.num.y);
    let iz = i32(i / (dims.num.x * dims.num.y));
    let p = frame.ofs_res.xyz
        + (vec3<f32>(f32(ix), f32(iy), f32(iz)) + vec3<f32>(0.5)) * frame.ofs_res.w;
    let s = i32(dims.num.w);

    for (var dz = -1; dz <= 1; dz = dz + 1) {
        for (var dy = -1; dy <= 1; dy = dy + 1) {
            for (var dx = -1; dx <= 1; dx = dx + 1) {
                if (dx == 0 && dy == 0 && dz == 0) {
                    continue;
                }
                let jx = ix + dx * s;
                let jy = iy + dy * s;
                let jz = iz + dz * s;
                if (jx < 0 || jy < 0 || jz < 0 || jx >= nx || jy >= ny || jz >= nz) {
                    continue;
                }
                let j = u32(jx) + u32(jy) * dims.num.x + u32(jz) * dims.num.x * dims.num.y;
                let nb = df[j];
                if (nb.w < 0.0) {
                    continue;
                }
                let d = distance(p, nb.xyz);
                if (cur.w < 0.0 || d < cur.w) {
                    cur = vec4<f32>(nb.xyz, d);
                }
            }
        }
    }
    df[i] = cur;
}
";

/// Compiled distance-field and axis-bound kernels.
///
/// Seed initialization, distance extraction and the axis-bound
/// masks/reductions are ordinary registry kernels; only the flood
/// pass needs its own pipeline, because it reads and writes one grid
/// in place (each cell writes only its own slot, the classic benign
/// jump-flood race).
pub struct FieldKernels {
    ctx: Arc<GpuContext>,
    kernels: KernelRegistry,
    flood_pipeline: wgpu::ComputePipeline,
    flood_layout: wgpu::BindGroupLayout,
    mask_names: HashMap<[u32; 3], String>,
}

impl FieldKernels {
    /// Compile the built-in kernels.
    pub fn new(ctx: Arc<GpuContext>) -> Result<Self, GpuError> {
        let mut kernels = KernelRegistry::new(ctx.clone());

        kernels.register_map_fn(
            "df_seed",
            CellType::U32,
            CellType::Vec4F,
            "vo = select(vec4<f32>(0.0, 0.0, 0.0, -1.0), vec4<f32>(p, 0.0), vi > 0u);",
        )?;
        kernels.register_map_fn(
            "df_extract",
            CellType::Vec4F,
            CellType::F32,
            "vo = select(65536.0, vi.w, vi.w >= 0.0);",
        )?;
        kernels.register_reduce_fn(
            "axis_min",
            CellType::F32,
            "65536.0",
            "var av = a;\n\
             if (av >= 65536.0) { av = 3.4028235e38; }\n\
             var bv = b;\n\
             if (bv >= 65536.0) { bv = 3.4028235e38; }\n\
             vo = min(av, bv);",
        )?;
        kernels.register_reduce_fn(
            "axis_max",
            CellType::F32,
            "65536.0",
            "var av = a;\n\
             if (av >= 65536.0) { av = -3.4028235e38; }\n\
             var bv = b;\n\
             if (bv >= 65536.0) { bv = -3.4028235e38; }\n\
             vo = max(av, bv);",
        )?;

        let device = &ctx.device;
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("kerf jump flood"),
            source: wgpu::ShaderSource::Wgsl(FLOOD_SHADER.into()),
        });
        let flood_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kerf jump flood"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kerf jump flood"),
            bind_group_layouts: &[&flood_layout],
            push_constant_ranges: &[],
        });
        let flood_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("kerf jump flood"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Ok(FieldKernels {
            ctx,
            kernels,
            flood_pipeline,
            flood_layout,
            mask_names: HashMap::new(),
        })
    }

    /// Compute, for every cell of `dist`, the Euclidean distance from
    /// its center to the center of the nearest seed cell (a cell of
    /// `seed` with value > 0). Cells that never see a seed (only
    /// possible when `seed` is empty) receive [`INVALID`].
    ///
    /// `seed` must be U32, `dist` F32, same geometry. Each flood pass
    /// is followed by an explicit device wait so the next pass
    /// observes its writes.
    pub fn distance_field(&self, seed: &DeviceGrid, dist: &DeviceGrid) -> Result<(), GpuError> {
        let meta = *seed.meta();
        if meta.cell != CellType::U32 {
            return Err(GpuError::CellTypeMismatch {
                expected: CellType::U32,
                actual: meta.cell,
            });
        }
        if dist.meta().cell != CellType::F32 {
            return Err(GpuError::CellTypeMismatch {
                expected: CellType::F32,
                actual: dist.meta().cell,
            });
        }
        if !meta.same_geometry(dist.meta()) {
            return Err(GpuError::Grid(crate::grid::GridError::GeometryMismatch));
        }
        seed.buffer()?;
        dist.buffer()?;

        let df_meta = GridMeta {
            cell: CellType::Vec4F,
            ..meta
        };
        let mut df = DeviceGrid::new(&self.ctx, df_meta);
        self.kernels.map("df_seed", seed, &df)?;

        let max_dim = meta.num.into_iter().max().unwrap_or(1);
        let passes = if max_dim <= 1 {
            0
        } else {
            32 - (max_dim - 1).leading_zeros()
        };
        log::debug!("distance field: {passes} flood passes over {:?}", meta.num);
        for k in 0..passes {
            let step = 1u32 << (passes - 1 - k);
            self.flood_pass(&df, step)?;
            // The next pass must observe this one's in-place writes.
            self.ctx.device.poll(wgpu::Maintain::Wait);
        }

        self.kernels.map("df_extract", &df, dist)?;
        df.destroy();
        Ok(())
    }

    fn flood_pass(&self, df: &DeviceGrid, step: u32) -> Result<(), GpuError> {
        let device = &self.ctx.device;
        let meta = df.meta();
        let (dims, frame) = meta_uniforms(device, meta.num, step, meta.ofs, meta.res);
        let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kerf jump flood"),
            layout: &self.flood_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: df.buffer()?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: dims.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: frame.as_entire_binding(),
                },
            ],
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("kerf jump flood"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("kerf jump flood"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.flood_pipeline);
            pass.set_bind_group(0, &bind, &[]);
            pass.dispatch_workgroups(workgroups_for(meta.cell_count() as u32), 1, 1);
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        log::trace!("flood pass, step {step}");
        Ok(())
    }

    /// World-space interval along `dir` spanned by the occupied cells
    /// (value > 0) of a U32 grid.
    ///
    /// `dir` must be unit length but is otherwise arbitrary; the mask
    /// kernel for a direction is compiled on first use and cached.
    /// Raw center bounds are widened by the cell half-diagonal for
    /// [`Boundary::Out`], shrunk for [`Boundary::In`] and untouched
    /// for [`Boundary::Nearest`]. Returns `None` for an empty
    /// occupancy, or when an `In` shrink inverts the interval (the
    /// occupancy is thinner than one cell diagonal).
    pub fn bound_of_axis(
        &mut self,
        dir: Vec3,
        grid: &DeviceGrid,
        boundary: Boundary,
    ) -> Result<Option<AxisInterval>, GpuError> {
        if (dir.length() - 1.0).abs() > 1e-4 {
            return Err(GpuError::NonUnitDirection);
        }
        let meta = *grid.meta();
        if meta.cell != CellType::U32 {
            return Err(GpuError::CellTypeMismatch {
                expected: CellType::U32,
                actual: meta.cell,
            });
        }
        grid.buffer()?;

        let mask = self.mask_kernel(dir)?;
        let mut projected = DeviceGrid::new(
            &self.ctx,
            GridMeta {
                cell: CellType::F32,
                ..meta
            },
        );
        self.kernels.map(&mask, grid, &projected)?;
        let raw_min: f32 = self.kernels.reduce("axis_min", &projected)?;
        let raw_max: f32 = self.kernels.reduce("axis_max", &projected)?;
        projected.destroy();

        if !(raw_min <= raw_max) {
            return Ok(None);
        }
        let pad = meta.half_diag();
        let (min, max) = match boundary {
            Boundary::Out => (raw_min - pad, raw_max + pad),
            Boundary::In => (raw_min + pad, raw_max - pad),
            Boundary::Nearest => (raw_min, raw_max),
        };
        if min > max {
            return Ok(None);
        }
        Ok(Some(AxisInterval { min, max }))
    }

    /// Mask kernel for a direction: projects occupied cell centers
    /// onto `dir`, everything else to the sentinel. Compiled once per
    /// distinct direction.
    fn mask_kernel(&mut self, dir: Vec3) -> Result<String, GpuError> {
        let key = [dir.x.to_bits(), dir.y.to_bits(), dir.z.to_bits()];
        if let Some(name) = self.mask_names.get(&key) {
            return Ok(name.clone());
        }
        let name = format!("axis_mask_{}", self.mask_names.len());
        let body = format!(
            "vo = select(65536.0, dot(vec3<f32>({:?}, {:?}, {:?}), p), vi > 0u);",
            dir.x, dir.y, dir.z
        );
        self.kernels
            .register_map_fn(&name, CellType::U32, CellType::F32, &body)?;
        self.mask_names.insert(key, name.clone());
        Ok(name)
    }
}

// Reduce rounds shrink by the workgroup size each time; anything else
// would break the round planning in the registry.
const _: () = assert!(WORKGROUP_SIZE.is_power_of_two());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flood_pass_count() {
        // Mirrors the pass computation in distance_field.
        let passes = |max_dim: u32| -> u32 {
            if max_dim <= 1 {
                0
            } else {
                32 - (max_dim - 1).leading_zeros()
            }
        };
        assert_eq!(passes(1), 0);
        assert_eq!(passes(2), 1);
        assert_eq!(passes(8), 3);
        assert_eq!(passes(9), 4);
        assert_eq!(passes(1024), 10);
    }
}
