//! Programmable per-voxel kernel registry and dispatcher.
//!
//! Callers register small WGSL bodies under a name once; registration
//! wraps the body in a generated compute shader, compiles it to a
//! pipeline and caches it for the life of the registry
//! (compile-once/dispatch-many). Three kernel forms exist:
//!
//! - **map**: per cell, the body sees `p` (world-space cell center)
//!   and `vi` (input value) and assigns `vo`.
//! - **map2**: two inputs, `vi1` and `vi2`, one output `vo`.
//! - **reduce**: the body combines `a` and `b` into `vo`; it must be
//!   pure, commutative and associative, with the registered init
//!   expression as neutral element. The dispatcher folds tree-wise
//!   inside each workgroup over shared memory, then iterates across
//!   rounds until a single element remains.
//!
//! Every dispatch binds two 16-byte uniform buffers with the grid
//! metadata: `(num_x, num_y, num_z, aux)` and `(ofs.xyz, res)`. `aux`
//! is zero here; the jump-flood kernel in [`super::field`] carries its
//! step size in it. Input and output bindings are guaranteed distinct:
//! when a caller passes the same grid as input and output, the
//! dispatcher runs the kernel into a shadow grid and copies back, so
//! kernel bodies never observe aliasing.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;

use crate::grid::{CellType, GridError, GridMeta};

use super::{transfer, DeviceGrid, GpuContext, GpuError};

/// Threads per workgroup for all generated kernels.
pub const WORKGROUP_SIZE: u32 = 128;

/// Value types a reduce can hand back to the CPU.
pub trait CellValue: bytemuck::Pod {
    /// The matching cell type tag.
    const CELL: CellType;
}

impl CellValue for u32 {
    const CELL: CellType = CellType::U32;
}

impl CellValue for f32 {
    const CELL: CellType = CellType::F32;
}

impl CellValue for glam::Vec4 {
    const CELL: CellType = CellType::Vec4F;
}

struct MapKernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    input: CellType,
    output: CellType,
}

struct Map2Kernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    input1: CellType,
    input2: CellType,
    output: CellType,
}

struct ReduceKernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    value: CellType,
}

/// Compiled per-voxel kernels, keyed by user-chosen name.
pub struct KernelRegistry {
    ctx: Arc<GpuContext>,
    maps: HashMap<String, MapKernel>,
    map2s: HashMap<String, Map2Kernel>,
    reduces: HashMap<String, ReduceKernel>,
}

const SHADER_PRELUDE: &str = "\
struct GridDims {
    num: vec4<u32>,
};

struct GridFrame {
    ofs_res: vec4<f32>,
};
";

/// Index decomposition and cell-center computation shared by the
/// map templates.
const CELL_SETUP: &str = "\
    let i = gid.x;
    let n = dims.num.x * dims.num.y * dims.num.z;
    if (i >= n) {
        return;
    }
    let ix = i % dims.num.x;
    let iy = (i / dims.num.x) % dims.num.y;
    let iz = i / (dims.num.x * dims.num.y);
    let p = frame.ofs_res.xyz
        + (vec3<f32>(f32(ix), f32(iy), f32(iz)) + vec3<f32>(0.5)) * frame.ofs_res.w;
";

fn map_shader(input: CellType, output: CellType, body: &str) -> String {
    format!(
        "{prelude}
@group(0) @binding(0) var<storage, read> vin: array<{in_ty}>;
@group(0) @binding(1) var<storage, read_write> vout: array<{out_ty}>;
@group(0) @binding(2) var<uniform> dims: GridDims;
@group(0) @binding(3) var<uniform> frame: GridFrame;

@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {{
{setup}
    let vi = vin[i];
    var vo: {out_ty};
    {body}
    vout[i] = vo;
}}
",
        prelude = SHADER_PRELUDE,
        in_ty = input.wgsl(),
        out_ty = output.wgsl(),
        wg = WORKGROUP_SIZE,
        setup = CELL_SETUP,
        body = body,
    )
}

fn map2_shader(input1: CellType, input2: CellType, output: CellType, body: &str) -> String {
    format!(
        "{prelude}
@group(0) @binding(0) var<storage, read> vin1: array<{in1}>;
@group(0) @binding(1) var<storage, read> vin2: array<{in2}>;
@group(0) @binding(2) var<storage, read_write> vout: array<{out_ty}>;
@group(0) @binding(3) var<uniform> dims: GridDims;
@group(0) @binding(4) var<uniform> frame: GridFrame;

@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {{
{setup}
    let vi1 = vin1[i];
    let vi2 = vin2[i];
    var vo: {out_ty};
    {body}
    vout[i] = vo;
}}
",
        prelude = SHADER_PRELUDE,
        in1 = input1.wgsl(),
        in2 = input2.wgsl(),
        out_ty = output.wgsl(),
        wg = WORKGROUP_SIZE,
        setup = CELL_SETUP,
        body = body,
    )
}

fn reduce_shader(value: CellType, init: &str, body: &str) -> String {
    format!(
        "{prelude}
@group(0) @binding(0) var<storage, read> vin: array<{val}>;
@group(0) @binding(1) var<storage, read_write> vout: array<{val}>;
@group(0) @binding(2) var<uniform> dims: GridDims;
@group(0) @binding(3) var<uniform> frame: GridFrame;

var<workgroup> scratch: array<{val}, {wg}>;

@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>,
        @builtin(local_invocation_id) lid: vec3<u32>,
        @builtin(workgroup_id) wid: vec3<u32>) {{
    let n = dims.num.x * dims.num.y * dims.num.z;
    var acc: {val} = {init};
    if (gid.x < n) {{
        acc = vin[gid.x];
    }}
    scratch[lid.x] = acc;
    workgroupBarrier();
    for (var stride = {half}u; stride > 0u; stride = stride / 2u) {{
        if (lid.x < stride) {{
            let a = scratch[lid.x];
            let b = scratch[lid.x + stride];
            var vo: {val};
            {body}
            scratch[lid.x] = vo;
        }}
        workgroupBarrier();
    }}
    if (lid.x == 0u) {{
        vout[wid.x] = scratch[0u];
    }}
}}
",
        prelude = SHADER_PRELUDE,
        val = value.wgsl(),
        wg = WORKGROUP_SIZE,
        half = WORKGROUP_SIZE / 2,
        init = init,
        body = body,
    )
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Create the metadata uniform pair for one dispatch: integer dims
/// plus aux word, and world frame (origin, resolution). Both are
/// created mapped, filled, unmapped, and dropped when the dispatch's
/// command buffer has been submitted.
pub(crate) fn meta_uniforms(
    device: &wgpu::Device,
    num: [u32; 3],
    aux: u32,
    ofs: Vec3,
    res: f32,
) -> (wgpu::Buffer, wgpu::Buffer) {
    let dims = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kerf grid dims"),
        size: 16,
        usage: wgpu::BufferUsages::UNIFORM,
        mapped_at_creation: true,
    });
    dims.slice(..)
        .get_mapped_range_mut()
        .copy_from_slice(bytemuck::cast_slice(&[num[0], num[1], num[2], aux]));
    dims.unmap();

    let frame = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kerf grid frame"),
        size: 16,
        usage: wgpu::BufferUsages::UNIFORM,
        mapped_at_creation: true,
    });
    frame
        .slice(..)
        .get_mapped_range_mut()
        .copy_from_slice(bytemuck::cast_slice(&[ofs.x, ofs.y, ofs.z, res]));
    frame.unmap();

    (dims, frame)
}

pub(crate) fn workgroups_for(cells: u32) -> u32 {
    cells.div_ceil(WORKGROUP_SIZE)
}

impl KernelRegistry {
    /// Create an empty registry on the given context.
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        KernelRegistry {
            ctx,
            maps: HashMap::new(),
            map2s: HashMap::new(),
            reduces: HashMap::new(),
        }
    }

    /// The context this registry dispatches on.
    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    fn compile(
        &self,
        label: &str,
        source: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
        let device = &self.ctx.device;
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        (pipeline, layout)
    }

    /// Compile and register a map kernel. `body` assigns `vo` from
    /// `vi` and `p`. Registration is one-shot per name.
    pub fn register_map_fn(
        &mut self,
        name: &str,
        input: CellType,
        output: CellType,
        body: &str,
    ) -> Result<(), GpuError> {
        if self.maps.contains_key(name) {
            return Err(GpuError::DuplicateKernel(name.to_owned()));
        }
        let source = map_shader(input, output, body);
        let entries = [
            storage_entry(0, true),
            storage_entry(1, false),
            uniform_entry(2),
            uniform_entry(3),
        ];
        let (pipeline, layout) = self.compile(name, &source, &entries);
        self.maps.insert(
            name.to_owned(),
            MapKernel {
                pipeline,
                layout,
                input,
                output,
            },
        );
        log::debug!("registered map kernel {name:?} ({input:?} -> {output:?})");
        Ok(())
    }

    /// Compile and register a two-input map kernel. `body` assigns
    /// `vo` from `vi1`, `vi2` and `p`.
    pub fn register_map2_fn(
        &mut self,
        name: &str,
        input1: CellType,
        input2: CellType,
        output: CellType,
        body: &str,
    ) -> Result<(), GpuError> {
        if self.map2s.contains_key(name) {
            return Err(GpuError::DuplicateKernel(name.to_owned()));
        }
        let source = map2_shader(input1, input2, output, body);
        let entries = [
            storage_entry(0, true),
            storage_entry(1, true),
            storage_entry(2, false),
            uniform_entry(3),
            uniform_entry(4),
        ];
        let (pipeline, layout) = self.compile(name, &source, &entries);
        self.map2s.insert(
            name.to_owned(),
            Map2Kernel {
                pipeline,
                layout,
                input1,
                input2,
                output,
            },
        );
        log::debug!("registered map2 kernel {name:?}");
        Ok(())
    }

    /// Compile and register a reduce kernel. `init` is the WGSL
    /// expression for the operator's neutral element; `body` combines
    /// `a` and `b` into `vo` and must be commutative and associative.
    pub fn register_reduce_fn(
        &mut self,
        name: &str,
        value: CellType,
        init: &str,
        body: &str,
    ) -> Result<(), GpuError> {
        if self.reduces.contains_key(name) {
            return Err(GpuError::DuplicateKernel(name.to_owned()));
        }
        let source = reduce_shader(value, init, body);
        let entries = [
            storage_entry(0, true),
            storage_entry(1, false),
            uniform_entry(2),
            uniform_entry(3),
        ];
        let (pipeline, layout) = self.compile(name, &source, &entries);
        self.reduces.insert(
            name.to_owned(),
            ReduceKernel {
                pipeline,
                layout,
                value,
            },
        );
        log::debug!("registered reduce kernel {name:?} over {value:?}");
        Ok(())
    }

    fn check_geometry(a: &GridMeta, b: &GridMeta) -> Result<(), GpuError> {
        if !a.same_geometry(b) {
            return Err(GpuError::Grid(GridError::GeometryMismatch));
        }
        Ok(())
    }

    fn check_cell(expected: CellType, actual: CellType) -> Result<(), GpuError> {
        if expected != actual {
            return Err(GpuError::CellTypeMismatch { expected, actual });
        }
        Ok(())
    }

    /// Run a registered map kernel over `input`, writing `output`.
    ///
    /// `input` and `output` may be the same grid; the dispatcher then
    /// routes through a shadow grid and copies back.
    pub fn map(&self, name: &str, input: &DeviceGrid, output: &DeviceGrid) -> Result<(), GpuError> {
        let kernel = self
            .maps
            .get(name)
            .ok_or_else(|| GpuError::UnknownKernel(name.to_owned()))?;
        Self::check_geometry(input.meta(), output.meta())?;
        Self::check_cell(kernel.input, input.meta().cell)?;
        Self::check_cell(kernel.output, output.meta().cell)?;
        input.buffer()?;
        output.buffer()?;

        if input.id() == output.id() {
            let mut shadow = DeviceGrid::new(&self.ctx, *output.meta());
            self.run_map(kernel, input, &shadow)?;
            transfer::copy_device(&self.ctx, &shadow, output)?;
            shadow.destroy();
            return Ok(());
        }
        self.run_map(kernel, input, output)
    }

    fn run_map(
        &self,
        kernel: &MapKernel,
        input: &DeviceGrid,
        output: &DeviceGrid,
    ) -> Result<(), GpuError> {
        let device = &self.ctx.device;
        let meta = input.meta();
        let (dims, frame) = meta_uniforms(device, meta.num, 0, meta.ofs, meta.res);
        let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kerf map"),
            layout: &kernel.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input.buffer()?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: output.buffer()?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: dims.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: frame.as_entire_binding(),
                },
            ],
        });
        self.dispatch(&kernel.pipeline, &bind, meta.cell_count() as u32);
        Ok(())
    }

    /// Run a registered two-input map kernel. Either input may alias
    /// the output; the shadow-grid path keeps the bindings distinct.
    pub fn map2(
        &self,
        name: &str,
        input1: &DeviceGrid,
        input2: &DeviceGrid,
        output: &DeviceGrid,
    ) -> Result<(), GpuError> {
        let kernel = self
            .map2s
            .get(name)
            .ok_or_else(|| GpuError::UnknownKernel(name.to_owned()))?;
        Self::check_geometry(input1.meta(), output.meta())?;
        Self::check_geometry(input2.meta(), output.meta())?;
        Self::check_cell(kernel.input1, input1.meta().cell)?;
        Self::check_cell(kernel.input2, input2.meta().cell)?;
        Self::check_cell(kernel.output, output.meta().cell)?;
        input1.buffer()?;
        input2.buffer()?;
        output.buffer()?;

        if input1.id() == output.id() || input2.id() == output.id() {
            let mut shadow = DeviceGrid::new(&self.ctx, *output.meta());
            self.run_map2(kernel, input1, input2, &shadow)?;
            transfer::copy_device(&self.ctx, &shadow, output)?;
            shadow.destroy();
            return Ok(());
        }
        self.run_map2(kernel, input1, input2, output)
    }

    fn run_map2(
        &self,
        kernel: &Map2Kernel,
        input1: &DeviceGrid,
        input2: &DeviceGrid,
        output: &DeviceGrid,
    ) -> Result<(), GpuError> {
        let device = &self.ctx.device;
        let meta = input1.meta();
        let (dims, frame) = meta_uniforms(device, meta.num, 0, meta.ofs, meta.res);
        let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kerf map2"),
            layout: &kernel.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input1.buffer()?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: input2.buffer()?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output.buffer()?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: dims.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: frame.as_entire_binding(),
                },
            ],
        });
        self.dispatch(&kernel.pipeline, &bind, meta.cell_count() as u32);
        Ok(())
    }

    fn dispatch(&self, pipeline: &wgpu::ComputePipeline, bind: &wgpu::BindGroup, cells: u32) {
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kerf dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("kerf dispatch"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind, &[]);
            pass.dispatch_workgroups(workgroups_for(cells), 1, 1);
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        log::trace!("dispatched {} workgroups", workgroups_for(cells));
    }

    /// Fold a registered reduce operator over every cell of `grid`
    /// and read the result back. Blocks on the final one-element
    /// readback.
    ///
    /// The grid is not modified; rounds run through a pair of
    /// ping-pong scratch buffers. The first round binds the true grid
    /// dimensions (kernels that use `p` see real centers); later
    /// rounds bind their element count as `(n, 1, 1)`.
    pub fn reduce<V: CellValue>(&self, name: &str, grid: &DeviceGrid) -> Result<V, GpuError> {
        let kernel = self
            .reduces
            .get(name)
            .ok_or_else(|| GpuError::UnknownKernel(name.to_owned()))?;
        Self::check_cell(kernel.value, grid.meta().cell)?;
        Self::check_cell(kernel.value, V::CELL)?;
        let src = grid.buffer()?;

        let device = &self.ctx.device;
        let meta = grid.meta();
        let elem = kernel.value.size();
        let total = meta.cell_count() as u32;

        let scratch_len = workgroups_for(total) as u64 * elem;
        let make_scratch = || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("kerf reduce scratch"),
                size: scratch_len,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let scratch = [make_scratch(), make_scratch()];

        // Plan the rounds up front so one encoder can carry them all;
        // dispatches in one encoder execute in program order.
        let mut binds: Vec<(wgpu::BindGroup, u32)> = Vec::new();
        let mut uniforms: Vec<wgpu::Buffer> = Vec::new();
        let mut count = total;
        let mut round = 0usize;
        loop {
            let groups = workgroups_for(count);
            let in_buf: &wgpu::Buffer = if round == 0 {
                src
            } else {
                &scratch[(round - 1) % 2]
            };
            let out_buf = &scratch[round % 2];
            let (dims, frame) = if round == 0 {
                meta_uniforms(device, meta.num, 0, meta.ofs, meta.res)
            } else {
                meta_uniforms(device, [count, 1, 1], 0, meta.ofs, meta.res)
            };
            let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("kerf reduce"),
                layout: &kernel.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: in_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: out_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: dims.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: frame.as_entire_binding(),
                    },
                ],
            });
            uniforms.push(dims);
            uniforms.push(frame);
            binds.push((bind, groups));
            count = groups;
            round += 1;
            if count == 1 {
                break;
            }
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("kerf reduce"),
        });
        for (bind, groups) in &binds {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("kerf reduce round"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, bind, &[]);
            pass.dispatch_workgroups(*groups, 1, 1);
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        log::trace!("reduce {name:?}: {} rounds over {total} cells", binds.len());

        let final_buf = &scratch[(round - 1) % 2];
        let bytes = transfer::read_buffer(&self.ctx, final_buf, elem)?;
        Ok(bytemuck::pod_read_unaligned::<V>(&bytes))
    }
}
