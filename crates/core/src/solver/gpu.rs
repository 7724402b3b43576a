//! GPU-based ocean solver implementation
//!
//! This module provides a GPU implementation of the `OceanSolver` trait using
//! wgpu compute shaders and storage buffers. This backend is only available when
//! the `gpu` feature is enabled.
//!
//! # Shader Files
//!
//! GPU compute shaders are located in `shaders/`:
//! - `evolve.wgsl` - H0 to height and choppy displacement spectra at time t
//! - `fft_stage.wgsl` - One radix-2 butterfly stage along rows or columns
//! - `fft_resolve.wgsl` - Real part with the centered-spectrum sign removed
//! - `normal_foam.wgsl` - Normals, Jacobian and persistent foam
//!
//! # Implementation
//!
//! Every field is a storage buffer in row-major order. The FFT ping-pongs
//! between two scratch buffers: the first row stage reads the evolved spectrum
//! and writes the first scratch buffer, every later stage swaps. All `2·log2(N)`
//! stage parameter blocks live in one uniform buffer, selected per dispatch with
//! a dynamic offset. Row and column stages run in separate compute passes, so
//! the column pass starts only after every row is done. The butterfly table is
//! an `Rg16Float` texture with one row per stage.

use super::context::GpuContext;
use super::r#trait::{OceanSolver, SpectralComponent};
use crate::error::{OceanError, Result};
use crate::grid::SimulationGrid;
use crate::publish::SurfaceField;
use crate::spectrum::{ButterflyTable, InitialSpectrum};
use crate::surface::FoamParams;
use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use std::num::NonZeroU64;
use tracing::debug;
use wgpu::util::DeviceExt;

/// Workgroup side used by every shader
const WORKGROUP_SIZE: u32 = 16;

/// Distance between stage parameter blocks, the default
/// `min_uniform_buffer_offset_alignment`
const STAGE_PARAMS_STRIDE: u32 = 256;

/// Buffers and textures held per grid: H0, three spectra, two FFT scratch,
/// three spatial maps, normal, foam, staging, butterfly texture and four
/// parameter buffers
const GPU_ALLOCATION_COUNT: usize = 17;

/// Evolve shader parameters (must match WGSL struct layout)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct EvolveParams {
    map_size: u32,
    domain_size: f32,
    time: f32,
    gravity: f32,
}

/// FFT stage shader parameters (must match WGSL struct layout)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct StageParams {
    map_size: u32,
    log2_size: u32,
    stage: u32,
    axis: u32,
    bit_reverse: u32,
    _padding: [u32; 3],
}

/// Resolve shader parameters (must match WGSL struct layout)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ResolveParams {
    map_size: u32,
    _padding: [u32; 3],
}

/// Normal/foam shader parameters (must match WGSL struct layout)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct SurfaceParams {
    map_size: u32,
    inv_tile: f32,
    delta_time: f32,
    up_speed: f32,
    down_speed: f32,
    threshold: f32,
    _padding: [f32; 2],
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

fn uniform_entry(binding: u32, has_dynamic_offset: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size: None,
        },
        count: None,
    }
}

fn buffer_entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

/// Pipelines and layouts, independent of the grid size
struct Pipelines {
    evolve: wgpu::ComputePipeline,
    stage: wgpu::ComputePipeline,
    resolve: wgpu::ComputePipeline,
    surface: wgpu::ComputePipeline,
    evolve_layout: wgpu::BindGroupLayout,
    stage_layout: wgpu::BindGroupLayout,
    resolve_layout: wgpu::BindGroupLayout,
    surface_layout: wgpu::BindGroupLayout,
}

impl Pipelines {
    fn new(device: &wgpu::Device) -> Self {
        let evolve_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Evolve Bind Group Layout"),
            entries: &[
                // h0 (binding 0)
                storage_entry(0, true),
                // height, displacement_x, displacement_y spectra (bindings 1-3)
                storage_entry(1, false),
                storage_entry(2, false),
                storage_entry(3, false),
                // params (binding 4)
                uniform_entry(4, false),
            ],
        });

        let stage_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("FFT Stage Bind Group Layout"),
            entries: &[
                // src (binding 0)
                storage_entry(0, true),
                // dst (binding 1)
                storage_entry(1, false),
                // butterfly table (binding 2)
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // per-stage params (binding 3, dynamic offset)
                uniform_entry(3, true),
            ],
        });

        let resolve_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("FFT Resolve Bind Group Layout"),
            entries: &[
                // transformed (binding 0)
                storage_entry(0, true),
                // spatial (binding 1)
                storage_entry(1, false),
                // params (binding 2)
                uniform_entry(2, false),
            ],
        });

        let surface_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Normal Foam Bind Group Layout"),
            entries: &[
                // height, displacement_x, displacement_y (bindings 0-2)
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, true),
                // normal (binding 3)
                storage_entry(3, false),
                // foam, read and written in place (binding 4)
                storage_entry(4, false),
                // params (binding 5)
                uniform_entry(5, false),
            ],
        });

        let evolve = Self::create_pipeline(
            device,
            "Evolve Pipeline",
            wgpu::include_wgsl!("shaders/evolve.wgsl"),
            &evolve_layout,
        );
        let stage = Self::create_pipeline(
            device,
            "FFT Stage Pipeline",
            wgpu::include_wgsl!("shaders/fft_stage.wgsl"),
            &stage_layout,
        );
        let resolve = Self::create_pipeline(
            device,
            "FFT Resolve Pipeline",
            wgpu::include_wgsl!("shaders/fft_resolve.wgsl"),
            &resolve_layout,
        );
        let surface = Self::create_pipeline(
            device,
            "Normal Foam Pipeline",
            wgpu::include_wgsl!("shaders/normal_foam.wgsl"),
            &surface_layout,
        );

        Self {
            evolve,
            stage,
            resolve,
            surface,
            evolve_layout,
            stage_layout,
            resolve_layout,
            surface_layout,
        }
    }

    fn create_pipeline(
        device: &wgpu::Device,
        label: &str,
        shader: wgpu::ShaderModuleDescriptor<'_>,
        layout: &wgpu::BindGroupLayout,
    ) -> wgpu::ComputePipeline {
        let module = device.create_shader_module(shader);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        })
    }
}

/// Every grid-sized allocation plus the bind groups over them
struct GpuResources {
    h0: wgpu::Buffer,
    spectra: [wgpu::Buffer; 3],
    ping: wgpu::Buffer,
    pong: wgpu::Buffer,
    spatial: [wgpu::Buffer; 3],
    normal: wgpu::Buffer,
    foam: wgpu::Buffer,
    staging: wgpu::Buffer,
    butterfly: wgpu::Texture,

    evolve_params: wgpu::Buffer,
    stage_params: wgpu::Buffer,
    resolve_params: wgpu::Buffer,
    surface_params: wgpu::Buffer,

    evolve_bind_group: wgpu::BindGroup,
    // Stage 0 of the row pass: spectrum → ping
    from_spectrum: [wgpu::BindGroup; 3],
    ping_to_pong: wgpu::BindGroup,
    pong_to_ping: wgpu::BindGroup,
    // Final stage always lands in pong
    resolve: [wgpu::BindGroup; 3],
    surface_bind_group: wgpu::BindGroup,
}

impl GpuResources {
    fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &Pipelines,
        grid: &SimulationGrid,
        table: &ButterflyTable,
    ) -> Self {
        let map_size = grid.map_size();
        let log2_size = grid.log2_size();
        let texels = grid.texel_count() as u64;

        let storage = |label: &str, bytes_per_texel: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: texels * bytes_per_texel,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        let h0 = storage("H0 Spectrum", 16);
        let spectra = [
            storage("Height Spectrum", 8),
            storage("Displacement X Spectrum", 8),
            storage("Displacement Y Spectrum", 8),
        ];
        let ping = storage("FFT Ping", 8);
        let pong = storage("FFT Pong", 8);
        let spatial = [
            storage("Height Map", 4),
            storage("Displacement X Map", 4),
            storage("Displacement Y Map", 4),
        ];
        let normal = storage("Normal Map", 8);
        let foam = storage("Foam Map", 4);

        // Sized for the widest published field (normal)
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: texels * 8,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Butterfly table: one row per stage, (re, im) as half floats
        let butterfly_size = wgpu::Extent3d {
            width: map_size,
            height: log2_size,
            depth_or_array_layers: 1,
        };
        let butterfly = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Butterfly Table"),
            size: butterfly_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rg16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &butterfly,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&table.to_half_pairs()),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(map_size * 4),
                rows_per_image: Some(log2_size),
            },
            butterfly_size,
        );
        let butterfly_view = butterfly.create_view(&wgpu::TextureViewDescriptor::default());

        let evolve_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Evolve Params"),
            size: std::mem::size_of::<EvolveParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Stage g < log2 is a row stage, the rest are column stages
        let stage_count = 2 * log2_size;
        let stride = STAGE_PARAMS_STRIDE as usize;
        let mut stage_bytes = vec![0_u8; stage_count as usize * stride];
        for global in 0..stage_count {
            let stage = global % log2_size;
            let params = StageParams {
                map_size,
                log2_size,
                stage,
                axis: global / log2_size,
                bit_reverse: u32::from(stage == 0),
                _padding: [0; 3],
            };
            let start = global as usize * stride;
            stage_bytes[start..start + std::mem::size_of::<StageParams>()]
                .copy_from_slice(bytemuck::bytes_of(&params));
        }
        let stage_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("FFT Stage Params"),
            contents: &stage_bytes,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let resolve_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("FFT Resolve Params"),
            contents: bytemuck::bytes_of(&ResolveParams {
                map_size,
                _padding: [0; 3],
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let surface_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Normal Foam Params"),
            size: std::mem::size_of::<SurfaceParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let evolve_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Evolve Bind Group"),
            layout: &pipelines.evolve_layout,
            entries: &[
                buffer_entry(0, &h0),
                buffer_entry(1, &spectra[0]),
                buffer_entry(2, &spectra[1]),
                buffer_entry(3, &spectra[2]),
                buffer_entry(4, &evolve_params),
            ],
        });

        let stage_bind_group = |label: &str, src: &wgpu::Buffer, dst: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &pipelines.stage_layout,
                entries: &[
                    buffer_entry(0, src),
                    buffer_entry(1, dst),
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&butterfly_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &stage_params,
                            offset: 0,
                            size: NonZeroU64::new(std::mem::size_of::<StageParams>() as u64),
                        }),
                    },
                ],
            })
        };
        let from_spectrum = [
            stage_bind_group("FFT Height Input", &spectra[0], &ping),
            stage_bind_group("FFT Displacement X Input", &spectra[1], &ping),
            stage_bind_group("FFT Displacement Y Input", &spectra[2], &ping),
        ];
        let ping_to_pong = stage_bind_group("FFT Ping To Pong", &ping, &pong);
        let pong_to_ping = stage_bind_group("FFT Pong To Ping", &pong, &ping);

        let resolve_bind_group = |label: &str, output: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &pipelines.resolve_layout,
                entries: &[
                    buffer_entry(0, &pong),
                    buffer_entry(1, output),
                    buffer_entry(2, &resolve_params),
                ],
            })
        };
        let resolve = [
            resolve_bind_group("Resolve Height", &spatial[0]),
            resolve_bind_group("Resolve Displacement X", &spatial[1]),
            resolve_bind_group("Resolve Displacement Y", &spatial[2]),
        ];

        let surface_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Normal Foam Bind Group"),
            layout: &pipelines.surface_layout,
            entries: &[
                buffer_entry(0, &spatial[0]),
                buffer_entry(1, &spatial[1]),
                buffer_entry(2, &spatial[2]),
                buffer_entry(3, &normal),
                buffer_entry(4, &foam),
                buffer_entry(5, &surface_params),
            ],
        });

        Self {
            h0,
            spectra,
            ping,
            pong,
            spatial,
            normal,
            foam,
            staging,
            butterfly,
            evolve_params,
            stage_params,
            resolve_params,
            surface_params,
            evolve_bind_group,
            from_spectrum,
            ping_to_pong,
            pong_to_ping,
            resolve,
            surface_bind_group,
        }
    }

    /// Bind group for global stage `global` (row stages then column stages)
    fn stage_bind_group(&self, component: SpectralComponent, global: u32) -> &wgpu::BindGroup {
        if global == 0 {
            &self.from_spectrum[component.index()]
        } else if global % 2 == 1 {
            &self.ping_to_pong
        } else {
            &self.pong_to_ping
        }
    }

    fn field_buffer(&self, field: SurfaceField) -> &wgpu::Buffer {
        match field {
            SurfaceField::Height => &self.spatial[0],
            SurfaceField::DisplacementX => &self.spatial[1],
            SurfaceField::DisplacementY => &self.spatial[2],
            SurfaceField::Normal => &self.normal,
            SurfaceField::Foam => &self.foam,
        }
    }

    fn destroy(self) {
        let buffers = [
            &self.h0,
            &self.spectra[0],
            &self.spectra[1],
            &self.spectra[2],
            &self.ping,
            &self.pong,
            &self.spatial[0],
            &self.spatial[1],
            &self.spatial[2],
            &self.normal,
            &self.foam,
            &self.staging,
            &self.evolve_params,
            &self.stage_params,
            &self.resolve_params,
            &self.surface_params,
        ];
        for buffer in buffers {
            buffer.destroy();
        }
        self.butterfly.destroy();
    }
}

/// GPU-based ocean solver using wgpu compute shaders
///
/// Dispatches are recorded in pipeline order on a single queue, so each stage
/// observes the complete output of the previous one.
pub struct GpuOceanSolver {
    // GPU handles
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,

    grid: SimulationGrid,
    pipelines: Pipelines,
    resources: Option<GpuResources>,
}

impl GpuOceanSolver {
    /// Create a new GPU ocean solver
    ///
    /// Compiles the shaders, allocates every field for `grid` and uploads the
    /// butterfly table.
    ///
    /// # Arguments
    ///
    /// * `context` - GPU context with device and queue
    /// * `grid` - Grid every field is allocated for
    /// * `table` - Butterfly table built for the same grid
    ///
    /// # Errors
    ///
    /// Returns `OceanError::SizeMismatch` if the table does not match the grid,
    /// `OceanError::GpuUnavailable` if a shader fails validation, or
    /// `OceanError::ResourceAllocation` if the device runs out of memory.
    pub fn new(context: GpuContext, grid: SimulationGrid, table: &ButterflyTable) -> Result<Self> {
        if table.size() != grid.size() {
            return Err(OceanError::SizeMismatch {
                expected: grid.size(),
                actual: table.size(),
            });
        }

        let (device, queue, adapter_info) = context.into_device_queue();

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipelines = Pipelines::new(&device);
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(OceanError::GpuUnavailable(error.to_string()));
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let resources = GpuResources::new(&device, &queue, &pipelines, &grid, table);
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            resources.destroy();
            return Err(OceanError::ResourceAllocation(error.to_string()));
        }

        debug!(
            "Allocated {} GPU resources for {}x{} grid on {}",
            GPU_ALLOCATION_COUNT,
            grid.size(),
            grid.size(),
            adapter_info.name
        );

        Ok(Self {
            device,
            queue,
            adapter_name: adapter_info.name,
            grid,
            pipelines,
            resources: Some(resources),
        })
    }

    /// Name of the adapter running the solver
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn resources(&self) -> Result<&GpuResources> {
        self.resources.as_ref().ok_or(OceanError::Disabled)
    }

    fn workgroup_count(&self) -> u32 {
        self.grid.workgroups(WORKGROUP_SIZE)
    }

    fn dispatch(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
    ) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, bind_group, &[]);
            let wg = self.workgroup_count();
            compute_pass.dispatch_workgroups(wg, wg, 1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl OceanSolver for GpuOceanSolver {
    fn upload_spectrum(&mut self, spectrum: &InitialSpectrum) -> Result<()> {
        let expected = self.grid.size();
        let actual = spectrum.grid().size();
        if actual != expected {
            return Err(OceanError::SizeMismatch { expected, actual });
        }
        let resources = self.resources()?;
        self.queue
            .write_buffer(&resources.h0, 0, bytemuck::cast_slice(spectrum.texels()));
        Ok(())
    }

    fn evolve(&mut self, time: f32, domain_size: f32, gravity: f32) -> Result<()> {
        let resources = self.resources()?;
        let params = EvolveParams {
            map_size: self.grid.map_size(),
            domain_size,
            time,
            gravity,
        };
        self.queue
            .write_buffer(&resources.evolve_params, 0, bytemuck::bytes_of(&params));
        self.dispatch(
            "Evolve Pass",
            &self.pipelines.evolve,
            &resources.evolve_bind_group,
        );
        Ok(())
    }

    fn transform(&mut self, component: SpectralComponent) -> Result<()> {
        let resources = self.resources()?;
        let log2_size = self.grid.log2_size();
        let wg = self.workgroup_count();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("FFT Encoder"),
            });

        for (label, stages) in [
            ("FFT Row Pass", 0..log2_size),
            ("FFT Column Pass", log2_size..2 * log2_size),
        ] {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipelines.stage);
            for global in stages {
                compute_pass.set_bind_group(
                    0,
                    resources.stage_bind_group(component, global),
                    &[global * STAGE_PARAMS_STRIDE],
                );
                compute_pass.dispatch_workgroups(wg, wg, 1);
            }
        }

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("FFT Resolve Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipelines.resolve);
            compute_pass.set_bind_group(0, &resources.resolve[component.index()], &[]);
            compute_pass.dispatch_workgroups(wg, wg, 1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn derive_surface(&mut self, params: &FoamParams) -> Result<()> {
        let resources = self.resources()?;
        let surface = SurfaceParams {
            map_size: self.grid.map_size(),
            inv_tile: 1.0 / params.tile_size,
            delta_time: params.delta_time,
            up_speed: params.up_speed,
            down_speed: params.down_speed,
            threshold: params.threshold,
            _padding: [0.0; 2],
        };
        self.queue
            .write_buffer(&resources.surface_params, 0, bytemuck::bytes_of(&surface));
        self.dispatch(
            "Normal Foam Pass",
            &self.pipelines.surface,
            &resources.surface_bind_group,
        );
        Ok(())
    }

    fn read_field(&self, field: SurfaceField) -> Result<Cow<'_, [f32]>> {
        let resources = self.resources()?;
        let size =
            (self.grid.texel_count() * field.components() * std::mem::size_of::<f32>()) as u64;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Field Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(
            resources.field_buffer(field),
            0,
            &resources.staging,
            0,
            size,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        // Map and read; this stalls until the whole queue has drained
        let buffer_slice = resources.staging.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| OceanError::ResourceAllocation(format!("readback channel closed: {e}")))?
            .map_err(|e| OceanError::ResourceAllocation(format!("readback map failed: {e}")))?;

        let data = buffer_slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        resources.staging.unmap();

        Ok(Cow::Owned(result))
    }

    fn grid(&self) -> SimulationGrid {
        self.grid
    }

    fn is_gpu_accelerated(&self) -> bool {
        true
    }

    fn live_allocations(&self) -> usize {
        if self.resources.is_some() {
            GPU_ALLOCATION_COUNT
        } else {
            0
        }
    }

    fn release(&mut self) -> usize {
        match self.resources.take() {
            Some(resources) => {
                resources.destroy();
                debug!("Released {} GPU resources", GPU_ALLOCATION_COUNT);
                GPU_ALLOCATION_COUNT
            }
            None => 0,
        }
    }

    fn gpu_buffer(&self, field: SurfaceField) -> Option<&wgpu::Buffer> {
        self.resources
            .as_ref()
            .map(|resources| resources.field_buffer(field))
    }
}

impl Drop for GpuOceanSolver {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::context::GpuInitResult;
    use crate::spectrum::SpectrumParams;
    use nalgebra::Vector2;

    fn spectrum(grid: &SimulationGrid) -> InitialSpectrum {
        let params = SpectrumParams {
            wind_speed: 10.0,
            wind_direction: Vector2::new(1.0, 0.0),
            domain_size: 256.0,
            amplitude: 5e-4,
            gravity: 9.81,
            seed: 3,
        };
        InitialSpectrum::generate(grid, &params).unwrap()
    }

    #[test]
    fn test_gpu_solver_creation() {
        // Only run if GPU is available
        if let GpuInitResult::Success(context) = GpuContext::new() {
            let grid = SimulationGrid::new(64).unwrap();
            let table = ButterflyTable::build(64).unwrap();
            let solver = GpuOceanSolver::new(context, grid, &table).unwrap();
            assert_eq!(solver.grid().size(), 64);
            assert!(solver.is_gpu_accelerated());
            assert_eq!(solver.live_allocations(), GPU_ALLOCATION_COUNT);
            assert!(solver.gpu_buffer(SurfaceField::Foam).is_some());
        }
    }

    #[test]
    fn test_gpu_solver_foam_starts_clear() {
        if let GpuInitResult::Success(context) = GpuContext::new() {
            let grid = SimulationGrid::new(32).unwrap();
            let table = ButterflyTable::build(32).unwrap();
            let mut solver = GpuOceanSolver::new(context, grid, &table).unwrap();
            solver.upload_spectrum(&spectrum(&grid)).unwrap();
            let foam = solver.read_field(SurfaceField::Foam).unwrap();
            assert_eq!(foam.len(), 32 * 32);
            assert!(foam.iter().all(|&f| f == 0.0));
            assert_eq!(solver.read_field(SurfaceField::Normal).unwrap().len(), 32 * 32 * 2);
        }
    }

    #[test]
    fn test_gpu_solver_release() {
        if let GpuInitResult::Success(context) = GpuContext::new() {
            let grid = SimulationGrid::new(32).unwrap();
            let table = ButterflyTable::build(32).unwrap();
            let mut solver = GpuOceanSolver::new(context, grid, &table).unwrap();
            assert_eq!(solver.release(), GPU_ALLOCATION_COUNT);
            assert_eq!(solver.release(), 0);
            assert!(solver.gpu_buffer(SurfaceField::Height).is_none());
            assert_eq!(solver.evolve(0.0, 256.0, 9.81), Err(OceanError::Disabled));
        }
    }
}
