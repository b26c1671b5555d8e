//! wgpu implementation of [`GpuBackend`]
//!
//! Clears and draws are recorded during the frame and encoded in
//! `end_frame`: consecutive commands on the same target share a render pass,
//! a clear opens a new pass (or folds into an empty one), and every draw gets
//! its own uniform buffer and bind group. Pipelines are cached per program,
//! target kind and depth-test state.

use super::{DrawCall, GpuBackend, RenderTarget, ResourceId, TextureArrayDesc, TextureArrayKind, TextureBinding, Viewport};
use crate::shader::reflect::{ProgramLayout, SamplerKind, Stage, TextureDim, TextureSample, TextureSlot};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuTextureArray {
    desc: TextureArrayDesc,
    _texture: wgpu::Texture,
    /// Whole-array view for sampling
    view: wgpu::TextureView,
    /// Single-layer views for rendering into
    layer_views: Vec<wgpu::TextureView>,
}

struct GpuProgram {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    layout: ProgramLayout,
}

#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
enum TargetKind {
    Surface,
    Offscreen,
}

/// Key for pipeline cache lookup
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct PipelineKey {
    program: ResourceId,
    target: TargetKind,
    depth_test: bool,
}

enum Command {
    Clear {
        target: RenderTarget,
        color: Option<[f32; 4]>,
        depth: Option<f32>,
    },
    Draw(DrawCall),
}

struct PreparedDraw {
    pipeline: Arc<wgpu::RenderPipeline>,
    bind_group: wgpu::BindGroup,
    _uniform_buffer: Option<wgpu::Buffer>,
    vertex_buffers: Vec<Arc<wgpu::Buffer>>,
    viewport: Viewport,
    first: u32,
    count: u32,
}

struct PassPlan {
    target: RenderTarget,
    clear_color: Option<[f32; 4]>,
    clear_depth: Option<f32>,
    draws: Vec<PreparedDraw>,
}

/// Fallbacks for texture slots nothing was bound to
struct DefaultTextures {
    white: GpuTexture,
    depth_2d: GpuTexture,
    depth_array: GpuTexture,
    color_array: GpuTexture,
}

struct Samplers {
    comparison: wgpu::Sampler,
    filtering: wgpu::Sampler,
    non_filtering: wgpu::Sampler,
}

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    depth_target: GpuTexture,
    frame: Option<wgpu::SurfaceTexture>,

    buffers: HashMap<ResourceId, Arc<wgpu::Buffer>>,
    textures: HashMap<ResourceId, GpuTexture>,
    arrays: HashMap<ResourceId, GpuTextureArray>,
    programs: HashMap<ResourceId, GpuProgram>,
    pipelines: HashMap<PipelineKey, Option<Arc<wgpu::RenderPipeline>>>,

    defaults: DefaultTextures,
    samplers: Samplers,
    commands: Vec<Command>,
}

impl WgpuBackend {
    /// Takes ownership of a configured surface
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    ) -> Self {
        surface.configure(&device, &config);
        let depth_target = create_depth_target(&device, config.width, config.height);

        // ── Default 1×1 textures ──────────────────────────────────────────────

        let white_tex = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Default White Texture"),
            size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &white_tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255u8, 255, 255, 255],
            wgpu::ImageDataLayout { offset: 0, bytes_per_row: Some(4), rows_per_image: Some(1) },
            wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
        );
        let white_view = white_tex.create_view(&Default::default());

        let defaults = DefaultTextures {
            white: GpuTexture { _texture: white_tex, view: white_view },
            depth_2d: single_texel(&device, "Default Depth", DEPTH_FORMAT, wgpu::TextureViewDimension::D2),
            depth_array: single_texel(&device, "Default Depth Array", DEPTH_FORMAT, wgpu::TextureViewDimension::D2Array),
            color_array: single_texel(&device, "Default Color Array", COLOR_FORMAT, wgpu::TextureViewDimension::D2Array),
        };

        let samplers = Samplers {
            comparison: device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Shadow Comparison Sampler"),
                compare: Some(wgpu::CompareFunction::LessEqual),
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            }),
            filtering: device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Default Sampler"),
                address_mode_u: wgpu::AddressMode::Repeat,
                address_mode_v: wgpu::AddressMode::Repeat,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            }),
            non_filtering: device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Nearest Sampler"),
                ..Default::default()
            }),
        };

        log::info!(
            "wgpu backend ready: {:?} surface {}x{}",
            config.format,
            config.width,
            config.height
        );

        Self {
            device,
            queue,
            surface,
            config,
            depth_target,
            frame: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            arrays: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            defaults,
            samplers,
            commands: Vec::new(),
        }
    }

    /// Surface configuration preferring a linear (non-sRGB) format
    pub fn surface_config(
        surface: &wgpu::Surface<'_>,
        adapter: &wgpu::Adapter,
        width: u32,
        height: u32,
    ) -> Result<wgpu::SurfaceConfiguration> {
        let caps = surface.get_capabilities(adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| Error::Wgpu("surface reports no supported formats".into()))?;

        Ok(wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        })
    }

    // ── Pipeline cache ──────────────────────────────────────────────────────

    fn pipeline(&mut self, key: PipelineKey) -> Option<Arc<wgpu::RenderPipeline>> {
        if let Some(cached) = self.pipelines.get(&key) {
            return cached.clone();
        }
        log::info!("Creating new pipeline variant: {:?}", key);
        let pipeline = self.create_pipeline(key).map(Arc::new);
        self.pipelines.insert(key, pipeline.clone());
        pipeline
    }

    fn create_pipeline(&self, key: PipelineKey) -> Option<wgpu::RenderPipeline> {
        let program = self.programs.get(&key.program)?;

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = program
            .layout
            .inputs
            .iter()
            .map(|input| {
                [wgpu::VertexAttribute {
                    format: vertex_format(input.components),
                    offset: 0,
                    shader_location: input.location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = program
            .layout
            .inputs
            .iter()
            .zip(&attributes)
            .map(|(input, attributes)| wgpu::VertexBufferLayout {
                array_stride: input.components as u64 * 4,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let format = match key.target {
            TargetKind::Surface => self.config.format,
            TargetKind::Offscreen => COLOR_FORMAT,
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Program Pipeline"),
            layout: Some(&program.pipeline_layout),
            cache: None,
            vertex: wgpu::VertexState {
                module: &program.vertex,
                entry_point: Stage::Vertex.entry_point(),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.fragment,
                entry_point: Stage::Fragment.entry_point(),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: key.depth_test,
                depth_compare: if key.depth_test {
                    wgpu::CompareFunction::Less
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("Pipeline for program {:?} failed: {}", key.program, err);
            return None;
        }
        Some(pipeline)
    }

    // ── Frame encoding ──────────────────────────────────────────────────────

    fn prepare(&mut self, call: &DrawCall) -> Option<PreparedDraw> {
        let target = match call.target {
            RenderTarget::Surface => TargetKind::Surface,
            RenderTarget::Framebuffer { .. } => TargetKind::Offscreen,
        };
        let pipeline = self.pipeline(PipelineKey {
            program: call.program.id(),
            target,
            depth_test: call.depth_test,
        })?;
        let program = self.programs.get(&call.program.id())?;

        let uniform_buffer = (program.layout.uniforms.size > 0).then(|| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Draw Uniforms"),
                contents: &call.uniforms,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let mut entries = Vec::new();
        if let Some(buffer) = &uniform_buffer {
            entries.push(wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() });
        }
        for (slot, (binding, bound)) in program.layout.textures.iter().zip(&call.textures) {
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::TextureView(self.texture_view(slot, *bound)),
            });
            if let Some(sampler) = slot.sampler {
                entries.push(wgpu::BindGroupEntry {
                    binding: sampler.binding,
                    resource: wgpu::BindingResource::Sampler(self.sampler(sampler.kind)),
                });
            }
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Bind Group"),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let vertex_buffers = call
            .vertex_buffers
            .iter()
            .map(|b| self.buffers.get(&b.id()).cloned())
            .collect::<Option<Vec<_>>>()?;

        Some(PreparedDraw {
            pipeline,
            bind_group,
            _uniform_buffer: uniform_buffer,
            vertex_buffers,
            viewport: call.viewport,
            first: call.first,
            count: call.count,
        })
    }

    fn texture_view(&self, slot: &TextureSlot, bound: Option<TextureBinding>) -> &wgpu::TextureView {
        let view = bound.and_then(|binding| match binding {
            TextureBinding::Texture(t) => self.textures.get(&t.id()).map(|t| &t.view),
            TextureBinding::Array(a) => self.arrays.get(&a.id()).map(|a| &a.view),
        });
        view.unwrap_or(match (slot.dim, slot.sample) {
            (TextureDim::D2, TextureSample::Float) => &self.defaults.white.view,
            (TextureDim::D2, TextureSample::Depth) => &self.defaults.depth_2d.view,
            (TextureDim::D2Array, TextureSample::Depth) => &self.defaults.depth_array.view,
            (TextureDim::D2Array, TextureSample::Float) => &self.defaults.color_array.view,
        })
    }

    fn sampler(&self, kind: SamplerKind) -> &wgpu::Sampler {
        match kind {
            SamplerKind::Comparison => &self.samplers.comparison,
            SamplerKind::Filtering => &self.samplers.filtering,
            SamplerKind::NonFiltering => &self.samplers.non_filtering,
        }
    }

    fn layer_view(&self, (array, layer): (super::TextureArray, u32)) -> Option<(&wgpu::TextureView, (u32, u32))> {
        let array = self.arrays.get(&array.id())?;
        let view = array.layer_views.get(layer as usize)?;
        Some((view, (array.desc.width, array.desc.height)))
    }

    fn plan_passes(&mut self, commands: Vec<Command>) -> Vec<PassPlan> {
        let mut plans: Vec<PassPlan> = Vec::new();
        for command in commands {
            match command {
                Command::Clear { target, color, depth } => match plans.last_mut() {
                    Some(plan) if plan.target == target && plan.draws.is_empty() => {
                        if color.is_some() {
                            plan.clear_color = color;
                        }
                        if depth.is_some() {
                            plan.clear_depth = depth;
                        }
                    }
                    _ => plans.push(PassPlan {
                        target,
                        clear_color: color,
                        clear_depth: depth,
                        draws: Vec::new(),
                    }),
                },
                Command::Draw(call) => {
                    let Some(prepared) = self.prepare(&call) else {
                        log::trace!("Draw with program {:?} skipped", call.program.id());
                        continue;
                    };
                    match plans.last_mut() {
                        Some(plan) if plan.target == call.target => plan.draws.push(prepared),
                        _ => plans.push(PassPlan {
                            target: call.target,
                            clear_color: None,
                            clear_depth: None,
                            draws: vec![prepared],
                        }),
                    }
                }
            }
        }
        plans
    }
}

impl GpuBackend for WgpuBackend {
    fn create_vertex_buffer(&mut self, id: ResourceId, data: &[f32]) {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(data),
            usage: wgpu::BufferUsages::VERTEX,
        });
        self.buffers.insert(id, Arc::new(buffer));
    }

    fn create_texture(&mut self, id: ResourceId, width: u32, height: u32, rgba: &[u8]) {
        let size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::ImageDataLayout { offset: 0, bytes_per_row: Some(4 * width), rows_per_image: Some(height) },
            size,
        );
        let view = texture.create_view(&Default::default());
        self.textures.insert(id, GpuTexture { _texture: texture, view });
    }

    fn create_texture_array(&mut self, id: ResourceId, desc: &TextureArrayDesc) {
        let (format, label) = match desc.kind {
            TextureArrayKind::Depth => (DEPTH_FORMAT, "Depth Array"),
            TextureArrayKind::Color => (COLOR_FORMAT, "Color Array"),
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("{label} View")),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        // Per-layer views so passes can render into individual layers
        let layer_views = (0..desc.layers)
            .map(|layer| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("{label} Layer {layer}")),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        self.arrays.insert(id, GpuTextureArray { desc: *desc, _texture: texture, view, layer_views });
    }

    fn create_program(
        &mut self,
        id: ResourceId,
        vertex_source: &str,
        fragment_source: &str,
        layout: &ProgramLayout,
    ) -> Result<()> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Vertex Stage"),
            source: wgpu::ShaderSource::Wgsl(vertex_source.into()),
        });
        let fragment = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fragment Stage"),
            source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
        });

        let entries = bind_group_layout_entries(layout);
        let bind_group_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Program Bind Group Layout"),
            entries: &entries,
        });
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Program Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(Error::Shader(err.to_string()));
        }

        self.programs.insert(
            id,
            GpuProgram { vertex, fragment, bind_group_layout, pipeline_layout, layout: layout.clone() },
        );
        Ok(())
    }

    fn free(&mut self, id: ResourceId) {
        self.buffers.remove(&id);
        self.textures.remove(&id);
        self.arrays.remove(&id);
        if self.programs.remove(&id).is_some() {
            self.pipelines.retain(|key, _| key.program != id);
        }
    }

    fn clear(&mut self, target: RenderTarget, color: Option<[f32; 4]>, depth: Option<f32>) {
        self.commands.push(Command::Clear { target, color, depth });
    }

    fn draw(&mut self, call: DrawCall) {
        self.commands.push(Command::Draw(call));
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.commands.clear();
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.surface
                    .get_current_texture()
                    .map_err(|err| Error::Wgpu(err.to_string()))?
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface acquire timed out, skipping frame");
                self.frame = None;
                return Ok(());
            }
            Err(err) => return Err(Error::Wgpu(err.to_string())),
        };
        self.frame = Some(frame);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        let commands = std::mem::take(&mut self.commands);
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };

        let plans = self.plan_passes(commands);
        let surface_view = frame.texture.create_view(&Default::default());
        let surface_size = (self.config.width, self.config.height);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        for plan in &plans {
            let (color_view, depth_view, size, label) = match plan.target {
                RenderTarget::Surface => (&surface_view, &self.depth_target.view, surface_size, "Surface Pass".to_string()),
                RenderTarget::Framebuffer { depth, color } => {
                    let (Some((depth_view, size)), Some((color_view, _))) = (self.layer_view(depth), self.layer_view(color))
                    else {
                        log::warn!("Pass target {:?} no longer exists", plan.target);
                        continue;
                    };
                    (color_view, depth_view, size, format!("Offscreen Pass Layer {}", color.1))
                }
            };

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match plan.clear_color {
                            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                                r: r as f64,
                                g: g as f64,
                                b: b as f64,
                                a: a as f64,
                            }),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: plan.clear_depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &plan.draws {
                let Some(viewport) = clamp_viewport(draw.viewport, size) else {
                    continue;
                };
                pass.set_viewport(
                    viewport.x as f32,
                    viewport.y as f32,
                    viewport.width as f32,
                    viewport.height as f32,
                    0.0,
                    1.0,
                );
                pass.set_pipeline(&draw.pipeline);
                pass.set_bind_group(0, &draw.bind_group, &[]);
                for (slot, buffer) in draw.vertex_buffers.iter().enumerate() {
                    pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
                pass.draw(draw.first..draw.first + draw.count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        log::trace!("Frame submitted: {} passes", plans.len());
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.depth_target = create_depth_target(&self.device, self.config.width, self.config.height);
    }
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

fn bind_group_layout_entries(layout: &ProgramLayout) -> Vec<wgpu::BindGroupLayoutEntry> {
    let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
    let mut entries = Vec::new();

    if layout.uniforms.size > 0 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(layout.uniforms.size as u64),
            },
            count: None,
        });
    }

    for slot in &layout.textures {
        let sample_type = match slot.sample {
            TextureSample::Float => wgpu::TextureSampleType::Float { filterable: true },
            TextureSample::Depth => wgpu::TextureSampleType::Depth,
        };
        let view_dimension = match slot.dim {
            TextureDim::D2 => wgpu::TextureViewDimension::D2,
            TextureDim::D2Array => wgpu::TextureViewDimension::D2Array,
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot.binding,
            visibility,
            ty: wgpu::BindingType::Texture { sample_type, view_dimension, multisampled: false },
            count: None,
        });

        if let Some(sampler) = slot.sampler {
            let ty = match sampler.kind {
                SamplerKind::Comparison => wgpu::SamplerBindingType::Comparison,
                SamplerKind::Filtering => wgpu::SamplerBindingType::Filtering,
                SamplerKind::NonFiltering => wgpu::SamplerBindingType::NonFiltering,
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: sampler.binding,
                visibility,
                ty: wgpu::BindingType::Sampler(ty),
                count: None,
            });
        }
    }
    entries
}

fn create_depth_target(device: &wgpu::Device, width: u32, height: u32) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Surface Depth"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&Default::default());
    GpuTexture { _texture: texture, view }
}

/// 1×1 texture left at its zero-initialised contents
fn single_texel(
    device: &wgpu::Device,
    label: &str,
    format: wgpu::TextureFormat,
    dimension: wgpu::TextureViewDimension,
) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        dimension: Some(dimension),
        ..Default::default()
    });
    GpuTexture { _texture: texture, view }
}

fn clamp_viewport(viewport: Viewport, (width, height): (u32, u32)) -> Option<Viewport> {
    let x = viewport.x.min(width);
    let y = viewport.y.min(height);
    let clamped = Viewport {
        x,
        y,
        width: viewport.width.min(width - x),
        height: viewport.height.min(height - y),
    };
    (clamped.width > 0 && clamped.height > 0).then_some(clamped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_is_clamped_to_target() {
        let vp = clamp_viewport(Viewport::new(2048, 2048), (1024, 512)).unwrap();
        assert_eq!((vp.width, vp.height), (1024, 512));
        assert!(clamp_viewport(Viewport { x: 1024, y: 0, width: 10, height: 10 }, (1024, 1024)).is_none());
    }

    #[test]
    fn vertex_formats_follow_component_count() {
        assert_eq!(vertex_format(2), wgpu::VertexFormat::Float32x2);
        assert_eq!(vertex_format(3), wgpu::VertexFormat::Float32x3);
    }
}
