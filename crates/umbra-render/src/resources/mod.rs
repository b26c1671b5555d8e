//! GPU resource manager
//!
//! Every resource kind gets its own handle type so a texture can never be
//! handed to something expecting a framebuffer. The manager keeps the
//! bookkeeping a GL-style immediate API needs (bound framebuffer, program and
//! vertex array, texture units, viewport, depth test) and turns each
//! `draw_arrays` into a self-contained [`DrawCall`] for the backend.

mod backend;
mod binding;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod wgpu_backend;

pub use backend::{DrawCall, GpuBackend, RenderTarget, TextureArrayDesc, TextureArrayKind};
pub use binding::{BindGuard, BindingContext};
pub use wgpu_backend::WgpuBackend;

use crate::shader::reflect::{self, ProgramLayout, TextureDim, TextureSample, TextureSlot, UniformValue};
use crate::{Error, Result};
use std::collections::HashMap;

/// Unique identifier for a resource
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct ResourceId(u64);

impl ResourceId {
    fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

macro_rules! handles {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
            pub struct $name(ResourceId);

            impl $name {
                pub fn id(self) -> ResourceId {
                    self.0
                }
            }
        )*
    };
}

handles!(
    /// Flat `f32` attribute data
    VertexBuffer,
    /// Attribute location to buffer mapping
    VertexArray,
    /// 2D RGBA8 texture
    Texture,
    /// Layered depth or color texture
    TextureArray,
    /// Depth + color attachment pair (one layer each)
    Framebuffer,
    /// Linked vertex + fragment program
    Program,
);

/// A texture that can be attached to a texture unit
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextureBinding {
    Texture(Texture),
    Array(TextureArray),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

struct ProgramState {
    layout: ProgramLayout,
    uniforms: Vec<u8>,
    /// Sampler name to texture unit
    sampler_units: HashMap<String, u32>,
}

#[derive(Default)]
struct FramebufferState {
    depth: Option<(TextureArray, u32)>,
    color: Option<(TextureArray, u32)>,
}

/// Owner of every GPU object the renderer creates
pub struct GpuResources {
    backend: Box<dyn GpuBackend>,
    bindings: BindingContext,

    vertex_buffers: HashMap<VertexBuffer, usize>,
    vertex_arrays: HashMap<VertexArray, HashMap<u32, (VertexBuffer, u32)>>,
    textures: HashMap<Texture, (u32, u32)>,
    texture_arrays: HashMap<TextureArray, TextureArrayDesc>,
    framebuffers: HashMap<Framebuffer, FramebufferState>,
    programs: HashMap<Program, ProgramState>,

    texture_units: Vec<Option<TextureBinding>>,
    viewport: Viewport,
    depth_test: bool,
    surface_size: (u32, u32),
}

impl GpuResources {
    pub fn new(backend: Box<dyn GpuBackend>, surface_width: u32, surface_height: u32) -> Self {
        Self {
            backend,
            bindings: BindingContext::new(),
            vertex_buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            texture_arrays: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            texture_units: Vec::new(),
            viewport: Viewport::new(surface_width, surface_height),
            depth_test: false,
            surface_size: (surface_width, surface_height),
        }
    }

    pub fn bindings(&self) -> &BindingContext {
        &self.bindings
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    // ── Creation ────────────────────────────────────────────────────────────

    pub fn create_vertex_buffer(&mut self, data: &[f32]) -> VertexBuffer {
        let handle = VertexBuffer(ResourceId::new());
        self.backend.create_vertex_buffer(handle.0, data);
        self.vertex_buffers.insert(handle, data.len());
        log::debug!("Created vertex buffer {:?} ({} floats)", handle.0, data.len());
        handle
    }

    pub fn create_vertex_array(&mut self) -> VertexArray {
        let handle = VertexArray(ResourceId::new());
        self.vertex_arrays.insert(handle, HashMap::new());
        log::debug!("Created vertex array {:?}", handle.0);
        handle
    }

    pub fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<Texture> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(Error::Resource(format!(
                "texture data is {} bytes, expected {} for {}x{} RGBA8",
                rgba.len(),
                expected,
                width,
                height
            )));
        }
        let handle = Texture(ResourceId::new());
        self.backend.create_texture(handle.0, width, height, rgba);
        self.textures.insert(handle, (width, height));
        log::debug!("Created texture {:?} ({}x{})", handle.0, width, height);
        Ok(handle)
    }

    pub fn create_texture_array(&mut self, desc: TextureArrayDesc) -> TextureArray {
        let handle = TextureArray(ResourceId::new());
        self.backend.create_texture_array(handle.0, &desc);
        self.texture_arrays.insert(handle, desc);
        log::debug!("Created texture array {:?} ({:?})", handle.0, desc);
        handle
    }

    pub fn create_framebuffer(&mut self) -> Framebuffer {
        let handle = Framebuffer(ResourceId::new());
        self.framebuffers.insert(handle, FramebufferState::default());
        log::debug!("Created framebuffer {:?}", handle.0);
        handle
    }

    /// Create one depth array and one color array with a layer per
    /// framebuffer, and attach layer `i` of both to `framebuffers[i]`.
    pub fn create_depth_and_color_texture_arrays(
        &mut self,
        framebuffers: &[Framebuffer],
        size: u32,
    ) -> Result<(TextureArray, TextureArray)> {
        if framebuffers.is_empty() || size == 0 {
            return Err(Error::Framebuffer(format!(
                "cannot create {} layers of {}x{}",
                framebuffers.len(),
                size,
                size
            )));
        }
        let layers = framebuffers.len() as u32;
        let depth = self.create_texture_array(TextureArrayDesc {
            width: size,
            height: size,
            layers,
            kind: TextureArrayKind::Depth,
        });
        let color = self.create_texture_array(TextureArrayDesc {
            width: size,
            height: size,
            layers,
            kind: TextureArrayKind::Color,
        });

        for (layer, fb) in framebuffers.iter().enumerate() {
            let state = self
                .framebuffers
                .get_mut(fb)
                .ok_or_else(|| Error::Framebuffer(format!("unknown framebuffer {:?}", fb.0)))?;
            state.depth = Some((depth, layer as u32));
            state.color = Some((color, layer as u32));
        }
        Ok((depth, color))
    }

    /// Compile, reflect and link a program from WGSL sources
    pub fn create_program(&mut self, vertex_source: &str, fragment_source: &str) -> Result<Program> {
        let vertex = reflect::reflect_stage(vertex_source, reflect::Stage::Vertex)
            .map_err(|log| Error::Shader(format!("vertex stage failed to compile:\n{}", log)))?;
        let fragment = reflect::reflect_stage(fragment_source, reflect::Stage::Fragment)
            .map_err(|log| Error::Shader(format!("fragment stage failed to compile:\n{}", log)))?;
        let layout = reflect::link(vertex, fragment)
            .map_err(|log| Error::Shader(format!("link failed: {}", log)))?;

        let handle = Program(ResourceId::new());
        self.backend.create_program(handle.0, vertex_source, fragment_source, &layout)?;

        log::debug!(
            "Created program {:?}: {} uniform bytes, {} textures, {} inputs",
            handle.0,
            layout.uniforms.size,
            layout.textures.len(),
            layout.inputs.len()
        );
        let uniforms = vec![0u8; layout.uniforms.size as usize];
        self.programs.insert(
            handle,
            ProgramState { layout, uniforms, sampler_units: HashMap::new() },
        );
        Ok(handle)
    }

    /// Both attachments must be present and the same size.
    pub fn check_framebuffer(&self, fb: Framebuffer) -> Result<()> {
        let state = self
            .framebuffers
            .get(&fb)
            .ok_or_else(|| Error::Framebuffer(format!("unknown framebuffer {:?}", fb.0)))?;
        let (Some(depth), Some(color)) = (state.depth, state.color) else {
            return Err(Error::Framebuffer(format!(
                "framebuffer {:?} is missing an attachment",
                fb.0
            )));
        };
        let depth_desc = self.attachment_desc(depth, TextureArrayKind::Depth)?;
        let color_desc = self.attachment_desc(color, TextureArrayKind::Color)?;
        if (depth_desc.width, depth_desc.height) != (color_desc.width, color_desc.height) {
            return Err(Error::Framebuffer(format!(
                "framebuffer {:?} attachments differ in size ({}x{} vs {}x{})",
                fb.0, depth_desc.width, depth_desc.height, color_desc.width, color_desc.height
            )));
        }
        Ok(())
    }

    fn attachment_desc(&self, (array, layer): (TextureArray, u32), kind: TextureArrayKind) -> Result<TextureArrayDesc> {
        match self.texture_arrays.get(&array) {
            Some(desc) if desc.kind == kind && layer < desc.layers => Ok(*desc),
            Some(_) => Err(Error::Framebuffer(format!(
                "attachment {:?} layer {} is not a valid {:?} layer",
                array.0, layer, kind
            ))),
            None => Err(Error::Framebuffer(format!("attachment {:?} was freed", array.0))),
        }
    }

    pub fn program_layout(&self, program: Program) -> Option<&ProgramLayout> {
        self.programs.get(&program).map(|p| &p.layout)
    }

    // ── Release ─────────────────────────────────────────────────────────────

    pub fn free_vertex_buffer(&mut self, handle: VertexBuffer) {
        if self.vertex_buffers.remove(&handle).is_some() {
            self.backend.free(handle.0);
            log::debug!("Freed vertex buffer {:?}", handle.0);
        }
    }

    pub fn free_vertex_array(&mut self, handle: VertexArray) {
        if self.vertex_arrays.remove(&handle).is_some() {
            log::debug!("Freed vertex array {:?}", handle.0);
        }
    }

    pub fn free_texture(&mut self, handle: Texture) {
        if self.textures.remove(&handle).is_some() {
            self.backend.free(handle.0);
            log::debug!("Freed texture {:?}", handle.0);
        }
    }

    pub fn free_texture_array(&mut self, handle: TextureArray) {
        if self.texture_arrays.remove(&handle).is_some() {
            self.backend.free(handle.0);
            log::debug!("Freed texture array {:?}", handle.0);
        }
    }

    pub fn free_framebuffer(&mut self, handle: Framebuffer) {
        if self.framebuffers.remove(&handle).is_some() {
            log::debug!("Freed framebuffer {:?}", handle.0);
        }
    }

    pub fn free_program(&mut self, handle: Program) {
        if self.programs.remove(&handle).is_some() {
            self.backend.free(handle.0);
            log::debug!("Freed program {:?}", handle.0);
        }
    }

    /// Number of live objects, all kinds together
    pub fn live_resource_count(&self) -> usize {
        self.vertex_buffers.len()
            + self.vertex_arrays.len()
            + self.textures.len()
            + self.texture_arrays.len()
            + self.framebuffers.len()
            + self.programs.len()
    }

    // ── Binding ─────────────────────────────────────────────────────────────

    pub fn bind_framebuffer(&self, fb: Framebuffer) -> BindGuard<Framebuffer> {
        self.bindings.bind_framebuffer(fb)
    }

    pub fn bind_program(&self, program: Program) -> BindGuard<Program> {
        self.bindings.bind_program(program)
    }

    pub fn bind_vertex_array(&self, vao: VertexArray) -> BindGuard<VertexArray> {
        self.bindings.bind_vertex_array(vao)
    }

    pub fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.viewport = Viewport { x, y, width, height };
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    // ── Program parameters ──────────────────────────────────────────────────

    /// Write a named uniform of `program`. Returns `false` if the program has
    /// no such uniform or the value does not fit its type.
    pub fn set_uniform(&mut self, program: Program, name: &str, value: impl Into<UniformValue>) -> bool {
        let Some(state) = self.programs.get_mut(&program) else {
            return false;
        };
        match state.layout.uniforms.fields.get(name) {
            Some(field) => {
                let written = field.write(value.into(), &mut state.uniforms);
                if !written {
                    log::trace!("Uniform '{}' does not accept this value type", name);
                }
                written
            }
            None => {
                log::trace!("No active uniform '{}' in program {:?}", name, program.0);
                false
            }
        }
    }

    /// Attach `buffer` to the program input `name` in the bound vertex array.
    pub fn set_vertex_buffer(&mut self, program: Program, name: &str, components: u32, buffer: VertexBuffer) -> bool {
        let Some(input) = self.programs.get(&program).and_then(|p| p.layout.input(name)) else {
            log::trace!("No active attribute '{}' in program {:?}", name, program.0);
            return false;
        };
        if input.components != components {
            log::warn!(
                "Attribute '{}' has {} components, buffer provides {}",
                name,
                input.components,
                components
            );
            return false;
        }
        let location = input.location;
        let Some(vao) = self.bindings.vertex_array() else {
            log::warn!("set_vertex_buffer('{}') without a bound vertex array", name);
            return false;
        };
        match self.vertex_arrays.get_mut(&vao) {
            Some(attributes) => {
                attributes.insert(location, (buffer, components));
                true
            }
            None => false,
        }
    }

    /// Put `texture` on `unit` and point the sampler `name` of `program` at it.
    pub fn set_texture_sampler(&mut self, program: Program, name: &str, texture: TextureBinding, unit: u32) -> bool {
        let Some(state) = self.programs.get_mut(&program) else {
            return false;
        };
        let Some(slot) = state.layout.texture(name) else {
            log::trace!("No active sampler '{}' in program {:?}", name, program.0);
            return false;
        };
        let compatible = binding_matches(slot, texture, &self.texture_arrays);
        if !compatible {
            log::warn!("Texture {:?} does not match sampler '{}' ({:?} {:?})", texture, name, slot.dim, slot.sample);
            return false;
        }

        state.sampler_units.insert(name.to_string(), unit);
        let unit = unit as usize;
        if self.texture_units.len() <= unit {
            self.texture_units.resize(unit + 1, None);
        }
        self.texture_units[unit] = Some(texture);
        true
    }

    // ── Commands ────────────────────────────────────────────────────────────

    fn current_target(&self) -> Option<RenderTarget> {
        let Some(fb) = self.bindings.framebuffer() else {
            return Some(RenderTarget::Surface);
        };
        match self.framebuffers.get(&fb) {
            Some(FramebufferState { depth: Some(depth), color: Some(color) }) => {
                Some(RenderTarget::Framebuffer { depth: *depth, color: *color })
            }
            _ => {
                log::warn!("Framebuffer {:?} is incomplete, command skipped", fb.0);
                None
            }
        }
    }

    /// Clear the bound framebuffer (or the surface when none is bound).
    pub fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        if color.is_none() && depth.is_none() {
            return;
        }
        if let Some(target) = self.current_target() {
            self.backend.clear(target, color, depth);
        }
    }

    /// Draw `count` vertices starting at `first` with the bound program and
    /// vertex array. Returns `false` if the draw had to be skipped.
    pub fn draw_arrays(&mut self, first: u32, count: u32) -> bool {
        if count == 0 {
            return true;
        }
        let Some(program) = self.bindings.program() else {
            log::warn!("draw_arrays without a bound program");
            return false;
        };
        let Some(vao) = self.bindings.vertex_array() else {
            log::warn!("draw_arrays without a bound vertex array");
            return false;
        };
        let (Some(state), Some(attributes)) = (self.programs.get(&program), self.vertex_arrays.get(&vao)) else {
            return false;
        };

        let mut vertex_buffers = Vec::with_capacity(state.layout.inputs.len());
        for input in &state.layout.inputs {
            let Some(&(buffer, components)) = attributes.get(&input.location) else {
                log::warn!("Attribute '{}' has no buffer, draw skipped", input.name);
                return false;
            };
            let available = self.vertex_buffers.get(&buffer).copied().unwrap_or(0);
            let needed = (first as usize + count as usize) * components as usize;
            if available < needed {
                log::warn!(
                    "Attribute '{}' buffer holds {} floats, draw needs {}",
                    input.name,
                    available,
                    needed
                );
                return false;
            }
            vertex_buffers.push(buffer);
        }

        let textures = state
            .layout
            .textures
            .iter()
            .map(|slot| {
                let bound = state
                    .sampler_units
                    .get(&slot.name)
                    .and_then(|unit| self.texture_units.get(*unit as usize).copied().flatten())
                    .filter(|binding| self.binding_alive(*binding))
                    .filter(|binding| binding_matches(slot, *binding, &self.texture_arrays));
                (slot.binding, bound)
            })
            .collect();

        let Some(target) = self.current_target() else {
            return false;
        };

        let call = DrawCall {
            program,
            target,
            viewport: self.viewport,
            depth_test: self.depth_test,
            uniforms: state.uniforms.clone(),
            textures,
            vertex_buffers,
            first,
            count,
        };
        log::trace!("Draw {:?}: {} vertices to {:?}", program.0, count, target);
        self.backend.draw(call);
        true
    }

    fn binding_alive(&self, binding: TextureBinding) -> bool {
        match binding {
            TextureBinding::Texture(t) => self.textures.contains_key(&t),
            TextureBinding::Array(a) => self.texture_arrays.contains_key(&a),
        }
    }

    // ── Frame ───────────────────────────────────────────────────────────────

    pub fn begin_frame(&mut self) -> Result<()> {
        self.backend.begin_frame()
    }

    pub fn end_frame(&mut self) -> Result<()> {
        self.backend.end_frame()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.surface_size {
            return;
        }
        self.surface_size = (width, height);
        self.backend.resize(width, height);
        log::debug!("Surface resized to {}x{}", width, height);
    }
}

fn binding_matches(
    slot: &TextureSlot,
    binding: TextureBinding,
    arrays: &HashMap<TextureArray, TextureArrayDesc>,
) -> bool {
    match (slot.dim, binding) {
        (TextureDim::D2, TextureBinding::Texture(_)) => slot.sample == TextureSample::Float,
        (TextureDim::D2Array, TextureBinding::Array(array)) => match arrays.get(&array).map(|d| d.kind) {
            Some(TextureArrayKind::Depth) => slot.sample == TextureSample::Depth,
            Some(TextureArrayKind::Color) => slot.sample == TextureSample::Float,
            None => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::testing::recording_resources;
    use super::*;

    const VERT: &str = r#"
struct Uniforms { mvp: mat4x4<f32>, tint: vec3<f32>, }
@group(0) @binding(0) var<uniform> u: Uniforms;

@vertex
fn vs_main(@location(0) vtx_position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return u.mvp * vec4<f32>(vtx_position, 1.0);
}
"#;

    const FRAG: &str = r#"
struct Uniforms { mvp: mat4x4<f32>, tint: vec3<f32>, }
@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var layers: texture_depth_2d_array;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    let d = textureLoad(layers, vec2<i32>(0, 0), 0, 0);
    return vec4<f32>(u.tint * d, 1.0);
}
"#;

    #[test]
    fn draw_uses_bound_state() {
        let (mut gpu, log) = recording_resources();
        let program = gpu.create_program(VERT, FRAG).unwrap();
        let vao = gpu.create_vertex_array();
        let buffer = gpu.create_vertex_buffer(&[0.0; 9]);

        let _program = gpu.bind_program(program);
        let _vao = gpu.bind_vertex_array(vao);
        assert!(gpu.set_vertex_buffer(program, "vtx_position", 3, buffer));
        assert!(gpu.set_uniform(program, "tint", glam::Vec3::ONE));
        assert!(gpu.draw_arrays(0, 3));

        let log = log.borrow();
        assert_eq!(log.draws.len(), 1);
        assert_eq!(log.draws[0].target, RenderTarget::Surface);
        assert_eq!(log.draws[0].vertex_buffers, vec![buffer]);
        assert_eq!(log.draws[0].textures, vec![(1, None)]);
    }

    #[test]
    fn unknown_parameters_report_false() {
        let (mut gpu, _log) = recording_resources();
        let program = gpu.create_program(VERT, FRAG).unwrap();
        let buffer = gpu.create_vertex_buffer(&[0.0; 6]);
        let vao = gpu.create_vertex_array();
        let _vao = gpu.bind_vertex_array(vao);

        assert!(!gpu.set_uniform(program, "missing", 1.0f32));
        assert!(!gpu.set_vertex_buffer(program, "vtx_normal", 3, buffer));
        assert!(!gpu.set_vertex_buffer(program, "vtx_position", 2, buffer));
    }

    #[test]
    fn draw_without_attribute_buffer_is_skipped() {
        let (mut gpu, log) = recording_resources();
        let program = gpu.create_program(VERT, FRAG).unwrap();
        let vao = gpu.create_vertex_array();

        let _program = gpu.bind_program(program);
        let _vao = gpu.bind_vertex_array(vao);
        assert!(!gpu.draw_arrays(0, 3));
        assert!(log.borrow().draws.is_empty());
    }

    #[test]
    fn sampler_kind_must_match() {
        let (mut gpu, _log) = recording_resources();
        let program = gpu.create_program(VERT, FRAG).unwrap();
        let fbs = [gpu.create_framebuffer(), gpu.create_framebuffer()];
        let (depth, color) = gpu.create_depth_and_color_texture_arrays(&fbs, 64).unwrap();

        assert!(!gpu.set_texture_sampler(program, "layers", TextureBinding::Array(color), 0));
        assert!(gpu.set_texture_sampler(program, "layers", TextureBinding::Array(depth), 0));
    }

    #[test]
    fn framebuffer_completeness() {
        let (mut gpu, _log) = recording_resources();
        let lonely = gpu.create_framebuffer();
        assert!(matches!(gpu.check_framebuffer(lonely), Err(Error::Framebuffer(_))));

        let fbs = [gpu.create_framebuffer(), gpu.create_framebuffer()];
        let (depth, _color) = gpu.create_depth_and_color_texture_arrays(&fbs, 32).unwrap();
        assert!(gpu.check_framebuffer(fbs[1]).is_ok());

        gpu.free_texture_array(depth);
        assert!(gpu.check_framebuffer(fbs[0]).is_err());
    }

    #[test]
    fn clear_targets_bound_framebuffer_layer() {
        let (mut gpu, log) = recording_resources();
        let fbs = [gpu.create_framebuffer(), gpu.create_framebuffer()];
        let (depth, color) = gpu.create_depth_and_color_texture_arrays(&fbs, 16).unwrap();
        {
            let _fb = gpu.bind_framebuffer(fbs[1]);
            gpu.clear(Some([0.0; 4]), Some(1.0));
        }
        gpu.clear(None, Some(1.0));

        let log = log.borrow();
        assert_eq!(
            log.clears[0].0,
            RenderTarget::Framebuffer { depth: (depth, 1), color: (color, 1) }
        );
        assert_eq!(log.clears[1].0, RenderTarget::Surface);
    }

    #[test]
    fn bad_source_is_a_shader_error() {
        let (mut gpu, _log) = recording_resources();
        let err = gpu.create_program("not wgsl", FRAG).unwrap_err();
        assert!(matches!(err, Error::Shader(_)));
        assert_eq!(gpu.live_resource_count(), 0);
    }
}
