//! The seam between the resource manager and a graphics API

use super::{Program, ResourceId, TextureArray, TextureBinding, VertexBuffer, Viewport};
use crate::shader::reflect::ProgramLayout;
use crate::Result;

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum TextureArrayKind {
    Depth,
    Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureArrayDesc {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub kind: TextureArrayKind,
}

/// Where clears and draws land
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RenderTarget {
    /// The window surface and its depth buffer
    Surface,
    /// One layer of a depth array and one layer of a color array
    Framebuffer {
        depth: (TextureArray, u32),
        color: (TextureArray, u32),
    },
}

/// Everything a backend needs to issue one non-indexed draw
#[derive(Debug, Clone)]
pub struct DrawCall {
    pub program: Program,
    pub target: RenderTarget,
    pub viewport: Viewport,
    pub depth_test: bool,
    /// Contents of the uniform block, laid out per the program's reflection
    pub uniforms: Vec<u8>,
    /// One entry per texture slot of the program, in binding order. `None`
    /// samples the backend's default texture.
    pub textures: Vec<(u32, Option<TextureBinding>)>,
    /// One buffer per program input, in location order
    pub vertex_buffers: Vec<VertexBuffer>,
    pub first: u32,
    pub count: u32,
}

/// Graphics API implementation behind [`GpuResources`](super::GpuResources)
///
/// The manager does all bookkeeping and validation. A backend only creates
/// and frees objects and executes the frame's clears and draws in order.
pub trait GpuBackend {
    fn create_vertex_buffer(&mut self, id: ResourceId, data: &[f32]);

    /// `rgba` holds `width * height` RGBA8 texels, rows top to bottom
    fn create_texture(&mut self, id: ResourceId, width: u32, height: u32, rgba: &[u8]);

    fn create_texture_array(&mut self, id: ResourceId, desc: &TextureArrayDesc);

    fn create_program(
        &mut self,
        id: ResourceId,
        vertex_source: &str,
        fragment_source: &str,
        layout: &ProgramLayout,
    ) -> Result<()>;

    fn free(&mut self, id: ResourceId);

    fn clear(&mut self, target: RenderTarget, color: Option<[f32; 4]>, depth: Option<f32>);

    fn draw(&mut self, call: DrawCall);

    fn begin_frame(&mut self) -> Result<()>;

    fn end_frame(&mut self) -> Result<()>;

    fn resize(&mut self, width: u32, height: u32);
}
