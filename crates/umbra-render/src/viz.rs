//! Full-screen view of the shadow map arrays

use crate::config::{RenderConfig, SHADOW_FAR, SHADOW_NEAR};
use crate::resources::{GpuResources, TextureArray, VertexArray, VertexBuffer};
use crate::shader::Shader;
use crate::Result;
use std::path::Path;

pub const VIZ_VERTEX_SHADER: &str = "shadow_viz.vert.wgsl";
pub const VIZ_FRAGMENT_SHADER: &str = "shadow_viz.frag.wgsl";

/// Two triangles covering clip space at depth `z`, with matching UVs
pub fn quad_buffers(z: f32) -> (Vec<f32>, Vec<f32>) {
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    let positions = corners.iter().flat_map(|&(x, y)| [x, y, z]).collect();
    let texcoords = corners
        .iter()
        .flat_map(|&(x, y)| [(x + 1.0) * 0.5, (y + 1.0) * 0.5])
        .collect();
    (positions, texcoords)
}

pub struct ShadowViz {
    vertex_array: VertexArray,
    position_buffer: VertexBuffer,
    texcoord_buffer: VertexBuffer,
    shader: Shader,
}

impl ShadowViz {
    pub fn new(gpu: &mut GpuResources, shader_dir: &Path, config: &RenderConfig) -> Result<Self> {
        let shader = Shader::new(
            gpu,
            shader_dir.join(VIZ_VERTEX_SHADER),
            shader_dir.join(VIZ_FRAGMENT_SHADER),
            config.abort_on_init_failure,
        )?;
        let (positions, texcoords) = quad_buffers(0.0);
        Ok(Self {
            vertex_array: gpu.create_vertex_array(),
            position_buffer: gpu.create_vertex_buffer(&positions),
            texcoord_buffer: gpu.create_vertex_buffer(&texcoords),
            shader,
        })
    }

    /// Draws every layer of both arrays side by side
    pub fn draw(&mut self, gpu: &mut GpuResources, depth: TextureArray, color: TextureArray, layers: usize) -> bool {
        let _vertex_array = gpu.bind_vertex_array(self.vertex_array);
        let Some(_program) = self.shader.bind(gpu) else {
            return false;
        };
        self.shader.set_vertex_buffer(gpu, "vtx_position", 3, self.position_buffer);
        self.shader.set_vertex_buffer(gpu, "vtx_texcoord", 2, self.texcoord_buffer);
        self.shader.set_texture_array_sampler(gpu, "depthTextureArray", depth);
        self.shader.set_texture_array_sampler(gpu, "colorTextureArray", color);
        self.shader.set_scalar_parameter(gpu, "num_layers", layers as i32);
        self.shader.set_scalar_parameter(gpu, "near_clip", SHADOW_NEAR);
        self.shader.set_scalar_parameter(gpu, "far_clip", SHADOW_FAR);

        gpu.draw_arrays(0, 6)
    }

    pub fn reload(&mut self, gpu: &mut GpuResources) -> Result<()> {
        self.shader.reload(gpu)
    }

    pub fn release(mut self, gpu: &mut GpuResources) {
        gpu.free_vertex_array(self.vertex_array);
        gpu.free_vertex_buffer(self.position_buffer);
        gpu.free_vertex_buffer(self.texcoord_buffer);
        self.shader.release(gpu);
    }
}
