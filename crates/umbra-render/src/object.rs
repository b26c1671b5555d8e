//! Drawable scene objects

use crate::lights::LightSet;
use crate::mesh::Mesh;
use crate::resources::{GpuResources, TextureArray};
use crate::shader::Shader;
use crate::Result;
use glam::{Mat4, Vec3};
use umbra_core::BBox;

/// Per-frame state shared by every object in the beauty pass
pub struct DrawContext<'a> {
    pub lights: &'a LightSet,
    pub camera_position: Vec3,
    /// Biased world-to-shadow-texture matrix per shadowed light
    pub world_to_shadow: &'a [Mat4],
    pub shadow_depth: Option<TextureArray>,
}

pub enum SceneObject {
    Mesh(Mesh),
}

impl SceneObject {
    pub fn draw(&mut self, gpu: &mut GpuResources, world_to_clip: &Mat4, ctx: &DrawContext<'_>) -> bool {
        match self {
            SceneObject::Mesh(mesh) => mesh.draw(gpu, world_to_clip, ctx),
        }
    }

    pub fn draw_shadow(&self, gpu: &mut GpuResources, world_to_light_clip: &Mat4, shadow_shader: &Shader) -> bool {
        match self {
            SceneObject::Mesh(mesh) => mesh.draw_shadow(gpu, world_to_light_clip, shadow_shader),
        }
    }

    pub fn bbox(&self) -> BBox {
        match self {
            SceneObject::Mesh(mesh) => mesh.bbox(),
        }
    }

    pub fn reload_shaders(&mut self, gpu: &mut GpuResources) -> Result<()> {
        match self {
            SceneObject::Mesh(mesh) => mesh.reload_shaders(gpu),
        }
    }

    pub fn release(&mut self, gpu: &mut GpuResources) {
        match self {
            SceneObject::Mesh(mesh) => mesh.release(gpu),
        }
    }
}

impl From<Mesh> for SceneObject {
    fn from(mesh: Mesh) -> Self {
        SceneObject::Mesh(mesh)
    }
}
