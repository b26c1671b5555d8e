//! Umbra Render - shadow-mapped forward renderer
//!
//! The renderer is written against an immediate-style resource manager:
//!
//! - Typed handles for every GPU resource kind
//! - Scoped binds that reset their target to "nothing bound" on drop
//! - Named shader parameters resolved by reflecting the WGSL sources
//! - A [`GpuBackend`](resources::GpuBackend) seam so the pass logic runs
//!   against wgpu in the viewer and against a recorder in tests
//!
//! A [`Scene`] owns drawables, classified lights and the shadow maps, and runs
//! one shadow pass per shadowed spot light followed by the beauty pass.

pub mod config;
pub mod lights;
pub mod mesh;
pub mod object;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod shadow;
pub mod viz;

pub use config::RenderConfig;
pub use lights::{AmbientLight, DirectionalLight, Light, LightSet, PointLight, SpotLight};
pub use mesh::Mesh;
pub use object::SceneObject;
pub use resources::{GpuBackend, GpuResources, WgpuBackend};
pub use scene::{RenderState, Scene};
pub use shader::Shader;

/// Result type for renderer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or drawing a scene
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Shader error: {0}")]
    Shader(String),

    #[error("Framebuffer error: {0}")]
    Framebuffer(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Texture error: {0}")]
    Texture(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WGPU error: {0}")]
    Wgpu(String),
}

impl From<wgpu::Error> for Error {
    fn from(err: wgpu::Error) -> Self {
        Error::Wgpu(err.to_string())
    }
}
