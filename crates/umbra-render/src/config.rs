//! Renderer configuration

use std::path::PathBuf;

/// Default cap on the number of spot lights that get a shadow map
pub const DEFAULT_MAX_SHADOWED_LIGHTS: usize = 8;
/// Default shadow map resolution (square)
pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 1024;
/// Default range of the per-spot rotation speed in disco mode, radians per frame
pub const DEFAULT_SPOT_ROTATION_SPEED_RANGE: f32 = 0.1;

/// Length of each per-kind light array in the mesh shader
pub const MAX_SHADER_LIGHTS: usize = 8;
/// Ambient term added when a scene brings no usable lights
pub const DEFAULT_AMBIENT_RADIANCE: f32 = 0.1;

/// Near plane of the virtual shadow camera
pub const SHADOW_NEAR: f32 = 10.0;
/// Far plane of the virtual shadow camera
pub const SHADOW_FAR: f32 = 400.0;
/// Lower bound on the shadow camera field of view, degrees
pub const SHADOW_MIN_FOV_DEG: f32 = 60.0;
/// Widening applied to the spot cone angle for the shadow camera
pub const SHADOW_FOV_SCALE: f32 = 1.4;

/// Scene construction options
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub max_shadowed_lights: usize,
    pub shadow_map_size: u32,
    /// When set, a shader that fails to build during construction is an error.
    /// Otherwise it stays unlinked and draws through it are skipped.
    pub abort_on_init_failure: bool,
    pub spot_rotation_speed_range: f32,
    /// Overrides the scene's `base_shader_dir`
    pub shader_dir: Option<PathBuf>,
}

impl RenderConfig {
    pub fn new() -> Self {
        Self {
            max_shadowed_lights: DEFAULT_MAX_SHADOWED_LIGHTS,
            shadow_map_size: DEFAULT_SHADOW_MAP_SIZE,
            abort_on_init_failure: true,
            spot_rotation_speed_range: DEFAULT_SPOT_ROTATION_SPEED_RANGE,
            shader_dir: None,
        }
    }

    pub fn with_max_shadowed_lights(mut self, max: usize) -> Self {
        self.max_shadowed_lights = max;
        self
    }

    pub fn with_shadow_map_size(mut self, size: u32) -> Self {
        self.shadow_map_size = size;
        self
    }

    pub fn with_abort_on_init_failure(mut self, abort: bool) -> Self {
        self.abort_on_init_failure = abort;
        self
    }

    pub fn with_spot_rotation_speed_range(mut self, range: f32) -> Self {
        self.spot_rotation_speed_range = range;
        self
    }

    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::new()
    }
}
