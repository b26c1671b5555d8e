//! Shadow map resources and light-space matrices
//!
//! Each shadowed spot light renders depth into one layer of a shared
//! `D2Array` texture. The beauty pass samples that array with a comparison
//! sampler through the biased matrices kept here.

use crate::config::{SHADOW_FAR, SHADOW_FOV_SCALE, SHADOW_MIN_FOV_DEG, SHADOW_NEAR};
use crate::lights::SpotLight;
use crate::resources::{Framebuffer, GpuResources, TextureArray};
use crate::Result;
use glam::{Mat4, Vec3, Vec4};

/// Clip space to texture space: x,y from [-1,1] to [0,1] with v pointing
/// down, depth already in [0,1].
pub fn bias_matrix() -> Mat4 {
    Mat4::from_cols(
        Vec4::new(0.5, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -0.5, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(0.5, 0.5, 0.0, 1.0),
    )
}

/// Field of view of the virtual camera placed at a spot light, degrees
pub fn shadow_fov_deg(cone_angle_deg: f32) -> f32 {
    (SHADOW_FOV_SCALE * cone_angle_deg).max(SHADOW_MIN_FOV_DEG)
}

/// View-projection of a camera sitting at the light and looking down its axis
pub fn world_to_light_clip(light: &SpotLight) -> Mat4 {
    // look_at degenerates when the axis is parallel to the up vector
    let up = if light.direction.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(light.position, light.position + light.direction, up);
    let projection = Mat4::perspective_rh(
        shadow_fov_deg(light.angle).to_radians(),
        1.0,
        SHADOW_NEAR,
        SHADOW_FAR,
    );
    projection * view
}

pub struct ShadowMaps {
    size: u32,
    framebuffers: Vec<Framebuffer>,
    depth: TextureArray,
    color: TextureArray,
    world_to_shadow: Vec<Mat4>,
}

impl ShadowMaps {
    /// One framebuffer per shadowed light, each attached to its own layer.
    pub fn new(gpu: &mut GpuResources, count: usize, size: u32) -> Result<Self> {
        let framebuffers: Vec<Framebuffer> = (0..count).map(|_| gpu.create_framebuffer()).collect();
        let (depth, color) = match gpu.create_depth_and_color_texture_arrays(&framebuffers, size) {
            Ok(arrays) => arrays,
            Err(err) => {
                for fb in framebuffers {
                    gpu.free_framebuffer(fb);
                }
                return Err(err);
            }
        };

        let maps = Self {
            size,
            framebuffers,
            depth,
            color,
            world_to_shadow: vec![Mat4::IDENTITY; count],
        };
        let complete = maps
            .framebuffers
            .iter()
            .try_for_each(|fb| gpu.check_framebuffer(*fb));
        match complete {
            Ok(()) => Ok(maps),
            Err(err) => {
                maps.release(gpu);
                Err(err)
            }
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    pub fn framebuffer(&self, index: usize) -> Option<Framebuffer> {
        self.framebuffers.get(index).copied()
    }

    pub fn depth(&self) -> TextureArray {
        self.depth
    }

    pub fn color(&self) -> TextureArray {
        self.color
    }

    pub fn world_to_shadow(&self) -> &[Mat4] {
        &self.world_to_shadow
    }

    /// Store the biased matrix for layer `index`
    pub fn set_world_to_shadow(&mut self, index: usize, world_to_light_clip: Mat4) {
        if let Some(slot) = self.world_to_shadow.get_mut(index) {
            *slot = bias_matrix() * world_to_light_clip;
        }
    }

    pub fn release(self, gpu: &mut GpuResources) {
        for fb in self.framebuffers {
            gpu.free_framebuffer(fb);
        }
        gpu.free_texture_array(self.depth);
        gpu.free_texture_array(self.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::recording_resources;
    use approx::assert_abs_diff_eq;

    fn overhead_spot(angle: f32) -> SpotLight {
        SpotLight {
            radiance: Vec3::ONE,
            position: Vec3::new(0.0, 100.0, 0.0),
            direction: Vec3::NEG_Y,
            angle,
        }
    }

    #[test]
    fn bias_maps_clip_centre_to_texture_centre() {
        let p = bias_matrix() * Vec4::new(0.0, 0.0, 0.25, 1.0);
        assert_abs_diff_eq!(p, Vec4::new(0.5, 0.5, 0.25, 1.0));

        let top_left = bias_matrix() * Vec4::new(-1.0, 1.0, 0.0, 1.0);
        assert_abs_diff_eq!(top_left.truncate().truncate(), glam::Vec2::ZERO);
    }

    #[test]
    fn fov_is_widened_and_floored() {
        assert_eq!(shadow_fov_deg(20.0), 60.0);
        assert_abs_diff_eq!(shadow_fov_deg(50.0), 70.0, epsilon = 1e-4);
    }

    #[test]
    fn light_axis_projects_to_clip_centre() {
        let m = world_to_light_clip(&overhead_spot(30.0));
        let clip = m * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;

        assert_abs_diff_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn maps_are_complete_and_released() {
        let (mut gpu, _log) = recording_resources();
        let mut maps = ShadowMaps::new(&mut gpu, 3, 256).unwrap();
        assert_eq!(maps.len(), 3);
        for i in 0..3 {
            gpu.check_framebuffer(maps.framebuffer(i).unwrap()).unwrap();
        }

        maps.set_world_to_shadow(1, Mat4::IDENTITY);
        assert_eq!(maps.world_to_shadow()[1], bias_matrix());

        maps.release(&mut gpu);
        assert_eq!(gpu.live_resource_count(), 0);
    }

    #[test]
    fn zero_size_is_a_framebuffer_error() {
        let (mut gpu, _log) = recording_resources();
        assert!(ShadowMaps::new(&mut gpu, 2, 0).is_err());
        assert_eq!(gpu.live_resource_count(), 0);
    }
}
