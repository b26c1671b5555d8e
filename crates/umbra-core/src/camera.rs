//! Orbit camera
//!
//! The camera sits on a sphere of radius `r` around a target point, at polar
//! angle `phi` (from +Y) and azimuth `theta` (from +Z towards +X). The
//! camera-to-world basis is recomputed from those values after every change.

use crate::description::CameraInfo;
use glam::{Mat3, Mat4, Vec3};

const PHI_EPSILON: f32 = 1e-5;

#[derive(Clone, Debug)]
pub struct Camera {
    h_fov: f32,
    v_fov: f32,
    ar: f32,
    near_clip: f32,
    far_clip: f32,

    pos: Vec3,
    target_pos: Vec3,
    phi: f32,
    theta: f32,
    r: f32,
    min_r: f32,
    max_r: f32,

    /// Columns: screen X, screen Y, direction from target to camera.
    c2w: Mat3,

    screen_w: u32,
    screen_h: u32,
    screen_dist: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            h_fov: 50.0,
            v_fov: 35.0,
            ar: 1.0,
            near_clip: 0.1,
            far_clip: 100.0,
            pos: Vec3::Z,
            target_pos: Vec3::ZERO,
            phi: std::f32::consts::FRAC_PI_2,
            theta: 0.0,
            r: 1.0,
            min_r: 0.0,
            max_r: f32::INFINITY,
            c2w: Mat3::IDENTITY,
            screen_w: 1,
            screen_h: 1,
            screen_dist: 1.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lens from `info` and widen whichever field of view is too
    /// narrow for the screen aspect ratio.
    pub fn configure(&mut self, info: &CameraInfo, screen_w: u32, screen_h: u32) {
        self.screen_w = screen_w;
        self.screen_h = screen_h;
        self.near_clip = info.n_clip;
        self.far_clip = info.f_clip;
        self.h_fov = info.h_fov;
        self.v_fov = info.v_fov;

        let ar1 = half_tan(self.h_fov) / half_tan(self.v_fov);
        self.ar = screen_w as f32 / screen_h.max(1) as f32;
        if ar1 < self.ar {
            self.h_fov = 2.0 * (half_tan(self.v_fov) * self.ar).atan().to_degrees();
        } else if ar1 > self.ar {
            self.v_fov = 2.0 * (half_tan(self.h_fov) / self.ar).atan().to_degrees();
        }
        self.screen_dist = screen_h as f32 / (2.0 * half_tan(self.v_fov));
    }

    pub fn place(&mut self, target: Vec3, phi: f32, theta: f32, r: f32, min_r: f32, max_r: f32) {
        self.r = r.max(min_r).min(max_r);
        self.phi = if phi.sin() == 0.0 { phi + PHI_EPSILON } else { phi };
        self.target_pos = target;
        self.theta = theta;
        self.min_r = min_r;
        self.max_r = max_r;
        self.compute_position();
    }

    /// Copy the placement of `other`, leaving the lens untouched.
    ///
    /// The orbit radius is not copied; the next `move_forward` rescales from
    /// this camera's own radius.
    pub fn copy_placement(&mut self, other: &Camera) {
        self.pos = other.pos;
        self.target_pos = other.target_pos;
        self.phi = other.phi;
        self.theta = other.theta;
        self.min_r = other.min_r;
        self.max_r = other.max_r;
        self.c2w = other.c2w;
    }

    pub fn set_screen_size(&mut self, screen_w: u32, screen_h: u32) {
        self.screen_w = screen_w;
        self.screen_h = screen_h;
        self.ar = screen_w as f32 / screen_h.max(1) as f32;
        self.h_fov = 2.0 * (screen_w as f32 / (2.0 * self.screen_dist)).atan().to_degrees();
        self.v_fov = 2.0 * (screen_h as f32 / (2.0 * self.screen_dist)).atan().to_degrees();
    }

    /// Pan by a screen-space offset, scaled so that `d` world units at the
    /// target correspond to `screen_dist` pixels.
    pub fn move_by(&mut self, dx: f32, dy: f32, d: f32) {
        let scale = d / self.screen_dist;
        let displacement = self.c2w.x_axis * (dx * scale) + self.c2w.y_axis * (dy * scale);
        self.pos += displacement;
        self.target_pos += displacement;
    }

    pub fn move_forward(&mut self, dist: f32) {
        let new_r = (self.r - dist).max(self.min_r).min(self.max_r);
        self.pos = self.target_pos + (self.pos - self.target_pos) * (new_r / self.r);
        self.r = new_r;
    }

    pub fn rotate_by(&mut self, d_phi: f32, d_theta: f32) {
        self.phi = (self.phi + d_phi).clamp(0.0, std::f32::consts::PI);
        self.theta += d_theta;
        self.compute_position();
    }

    fn compute_position(&mut self) {
        let mut sin_phi = self.phi.sin();
        if sin_phi == 0.0 {
            self.phi += PHI_EPSILON;
            sin_phi = self.phi.sin();
        }

        let dir_to_camera = Vec3::new(
            self.r * sin_phi * self.theta.sin(),
            self.r * self.phi.cos(),
            self.r * sin_phi * self.theta.cos(),
        );
        self.pos = self.target_pos + dir_to_camera;

        let up = Vec3::new(0.0, if sin_phi > 0.0 { 1.0 } else { -1.0 }, 0.0);
        let screen_x = up.cross(dir_to_camera).normalize();
        let screen_y = dir_to_camera.cross(screen_x).normalize();

        self.c2w = Mat3::from_cols(screen_x, screen_y, dir_to_camera.normalize());
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn position(&self) -> Vec3 {
        self.pos
    }

    pub fn view_point(&self) -> Vec3 {
        self.target_pos
    }

    pub fn up_dir(&self) -> Vec3 {
        self.c2w.y_axis
    }

    pub fn h_fov(&self) -> f32 {
        self.h_fov
    }

    pub fn v_fov(&self) -> f32 {
        self.v_fov
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.ar
    }

    pub fn near_clip(&self) -> f32 {
        self.near_clip
    }

    pub fn far_clip(&self) -> f32 {
        self.far_clip
    }

    pub fn screen_w(&self) -> u32 {
        self.screen_w
    }

    pub fn screen_h(&self) -> u32 {
        self.screen_h
    }

    pub fn screen_dist(&self) -> f32 {
        self.screen_dist
    }

    pub fn radius(&self) -> f32 {
        self.r
    }

    pub fn phi(&self) -> f32 {
        self.phi
    }

    pub fn theta(&self) -> f32 {
        self.theta
    }

    pub fn c2w(&self) -> Mat3 {
        self.c2w
    }

    /// Right-handed look-at view matrix.
    pub fn world_to_camera(&self) -> Mat4 {
        Mat4::look_at_rh(self.pos, self.target_pos, self.up_dir())
    }

    /// Right-handed perspective projection with a `[0, 1]` depth range.
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.v_fov.to_radians(), self.ar, self.near_clip, self.far_clip)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.world_to_camera()
    }
}

fn half_tan(fov_deg: f32) -> f32 {
    (fov_deg.to_radians() / 2.0).tan()
}
