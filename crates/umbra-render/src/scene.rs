//! Scene aggregation and the two-pass render protocol
//!
//! A frame runs one shadow pass per shadowed spot light, each into its own
//! layer of the shadow map arrays, then the beauty pass onto the surface.
//! Only spot lights cast shadows, and at most `max_shadowed_lights` of them.

use crate::config::{RenderConfig, DEFAULT_AMBIENT_RADIANCE, MAX_SHADER_LIGHTS};
use crate::lights::{AmbientLight, Light, LightSet};
use crate::mesh::Mesh;
use crate::object::{DrawContext, SceneObject};
use crate::resources::GpuResources;
use crate::shader::Shader;
use crate::shadow::{self, ShadowMaps};
use crate::viz::ShadowViz;
use crate::Result;
use glam::Vec3;
use rand::Rng;
use std::path::{Path, PathBuf};
use umbra_core::{BBox, Camera, SceneInfo};

/// Where shaders are looked up when neither the config nor the scene names a directory
pub const DEFAULT_SHADER_DIR: &str = "assets/shaders";

const SHADOW_PASS_VERTEX_SHADER: &str = "shadow_pass.vert.wgsl";
const SHADOW_PASS_FRAGMENT_SHADER: &str = "shadow_pass.frag.wgsl";

/// Per-frame progress through the render protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderState {
    #[default]
    Idle,
    ShadowPass(usize),
    BeautyPass,
}

/// GPU state that exists only when at least one light is shadowed
struct ShadowResources {
    maps: ShadowMaps,
    shader: Shader,
    viz: ShadowViz,
}

impl ShadowResources {
    fn new(gpu: &mut GpuResources, count: usize, shader_dir: &Path, config: &RenderConfig) -> Result<Self> {
        let maps = ShadowMaps::new(gpu, count, config.shadow_map_size)?;
        let shader = match Shader::new(
            gpu,
            shader_dir.join(SHADOW_PASS_VERTEX_SHADER),
            shader_dir.join(SHADOW_PASS_FRAGMENT_SHADER),
            config.abort_on_init_failure,
        ) {
            Ok(shader) => shader,
            Err(err) => {
                maps.release(gpu);
                return Err(err);
            }
        };
        match ShadowViz::new(gpu, shader_dir, config) {
            Ok(viz) => Ok(Self { maps, shader, viz }),
            Err(err) => {
                let mut shader = shader;
                shader.release(gpu);
                maps.release(gpu);
                Err(err)
            }
        }
    }

    fn release(mut self, gpu: &mut GpuResources) {
        self.shader.release(gpu);
        self.viz.release(gpu);
        self.maps.release(gpu);
    }
}

pub struct Scene {
    objects: Vec<SceneObject>,
    lights: LightSet,
    /// Radians per frame, one per spot light
    spot_rotation_speeds: Vec<f32>,
    num_shadowed_lights: usize,
    shadow: Option<ShadowResources>,

    visualize_shadow_map: bool,
    disco_mode: bool,
    state: RenderState,
    released: bool,
}

impl Scene {
    /// Take ownership of `objects` and `lights` and set up shadow mapping for
    /// the first `min(spots, max_shadowed_lights)` spot lights.
    ///
    /// On error every resource the objects hold is released.
    pub fn new(
        gpu: &mut GpuResources,
        mut objects: Vec<SceneObject>,
        lights: LightSet,
        shader_dir: &Path,
        config: &RenderConfig,
    ) -> Result<Self> {
        let range = config.spot_rotation_speed_range;
        let mut rng = rand::thread_rng();
        let spot_rotation_speeds = lights
            .spot()
            .iter()
            .map(|_| rng.gen::<f32>() * range - range / 2.0)
            .collect();

        let max = config.max_shadowed_lights.min(MAX_SHADER_LIGHTS);
        if config.max_shadowed_lights > MAX_SHADER_LIGHTS {
            log::warn!(
                "max_shadowed_lights {} exceeds the shader limit, using {}",
                config.max_shadowed_lights,
                MAX_SHADER_LIGHTS
            );
        }
        let num_shadowed_lights = lights.spot().len().min(max);

        let shadow = if num_shadowed_lights > 0 {
            match ShadowResources::new(gpu, num_shadowed_lights, shader_dir, config) {
                Ok(shadow) => {
                    log::info!(
                        "Shadow maps: {} lights, {}×{}",
                        num_shadowed_lights,
                        config.shadow_map_size,
                        config.shadow_map_size
                    );
                    Some(shadow)
                }
                Err(err) => {
                    for object in &mut objects {
                        object.release(gpu);
                    }
                    return Err(err);
                }
            }
        } else {
            None
        };

        log::info!(
            "Scene: {} objects, {} directional, {} point, {} spot, {} ambient lights",
            objects.len(),
            lights.directional().len(),
            lights.point().len(),
            lights.spot().len(),
            lights.ambient().len()
        );

        Ok(Self {
            objects,
            lights,
            spot_rotation_speeds,
            num_shadowed_lights,
            shadow,
            visualize_shadow_map: false,
            disco_mode: false,
            state: RenderState::Idle,
            released: false,
        })
    }

    /// Build lights and meshes from a parsed scene description.
    ///
    /// A description without usable lights gets a dim ambient light. The
    /// shader directory is the config override, else the scene's
    /// `base_shader_dir`, else [`DEFAULT_SHADER_DIR`].
    pub fn from_info(gpu: &mut GpuResources, info: &SceneInfo, config: &RenderConfig) -> Result<Self> {
        let shader_dir: PathBuf = config
            .shader_dir
            .clone()
            .or_else(|| info.base_shader_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SHADER_DIR));

        let mut lights: LightSet = info
            .lights()
            .filter_map(|(light, transform)| Light::from_info(light, transform))
            .collect();
        if lights.is_empty() {
            log::info!("No lights in scene, adding default ambient light");
            lights.push(Light::Ambient(AmbientLight {
                radiance: Vec3::splat(DEFAULT_AMBIENT_RADIANCE),
            }));
        }

        let mut objects = Vec::new();
        for (mesh, transform) in info.meshes() {
            match Mesh::new(gpu, mesh, *transform, &shader_dir, config) {
                Ok(mesh) => objects.push(SceneObject::from(mesh)),
                Err(err) => {
                    for object in &mut objects {
                        object.release(gpu);
                    }
                    return Err(err);
                }
            }
        }

        Self::new(gpu, objects, lights, &shader_dir, config)
    }

    /// Run the shadow passes and the beauty pass for one frame.
    pub fn render(&mut self, gpu: &mut GpuResources, camera: &Camera) {
        if self.disco_mode {
            self.rotate_spot_lights();
        }

        for i in 0..self.num_shadowed_lights {
            self.render_shadow_pass(gpu, i);
        }

        self.state = RenderState::BeautyPass;
        log::trace!("Beauty pass");
        let (width, height) = gpu.surface_size();
        gpu.set_viewport(0, 0, width, height);
        gpu.clear(Some([0.0, 0.0, 0.0, 0.0]), Some(1.0));
        gpu.set_depth_test(true);

        if self.visualize_shadow_map && self.needs_shadow_pass() {
            self.visualize_shadow_maps(gpu);
        } else {
            self.draw_objects(gpu, camera);
        }
        self.state = RenderState::Idle;
    }

    fn render_shadow_pass(&mut self, gpu: &mut GpuResources, index: usize) {
        let (Some(shadow), Some(light)) = (self.shadow.as_mut(), self.lights.spot().get(index)) else {
            return;
        };
        let Some(framebuffer) = shadow.maps.framebuffer(index) else {
            return;
        };
        self.state = RenderState::ShadowPass(index);
        log::trace!("Shadow pass {}", index);

        let world_to_light_clip = shadow::world_to_light_clip(light);

        let _framebuffer = gpu.bind_framebuffer(framebuffer);
        let size = shadow.maps.size();
        gpu.set_viewport(0, 0, size, size);
        gpu.clear(Some([0.0, 0.0, 0.0, 0.0]), Some(1.0));
        gpu.set_depth_test(true);

        for object in &self.objects {
            object.draw_shadow(gpu, &world_to_light_clip, &shadow.shader);
        }
        shadow.maps.set_world_to_shadow(index, world_to_light_clip);
    }

    fn draw_objects(&mut self, gpu: &mut GpuResources, camera: &Camera) {
        let (world_to_shadow, shadow_depth) = match &self.shadow {
            Some(shadow) => (shadow.maps.world_to_shadow(), Some(shadow.maps.depth())),
            None => (&[][..], None),
        };
        let ctx = DrawContext {
            lights: &self.lights,
            camera_position: camera.position(),
            world_to_shadow,
            shadow_depth,
        };
        let world_to_clip = camera.view_projection();
        for object in &mut self.objects {
            object.draw(gpu, &world_to_clip, &ctx);
        }
    }

    fn visualize_shadow_maps(&mut self, gpu: &mut GpuResources) {
        if let Some(shadow) = self.shadow.as_mut() {
            let (depth, color) = (shadow.maps.depth(), shadow.maps.color());
            shadow.viz.draw(gpu, depth, color, shadow.maps.len());
        }
    }

    /// Advance every spot light by its own rotation speed
    pub fn rotate_spot_lights(&mut self) {
        for (light, speed) in self.lights.spot_mut().iter_mut().zip(&self.spot_rotation_speeds) {
            light.rotate(*speed);
        }
    }

    /// Reload the scene-level shaders, then every object's. The first error
    /// is returned after all reloads were attempted.
    pub fn reload_shaders(&mut self, gpu: &mut GpuResources) -> Result<()> {
        log::info!("Reloading all shaders");
        let mut first_error = None;
        let mut record = |result: Result<()>| {
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        };

        if let Some(shadow) = self.shadow.as_mut() {
            record(shadow.shader.reload(gpu));
            record(shadow.viz.reload(gpu));
        }
        for object in &mut self.objects {
            record(object.reload_shaders(gpu));
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn needs_shadow_pass(&self) -> bool {
        self.shadow.is_some()
    }

    pub fn num_shadowed_lights(&self) -> usize {
        self.num_shadowed_lights
    }

    pub fn num_spot_lights(&self) -> usize {
        self.lights.spot().len()
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn lights(&self) -> &LightSet {
        &self.lights
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn spot_rotation_speeds(&self) -> &[f32] {
        &self.spot_rotation_speeds
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn shadow_maps(&self) -> Option<&ShadowMaps> {
        self.shadow.as_ref().map(|s| &s.maps)
    }

    pub fn visualize_shadow_map(&self) -> bool {
        self.visualize_shadow_map
    }

    pub fn set_visualize_shadow_map(&mut self, on: bool) {
        self.visualize_shadow_map = on;
    }

    pub fn toggle_visualize_shadow_map(&mut self) -> bool {
        self.visualize_shadow_map = !self.visualize_shadow_map;
        self.visualize_shadow_map
    }

    pub fn disco_mode(&self) -> bool {
        self.disco_mode
    }

    pub fn toggle_disco_mode(&mut self) -> bool {
        self.disco_mode = !self.disco_mode;
        self.disco_mode
    }

    /// Union of every object's world-space bounds
    pub fn bbox(&self) -> BBox {
        self.objects.iter().fold(BBox::empty(), |bbox, object| bbox.union(&object.bbox()))
    }

    /// Free every GPU resource the scene owns
    pub fn release(mut self, gpu: &mut GpuResources) {
        for object in &mut self.objects {
            object.release(gpu);
        }
        if let Some(shadow) = self.shadow.take() {
            shadow.release(gpu);
        }
        self.released = true;
        log::debug!("Scene released");
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        if !self.released {
            log::warn!("Scene dropped without release, its GPU resources stay allocated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights::{DirectionalLight, SpotLight};
    use crate::mesh::tests::{quad, shader_dir};
    use crate::resources::testing::recording_resources;
    use glam::Mat4;
    use umbra_core::{CameraInfo, Instance, LightInfo, LightKind, Node};

    fn camera() -> Camera {
        let mut camera = Camera::new();
        camera.configure(&CameraInfo::default(), 600, 600);
        camera.place(Vec3::ZERO, 1.0, 0.5, 6.0, 0.5, 60.0);
        camera
    }

    fn spot(x: f32) -> Light {
        Light::Spot(SpotLight {
            radiance: Vec3::splat(50.0),
            position: Vec3::new(x, 30.0, 5.0),
            direction: Vec3::new(-x, -30.0, -5.0).normalize(),
            angle: 30.0,
        })
    }

    fn directional() -> Light {
        Light::Directional(DirectionalLight { radiance: Vec3::ONE, direction: Vec3::NEG_Y })
    }

    fn build(gpu: &mut GpuResources, lights: Vec<Light>, config: &RenderConfig) -> Scene {
        let mesh = Mesh::new(gpu, &quad(), Mat4::IDENTITY, &shader_dir(), config).unwrap();
        Scene::new(gpu, vec![mesh.into()], lights.into_iter().collect(), &shader_dir(), config).unwrap()
    }

    #[test]
    fn directional_scene_draws_each_object_once() {
        let (mut gpu, log) = recording_resources();
        let mut scene = build(&mut gpu, vec![directional()], &RenderConfig::default());

        assert!(!scene.needs_shadow_pass());
        scene.render(&mut gpu, &camera());

        let log_ref = log.borrow();
        assert_eq!(log_ref.surface_draws(), 1);
        assert_eq!(log_ref.framebuffer_draws(), 0);
        assert_eq!(log_ref.framebuffer_clears(), 0);
        assert!(log_ref.draws[0].depth_test);
        drop(log_ref);

        assert_eq!(scene.state(), RenderState::Idle);
        scene.release(&mut gpu);
        assert_eq!(gpu.live_resource_count(), 0);
    }

    #[test]
    fn spot_lights_get_a_pass_each_before_the_beauty_pass() {
        let (mut gpu, log) = recording_resources();
        let config = RenderConfig::default().with_shadow_map_size(128);
        let mut scene = build(&mut gpu, vec![spot(10.0), spot(-10.0), directional()], &config);

        assert_eq!(scene.num_shadowed_lights(), 2);
        scene.render(&mut gpu, &camera());

        let log_ref = log.borrow();
        assert_eq!(log_ref.framebuffer_clears(), 2);
        assert_eq!(log_ref.framebuffer_draws(), 2);
        assert_eq!(log_ref.surface_draws(), 1);
        let first_surface = log_ref.draws.iter().position(|d| d.target == crate::resources::RenderTarget::Surface);
        assert_eq!(first_surface, Some(2));
        for draw in &log_ref.draws[..2] {
            assert_eq!(draw.viewport.width, 128);
        }
        drop(log_ref);

        let maps = scene.shadow_maps().unwrap();
        assert_ne!(maps.world_to_shadow()[0], Mat4::IDENTITY);
        assert_ne!(maps.world_to_shadow()[0], maps.world_to_shadow()[1]);
        scene.release(&mut gpu);
        assert_eq!(gpu.live_resource_count(), 0);
    }

    #[test]
    fn shadowed_count_is_capped() {
        let (mut gpu, _log) = recording_resources();
        for (spots, max, expected) in [(0, 8, 0), (3, 8, 3), (5, 2, 2), (12, 20, 8)] {
            let config = RenderConfig::default().with_max_shadowed_lights(max).with_shadow_map_size(16);
            let lights = (0..spots).map(|i| spot(i as f32 + 1.0)).collect();
            let scene = build(&mut gpu, lights, &config);

            assert_eq!(scene.num_shadowed_lights(), expected);
            assert_eq!(scene.needs_shadow_pass(), expected > 0);
            assert_eq!(scene.spot_rotation_speeds().len(), spots);
            scene.release(&mut gpu);
        }
        assert_eq!(gpu.live_resource_count(), 0);
    }

    fn uniform_i32(gpu: &GpuResources, draw: &crate::resources::DrawCall, name: &str) -> i32 {
        let layout = gpu.program_layout(draw.program).unwrap();
        let offset = layout.uniforms.fields[name].offset as usize;
        i32::from_ne_bytes(draw.uniforms[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn spots_beyond_the_cap_shade_without_a_shadow_pass() {
        let (mut gpu, log) = recording_resources();
        let config = RenderConfig::default().with_max_shadowed_lights(2).with_shadow_map_size(64);
        let mut scene = build(&mut gpu, vec![spot(10.0), spot(-10.0), spot(0.0)], &config);

        assert_eq!(scene.num_spot_lights(), 3);
        assert_eq!(scene.num_shadowed_lights(), 2);
        scene.render(&mut gpu, &camera());

        let log_ref = log.borrow();
        assert_eq!(log_ref.framebuffer_clears(), 2);
        assert_eq!(log_ref.framebuffer_draws(), 2);
        assert_eq!(log_ref.surface_draws(), 1);
        let beauty = log_ref
            .draws
            .iter()
            .find(|d| d.target == crate::resources::RenderTarget::Surface)
            .unwrap();
        assert_eq!(uniform_i32(&gpu, beauty, "num_spot_lights"), 3);
        assert_eq!(uniform_i32(&gpu, beauty, "num_shadowed_lights"), 2);
        drop(log_ref);

        assert_eq!(scene.shadow_maps().unwrap().len(), 2);
        scene.release(&mut gpu);
        assert_eq!(gpu.live_resource_count(), 0);
    }

    #[test]
    fn visualization_without_shadows_falls_back_to_scene() {
        let (mut gpu, log) = recording_resources();
        let mut scene = build(&mut gpu, vec![directional()], &RenderConfig::default());

        assert!(scene.toggle_visualize_shadow_map());
        scene.render(&mut gpu, &camera());
        assert_eq!(log.borrow().surface_draws(), 1);
        scene.release(&mut gpu);
    }

    #[test]
    fn visualization_replaces_the_beauty_draws() {
        let (mut gpu, log) = recording_resources();
        let config = RenderConfig::default().with_shadow_map_size(64);
        let mut scene = build(&mut gpu, vec![spot(4.0)], &config);

        scene.set_visualize_shadow_map(true);
        scene.render(&mut gpu, &camera());

        let log_ref = log.borrow();
        let surface: Vec<_> = log_ref
            .draws
            .iter()
            .filter(|d| d.target == crate::resources::RenderTarget::Surface)
            .collect();
        assert_eq!(surface.len(), 1);
        assert_eq!(surface[0].count, 6);
        drop(log_ref);
        scene.release(&mut gpu);
    }

    #[test]
    fn disco_mode_moves_spots_each_frame() {
        let (mut gpu, _log) = recording_resources();
        let config = RenderConfig::default()
            .with_shadow_map_size(16)
            .with_spot_rotation_speed_range(0.5);
        let mut scene = build(&mut gpu, vec![spot(10.0)], &config);
        let before = scene.lights().spot()[0];

        scene.render(&mut gpu, &camera());
        assert_eq!(scene.lights().spot()[0], before);

        assert!(scene.toggle_disco_mode());
        scene.render(&mut gpu, &camera());
        let after = scene.lights().spot()[0];
        let speed = scene.spot_rotation_speeds()[0];
        assert!(speed.abs() <= 0.25);
        if speed != 0.0 {
            assert_ne!(after.position, before.position);
        }
        scene.release(&mut gpu);
    }

    #[test]
    fn from_info_injects_ambient_and_uses_node_transforms() {
        let (mut gpu, _log) = recording_resources();
        let info = SceneInfo {
            nodes: vec![
                Node::new(Instance::Polymesh(quad()))
                    .with_transform(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0))),
                Node::new(Instance::Light(LightInfo { kind: LightKind::Area, ..Default::default() })),
            ],
            base_shader_dir: Some(shader_dir()),
        };
        let scene = Scene::from_info(&mut gpu, &info, &RenderConfig::default()).unwrap();

        assert_eq!(scene.lights().len(), 1);
        assert_eq!(scene.lights().ambient().len(), 1);
        assert_eq!(scene.bbox().centroid(), Vec3::new(0.0, 2.0, 0.0));
        scene.release(&mut gpu);
    }

    #[test]
    fn missing_shader_dir_is_fatal_by_default() {
        let (mut gpu, _log) = recording_resources();
        let info = SceneInfo {
            nodes: vec![Node::new(Instance::Polymesh(quad()))],
            base_shader_dir: Some(PathBuf::from("/nonexistent/shaders")),
        };
        assert!(Scene::from_info(&mut gpu, &info, &RenderConfig::default()).is_err());
        assert_eq!(gpu.live_resource_count(), 0);

        let lenient = RenderConfig::default().with_abort_on_init_failure(false);
        let scene = Scene::from_info(&mut gpu, &info, &lenient).unwrap();
        assert_eq!(scene.num_objects(), 1);
        scene.release(&mut gpu);
    }

    #[test]
    fn reload_keeps_scene_drawable() {
        let (mut gpu, log) = recording_resources();
        let config = RenderConfig::default().with_shadow_map_size(16);
        let mut scene = build(&mut gpu, vec![spot(3.0)], &config);
        let programs = log.borrow().programs_created;

        scene.reload_shaders(&mut gpu).unwrap();
        assert_eq!(log.borrow().programs_created, programs + 3);

        scene.render(&mut gpu, &camera());
        assert_eq!(log.borrow().surface_draws(), 1);
        scene.release(&mut gpu);
        assert_eq!(gpu.live_resource_count(), 0);
    }

    #[test]
    fn demo_scene_renders_two_shadowed_spots() {
        let (mut gpu, log) = recording_resources();
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/scenes/demo.json");
        let info = umbra_core::loader::load(&path).unwrap();
        let mut scene = Scene::from_info(&mut gpu, &info, &RenderConfig::default().with_shadow_map_size(32)).unwrap();

        assert_eq!(scene.num_objects(), 2);
        assert_eq!(scene.num_shadowed_lights(), 2);
        assert!(!scene.bbox().is_empty());

        scene.render(&mut gpu, &camera());
        let log_ref = log.borrow();
        assert_eq!(log_ref.framebuffer_draws(), 4);
        assert_eq!(log_ref.surface_draws(), 2);
        drop(log_ref);
        scene.release(&mut gpu);
        assert_eq!(gpu.live_resource_count(), 0);
    }
}
