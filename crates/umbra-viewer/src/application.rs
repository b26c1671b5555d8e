//! Viewer state: camera control, key commands and scene lifetime
//!
//! Nothing here touches a window or a device directly, so the whole input
//! path can be driven from tests through a recording backend.

use glam::Vec3;
use std::f32::consts::PI;
use umbra_core::{Camera, CameraInfo, SceneInfo};
use umbra_render::{GpuResources, RenderConfig, Scene};
use winit::keyboard::{Key, NamedKey};

/// Keyboard actions understood by the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleViz,
    DumpCamera,
    ResetCamera,
    ReloadShaders,
    ToggleDisco,
    ToggleHud,
    Quit,
}

impl Command {
    pub fn from_key(key: &Key) -> Option<Self> {
        match key {
            Key::Named(NamedKey::Tab) => Some(Command::ToggleHud),
            Key::Named(NamedKey::Escape) => Some(Command::Quit),
            Key::Character(c) => match c.to_ascii_lowercase().as_str() {
                "v" => Some(Command::ToggleViz),
                "c" => Some(Command::DumpCamera),
                "r" => Some(Command::ResetCamera),
                "s" => Some(Command::ReloadShaders),
                "d" => Some(Command::ToggleDisco),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Default, Clone, Copy)]
struct MouseState {
    x: f32,
    y: f32,
    left: bool,
    right: bool,
    middle: bool,
}

pub struct Application {
    config: RenderConfig,
    scene: Option<Scene>,
    scene_name: String,
    camera: Camera,
    canonical_camera: Camera,
    canonical_view_distance: f32,
    scroll_rate: f32,
    screen_w: u32,
    screen_h: u32,
    hud_visible: bool,
    mouse: MouseState,
}

impl Application {
    /// Starts with a placeholder camera so resizes before the first load
    /// have something to act on.
    pub fn new(config: RenderConfig, screen_w: u32, screen_h: u32) -> Self {
        let placeholder = CameraInfo {
            h_fov: 20.0,
            v_fov: 28.0,
            n_clip: 0.1,
            f_clip: 100.0,
            ..CameraInfo::default()
        };
        let mut camera = Camera::new();
        camera.configure(&placeholder, screen_w, screen_h);
        let mut canonical_camera = Camera::new();
        canonical_camera.configure(&placeholder, screen_w, screen_h);

        Self {
            config,
            scene: None,
            scene_name: String::new(),
            camera,
            canonical_camera,
            canonical_view_distance: 1.0,
            scroll_rate: 0.1,
            screen_w,
            screen_h,
            hud_visible: true,
            mouse: MouseState::default(),
        }
    }

    /// Replace the current scene and frame the camera around it.
    pub fn load(&mut self, gpu: &mut GpuResources, info: &SceneInfo, name: &str) -> umbra_render::Result<()> {
        if let Some(old) = self.scene.take() {
            old.release(gpu);
        }

        let (camera_info, transform) = match info.cameras().next() {
            Some((camera, transform)) => (camera.clone(), *transform),
            None => (CameraInfo::default(), glam::Mat4::IDENTITY),
        };
        let cam_pos = transform.transform_point3(camera_info.pos);
        let cam_dir = transform.transform_point3(camera_info.view_dir);
        self.camera.configure(&camera_info, self.screen_w, self.screen_h);
        self.canonical_camera.configure(&camera_info, self.screen_w, self.screen_h);

        let scene = Scene::from_info(gpu, info, &self.config)?;
        log::info!(
            "Loaded scene '{}': {} objects, {} lights, {} shadowed",
            name,
            scene.num_objects(),
            scene.lights().len(),
            scene.num_shadowed_lights()
        );

        let bbox = scene.bbox();
        if !bbox.is_empty() {
            self.canonical_view_distance = bbox.extent().length() / 2.0 * 1.5;
            let view_distance = self.canonical_view_distance * 2.0;
            let min_distance = self.canonical_view_distance / 10.0;
            let max_distance = self.canonical_view_distance * 20.0;
            let (phi, theta) = spherical_angles(cam_dir);

            let mut target = bbox.centroid();
            self.canonical_camera
                .place(target, phi, theta, view_distance, min_distance, max_distance);

            let mut distance = view_distance;
            if !camera_info.default_flag {
                target = cam_pos;
                distance = camera_info.view_dir.length();
            }
            self.camera.place(target, phi, theta, distance, min_distance, max_distance);

            self.scroll_rate = self.canonical_view_distance / 10.0;
        }

        self.scene = Some(scene);
        self.scene_name = name.to_string();
        Ok(())
    }

    pub fn render(&mut self, gpu: &mut GpuResources) {
        if let Some(scene) = self.scene.as_mut() {
            scene.render(gpu, &self.camera);
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.screen_w = width;
        self.screen_h = height;
        self.camera.set_screen_size(width, height);
    }

    // ── Input ───────────────────────────────────────────────────────────────

    pub fn cursor_moved(&mut self, x: f32, y: f32) {
        let dx = x - self.mouse.x;
        let dy = y - self.mouse.y;
        let MouseState { left, right, middle, .. } = self.mouse;

        if left && !middle && !right {
            self.camera.rotate_by(
                dy * (PI / self.screen_h as f32),
                dx * (PI / self.screen_w as f32),
            );
        } else if right && !left && !middle {
            // screen y grows downward
            self.camera.move_by(-dx, dy, self.canonical_view_distance);
        }

        self.mouse.x = x;
        self.mouse.y = y;
    }

    pub fn mouse_button(&mut self, button: MouseButton, pressed: bool) {
        match button {
            MouseButton::Left => self.mouse.left = pressed,
            MouseButton::Right => self.mouse.right = pressed,
            MouseButton::Middle => self.mouse.middle = pressed,
        }
    }

    pub fn scroll(&mut self, _dx: f32, dy: f32) {
        self.camera.move_forward(-dy * self.scroll_rate);
    }

    /// Apply a key command. Returns `false` when the viewer should exit.
    pub fn command(&mut self, gpu: &mut GpuResources, command: Command) -> bool {
        match command {
            Command::ToggleViz => {
                if let Some(scene) = self.scene.as_mut() {
                    let on = scene.toggle_visualize_shadow_map();
                    log::info!("Shadow map view {}", if on { "on" } else { "off" });
                }
            }
            Command::DumpCamera => self.dump_camera(),
            Command::ResetCamera => self.camera.copy_placement(&self.canonical_camera),
            Command::ReloadShaders => {
                if let Some(scene) = self.scene.as_mut() {
                    match scene.reload_shaders(gpu) {
                        Ok(()) => log::info!("Shaders reloaded"),
                        Err(err) => log::error!("Shader reload failed: {}", err),
                    }
                }
            }
            Command::ToggleDisco => {
                if let Some(scene) = self.scene.as_mut() {
                    let on = scene.toggle_disco_mode();
                    log::info!("Disco mode {}", if on { "on" } else { "off" });
                }
            }
            Command::ToggleHud => self.hud_visible = !self.hud_visible,
            Command::Quit => return false,
        }
        true
    }

    fn dump_camera(&self) {
        let c = &self.camera;
        log::info!("Current camera info:");
        log::info!("Pos:          {}", c.position());
        log::info!("Lookat:       {}", c.view_point());
        log::info!("Up:           {}", c.up_dir());
        log::info!("aspect_ratio: {}", c.aspect_ratio());
        log::info!("near_clip:    {}", c.near_clip());
        log::info!("far_clip:     {}", c.far_clip());
    }

    // ── State ───────────────────────────────────────────────────────────────

    /// Window title; carries the status line while the HUD is on
    pub fn title(&self) -> String {
        let Some(scene) = self.scene.as_ref().filter(|_| self.hud_visible) else {
            return format!("Umbra - {}", self.scene_name);
        };
        let mut title = format!(
            "Umbra - {} | {} lights, {} spot, {} shadowed",
            self.scene_name,
            scene.lights().len(),
            scene.num_spot_lights(),
            scene.num_shadowed_lights()
        );
        if scene.visualize_shadow_map() {
            title.push_str(" | shadow map view");
        }
        if scene.disco_mode() {
            title.push_str(" | disco");
        }
        title
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn canonical_camera(&self) -> &Camera {
        &self.canonical_camera
    }

    pub fn canonical_view_distance(&self) -> f32 {
        self.canonical_view_distance
    }

    pub fn scroll_rate(&self) -> f32 {
        self.scroll_rate
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn hud_visible(&self) -> bool {
        self.hud_visible
    }

    pub fn release(&mut self, gpu: &mut GpuResources) {
        if let Some(scene) = self.scene.take() {
            scene.release(gpu);
        }
    }
}

/// Direction of `v` as the (polar from +Y, azimuth about +Y) pair the
/// orbit camera is placed with
pub fn spherical_angles(v: Vec3) -> (f32, f32) {
    let v = v.normalize_or_zero();
    (v.y.clamp(-1.0, 1.0).acos(), v.x.atan2(v.z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::path::PathBuf;
    use umbra_core::{Instance, LightInfo, LightKind, Node, PolymeshInfo, Polygon};
    use umbra_render::resources::testing::recording_resources;

    fn shader_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../assets/shaders")
    }

    fn config() -> RenderConfig {
        RenderConfig::new().with_shader_dir(shader_dir())
    }

    fn floor() -> PolymeshInfo {
        PolymeshInfo {
            vertices: vec![
                Vec3::new(-2.0, 0.0, -2.0),
                Vec3::new(2.0, 0.0, -2.0),
                Vec3::new(2.0, 0.0, 2.0),
                Vec3::new(-2.0, 0.0, 2.0),
            ],
            polygons: vec![
                Polygon { vertex_indices: vec![0, 2, 1], ..Default::default() },
                Polygon { vertex_indices: vec![0, 3, 2], ..Default::default() },
            ],
            ..Default::default()
        }
    }

    fn scene_info(camera: Option<CameraInfo>) -> SceneInfo {
        let mut nodes = vec![
            Node::new(Instance::Polymesh(floor())),
            Node::new(Instance::Light(LightInfo {
                kind: LightKind::Spot,
                spectrum: Vec3::ONE,
                position: Vec3::new(0.0, 20.0, 0.0),
                direction: Vec3::NEG_Y,
                falloff_deg: 30.0,
                ..Default::default()
            })),
        ];
        if let Some(camera) = camera {
            nodes.push(Node::new(Instance::Camera(camera)));
        }
        SceneInfo { nodes, base_shader_dir: None }
    }

    #[test]
    fn keys_map_to_commands() {
        let key = |s: &str| Key::Character(s.into());
        assert_eq!(Command::from_key(&key("v")), Some(Command::ToggleViz));
        assert_eq!(Command::from_key(&key("V")), Some(Command::ToggleViz));
        assert_eq!(Command::from_key(&key("S")), Some(Command::ReloadShaders));
        assert_eq!(Command::from_key(&key("d")), Some(Command::ToggleDisco));
        assert_eq!(Command::from_key(&Key::Named(NamedKey::Tab)), Some(Command::ToggleHud));
        assert_eq!(Command::from_key(&key("x")), None);
    }

    #[test]
    fn default_camera_frames_scene_bounds() {
        let (mut gpu, _log) = recording_resources();
        let mut app = Application::new(config(), 600, 600);
        app.load(&mut gpu, &scene_info(None), "floor").unwrap();

        // extent (4, 0, 4)
        let canonical = 32f32.sqrt() / 2.0 * 1.5;
        assert_abs_diff_eq!(app.canonical_view_distance(), canonical, epsilon = 1e-5);
        assert_abs_diff_eq!(app.scroll_rate(), canonical / 10.0, epsilon = 1e-5);
        assert_abs_diff_eq!(app.camera().view_point(), Vec3::ZERO, epsilon = 1e-5);
        assert_abs_diff_eq!(
            (app.camera().position() - app.camera().view_point()).length(),
            canonical * 2.0,
            epsilon = 1e-4
        );

        app.release(&mut gpu);
        assert_eq!(gpu.live_resource_count(), 0);
    }

    #[test]
    fn explicit_camera_orbits_its_own_target() {
        let (mut gpu, _log) = recording_resources();
        let mut app = Application::new(config(), 600, 600);
        let camera = CameraInfo {
            pos: Vec3::new(1.0, 2.0, 3.0),
            view_dir: Vec3::new(0.0, 0.0, 10.0),
            default_flag: false,
            ..CameraInfo::default()
        };
        app.load(&mut gpu, &scene_info(Some(camera)), "floor").unwrap();

        assert_abs_diff_eq!(app.camera().view_point(), Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-5);
        assert_abs_diff_eq!(
            (app.camera().position() - app.camera().view_point()).length(),
            10.0,
            epsilon = 1e-4
        );
        assert_abs_diff_eq!(app.canonical_camera().view_point(), Vec3::ZERO, epsilon = 1e-5);

        app.release(&mut gpu);
    }

    #[test]
    fn reset_restores_canonical_placement() {
        let (mut gpu, _log) = recording_resources();
        let mut app = Application::new(config(), 600, 600);
        app.load(&mut gpu, &scene_info(None), "floor").unwrap();

        app.mouse_button(MouseButton::Right, true);
        app.cursor_moved(0.0, 0.0);
        app.cursor_moved(50.0, 20.0);
        app.mouse_button(MouseButton::Right, false);
        assert!((app.camera().view_point() - Vec3::ZERO).length() > 1e-3);

        assert!(app.command(&mut gpu, Command::ResetCamera));
        assert_abs_diff_eq!(app.camera().position(), app.canonical_camera().position(), epsilon = 1e-5);
        assert_abs_diff_eq!(app.camera().view_point(), app.canonical_camera().view_point(), epsilon = 1e-5);

        app.release(&mut gpu);
    }

    #[test]
    fn scroll_changes_orbit_radius() {
        let (mut gpu, _log) = recording_resources();
        let mut app = Application::new(config(), 600, 600);
        app.load(&mut gpu, &scene_info(None), "floor").unwrap();

        let before = app.camera().radius();
        app.scroll(0.0, 1.0);
        assert_abs_diff_eq!(app.camera().radius(), before + app.scroll_rate(), epsilon = 1e-4);
        app.scroll(0.0, -2.0);
        assert_abs_diff_eq!(app.camera().radius(), before - app.scroll_rate(), epsilon = 1e-4);

        app.release(&mut gpu);
    }

    #[test]
    fn commands_toggle_scene_flags() {
        let (mut gpu, _log) = recording_resources();
        let mut app = Application::new(config(), 600, 600);
        app.load(&mut gpu, &scene_info(None), "floor").unwrap();

        app.command(&mut gpu, Command::ToggleViz);
        app.command(&mut gpu, Command::ToggleDisco);
        let scene = app.scene().unwrap();
        assert!(scene.visualize_shadow_map());
        assert!(scene.disco_mode());
        assert!(app.title().contains("disco"));

        app.command(&mut gpu, Command::ToggleHud);
        assert!(!app.hud_visible());
        assert_eq!(app.title(), "Umbra - floor");
        assert!(!app.command(&mut gpu, Command::Quit));

        app.release(&mut gpu);
    }

    #[test]
    fn reload_replaces_previous_scene() {
        let (mut gpu, log) = recording_resources();
        let mut app = Application::new(config(), 600, 600);
        app.load(&mut gpu, &scene_info(None), "first").unwrap();
        let live = gpu.live_resource_count();
        app.load(&mut gpu, &scene_info(None), "second").unwrap();
        assert_eq!(gpu.live_resource_count(), live);

        gpu.begin_frame().unwrap();
        app.render(&mut gpu);
        gpu.end_frame().unwrap();
        assert_eq!(log.borrow().framebuffer_draws(), 1);
        assert_eq!(log.borrow().surface_draws(), 1);

        app.release(&mut gpu);
        assert_eq!(gpu.live_resource_count(), 0);
    }

    #[test]
    fn angles_match_orbit_convention() {
        let (phi, theta) = spherical_angles(Vec3::new(0.0, 0.0, 1.0));
        assert_abs_diff_eq!(phi, PI / 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(theta, 0.0, epsilon = 1e-6);
    }
}
