//! Scene description value produced by the loaders
//!
//! The renderer never sees file formats; it only consumes these records.

use glam::{Mat4, Vec2, Vec3};
use std::path::PathBuf;

/// Parsed scene: a flat list of instanced nodes.
#[derive(Clone, Debug, Default)]
pub struct SceneInfo {
    pub nodes: Vec<Node>,
    /// Directory holding the scene-level shaders, already resolved against
    /// the scene file location.
    pub base_shader_dir: Option<PathBuf>,
}

impl SceneInfo {
    pub fn cameras(&self) -> impl Iterator<Item = (&CameraInfo, &Mat4)> {
        self.nodes.iter().filter_map(|n| match &n.instance {
            Instance::Camera(c) => Some((c, &n.transform)),
            _ => None,
        })
    }

    pub fn lights(&self) -> impl Iterator<Item = (&LightInfo, &Mat4)> {
        self.nodes.iter().filter_map(|n| match &n.instance {
            Instance::Light(l) => Some((l, &n.transform)),
            _ => None,
        })
    }

    pub fn meshes(&self) -> impl Iterator<Item = (&PolymeshInfo, &Mat4)> {
        self.nodes.iter().filter_map(|n| match &n.instance {
            Instance::Polymesh(m) => Some((m, &n.transform)),
            _ => None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub instance: Instance,
    pub transform: Mat4,
}

impl Node {
    pub fn new(instance: Instance) -> Self {
        Self { instance, transform: Mat4::IDENTITY }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

#[derive(Clone, Debug)]
pub enum Instance {
    Camera(CameraInfo),
    Light(LightInfo),
    Polymesh(PolymeshInfo),
}

/// Camera record; field-of-view values are in degrees.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraInfo {
    pub pos: Vec3,
    pub view_dir: Vec3,
    pub up_dir: Vec3,
    pub h_fov: f32,
    pub v_fov: f32,
    pub n_clip: f32,
    pub f_clip: f32,
    /// True when the file did not specify a placement, so the viewer frames
    /// the scene bounds instead.
    pub default_flag: bool,
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self {
            pos: Vec3::ZERO,
            view_dir: Vec3::NEG_Z,
            up_dir: Vec3::Y,
            h_fov: 50.0,
            v_fov: 35.0,
            n_clip: 0.1,
            f_clip: 100.0,
            default_flag: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LightKind {
    #[default]
    Ambient,
    Directional,
    Area,
    Point,
    Spot,
}

impl LightKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ambient" => Some(Self::Ambient),
            "directional" => Some(Self::Directional),
            "area" => Some(Self::Area),
            "point" => Some(Self::Point),
            "spot" => Some(Self::Spot),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightInfo {
    pub kind: LightKind,
    /// Radiance (RGB).
    pub spectrum: Vec3,
    pub position: Vec3,
    pub direction: Vec3,
    pub falloff_deg: f32,
    pub falloff_exp: f32,
    pub constant_att: f32,
    pub linear_att: f32,
    pub quadratic_att: f32,
}

impl Default for LightInfo {
    fn default() -> Self {
        Self {
            kind: LightKind::Ambient,
            spectrum: Vec3::ONE,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            falloff_deg: 45.0,
            falloff_exp: 0.0,
            constant_att: 1.0,
            linear_att: 0.0,
            quadratic_att: 0.0,
        }
    }
}

impl LightInfo {
    pub fn ambient(spectrum: Vec3) -> Self {
        Self { kind: LightKind::Ambient, spectrum, ..Default::default() }
    }
}

/// One face; index lists are zero-based and parallel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Polygon {
    pub vertex_indices: Vec<usize>,
    pub normal_indices: Vec<usize>,
    pub texcoord_indices: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct PolymeshInfo {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub texcoords: Vec<Vec2>,
    pub polygons: Vec<Polygon>,
    /// Flat diffuse colour per polygon (from `usemtl`), black by default.
    pub material_diffuse_parameters: Vec<Vec3>,

    pub is_mirror_brdf: bool,
    pub phong_spec_exp: f32,

    pub diffuse_filename: Option<PathBuf>,
    pub normal_filename: Option<PathBuf>,
    pub environment_filename: Option<PathBuf>,
    pub vert_filename: Option<PathBuf>,
    pub frag_filename: Option<PathBuf>,

    pub position: Vec3,
    /// Euler angles in degrees, applied X then Y then Z.
    pub rotation: Vec3,
    pub scale: Vec3,

    /// Extra named scalars forwarded to the mesh shader.
    pub parameters: Vec<(String, f32)>,
}

impl Default for PolymeshInfo {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            normals: Vec::new(),
            texcoords: Vec::new(),
            polygons: Vec::new(),
            material_diffuse_parameters: Vec::new(),
            is_mirror_brdf: false,
            phong_spec_exp: 1.0,
            diffuse_filename: None,
            normal_filename: None,
            environment_filename: None,
            vert_filename: None,
            frag_filename: None,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            parameters: Vec::new(),
        }
    }
}

impl PolymeshInfo {
    pub fn triangle_count(&self) -> usize {
        self.polygons.len()
    }
}
