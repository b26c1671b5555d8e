//! Triangle mesh drawable
//!
//! Geometry is de-indexed on construction: every attribute buffer holds one
//! entry per triangle corner, so draws are plain `draw_arrays` calls.

use crate::config::RenderConfig;
use crate::object::DrawContext;
use crate::resources::{GpuResources, Texture, VertexArray, VertexBuffer};
use crate::shader::Shader;
use crate::{Error, Result};
use bitflags::bitflags;
use glam::{Mat3, Mat4, Vec2, Vec3};
use std::path::Path;
use umbra_core::{BBox, PolymeshInfo};

/// Shaders a mesh falls back to when its record names none
pub const DEFAULT_VERTEX_SHADER: &str = "mesh.vert.wgsl";
pub const DEFAULT_FRAGMENT_SHADER: &str = "mesh.frag.wgsl";

bitflags! {
    /// Shader branches a mesh turns on
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MeshFlags: u32 {
        const TEXTURE_MAPPING = 1 << 0;
        const NORMAL_MAPPING = 1 << 1;
        const ENVIRONMENT_MAPPING = 1 << 2;
        const MIRROR_BRDF = 1 << 3;
    }
}

/// Flat per-corner attribute arrays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deindexed {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub texcoords: Vec<Vec2>,
    pub diffuse_colors: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
}

impl Deindexed {
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// Flatten indexed polygons into per-corner arrays.
///
/// Polygons without normal indices get their face normal. A mesh without
/// texture coordinates gets zero UVs. Tangents come from the UV gradient of
/// each triangle; a degenerate UV triangle produces non-finite tangents.
pub fn deindex(info: &PolymeshInfo) -> Result<Deindexed> {
    let n = info.polygons.len() * 3;
    let mut out = Deindexed {
        positions: Vec::with_capacity(n),
        normals: Vec::with_capacity(n),
        texcoords: Vec::with_capacity(n),
        diffuse_colors: Vec::with_capacity(n),
        tangents: Vec::with_capacity(n),
    };

    for (i, polygon) in info.polygons.iter().enumerate() {
        if polygon.vertex_indices.len() != 3 {
            return Err(Error::Resource(format!(
                "polygon {} has {} vertices, expected a triangle",
                i,
                polygon.vertex_indices.len()
            )));
        }
        let corners: [Vec3; 3] = lookup(&info.vertices, &polygon.vertex_indices, "vertex", i)?;

        let normals = if polygon.normal_indices.is_empty() {
            [(corners[1] - corners[0]).cross(corners[2] - corners[0]).normalize_or_zero(); 3]
        } else {
            lookup(&info.normals, &polygon.normal_indices, "normal", i)?
        };

        let texcoords = if info.texcoords.is_empty() || polygon.texcoord_indices.is_empty() {
            [Vec2::ZERO; 3]
        } else {
            lookup(&info.texcoords, &polygon.texcoord_indices, "texcoord", i)?
        };

        let diffuse = info.material_diffuse_parameters.get(i).copied().unwrap_or(Vec3::ZERO);
        let tangent = triangle_tangent(&corners, &texcoords);

        out.positions.extend(corners);
        out.normals.extend(normals);
        out.texcoords.extend(texcoords);
        out.diffuse_colors.extend([diffuse; 3]);
        out.tangents.extend([tangent; 3]);
    }
    Ok(out)
}

fn lookup<T: Copy>(pool: &[T], indices: &[usize], what: &str, polygon: usize) -> Result<[T; 3]> {
    let get = |k: usize| {
        indices
            .get(k)
            .and_then(|&index| pool.get(index))
            .copied()
            .ok_or_else(|| Error::Resource(format!("polygon {} has a bad {} index", polygon, what)))
    };
    Ok([get(0)?, get(1)?, get(2)?])
}

/// Solve the 2×2 system relating position edges to UV edges
pub fn triangle_tangent(positions: &[Vec3; 3], uvs: &[Vec2; 3]) -> Vec3 {
    let delta_pos1 = positions[1] - positions[0];
    let delta_pos2 = positions[2] - positions[0];
    let delta_uv1 = uvs[1] - uvs[0];
    let delta_uv2 = uvs[2] - uvs[0];

    let r = 1.0 / (delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x);
    (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r
}

fn flatten3(v: &[Vec3]) -> &[f32] {
    bytemuck::cast_slice(v)
}

fn flatten2(v: &[Vec2]) -> &[f32] {
    bytemuck::cast_slice(v)
}

/// Decode a PNG into RGBA8
pub fn load_png(path: &Path) -> Result<(u32, u32, Vec<u8>)> {
    let image = image::open(path)?.to_rgba8();
    Ok((image.width(), image.height(), image.into_raw()))
}

pub struct Mesh {
    num_triangles: usize,
    positions: Vec<Vec3>,
    object_to_world: Mat4,
    object_to_world_normals: Mat3,

    flags: MeshFlags,
    spec_exp: f32,
    parameters: Vec<(String, f32)>,

    vertex_array: VertexArray,
    position_buffer: VertexBuffer,
    normal_buffer: VertexBuffer,
    texcoord_buffer: VertexBuffer,
    tangent_buffer: VertexBuffer,
    diffuse_color_buffer: VertexBuffer,

    diffuse_texture: Option<Texture>,
    normal_texture: Option<Texture>,
    environment_texture: Option<Texture>,

    shader: Shader,
}

impl Mesh {
    pub fn new(
        gpu: &mut GpuResources,
        info: &PolymeshInfo,
        object_to_world: Mat4,
        shader_dir: &Path,
        config: &RenderConfig,
    ) -> Result<Self> {
        let data = deindex(info)?;

        let vertex_path = info
            .vert_filename
            .clone()
            .unwrap_or_else(|| shader_dir.join(DEFAULT_VERTEX_SHADER));
        let fragment_path = info
            .frag_filename
            .clone()
            .unwrap_or_else(|| shader_dir.join(DEFAULT_FRAGMENT_SHADER));
        let shader = Shader::new(gpu, vertex_path, fragment_path, config.abort_on_init_failure)?;

        let vertex_array = gpu.create_vertex_array();
        let position_buffer = gpu.create_vertex_buffer(flatten3(&data.positions));
        let normal_buffer = gpu.create_vertex_buffer(flatten3(&data.normals));
        let texcoord_buffer = gpu.create_vertex_buffer(flatten2(&data.texcoords));
        let tangent_buffer = gpu.create_vertex_buffer(flatten3(&data.tangents));
        let diffuse_color_buffer = gpu.create_vertex_buffer(flatten3(&data.diffuse_colors));

        let diffuse_texture = load_texture(gpu, info.diffuse_filename.as_deref(), "diffuse");
        let normal_texture = load_texture(gpu, info.normal_filename.as_deref(), "normal");
        let environment_texture = load_texture(gpu, info.environment_filename.as_deref(), "environment");

        log::debug!("Mesh ready: {} triangles", data.triangle_count());

        let mut flags = MeshFlags::empty();
        flags.set(MeshFlags::TEXTURE_MAPPING, diffuse_texture.is_some());
        flags.set(MeshFlags::NORMAL_MAPPING, normal_texture.is_some());
        flags.set(MeshFlags::ENVIRONMENT_MAPPING, environment_texture.is_some());
        flags.set(MeshFlags::MIRROR_BRDF, info.is_mirror_brdf);

        Ok(Self {
            num_triangles: data.triangle_count(),
            positions: data.positions,
            object_to_world,
            object_to_world_normals: Mat3::from_mat4(object_to_world).inverse().transpose(),
            flags,
            spec_exp: info.phong_spec_exp,
            parameters: info.parameters.clone(),
            vertex_array,
            position_buffer,
            normal_buffer,
            texcoord_buffer,
            tangent_buffer,
            diffuse_color_buffer,
            diffuse_texture,
            normal_texture,
            environment_texture,
            shader,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.num_triangles
    }

    pub fn object_to_world(&self) -> Mat4 {
        self.object_to_world
    }

    pub fn flags(&self) -> MeshFlags {
        self.flags
    }

    pub fn shader(&self) -> &Shader {
        &self.shader
    }

    /// Beauty-pass draw with the mesh's own shader
    pub fn draw(&mut self, gpu: &mut GpuResources, world_to_clip: &Mat4, ctx: &DrawContext<'_>) -> bool {
        let Some(_program) = self.shader.bind(gpu) else {
            return false;
        };
        let _vertex_array = gpu.bind_vertex_array(self.vertex_array);
        let shader = &mut self.shader;
        let mvp = *world_to_clip * self.object_to_world;

        let flags = self.flags;
        shader.set_scalar_parameter(gpu, "useTextureMapping", flags.contains(MeshFlags::TEXTURE_MAPPING));
        shader.set_scalar_parameter(gpu, "useNormalMapping", flags.contains(MeshFlags::NORMAL_MAPPING));
        shader.set_scalar_parameter(gpu, "useEnvironmentMapping", flags.contains(MeshFlags::ENVIRONMENT_MAPPING));
        shader.set_scalar_parameter(gpu, "useMirrorBRDF", flags.contains(MeshFlags::MIRROR_BRDF));
        shader.set_scalar_parameter(gpu, "spec_exp", self.spec_exp);

        shader.set_vector_parameter(gpu, "camera_position", ctx.camera_position);
        shader.set_matrix_parameter(gpu, "obj2world", self.object_to_world);
        shader.set_matrix3_parameter(gpu, "obj2worldNorm", self.object_to_world_normals);
        shader.set_matrix_parameter(gpu, "mvp", mvp);

        // Object space straight to each shadow map's texture space
        shader.set_scalar_parameter(gpu, "num_shadowed_lights", ctx.world_to_shadow.len() as i32);
        for (j, world_to_shadow) in ctx.world_to_shadow.iter().enumerate() {
            let name = format!("obj2shadowlight[{}]", j);
            shader.set_matrix_parameter(gpu, &name, *world_to_shadow * self.object_to_world);
        }

        if let Some(texture) = self.diffuse_texture {
            shader.set_texture_sampler(gpu, "diffuseTextureSampler", texture);
        }
        if let Some(texture) = self.normal_texture {
            shader.set_texture_sampler(gpu, "normalTextureSampler", texture);
        }
        if let Some(texture) = self.environment_texture {
            shader.set_texture_sampler(gpu, "environmentTextureSampler", texture);
        }
        if let Some(depth) = ctx.shadow_depth {
            shader.set_texture_array_sampler(gpu, "shadowTextureArray", depth);
        }

        let lights = ctx.lights;
        shader.set_vector_parameter(gpu, "ambient_light_intensity", lights.ambient_radiance());
        shader.set_scalar_parameter(gpu, "num_directional_lights", lights.directional().len() as i32);
        shader.set_scalar_parameter(gpu, "num_point_lights", lights.point().len() as i32);
        shader.set_scalar_parameter(gpu, "num_spot_lights", lights.spot().len() as i32);

        for (j, light) in lights.directional().iter().enumerate() {
            shader.set_vector_parameter(gpu, &format!("directional_light_vectors[{}]", j), light.direction);
            shader.set_vector_parameter(gpu, &format!("directional_light_intensities[{}]", j), light.radiance);
        }
        for (j, light) in lights.point().iter().enumerate() {
            shader.set_vector_parameter(gpu, &format!("point_light_positions[{}]", j), light.position);
            shader.set_vector_parameter(gpu, &format!("point_light_intensities[{}]", j), light.radiance);
        }
        for (j, light) in lights.spot().iter().enumerate() {
            shader.set_vector_parameter(gpu, &format!("spot_light_positions[{}]", j), light.position);
            shader.set_vector_parameter(gpu, &format!("spot_light_directions[{}]", j), light.direction);
            shader.set_scalar_parameter(gpu, &format!("spot_light_angles[{}]", j), light.angle);
            shader.set_vector_parameter(gpu, &format!("spot_light_intensities[{}]", j), light.radiance);
        }

        for (name, value) in &self.parameters {
            if !shader.set_scalar_parameter(gpu, name, *value) {
                log::trace!("Mesh parameter '{}' is not used by its shader", name);
            }
        }

        shader.set_vertex_buffer(gpu, "vtx_position", 3, self.position_buffer);
        shader.set_vertex_buffer(gpu, "vtx_diffuse_color", 3, self.diffuse_color_buffer);
        shader.set_vertex_buffer(gpu, "vtx_normal", 3, self.normal_buffer);
        shader.set_vertex_buffer(gpu, "vtx_texcoord", 2, self.texcoord_buffer);
        shader.set_vertex_buffer(gpu, "vtx_tangent", 3, self.tangent_buffer);

        gpu.draw_arrays(0, 3 * self.num_triangles as u32)
    }

    /// Depth-only draw with the scene's shared shadow shader
    pub fn draw_shadow(&self, gpu: &mut GpuResources, world_to_light_clip: &Mat4, shadow_shader: &Shader) -> bool {
        let Some(_program) = shadow_shader.bind(gpu) else {
            return false;
        };
        let _vertex_array = gpu.bind_vertex_array(self.vertex_array);

        shadow_shader.set_matrix_parameter(gpu, "mvp", *world_to_light_clip * self.object_to_world);
        shadow_shader.set_vertex_buffer(gpu, "vtx_position", 3, self.position_buffer);
        shadow_shader.set_vertex_buffer(gpu, "vtx_normal", 3, self.normal_buffer);
        shadow_shader.set_matrix3_parameter(gpu, "obj2worldNorm", self.object_to_world_normals);

        gpu.draw_arrays(0, 3 * self.num_triangles as u32)
    }

    /// World-space bounds over every triangle corner
    pub fn bbox(&self) -> BBox {
        let mut bbox = BBox::empty();
        for position in &self.positions {
            bbox.expand_point(self.object_to_world.transform_point3(*position));
        }
        bbox
    }

    pub fn reload_shaders(&mut self, gpu: &mut GpuResources) -> Result<()> {
        self.shader.reload(gpu)
    }

    pub fn release(&mut self, gpu: &mut GpuResources) {
        gpu.free_vertex_array(self.vertex_array);
        for buffer in [
            self.position_buffer,
            self.normal_buffer,
            self.texcoord_buffer,
            self.tangent_buffer,
            self.diffuse_color_buffer,
        ] {
            gpu.free_vertex_buffer(buffer);
        }
        for texture in [self.diffuse_texture, self.normal_texture, self.environment_texture]
            .into_iter()
            .flatten()
        {
            gpu.free_texture(texture);
        }
        self.shader.release(gpu);
    }
}

/// A missing or undecodable map leaves the feature off
fn load_texture(gpu: &mut GpuResources, path: Option<&Path>, kind: &str) -> Option<Texture> {
    let path = path?;
    let created = load_png(path).and_then(|(width, height, rgba)| gpu.create_texture(width, height, &rgba));
    match created {
        Ok(texture) => Some(texture),
        Err(err) => {
            log::warn!("Texture ({}) loading error = {}: {}", kind, path.display(), err);
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::lights::{DirectionalLight, Light, LightSet};
    use crate::resources::testing::recording_resources;
    use approx::assert_abs_diff_eq;
    use std::path::PathBuf;
    use umbra_core::Polygon;

    pub(crate) fn shader_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/shaders")
    }

    fn tri(v: [usize; 3]) -> Polygon {
        Polygon { vertex_indices: v.to_vec(), normal_indices: v.to_vec(), texcoord_indices: v.to_vec() }
    }

    pub(crate) fn quad() -> PolymeshInfo {
        PolymeshInfo {
            vertices: vec![
                Vec3::new(-1.0, 0.0, -1.0),
                Vec3::new(1.0, 0.0, -1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(-1.0, 0.0, 1.0),
            ],
            normals: vec![Vec3::Y; 4],
            texcoords: vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)],
            polygons: vec![tri([0, 1, 2]), tri([0, 2, 3])],
            material_diffuse_parameters: vec![Vec3::X, Vec3::Z],
            ..Default::default()
        }
    }

    #[test]
    fn deindexed_triangles_match_source_order() {
        let info = quad();
        let data = deindex(&info).unwrap();

        assert_eq!(data.triangle_count(), 2);
        for (k, polygon) in info.polygons.iter().enumerate() {
            for c in 0..3 {
                assert_eq!(data.positions[3 * k + c], info.vertices[polygon.vertex_indices[c]]);
            }
        }
        assert_eq!(data.diffuse_colors[3..6], [Vec3::Z; 3]);
    }

    #[test]
    fn tangent_follows_u_axis() {
        let data = deindex(&quad()).unwrap();
        for tangent in &data.tangents {
            assert_abs_diff_eq!(*tangent, Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-5);
        }
    }

    #[test]
    fn degenerate_uvs_are_not_guarded() {
        let tangent = triangle_tangent(&[Vec3::ZERO, Vec3::X, Vec3::Y], &[Vec2::ZERO; 3]);
        assert!(!tangent.is_finite());
    }

    #[test]
    fn missing_normals_use_face_normal() {
        let mut info = quad();
        for polygon in &mut info.polygons {
            polygon.normal_indices.clear();
        }
        info.texcoords.clear();
        let data = deindex(&info).unwrap();

        assert_abs_diff_eq!(data.normals[0], Vec3::NEG_Y, epsilon = 1e-6);
        assert_eq!(data.texcoords[0], Vec2::ZERO);
    }

    #[test]
    fn bad_index_is_an_error() {
        let mut info = quad();
        info.polygons[1].vertex_indices[2] = 9;
        assert!(deindex(&info).is_err());
    }

    #[test]
    fn bbox_is_in_world_space() {
        let (mut gpu, _log) = recording_resources();
        let transform = Mat4::from_translation(Vec3::new(0.0, 3.0, 0.0)) * Mat4::from_scale(Vec3::splat(2.0));
        let mesh = Mesh::new(&mut gpu, &quad(), transform, &shader_dir(), &RenderConfig::default()).unwrap();

        let bbox = mesh.bbox();
        assert_abs_diff_eq!(bbox.min, Vec3::new(-2.0, 3.0, -2.0));
        assert_abs_diff_eq!(bbox.max, Vec3::new(2.0, 3.0, 2.0));
    }

    #[test]
    fn draw_binds_all_attributes() {
        let (mut gpu, log) = recording_resources();
        let mut mesh = Mesh::new(&mut gpu, &quad(), Mat4::IDENTITY, &shader_dir(), &RenderConfig::default()).unwrap();
        let lights: LightSet = [Light::Directional(DirectionalLight { radiance: Vec3::ONE, direction: Vec3::NEG_Y })]
            .into_iter()
            .collect();
        let ctx = DrawContext {
            lights: &lights,
            camera_position: Vec3::new(0.0, 5.0, 5.0),
            world_to_shadow: &[],
            shadow_depth: None,
        };

        assert!(mesh.draw(&mut gpu, &Mat4::IDENTITY, &ctx));
        let log = log.borrow();
        assert_eq!(log.draws.len(), 1);
        assert_eq!(log.draws[0].count, 6);
        assert_eq!(log.draws[0].vertex_buffers.len(), 5);
        assert!(!log.draws[0].uniforms.is_empty());
    }

    #[test]
    fn missing_texture_leaves_mapping_off() {
        let (mut gpu, _log) = recording_resources();
        let mut info = quad();
        info.diffuse_filename = Some(PathBuf::from("/nonexistent/diffuse.png"));
        let mesh = Mesh::new(&mut gpu, &info, Mat4::IDENTITY, &shader_dir(), &RenderConfig::default()).unwrap();
        assert!(mesh.diffuse_texture.is_none());
        assert!(!mesh.flags().contains(MeshFlags::TEXTURE_MAPPING));
    }

    #[test]
    fn release_frees_everything() {
        let (mut gpu, log) = recording_resources();
        let mut mesh = Mesh::new(&mut gpu, &quad(), Mat4::IDENTITY, &shader_dir(), &RenderConfig::default()).unwrap();
        mesh.release(&mut gpu);

        assert_eq!(gpu.live_resource_count(), 0);
        assert!(log.borrow().live.is_empty());
    }
}
