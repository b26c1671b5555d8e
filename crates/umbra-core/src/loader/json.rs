//! JSON scene format
//!
//! Every file path in the document is relative to the directory holding the
//! scene file. Unknown keys are ignored.

use super::obj::{parse_mtl, parse_obj, MaterialTable};
use crate::description::{
    CameraInfo, Instance, LightInfo, LightKind, Node, PolymeshInfo, SceneInfo,
};
use crate::{Error, Result};
use glam::{Mat4, Vec3};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonScene {
    base_shader_dir: Option<String>,
    camera: Option<JsonCamera>,
    lights: Vec<JsonLight>,
    meshes: Vec<JsonMesh>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonCamera {
    up_axis: Option<String>,
    xfov: Option<f32>,
    yfov: Option<f32>,
    aspect_ratio: Option<f32>,
    znear: Option<f32>,
    zfar: Option<f32>,
    target_position: Option<[f32; 3]>,
    dir2cam: Option<[f32; 3]>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonLight {
    #[serde(rename = "type")]
    kind: Option<String>,
    intensity: Option<[f32; 3]>,
    position: Option<[f32; 3]>,
    direction: Option<[f32; 3]>,
    falloff_deg: Option<f32>,
    falloff_exp: Option<f32>,
    constant_att: Option<f32>,
    linear_att: Option<f32>,
    quadratic_att: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonMesh {
    filename: Option<String>,
    material_filename: Option<String>,
    material: Option<String>,
    spec_exp: Option<f32>,
    diffuse_filename: Option<String>,
    normal_filename: Option<String>,
    environment_filename: Option<String>,
    vertex_shader_filename: Option<String>,
    fragment_shader_filename: Option<String>,
    translate: Option<[f32; 3]>,
    position: Option<[f32; 3]>,
    rotation: Option<[f32; 3]>,
    scale: Option<[f32; 3]>,
    texcoord_u_scale: Option<f32>,
    texcoord_v_scale: Option<f32>,
    texcoord_u_flip: Option<String>,
    texcoord_v_flip: Option<String>,
    parameters: Vec<JsonParameter>,
}

#[derive(Debug, Deserialize)]
struct JsonParameter {
    name: String,
    value: f32,
}

/// Parse a JSON scene document. `base_dir` is the directory of the scene file.
pub fn parse_scene_json(source: &str, base_dir: &Path) -> Result<SceneInfo> {
    let doc: JsonScene = serde_json::from_str(source)?;
    let mut scene = SceneInfo {
        base_shader_dir: doc.base_shader_dir.as_deref().map(|dir| base_dir.join(dir)),
        ..Default::default()
    };

    if let Some(camera) = &doc.camera {
        scene.nodes.push(Node::new(Instance::Camera(camera_info(camera))));
    }

    for light in &doc.lights {
        if let Some(info) = light_info(light) {
            scene.nodes.push(Node::new(Instance::Light(info)));
        }
    }

    for (index, mesh) in doc.meshes.iter().enumerate() {
        let (info, transform) = polymesh_info(mesh, index, base_dir)?;
        scene.nodes.push(Node::new(Instance::Polymesh(info)).with_transform(transform));
    }

    log::debug!(
        "Scene JSON: {} cameras, {} lights, {} meshes",
        scene.cameras().count(),
        scene.lights().count(),
        scene.meshes().count()
    );
    Ok(scene)
}

fn camera_info(json: &JsonCamera) -> CameraInfo {
    let mut camera = CameraInfo::default();

    match json.up_axis.as_deref() {
        Some("X_UP") => camera.up_dir = Vec3::X,
        Some("Y_UP") | None => camera.up_dir = Vec3::Y,
        Some("Z_UP") => camera.up_dir = Vec3::Z,
        Some(other) => log::warn!("Unknown camera up_axis '{}', keeping Y_UP", other),
    }

    if let Some(h) = json.xfov {
        camera.h_fov = h;
    }
    match (json.yfov, json.aspect_ratio) {
        (Some(v), _) => camera.v_fov = v,
        (None, Some(ar)) => {
            let half_h = (0.5 * camera.h_fov).to_radians();
            camera.v_fov = 2.0 * (half_h.tan() / ar).atan().to_degrees();
        }
        (None, None) => {}
    }
    if let Some(n) = json.znear {
        camera.n_clip = n;
    }
    if let Some(f) = json.zfar {
        camera.f_clip = f;
    }

    if let Some(pos) = json.target_position {
        camera.pos = Vec3::from(pos);
        camera.default_flag = false;
    }
    if let Some(dir) = json.dir2cam {
        camera.view_dir = Vec3::from(dir);
        camera.default_flag = false;
    }
    camera
}

fn light_info(json: &JsonLight) -> Option<LightInfo> {
    let kind = match json.kind.as_deref().map(|name| (name, LightKind::from_name(name))) {
        Some((_, Some(kind))) => kind,
        Some((name, None)) => {
            log::warn!("Skipping light with unknown type '{}'", name);
            return None;
        }
        None => LightKind::default(),
    };

    let mut light = LightInfo { kind, ..Default::default() };
    if let Some(rgb) = json.intensity {
        light.spectrum = Vec3::from(rgb);
    }
    if let Some(p) = json.position {
        light.position = Vec3::from(p);
    }
    if let Some(d) = json.direction {
        light.direction = Vec3::from(d);
    }
    light.falloff_deg = json.falloff_deg.unwrap_or(light.falloff_deg);
    light.falloff_exp = json.falloff_exp.unwrap_or(light.falloff_exp);
    light.constant_att = json.constant_att.unwrap_or(light.constant_att);
    light.linear_att = json.linear_att.unwrap_or(light.linear_att);
    light.quadratic_att = json.quadratic_att.unwrap_or(light.quadratic_att);
    Some(light)
}

fn polymesh_info(json: &JsonMesh, index: usize, base_dir: &Path) -> Result<(PolymeshInfo, Mat4)> {
    let resolve = |name: &Option<String>| -> Option<PathBuf> {
        name.as_deref().map(|n| base_dir.join(n))
    };

    let materials = match resolve(&json.material_filename) {
        Some(path) => parse_mtl(&std::fs::read_to_string(&path)?),
        None => MaterialTable::new(),
    };

    let mesh_path = resolve(&json.filename)
        .ok_or_else(|| Error::MissingElement(format!("meshes[{index}].filename")))?;
    let source = std::fs::read_to_string(&mesh_path)?;
    let mut mesh = parse_obj(&source, &mesh_path, &materials)?;

    if json.material.as_deref() == Some("mirror") {
        mesh.is_mirror_brdf = true;
    }
    if let Some(exp) = json.spec_exp {
        mesh.phong_spec_exp = exp;
    }

    mesh.diffuse_filename = resolve(&json.diffuse_filename);
    mesh.normal_filename = resolve(&json.normal_filename);
    mesh.environment_filename = resolve(&json.environment_filename);
    mesh.vert_filename = resolve(&json.vertex_shader_filename);
    mesh.frag_filename = resolve(&json.fragment_shader_filename);

    if let Some(p) = json.position {
        mesh.position = Vec3::from(p);
    }
    if let Some(r) = json.rotation {
        mesh.rotation = Vec3::from(r);
    }
    let translate = json.translate.map(Vec3::from).unwrap_or(Vec3::ZERO);
    if let Some(s) = json.scale {
        mesh.scale = Vec3::from(s);
    }

    if let Some(s) = json.texcoord_u_scale {
        mesh.texcoords.iter_mut().for_each(|t| t.x *= s);
    }
    if is_true(&json.texcoord_u_flip) {
        mesh.texcoords.iter_mut().for_each(|t| t.x = 1.0 - t.x);
    }
    if let Some(s) = json.texcoord_v_scale {
        mesh.texcoords.iter_mut().for_each(|t| t.y *= s);
    }
    if is_true(&json.texcoord_v_flip) {
        mesh.texcoords.iter_mut().for_each(|t| t.y = 1.0 - t.y);
    }

    mesh.parameters = json
        .parameters
        .iter()
        .map(|p| (p.name.clone(), p.value))
        .collect();

    let transform = Mat4::from_translation(translate) * Mat4::from_scale(mesh.scale);
    Ok((mesh, transform))
}

fn is_true(flag: &Option<String>) -> bool {
    flag.as_deref() == Some("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use glam::Vec2;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("umbra-json-{}-{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn camera_defaults_and_aspect_ratio() {
        let scene = parse_scene_json(
            r#"{ "camera": { "xfov": 90, "aspect_ratio": 2.0, "up_axis": "Z_UP" } }"#,
            Path::new("."),
        )
        .unwrap();
        let (camera, _) = scene.cameras().next().unwrap();

        assert!(camera.default_flag);
        assert_eq!(camera.up_dir, Vec3::Z);
        assert_eq!(camera.view_dir, Vec3::NEG_Z);
        assert_abs_diff_eq!(camera.v_fov, 2.0 * 0.5f32.atan().to_degrees(), epsilon = 1e-4);
    }

    #[test]
    fn explicit_placement_clears_default_flag() {
        let scene = parse_scene_json(
            r#"{ "camera": { "target_position": [1, 2, 3], "dir2cam": [0, 0, 5] } }"#,
            Path::new("."),
        )
        .unwrap();
        let (camera, _) = scene.cameras().next().unwrap();

        assert!(!camera.default_flag);
        assert_eq!(camera.pos, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(camera.view_dir, Vec3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn lights_are_typed_and_unknown_ones_skipped() {
        let scene = parse_scene_json(
            r#"{ "lights": [
                { "type": "spot", "intensity": [2, 2, 2], "position": [0, 5, 0],
                  "direction": [0, -1, 0], "falloff_deg": 30 },
                { "type": "laser" },
                { "type": "directional", "direction": [1, -1, 0] }
            ] }"#,
            Path::new("."),
        )
        .unwrap();
        let lights: Vec<_> = scene.lights().map(|(l, _)| l.clone()).collect();

        assert_eq!(lights.len(), 2);
        assert_eq!(lights[0].kind, LightKind::Spot);
        assert_eq!(lights[0].spectrum, Vec3::splat(2.0));
        assert_eq!(lights[0].falloff_deg, 30.0);
        assert_eq!(lights[1].kind, LightKind::Directional);
    }

    #[test]
    fn mesh_without_filename_is_missing_element() {
        let err = parse_scene_json(r#"{ "meshes": [ { "spec_exp": 4 } ] }"#, Path::new(".")).unwrap_err();
        assert!(matches!(err, Error::MissingElement(_)));
    }

    #[test]
    fn mesh_paths_transform_and_texcoords() {
        let dir = scratch_dir("mesh");
        std::fs::write(
            dir.join("tri.obj"),
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0.25 0.5\nvn 0 0 1\nusemtl red\nf 1/1/1 2/1/1 3/1/1\n",
        )
        .unwrap();
        std::fs::write(dir.join("tri.mtl"), "newmtl red\nKd 1 0 0\n").unwrap();

        let scene = parse_scene_json(
            r#"{
                "base_shader_dir": "shaders",
                "meshes": [ {
                    "filename": "tri.obj",
                    "material_filename": "tri.mtl",
                    "material": "mirror",
                    "diffuse_filename": "wood.png",
                    "translate": [1, 0, 0],
                    "scale": [2, 2, 2],
                    "texcoord_u_scale": 2.0,
                    "texcoord_v_flip": "true",
                    "parameters": [ { "name": "roughness", "value": 0.5 } ]
                } ]
            }"#,
            &dir,
        )
        .unwrap();

        assert_eq!(scene.base_shader_dir, Some(dir.join("shaders")));
        let (mesh, transform) = scene.meshes().next().unwrap();
        assert!(mesh.is_mirror_brdf);
        assert_eq!(mesh.diffuse_filename, Some(dir.join("wood.png")));
        assert_eq!(mesh.material_diffuse_parameters, vec![Vec3::X]);
        assert_abs_diff_eq!(mesh.texcoords[0], Vec2::new(0.5, 0.5));
        assert_eq!(mesh.parameters, vec![("roughness".to_string(), 0.5)]);
        assert_abs_diff_eq!(
            transform.transform_point3(Vec3::new(1.0, 1.0, 0.0)),
            Vec3::new(3.0, 2.0, 0.0)
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unreadable_mesh_file_is_an_error() {
        let dir = scratch_dir("missing");
        let err = parse_scene_json(r#"{ "meshes": [ { "filename": "nope.obj" } ] }"#, &dir).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
