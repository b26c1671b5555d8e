//! Scene file loaders
//!
//! `load` picks a parser from the file extension. JSON scenes reference OBJ
//! meshes (and optionally MTL materials); a bare OBJ file becomes a one-mesh
//! scene with a fixed camera.

mod json;
mod obj;

pub use json::parse_scene_json;
pub use obj::{parse_mtl, parse_obj, MaterialTable};

use crate::description::{CameraInfo, Instance, Node, SceneInfo};
use crate::{Error, Result};
use std::path::Path;

/// Load a scene description from disk.
pub fn load(path: impl AsRef<Path>) -> Result<SceneInfo> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "json" => {
            log::info!("Loading scene JSON file {}", path.display());
            let source = std::fs::read_to_string(path)?;
            let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
            parse_scene_json(&source, base_dir)
        }
        "obj" => {
            log::info!("Loading OBJ file {}", path.display());
            load_obj_scene(path)
        }
        other => Err(Error::UnsupportedFormat(format!(
            "{} (extension '{}')",
            path.display(),
            other
        ))),
    }
}

/// A bare OBJ file: the mesh at the origin plus a fixed wide-angle camera.
fn load_obj_scene(path: &Path) -> Result<SceneInfo> {
    let source = std::fs::read_to_string(path)?;
    let mesh = parse_obj(&source, path, &MaterialTable::new())?;

    let camera = CameraInfo {
        view_dir: glam::Vec3::NEG_Z,
        up_dir: glam::Vec3::Y,
        h_fov: 50.0,
        v_fov: 35.0,
        n_clip: 0.001,
        f_clip: 1000.0,
        ..Default::default()
    };

    Ok(SceneInfo {
        nodes: vec![
            Node::new(Instance::Camera(camera)),
            Node::new(Instance::Polymesh(mesh)),
        ],
        base_shader_dir: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load("scene.dae").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn bare_obj_gets_fixed_camera() {
        let dir = std::env::temp_dir().join(format!("umbra-obj-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tri.OBJ");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n").unwrap();

        let scene = load(&path).unwrap();
        let (camera, _) = scene.cameras().next().unwrap();
        assert_eq!(camera.h_fov, 50.0);
        assert_eq!(camera.v_fov, 35.0);
        assert_eq!(camera.n_clip, 0.001);
        assert_eq!(camera.f_clip, 1000.0);
        assert_eq!(scene.meshes().count(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
