//! Wavefront OBJ / MTL parsing
//!
//! Only the subset the viewer needs: positions, normals, texture
//! coordinates, faces, and a flat diffuse colour per face from `usemtl`.

use crate::description::{Polygon, PolymeshInfo};
use crate::{Error, Result};
use glam::{Vec2, Vec3};
use std::collections::HashMap;
use std::path::Path;

/// Diffuse colour (`Kd`) per material name.
pub type MaterialTable = HashMap<String, Vec3>;

/// Parse an MTL file, keeping the first `Kd` of every `newmtl` block.
pub fn parse_mtl(source: &str) -> MaterialTable {
    let mut table = MaterialTable::new();
    let mut current: Option<String> = None;

    for line in source.lines() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("newmtl") => {
                current = tokens.next().map(str::to_owned);
            }
            Some("Kd") => {
                let Some(name) = current.take() else { continue };
                let values: Vec<f32> = tokens.filter_map(|t| t.parse().ok()).collect();
                if let [r, g, b] = values[..] {
                    table.insert(name, Vec3::new(r, g, b));
                }
            }
            _ => {}
        }
    }
    table
}

/// Parse an OBJ file into a polygon mesh.
///
/// Faces with more than three corners are fan-triangulated so every polygon
/// in the result is a triangle.
pub fn parse_obj(source: &str, file: &Path, materials: &MaterialTable) -> Result<PolymeshInfo> {
    let mut mesh = PolymeshInfo::default();

    // Attribute pass first so faces may reference data declared after them.
    for line in source.lines() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                if let Some([x, y, z]) = parse_floats::<3>(tokens) {
                    mesh.vertices.push(Vec3::new(x, y, z));
                }
            }
            Some("vn") => {
                if let Some([x, y, z]) = parse_floats::<3>(tokens) {
                    mesh.normals.push(Vec3::new(x, y, z));
                }
            }
            Some("vt") => {
                if let Some([u, v]) = parse_floats::<2>(tokens) {
                    mesh.texcoords.push(Vec2::new(u, v));
                }
            }
            _ => {}
        }
    }

    let mut diffuse = Vec3::ZERO;
    let mut warned_non_triangle = false;

    for (line_no, line) in source.lines().enumerate() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("usemtl") => {
                diffuse = tokens
                    .next()
                    .and_then(|name| materials.get(name))
                    .copied()
                    .unwrap_or(diffuse);
            }
            Some("f") => {
                let corners = tokens
                    .map(|t| parse_corner(t, &mesh))
                    .collect::<std::result::Result<Vec<_>, String>>()
                    .map_err(|message| Error::Parse {
                        file: file.to_path_buf(),
                        line: line_no + 1,
                        message,
                    })?;

                if corners.len() < 3 {
                    return Err(Error::Parse {
                        file: file.to_path_buf(),
                        line: line_no + 1,
                        message: format!("face has {} corners", corners.len()),
                    });
                }
                if corners.len() != 3 && !warned_non_triangle {
                    log::warn!("Non triangle detected in {}, triangulating", file.display());
                    warned_non_triangle = true;
                }

                for i in 1..corners.len() - 1 {
                    mesh.polygons.push(triangle(&corners[0], &corners[i], &corners[i + 1]));
                    mesh.material_diffuse_parameters.push(diffuse);
                }
            }
            _ => {}
        }
    }

    log::debug!(
        "Parsed {}: {} vertices, {} normals, {} texcoords, {} triangles",
        file.display(),
        mesh.vertices.len(),
        mesh.normals.len(),
        mesh.texcoords.len(),
        mesh.polygons.len()
    );
    Ok(mesh)
}

#[derive(Clone, Copy, Debug)]
struct Corner {
    vertex: usize,
    texcoord: Option<usize>,
    normal: Option<usize>,
}

fn triangle(a: &Corner, b: &Corner, c: &Corner) -> Polygon {
    let corners = [a, b, c];
    let mut poly = Polygon {
        vertex_indices: corners.iter().map(|c| c.vertex).collect(),
        ..Default::default()
    };
    if corners.iter().all(|c| c.texcoord.is_some()) {
        poly.texcoord_indices = corners.iter().filter_map(|c| c.texcoord).collect();
    }
    if corners.iter().all(|c| c.normal.is_some()) {
        poly.normal_indices = corners.iter().filter_map(|c| c.normal).collect();
    }
    poly
}

/// One face corner: `v`, `v/t`, `v//n` or `v/t/n` (1-based, negative is
/// relative to the end of the list).
fn parse_corner(token: &str, mesh: &PolymeshInfo) -> std::result::Result<Corner, String> {
    let mut parts = token.split('/');
    let vertex = match parts.next() {
        Some(s) if !s.is_empty() => resolve_index(s, mesh.vertices.len())?,
        _ => return Err(format!("bad face corner '{token}'")),
    };
    let texcoord = match parts.next() {
        Some(s) if !s.is_empty() => Some(resolve_index(s, mesh.texcoords.len())?),
        _ => None,
    };
    let normal = match parts.next() {
        Some(s) if !s.is_empty() => Some(resolve_index(s, mesh.normals.len())?),
        _ => None,
    };
    if parts.next().is_some() {
        return Err(format!("bad face corner '{token}'"));
    }
    Ok(Corner { vertex, texcoord, normal })
}

fn resolve_index(s: &str, len: usize) -> std::result::Result<usize, String> {
    let raw: i64 = s.parse().map_err(|_| format!("bad index '{s}'"))?;
    let index = if raw > 0 { raw - 1 } else { len as i64 + raw };
    if index < 0 || index as usize >= len {
        return Err(format!("index {raw} out of range (have {len})"));
    }
    Ok(index as usize)
}

fn parse_floats<'a, const N: usize>(tokens: impl Iterator<Item = &'a str>) -> Option<[f32; N]> {
    let mut out = [0.0; N];
    let mut count = 0;
    for token in tokens.take(N) {
        out[count] = token.parse().ok()?;
        count += 1;
    }
    (count == N).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
# unit quad
mtllib quad.mtl
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl red
f 1/1/1 2/2/1 3/3/1
usemtl blue
f 1/1/1 3/3/1 4/4/1
";

    #[test]
    fn parses_attributes_and_faces() {
        let materials = parse_mtl("newmtl red\nKd 1 0 0\nnewmtl blue\nKd 0 0 1\n");
        let mesh = parse_obj(QUAD, Path::new("quad.obj"), &materials).unwrap();

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.texcoords.len(), 4);
        assert_eq!(mesh.normals.len(), 1);
        assert_eq!(mesh.polygons.len(), 2);
        assert_eq!(mesh.polygons[1].vertex_indices, vec![0, 2, 3]);
        assert_eq!(mesh.polygons[1].texcoord_indices, vec![0, 2, 3]);
        assert_eq!(mesh.polygons[1].normal_indices, vec![0, 0, 0]);
        assert_eq!(mesh.material_diffuse_parameters, vec![Vec3::X, Vec3::Z]);
    }

    #[test]
    fn accepts_every_corner_form() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvn 0 0 1\nf 1 2/1 3//1\nf -3 -2 -1\n";
        let mesh = parse_obj(src, Path::new("mixed.obj"), &MaterialTable::new()).unwrap();

        assert_eq!(mesh.polygons.len(), 2);
        assert_eq!(mesh.polygons[0].vertex_indices, vec![0, 1, 2]);
        assert!(mesh.polygons[0].normal_indices.is_empty());
        assert_eq!(mesh.polygons[1].vertex_indices, vec![0, 1, 2]);
    }

    #[test]
    fn fans_polygons_into_triangles() {
        let src = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv -1 1 0\nf 1 2 3 4 5\n";
        let mesh = parse_obj(src, Path::new("fan.obj"), &MaterialTable::new()).unwrap();

        assert_eq!(mesh.polygons.len(), 3);
        assert_eq!(mesh.polygons[2].vertex_indices, vec![0, 3, 4]);
        assert_eq!(mesh.material_diffuse_parameters.len(), 3);
    }

    #[test]
    fn bad_face_reports_line() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 x\n";
        let err = parse_obj(src, Path::new("bad.obj"), &MaterialTable::new()).unwrap_err();
        match err {
            Error::Parse { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let src = "v 0 0 0\nf 1 2 3\n";
        assert!(parse_obj(src, Path::new("oob.obj"), &MaterialTable::new()).is_err());
    }

    #[test]
    fn mtl_keeps_first_kd() {
        let table = parse_mtl("newmtl a\nKd 0.5 0.5 0.5\nKd 1 1 1\nnewmtl b\nKs 1 1 1\n");
        assert_eq!(table.get("a"), Some(&Vec3::splat(0.5)));
        assert!(!table.contains_key("b"));
    }
}
