//! WGSL reflection
//!
//! Every program is a vertex + fragment pair of WGSL modules. Parameters are
//! looked up by name, the way a GL program exposes its active uniforms and
//! attributes:
//!
//! - uniforms are members of the struct bound at `@group(0) @binding(0)`,
//!   with `name[i]` addressing individual array elements
//! - textures are handle globals; a texture `T` may be paired with a sampler
//!   global named `T_sampler`
//! - attributes are the `@location` inputs of `vs_main`, either as plain
//!   arguments or as members of an input struct

use glam::{Mat3, Mat4, Vec3, Vec4};
use std::collections::HashMap;

/// Shader stage of a single WGSL module
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    pub fn entry_point(self) -> &'static str {
        match self {
            Stage::Vertex => "vs_main",
            Stage::Fragment => "fs_main",
        }
    }

    fn naga(self) -> naga::ShaderStage {
        match self {
            Stage::Vertex => naga::ShaderStage::Vertex,
            Stage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    Float,
    Sint,
    Uint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarKind),
    Vector { size: u8, kind: ScalarKind },
    Matrix { columns: u8, rows: u8 },
}

/// One addressable uniform location inside the uniform block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformField {
    pub offset: u32,
    pub ty: FieldType,
}

/// Reflected `@group(0) @binding(0)` uniform struct
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniformBlock {
    /// Struct size in bytes, already padded to its alignment
    pub size: u32,
    pub fields: HashMap<String, UniformField>,
}

/// A value handed to a named uniform setter
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Int(v as i32)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat3> for UniformValue {
    fn from(v: Mat3) -> Self {
        UniformValue::Mat3(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

impl UniformField {
    /// Encode `value` into the block bytes. Returns `false` when the value
    /// does not fit the field's declared type.
    ///
    /// Scalars may target a vector field, in which case only component 0 is
    /// written; uniform arrays of scalars are declared as `array<vec4<f32>, N>`
    /// because of the 16-byte array stride rule.
    pub fn write(&self, value: UniformValue, bytes: &mut [u8]) -> bool {
        let offset = self.offset as usize;
        match (value, self.ty) {
            (UniformValue::Int(v), FieldType::Scalar(kind) | FieldType::Vector { kind, .. }) => {
                put(bytes, offset, &encode_scalar(v as f64, kind))
            }
            (UniformValue::Float(v), FieldType::Scalar(kind) | FieldType::Vector { kind, .. }) => {
                put(bytes, offset, &encode_scalar(v as f64, kind))
            }
            (UniformValue::Vec3(v), FieldType::Vector { size, kind: ScalarKind::Float }) if size >= 3 => {
                put(bytes, offset, bytemuck::cast_slice(&v.to_array()))
            }
            (UniformValue::Vec4(v), FieldType::Vector { size: 4, kind: ScalarKind::Float }) => {
                put(bytes, offset, bytemuck::cast_slice(&v.to_array()))
            }
            (UniformValue::Mat3(m), FieldType::Matrix { columns: 3, rows: 3 }) => {
                // mat3x3<f32> columns are padded to 16 bytes
                (0..3).all(|c| {
                    let column = m.col(c).to_array();
                    put(bytes, offset + c * 16, bytemuck::cast_slice(&column))
                })
            }
            (UniformValue::Mat4(m), FieldType::Matrix { columns: 4, rows: 4 }) => {
                put(bytes, offset, bytemuck::cast_slice(&m.to_cols_array()))
            }
            _ => false,
        }
    }
}

fn encode_scalar(v: f64, kind: ScalarKind) -> [u8; 4] {
    match kind {
        ScalarKind::Float => (v as f32).to_ne_bytes(),
        ScalarKind::Sint => (v as i32).to_ne_bytes(),
        ScalarKind::Uint => (v.max(0.0) as u32).to_ne_bytes(),
    }
}

fn put(bytes: &mut [u8], offset: usize, data: &[u8]) -> bool {
    match bytes.get_mut(offset..offset + data.len()) {
        Some(dst) => {
            dst.copy_from_slice(data);
            true
        }
        None => false,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDim {
    D2,
    D2Array,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSample {
    Float,
    Depth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    Filtering,
    NonFiltering,
    Comparison,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerSlot {
    pub binding: u32,
    pub kind: SamplerKind,
}

/// A texture global and its optional `_sampler` companion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureSlot {
    pub name: String,
    pub binding: u32,
    pub dim: TextureDim,
    pub sample: TextureSample,
    pub sampler: Option<SamplerSlot>,
}

/// A `vs_main` attribute input; always `f32` or `vecN<f32>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexInput {
    pub name: String,
    pub location: u32,
    pub components: u32,
}

/// What a single stage module declares
#[derive(Clone, Debug, Default)]
pub struct StageReflection {
    pub uniforms: Option<UniformBlock>,
    pub textures: Vec<TextureSlot>,
    pub inputs: Vec<VertexInput>,
}

/// The linked interface of a vertex + fragment pair
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgramLayout {
    pub uniforms: UniformBlock,
    pub textures: Vec<TextureSlot>,
    pub inputs: Vec<VertexInput>,
}

impl ProgramLayout {
    pub fn texture(&self, name: &str) -> Option<&TextureSlot> {
        self.textures.iter().find(|t| t.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&VertexInput> {
        self.inputs.iter().find(|i| i.name == name)
    }
}

/// Parse, validate and reflect one stage. The error string is the
/// compiler diagnostic, ready to print.
pub fn reflect_stage(source: &str, stage: Stage) -> std::result::Result<StageReflection, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| e.emit_to_string(source))?;

    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage.naga() && ep.name == stage.entry_point())
        .ok_or_else(|| format!("missing {:?} entry point `{}`", stage, stage.entry_point()))?;

    let mut reflection = StageReflection::default();
    let mut samplers: HashMap<String, (u32, bool)> = HashMap::new();

    for (_, var) in module.global_variables.iter() {
        let (Some(name), Some(binding)) = (var.name.as_ref(), var.binding.as_ref()) else {
            continue;
        };
        if binding.group != 0 {
            return Err(format!(
                "`{}` is in bind group {}, only group 0 is supported",
                name, binding.group
            ));
        }

        match (var.space, &module.types[var.ty].inner) {
            (naga::AddressSpace::Uniform, naga::TypeInner::Struct { members, span }) => {
                if binding.binding != 0 {
                    return Err(format!("uniform block `{}` must use binding 0", name));
                }
                reflection.uniforms = Some(reflect_block(&module, members, *span)?);
            }
            (naga::AddressSpace::Handle, naga::TypeInner::Image { dim, arrayed, class }) => {
                reflection
                    .textures
                    .push(texture_slot(name, binding.binding, *dim, *arrayed, class)?);
            }
            (naga::AddressSpace::Handle, naga::TypeInner::Sampler { comparison }) => {
                samplers.insert(name.clone(), (binding.binding, *comparison));
            }
            _ => return Err(format!("unsupported resource binding `{}`", name)),
        }
    }

    for texture in &mut reflection.textures {
        if let Some((binding, comparison)) = samplers.remove(&format!("{}_sampler", texture.name)) {
            let kind = match (comparison, texture.sample) {
                (true, _) => SamplerKind::Comparison,
                (false, TextureSample::Depth) => SamplerKind::NonFiltering,
                (false, TextureSample::Float) => SamplerKind::Filtering,
            };
            texture.sampler = Some(SamplerSlot { binding, kind });
        }
    }
    if let Some(orphan) = samplers.keys().next() {
        return Err(format!("sampler `{}` has no texture named after it", orphan));
    }

    if stage == Stage::Vertex {
        for arg in &entry.function.arguments {
            match &arg.binding {
                Some(naga::Binding::Location { location, .. }) => {
                    reflection.inputs.push(vertex_input(&module, arg.name.as_deref(), *location, arg.ty)?);
                }
                Some(naga::Binding::BuiltIn(_)) => {}
                None => {
                    if let naga::TypeInner::Struct { members, .. } = &module.types[arg.ty].inner {
                        for member in members {
                            if let Some(naga::Binding::Location { location, .. }) = &member.binding {
                                reflection.inputs.push(vertex_input(
                                    &module,
                                    member.name.as_deref(),
                                    *location,
                                    member.ty,
                                )?);
                            }
                        }
                    }
                }
            }
        }
        reflection.inputs.sort_by_key(|input| input.location);
    }

    Ok(reflection)
}

/// Check that both stages agree on their shared interface and merge it.
pub fn link(vertex: StageReflection, fragment: StageReflection) -> std::result::Result<ProgramLayout, String> {
    let uniforms = match (vertex.uniforms, fragment.uniforms) {
        (Some(v), Some(f)) if v != f => {
            return Err("vertex and fragment stages declare different uniform blocks".into())
        }
        (Some(v), _) => v,
        (None, Some(f)) => f,
        (None, None) => UniformBlock::default(),
    };

    let mut textures = vertex.textures;
    for texture in fragment.textures {
        match textures.iter().find(|t| t.binding == texture.binding) {
            Some(existing) if *existing != texture => {
                return Err(format!(
                    "binding {} is `{}` in the vertex stage but `{}` in the fragment stage",
                    texture.binding, existing.name, texture.name
                ));
            }
            Some(_) => {}
            None => textures.push(texture),
        }
    }
    textures.sort_by_key(|t| t.binding);

    let mut bindings: Vec<u32> = textures
        .iter()
        .flat_map(|t| std::iter::once(t.binding).chain(t.sampler.map(|s| s.binding)))
        .collect();
    if uniforms.size > 0 {
        bindings.push(0);
    }
    bindings.sort_unstable();
    if let Some(pair) = bindings.windows(2).find(|w| w[0] == w[1]) {
        return Err(format!("binding {} is declared twice", pair[0]));
    }

    Ok(ProgramLayout { uniforms, textures, inputs: vertex.inputs })
}

fn reflect_block(
    module: &naga::Module,
    members: &[naga::StructMember],
    span: u32,
) -> std::result::Result<UniformBlock, String> {
    let mut block = UniformBlock { size: span, fields: HashMap::new() };

    for member in members {
        let Some(name) = member.name.as_ref() else { continue };
        match &module.types[member.ty].inner {
            naga::TypeInner::Array { base, size: naga::ArraySize::Constant(count), stride } => {
                let ty = field_type(&module.types[*base].inner)
                    .ok_or_else(|| format!("uniform array `{}` has an unsupported element type", name))?;
                for i in 0..count.get() {
                    block
                        .fields
                        .insert(format!("{}[{}]", name, i), UniformField { offset: member.offset + i * stride, ty });
                }
                block.fields.insert(name.clone(), UniformField { offset: member.offset, ty });
            }
            inner => {
                let ty = field_type(inner)
                    .ok_or_else(|| format!("uniform `{}` has an unsupported type", name))?;
                block.fields.insert(name.clone(), UniformField { offset: member.offset, ty });
            }
        }
    }
    Ok(block)
}

fn field_type(inner: &naga::TypeInner) -> Option<FieldType> {
    match *inner {
        naga::TypeInner::Scalar(scalar) => scalar_kind(scalar).map(FieldType::Scalar),
        naga::TypeInner::Vector { size, scalar } => {
            scalar_kind(scalar).map(|kind| FieldType::Vector { size: size as u8, kind })
        }
        naga::TypeInner::Matrix { columns, rows, scalar } => match scalar_kind(scalar) {
            Some(ScalarKind::Float) => Some(FieldType::Matrix { columns: columns as u8, rows: rows as u8 }),
            _ => None,
        },
        _ => None,
    }
}

fn scalar_kind(scalar: naga::Scalar) -> Option<ScalarKind> {
    match (scalar.kind, scalar.width) {
        (naga::ScalarKind::Float, 4) => Some(ScalarKind::Float),
        (naga::ScalarKind::Sint, 4) => Some(ScalarKind::Sint),
        (naga::ScalarKind::Uint, 4) => Some(ScalarKind::Uint),
        _ => None,
    }
}

fn texture_slot(
    name: &str,
    binding: u32,
    dim: naga::ImageDimension,
    arrayed: bool,
    class: &naga::ImageClass,
) -> std::result::Result<TextureSlot, String> {
    let dim = match (dim, arrayed) {
        (naga::ImageDimension::D2, false) => TextureDim::D2,
        (naga::ImageDimension::D2, true) => TextureDim::D2Array,
        _ => return Err(format!("texture `{}` must be 2d or 2d_array", name)),
    };
    let sample = match *class {
        naga::ImageClass::Sampled { kind: naga::ScalarKind::Float, multi: false } => TextureSample::Float,
        naga::ImageClass::Depth { multi: false } => TextureSample::Depth,
        _ => return Err(format!("texture `{}` must be a float or depth texture", name)),
    };
    Ok(TextureSlot { name: name.to_string(), binding, dim, sample, sampler: None })
}

fn vertex_input(
    module: &naga::Module,
    name: Option<&str>,
    location: u32,
    ty: naga::Handle<naga::Type>,
) -> std::result::Result<VertexInput, String> {
    let name = name.ok_or_else(|| format!("vertex input at location {} has no name", location))?;
    let components = match field_type(&module.types[ty].inner) {
        Some(FieldType::Scalar(ScalarKind::Float)) => 1,
        Some(FieldType::Vector { size, kind: ScalarKind::Float }) => size as u32,
        _ => return Err(format!("vertex input `{}` must be f32 or vecN<f32>", name)),
    };
    Ok(VertexInput { name: name.to_string(), location, components })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERT: &str = r#"
struct Uniforms {
    mvp: mat4x4<f32>,
    normal_matrix: mat3x3<f32>,
    camera_position: vec3<f32>,
    spec_exp: f32,
    angles: array<vec4<f32>, 4>,
    count: i32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexInput {
    @location(1) vtx_normal: vec3<f32>,
    @location(0) vtx_position: vec3<f32>,
}

@vertex
fn vs_main(in: VertexInput, @location(2) vtx_texcoord: vec2<f32>) -> @builtin(position) vec4<f32> {
    return u.mvp * vec4<f32>(in.vtx_position + in.vtx_normal * 0.0 + vec3<f32>(vtx_texcoord, 0.0), 1.0);
}
"#;

    const FRAG: &str = r#"
struct Uniforms {
    mvp: mat4x4<f32>,
    normal_matrix: mat3x3<f32>,
    camera_position: vec3<f32>,
    spec_exp: f32,
    angles: array<vec4<f32>, 4>,
    count: i32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var shadowMap: texture_depth_2d_array;
@group(0) @binding(2) var shadowMap_sampler: sampler_comparison;
@group(0) @binding(3) var albedo: texture_2d<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    let lit = textureSampleCompareLevel(shadowMap, shadowMap_sampler, vec2<f32>(0.5, 0.5), 0, 0.5);
    let texel = textureLoad(albedo, vec2<i32>(0, 0), 0);
    return vec4<f32>(u.camera_position * lit, u.spec_exp) + texel;
}
"#;

    fn linked() -> ProgramLayout {
        let vs = reflect_stage(VERT, Stage::Vertex).unwrap();
        let fs = reflect_stage(FRAG, Stage::Fragment).unwrap();
        link(vs, fs).unwrap()
    }

    #[test]
    fn uniform_offsets_follow_wgsl_layout() {
        let layout = linked();
        let fields = &layout.uniforms.fields;

        assert_eq!(fields["mvp"].offset, 0);
        assert_eq!(fields["normal_matrix"].offset, 64);
        assert_eq!(fields["camera_position"].offset, 112);
        assert_eq!(fields["spec_exp"].offset, 124);
        assert_eq!(fields["angles[0]"].offset, 128);
        assert_eq!(fields["angles[2]"].offset, 160);
        assert_eq!(fields["angles"], fields["angles[0]"]);
        assert!(!fields.contains_key("angles[4]"));
        assert_eq!(fields["count"].ty, FieldType::Scalar(ScalarKind::Sint));
        assert_eq!(layout.uniforms.size % 16, 0);
    }

    #[test]
    fn inputs_are_sorted_by_location() {
        let layout = linked();
        let names: Vec<_> = layout.inputs.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["vtx_position", "vtx_normal", "vtx_texcoord"]);
        assert_eq!(layout.input("vtx_texcoord").unwrap().components, 2);
    }

    #[test]
    fn textures_pick_up_their_samplers() {
        let layout = linked();
        let shadow = layout.texture("shadowMap").unwrap();
        assert_eq!(shadow.dim, TextureDim::D2Array);
        assert_eq!(shadow.sample, TextureSample::Depth);
        assert_eq!(shadow.sampler, Some(SamplerSlot { binding: 2, kind: SamplerKind::Comparison }));
        assert_eq!(layout.texture("albedo").unwrap().sampler, None);
    }

    #[test]
    fn writes_land_at_reflected_offsets() {
        let layout = linked();
        let mut bytes = vec![0u8; layout.uniforms.size as usize];
        let fields = &layout.uniforms.fields;

        assert!(fields["angles[1]"].write(UniformValue::Float(30.0), &mut bytes));
        assert_eq!(f32::from_ne_bytes(bytes[144..148].try_into().unwrap()), 30.0);

        assert!(fields["count"].write(UniformValue::Int(3), &mut bytes));
        let count_offset = fields["count"].offset as usize;
        assert_eq!(i32::from_ne_bytes(bytes[count_offset..count_offset + 4].try_into().unwrap()), 3);

        let m = Mat3::from_cols(Vec3::X, Vec3::new(4.0, 5.0, 6.0), Vec3::Z);
        assert!(fields["normal_matrix"].write(UniformValue::Mat3(m), &mut bytes));
        assert_eq!(f32::from_ne_bytes(bytes[84..88].try_into().unwrap()), 5.0);

        assert!(!fields["mvp"].write(UniformValue::Vec3(Vec3::ONE), &mut bytes));
    }

    #[test]
    fn compile_errors_carry_diagnostics() {
        let err = reflect_stage("fn vs_main( {", Stage::Vertex).unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn missing_entry_point_is_an_error() {
        let err = reflect_stage(FRAG, Stage::Vertex).unwrap_err();
        assert!(err.contains("vs_main"));
    }

    #[test]
    fn stage_entry_points_name_the_reflected_functions() {
        assert_eq!(Stage::Vertex.entry_point(), "vs_main");
        assert_eq!(Stage::Fragment.entry_point(), "fs_main");

        let renamed = FRAG.replace("fn fs_main", "fn main");
        let err = reflect_stage(&renamed, Stage::Fragment).unwrap_err();
        assert!(err.contains(Stage::Fragment.entry_point()));
    }

    #[test]
    fn link_rejects_mismatched_blocks() {
        let vs = reflect_stage(VERT, Stage::Vertex).unwrap();
        let other = r#"
struct Other { tint: vec4<f32> }
@group(0) @binding(0) var<uniform> o: Other;
@fragment
fn fs_main() -> @location(0) vec4<f32> { return o.tint; }
"#;
        let fs = reflect_stage(other, Stage::Fragment).unwrap();
        assert!(link(vs, fs).is_err());
    }
}
