//! Shader programs with named parameters
//!
//! A [`Shader`] is a vertex + fragment WGSL pair loaded from disk. Parameter
//! setters resolve names against the linked program and return `false` for
//! names the program does not use, so one call site can drive several shader
//! variants.

pub mod reflect;

use crate::resources::{BindGuard, GpuResources, Program, Texture, TextureArray, TextureBinding, VertexBuffer};
use crate::{Error, Result};
use glam::{Mat3, Mat4, Vec3};
use reflect::UniformValue;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Value accepted by [`Shader::set_scalar_parameter`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Int(i32),
    Float(f32),
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<f32> for ScalarValue {
    fn from(v: f32) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Int(v as i32)
    }
}

impl From<ScalarValue> for UniformValue {
    fn from(v: ScalarValue) -> Self {
        match v {
            ScalarValue::Int(i) => UniformValue::Int(i),
            ScalarValue::Float(f) => UniformValue::Float(f),
        }
    }
}

pub struct Shader {
    vertex_path: PathBuf,
    fragment_path: PathBuf,
    program: Option<Program>,
    /// Sampler name to texture unit, assigned in order of first use
    texture_units: HashMap<String, u32>,
}

impl Shader {
    /// Load, compile and link a program.
    ///
    /// With `abort_on_init_failure` a failure is returned as an error.
    /// Otherwise the shader is kept without a program: binds yield `None`
    /// and every setter returns `false` until a successful [`reload`](Self::reload).
    pub fn new(
        gpu: &mut GpuResources,
        vertex_path: impl Into<PathBuf>,
        fragment_path: impl Into<PathBuf>,
        abort_on_init_failure: bool,
    ) -> Result<Self> {
        let mut shader = Self {
            vertex_path: vertex_path.into(),
            fragment_path: fragment_path.into(),
            program: None,
            texture_units: HashMap::new(),
        };

        match shader.build(gpu) {
            Ok(program) => shader.program = Some(program),
            Err(err) if abort_on_init_failure => return Err(err),
            Err(_) => log::warn!(
                "Continuing without program for {}",
                shader.vertex_path.display()
            ),
        }
        Ok(shader)
    }

    fn build(&self, gpu: &mut GpuResources) -> Result<Program> {
        let built = read_source(&self.vertex_path)
            .and_then(|vs| Ok((vs, read_source(&self.fragment_path)?)))
            .and_then(|(vs, fs)| gpu.create_program(&vs, &fs));

        match built {
            Ok(program) => {
                log::debug!(
                    "Linked {} with {}",
                    self.vertex_path.display(),
                    self.fragment_path.display()
                );
                Ok(program)
            }
            Err(err) => {
                log::error!(
                    "Failed to build {} with {}: {}",
                    self.vertex_path.display(),
                    self.fragment_path.display(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Rebuild from the same files. The current program stays in use when
    /// the rebuild fails.
    pub fn reload(&mut self, gpu: &mut GpuResources) -> Result<()> {
        let program = self.build(gpu)?;
        if let Some(old) = self.program.replace(program) {
            gpu.free_program(old);
        }
        log::info!("Reloaded {}", self.vertex_path.display());
        Ok(())
    }

    pub fn release(&mut self, gpu: &mut GpuResources) {
        if let Some(program) = self.program.take() {
            gpu.free_program(program);
        }
    }

    pub fn program(&self) -> Option<Program> {
        self.program
    }

    pub fn is_linked(&self) -> bool {
        self.program.is_some()
    }

    pub fn vertex_path(&self) -> &Path {
        &self.vertex_path
    }

    pub fn fragment_path(&self) -> &Path {
        &self.fragment_path
    }

    pub fn bind(&self, gpu: &GpuResources) -> Option<BindGuard<Program>> {
        self.program.map(|program| gpu.bind_program(program))
    }

    fn set_uniform(&self, gpu: &mut GpuResources, name: &str, value: UniformValue) -> bool {
        match self.program {
            Some(program) => gpu.set_uniform(program, name, value),
            None => false,
        }
    }

    pub fn set_scalar_parameter(&self, gpu: &mut GpuResources, name: &str, value: impl Into<ScalarValue>) -> bool {
        self.set_uniform(gpu, name, value.into().into())
    }

    pub fn set_vector_parameter(&self, gpu: &mut GpuResources, name: &str, value: Vec3) -> bool {
        self.set_uniform(gpu, name, UniformValue::Vec3(value))
    }

    pub fn set_matrix_parameter(&self, gpu: &mut GpuResources, name: &str, value: Mat4) -> bool {
        self.set_uniform(gpu, name, UniformValue::Mat4(value))
    }

    pub fn set_matrix3_parameter(&self, gpu: &mut GpuResources, name: &str, value: Mat3) -> bool {
        self.set_uniform(gpu, name, UniformValue::Mat3(value))
    }

    /// Needs a bound vertex array
    pub fn set_vertex_buffer(&self, gpu: &mut GpuResources, name: &str, components: u32, buffer: VertexBuffer) -> bool {
        match self.program {
            Some(program) => gpu.set_vertex_buffer(program, name, components, buffer),
            None => false,
        }
    }

    pub fn set_texture_sampler(&mut self, gpu: &mut GpuResources, name: &str, texture: Texture) -> bool {
        self.bind_texture(gpu, name, TextureBinding::Texture(texture))
    }

    pub fn set_texture_array_sampler(&mut self, gpu: &mut GpuResources, name: &str, array: TextureArray) -> bool {
        self.bind_texture(gpu, name, TextureBinding::Array(array))
    }

    fn bind_texture(&mut self, gpu: &mut GpuResources, name: &str, binding: TextureBinding) -> bool {
        let Some(program) = self.program else {
            return false;
        };
        let unit = self.texture_unit(name);
        gpu.set_texture_sampler(program, name, binding, unit)
    }

    /// Stable unit per parameter name
    pub fn texture_unit(&mut self, name: &str) -> u32 {
        let next = self.texture_units.len() as u32;
        *self.texture_units.entry(name.to_string()).or_insert(next)
    }
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|err| Error::Shader(format!("failed to read {}: {}", path.display(), err)))
}
