//! Recording backend for GPU-free tests

use super::{DrawCall, GpuBackend, GpuResources, RenderTarget, ResourceId, TextureArrayDesc};
use crate::shader::reflect::ProgramLayout;
use crate::Result;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct Log {
    pub frames: usize,
    pub clears: Vec<(RenderTarget, Option<[f32; 4]>, Option<f32>)>,
    pub draws: Vec<DrawCall>,
    pub live: HashSet<ResourceId>,
    pub programs_created: usize,
}

impl Log {
    pub fn framebuffer_clears(&self) -> usize {
        self.clears
            .iter()
            .filter(|(target, _, _)| matches!(target, RenderTarget::Framebuffer { .. }))
            .count()
    }

    pub fn surface_draws(&self) -> usize {
        self.draws.iter().filter(|d| d.target == RenderTarget::Surface).count()
    }

    pub fn framebuffer_draws(&self) -> usize {
        self.draws.len() - self.surface_draws()
    }
}

pub struct RecordingBackend {
    log: Rc<RefCell<Log>>,
}

impl GpuBackend for RecordingBackend {
    fn create_vertex_buffer(&mut self, id: ResourceId, _data: &[f32]) {
        self.log.borrow_mut().live.insert(id);
    }

    fn create_texture(&mut self, id: ResourceId, _width: u32, _height: u32, _rgba: &[u8]) {
        self.log.borrow_mut().live.insert(id);
    }

    fn create_texture_array(&mut self, id: ResourceId, _desc: &TextureArrayDesc) {
        self.log.borrow_mut().live.insert(id);
    }

    fn create_program(&mut self, id: ResourceId, _vs: &str, _fs: &str, _layout: &ProgramLayout) -> Result<()> {
        let mut log = self.log.borrow_mut();
        log.live.insert(id);
        log.programs_created += 1;
        Ok(())
    }

    fn free(&mut self, id: ResourceId) {
        self.log.borrow_mut().live.remove(&id);
    }

    fn clear(&mut self, target: RenderTarget, color: Option<[f32; 4]>, depth: Option<f32>) {
        self.log.borrow_mut().clears.push((target, color, depth));
    }

    fn draw(&mut self, call: DrawCall) {
        self.log.borrow_mut().draws.push(call);
    }

    fn begin_frame(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.log.borrow_mut().frames += 1;
        Ok(())
    }

    fn resize(&mut self, _width: u32, _height: u32) {}
}

pub fn recording_resources() -> (GpuResources, Rc<RefCell<Log>>) {
    let log = Rc::new(RefCell::new(Log::default()));
    let backend = RecordingBackend { log: log.clone() };
    (GpuResources::new(Box::new(backend), 600, 600), log)
}
