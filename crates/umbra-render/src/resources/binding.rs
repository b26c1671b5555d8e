//! Binding context and scoped binds
//!
//! One slot per binding target. A [`BindGuard`] fills its slot on creation
//! and empties it on drop. Dropping an inner guard does not bring back an
//! outer bind of the same target: the slot is simply left empty.

use super::{Framebuffer, Program, VertexArray};
use std::cell::Cell;
use std::rc::Rc;

type Slot<T> = Rc<Cell<Option<T>>>;

/// The "currently bound" state of every binding target
#[derive(Clone, Default)]
pub struct BindingContext {
    framebuffer: Slot<Framebuffer>,
    program: Slot<Program>,
    vertex_array: Slot<VertexArray>,
}

impl BindingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` means the window surface
    pub fn framebuffer(&self) -> Option<Framebuffer> {
        self.framebuffer.get()
    }

    pub fn program(&self) -> Option<Program> {
        self.program.get()
    }

    pub fn vertex_array(&self) -> Option<VertexArray> {
        self.vertex_array.get()
    }

    pub(crate) fn bind_framebuffer(&self, fb: Framebuffer) -> BindGuard<Framebuffer> {
        BindGuard::new(&self.framebuffer, fb)
    }

    pub(crate) fn bind_program(&self, program: Program) -> BindGuard<Program> {
        BindGuard::new(&self.program, program)
    }

    pub(crate) fn bind_vertex_array(&self, vao: VertexArray) -> BindGuard<VertexArray> {
        BindGuard::new(&self.vertex_array, vao)
    }
}

/// Keeps a resource bound until dropped
#[must_use = "the resource is unbound as soon as the guard is dropped"]
pub struct BindGuard<T: Copy> {
    slot: Slot<T>,
    value: T,
}

impl<T: Copy> BindGuard<T> {
    fn new(slot: &Slot<T>, value: T) -> Self {
        slot.set(Some(value));
        Self { slot: slot.clone(), value }
    }

    /// The resource this guard bound
    pub fn resource(&self) -> T {
        self.value
    }
}

impl<T: Copy> Drop for BindGuard<T> {
    fn drop(&mut self) {
        self.slot.set(None);
    }
}
