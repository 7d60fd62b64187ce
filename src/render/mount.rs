//! Mount points: where a trial's scene is presented.

use std::sync::Arc;

use parking_lot::Mutex;

use super::Scene;

/// Caller-supplied container. The trial fully owns its contents from
/// construction until `clear()` on completion.
pub trait Mount: Send {
    /// Show the latest scene.
    fn present(&mut self, scene: &Scene);

    /// Empty the container.
    fn clear(&mut self);
}

/// In-memory mount that keeps the most recent frame.
#[derive(Debug, Default)]
pub struct MemoryMount {
    frame: Option<Scene>,
    frames: u64,
    cleared: bool,
}

impl MemoryMount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> Option<&Scene> {
        self.frame.as_ref()
    }

    /// Number of `present` calls so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared
    }
}

impl Mount for MemoryMount {
    fn present(&mut self, scene: &Scene) {
        self.frame = Some(scene.clone());
        self.frames += 1;
        self.cleared = false;
    }

    fn clear(&mut self) {
        self.frame = None;
        self.cleared = true;
    }
}

impl<M: Mount + ?Sized> Mount for Box<M> {
    fn present(&mut self, scene: &Scene) {
        (**self).present(scene)
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

/// A mount shared with an observer outside the trial, e.g. a front end
/// that polls the latest frame.
impl<M: Mount> Mount for Arc<Mutex<M>> {
    fn present(&mut self, scene: &Scene) {
        self.lock().present(scene)
    }

    fn clear(&mut self) {
        self.lock().clear()
    }
}
