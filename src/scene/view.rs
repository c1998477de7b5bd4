use std::collections::{HashMap, HashSet};

use crate::foundation::core::{FrameIndex, Rect};
use crate::foundation::error::WavyteResult;
use crate::render::surface::Surface;
use crate::scene::script::{Deferred, ResourceValue};

/// Drawing contract for script-produced content.
pub trait Drawable: Send {
    /// Draw into `surface`. Missing resources are requested through `cx`, not waited for.
    fn draw(&self, surface: &mut Surface, cx: &mut DrawContext<'_>) -> WavyteResult<()>;

    /// Logical bounds of the content.
    fn bounds(&self) -> Rect;
}

/// Resolved resources, kept across resets of the same scene.
#[derive(Debug, Default)]
pub struct ResourceCache {
    values: HashMap<String, ResourceValue>,
    failed: HashSet<String>,
}

impl ResourceCache {
    /// Resolved value for `key`.
    pub fn get(&self, key: &str) -> Option<&ResourceValue> {
        self.values.get(key)
    }

    /// Return `true` when resolving `key` failed before.
    pub fn is_failed(&self, key: &str) -> bool {
        self.failed.contains(key)
    }

    pub(crate) fn insert(&mut self, key: String, value: ResourceValue) {
        self.failed.remove(&key);
        self.values.insert(key, value);
    }

    pub(crate) fn mark_failed(&mut self, key: String) {
        self.failed.insert(key);
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.failed.clear();
    }

    /// Number of resolved resources.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Return `true` when nothing is resolved.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Explicit drawing context threaded through every draw call.
pub struct DrawContext<'a> {
    resolution_scale: f64,
    frame: FrameIndex,
    resources: &'a ResourceCache,
    pending: Vec<(String, Deferred)>,
}

impl<'a> DrawContext<'a> {
    pub(crate) fn new(resolution_scale: f64, frame: FrameIndex, resources: &'a ResourceCache) -> Self {
        Self {
            resolution_scale,
            frame,
            resources,
            pending: Vec::new(),
        }
    }

    /// Logical-to-physical scale factor.
    pub fn resolution_scale(&self) -> f64 {
        self.resolution_scale
    }

    /// Global frame being drawn.
    pub fn frame(&self) -> FrameIndex {
        self.frame
    }

    /// Map a logical rectangle to physical pixels.
    pub fn to_physical(&self, rect: Rect) -> Rect {
        rect.scale_from_origin(self.resolution_scale)
    }

    /// Look up a resolved resource.
    pub fn resource(&self, key: &str) -> Option<&ResourceValue> {
        self.resources.get(key)
    }

    /// Return `true` when `key` failed to resolve earlier.
    pub fn resource_failed(&self, key: &str) -> bool {
        self.resources.is_failed(key)
    }

    /// Ask the scene to resolve `deferred` under `key` and draw again.
    pub fn request(&mut self, key: impl Into<String>, deferred: Deferred) {
        let key = key.into();
        if self.pending.iter().any(|(k, _)| *k == key) {
            return;
        }
        self.pending.push((key, deferred));
    }

    /// Return `true` when this draw pass requested resources.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn into_pending(self) -> Vec<(String, Deferred)> {
        self.pending
    }
}

/// Ordered, named list of drawables produced by a script.
#[derive(Default)]
pub struct View {
    nodes: Vec<(String, Box<dyn Drawable>)>,
}

impl View {
    /// Insert `drawable` under `name`, replacing an existing node in place.
    pub fn insert(&mut self, name: impl Into<String>, drawable: impl Drawable + 'static) {
        let name = name.into();
        let boxed: Box<dyn Drawable> = Box::new(drawable);
        match self.nodes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = boxed,
            None => self.nodes.push((name, boxed)),
        }
    }

    /// Remove a node. Returns `false` if it did not exist.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|(n, _)| n != name);
        before != self.nodes.len()
    }

    /// Borrow a node.
    pub fn get(&self, name: &str) -> Option<&dyn Drawable> {
        self.nodes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_ref())
    }

    /// Logical bounds of a node.
    pub fn bounds_of(&self, name: &str) -> Option<Rect> {
        self.get(name).map(Drawable::bounds)
    }

    /// Node names in draw order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|(n, _)| n.as_str())
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Return `true` when there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Remove every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub(crate) fn draw(&self, surface: &mut Surface, cx: &mut DrawContext<'_>) -> WavyteResult<()> {
        for (_, d) in &self.nodes {
            d.draw(surface, cx)?;
        }
        Ok(())
    }
}
