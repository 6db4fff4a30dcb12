//! In-memory backend that records renderable state instead of drawing it.
//!
//! Used for headless runs (servers, CI) and as the test double for the observer.

use std::collections::BTreeMap;

use super::{BackendError, MaterialId, RenderBackend, RenderableHandle, RenderableSpec};
use crate::mesh::MeshPayload;

/// Recorded state of one headless renderable.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableState {
    pub name: String,
    pub physics_layer: u32,
    pub visible: bool,
    pub collision: bool,
    pub material: Option<MaterialId>,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub has_mesh: bool,
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    renderables: BTreeMap<RenderableHandle, RenderableState>,
    next_handle: u32,
    created: usize,
    destroyed: usize,
    fail_creations: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` creations fail.
    pub fn fail_next_creations(&mut self, count: usize) {
        self.fail_creations = count;
    }

    pub fn state(&self, handle: RenderableHandle) -> Option<&RenderableState> {
        self.renderables.get(&handle)
    }

    pub fn live(&self) -> usize {
        self.renderables.len()
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed
    }

    pub fn handles(&self) -> impl Iterator<Item = RenderableHandle> + '_ {
        self.renderables.keys().copied()
    }

    fn with_state(&mut self, handle: RenderableHandle, f: impl FnOnce(&mut RenderableState)) {
        match self.renderables.get_mut(&handle) {
            Some(state) => f(state),
            None => tracing::warn!(%handle, "Operation on unknown renderable ignored"),
        }
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_renderable(
        &mut self,
        spec: &RenderableSpec,
    ) -> Result<RenderableHandle, BackendError> {
        if self.fail_creations > 0 {
            self.fail_creations -= 1;
            return Err(BackendError::Create {
                name: spec.name.clone(),
                reason: "headless backend configured to fail".to_string(),
            });
        }

        let handle = RenderableHandle::from_raw(self.next_handle);
        self.next_handle += 1;
        self.created += 1;
        self.renderables.insert(
            handle,
            RenderableState {
                name: spec.name.clone(),
                physics_layer: spec.physics_layer,
                visible: false,
                collision: false,
                material: None,
                vertex_count: 0,
                triangle_count: 0,
                has_mesh: false,
            },
        );
        tracing::trace!(%handle, name = %spec.name, "Created headless renderable");
        Ok(handle)
    }

    fn destroy_renderable(&mut self, handle: RenderableHandle) {
        if self.renderables.remove(&handle).is_some() {
            self.destroyed += 1;
        } else {
            tracing::warn!(%handle, "Destroying unknown renderable");
        }
    }

    fn set_mesh(&mut self, handle: RenderableHandle, mesh: Option<&MeshPayload>) {
        self.with_state(handle, |state| match mesh {
            Some(mesh) => {
                state.has_mesh = true;
                state.vertex_count = mesh.vertex_count();
                state.triangle_count = mesh.triangle_count();
            }
            None => {
                state.has_mesh = false;
                state.vertex_count = 0;
                state.triangle_count = 0;
            }
        });
    }

    fn set_visible(&mut self, handle: RenderableHandle, visible: bool) {
        self.with_state(handle, |state| state.visible = visible);
    }

    fn set_collision(&mut self, handle: RenderableHandle, enabled: bool) {
        self.with_state(handle, |state| state.collision = enabled);
    }

    fn set_material(&mut self, handle: RenderableHandle, material: &MaterialId) {
        self.with_state(handle, |state| state.material = Some(material.clone()));
    }

    fn set_name(&mut self, handle: RenderableHandle, name: &str) {
        self.with_state(handle, |state| state.name = name.to_string());
    }
}
