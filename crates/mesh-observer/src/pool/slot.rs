//! MeshSlot - one reusable container for an observed surface.
//!
//! A slot is either pooled (no id, no payload) or active (id and payload set).
//! The renderable handle survives every recycle and is only released at teardown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::RenderableHandle;
use crate::mesh::{MeshId, MeshPayload};

#[derive(Debug)]
pub struct MeshSlot {
    id: Option<MeshId>,
    payload: Option<Arc<MeshPayload>>,
    renderable: Option<RenderableHandle>,
    last_updated: Option<DateTime<Utc>>,
    visible: bool,
}

impl MeshSlot {
    /// A pooled slot. `renderable` is `None` when the backend failed to build one.
    pub fn new(renderable: Option<RenderableHandle>) -> Self {
        Self {
            id: None,
            payload: None,
            renderable,
            last_updated: None,
            visible: false,
        }
    }

    pub fn id(&self) -> Option<&MeshId> {
        self.id.as_ref()
    }

    pub fn payload(&self) -> Option<&Arc<MeshPayload>> {
        self.payload.as_ref()
    }

    pub fn renderable(&self) -> Option<RenderableHandle> {
        self.renderable
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_pooled(&self) -> bool {
        self.id.is_none()
            && self.payload.is_none()
            && self.last_updated.is_none()
            && !self.visible
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.payload.is_some()
    }

    /// Pooled → Active: tag with `id` and install the first payload.
    pub fn activate(&mut self, id: MeshId, payload: Arc<MeshPayload>) {
        debug_assert!(self.is_pooled(), "activating a slot that was not reset");
        self.id = Some(id);
        self.payload = Some(payload);
        self.last_updated = Some(Utc::now());
        self.visible = false;
    }

    /// Replace the payload of an active slot and mark it as shown.
    pub fn update(&mut self, payload: Arc<MeshPayload>) {
        self.payload = Some(payload);
        self.last_updated = Some(Utc::now());
        self.visible = true;
    }

    /// Active → Pooled. Clears every per-owner field; the renderable is kept.
    pub fn recycle(&mut self) {
        self.id = None;
        self.payload = None;
        self.last_updated = None;
        self.visible = false;
    }

    /// Take the renderable out for destruction at teardown.
    pub fn take_renderable(&mut self) -> Option<RenderableHandle> {
        self.renderable.take()
    }

    /// Read-only copy of an active slot, `None` while pooled.
    pub fn view(&self) -> Option<SlotView> {
        let id = self.id.clone()?;
        let payload = self.payload.clone()?;
        Some(SlotView {
            id,
            vertex_count: payload.vertex_count(),
            triangle_count: payload.triangle_count(),
            payload,
            renderable: self.renderable,
            last_updated: self.last_updated,
            visible: self.visible,
        })
    }
}

/// Immutable view of an active slot, handed to event consumers and snapshots.
///
/// Shares the payload with the slot; later updates replace the slot's payload
/// rather than mutating it, so a view never changes under its holder.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub id: MeshId,
    #[serde(skip)]
    pub payload: Arc<MeshPayload>,
    pub renderable: Option<RenderableHandle>,
    pub last_updated: Option<DateTime<Utc>>,
    pub visible: bool,
    pub vertex_count: usize,
    pub triangle_count: usize,
}
