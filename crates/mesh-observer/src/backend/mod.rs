//! Render backend seam.
//!
//! The observer never talks to a graphics API directly. Every pooled slot owns
//! one [`RenderableHandle`], an opaque token minted by a [`RenderBackend`]. All
//! calls go through `&mut self`, so whoever holds the backend is the only
//! thread that can touch renderables.

mod headless;

use serde::{Deserialize, Serialize};

use crate::mesh::MeshPayload;
use crate::profile::ConstructionMode;

pub use headless::{HeadlessBackend, RenderableState};

/// Opaque token for one renderable owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderableHandle(u32);

impl RenderableHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for RenderableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "renderable#{}", self.0)
    }
}

/// Material reference resolved by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(String);

impl MaterialId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MaterialId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// What the backend needs to build one renderable.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableSpec {
    pub name: String,
    pub physics_layer: u32,
    pub construction: ConstructionMode,
    pub additional_components: Vec<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("failed to create renderable '{name}': {reason}")]
    Create { name: String, reason: String },
    #[error("unknown renderable {0}")]
    UnknownHandle(RenderableHandle),
}

/// Rendering/physics collaborator driven by the observer.
///
/// Not required to be `Sync`: the observer only calls it from the owning thread.
pub trait RenderBackend {
    fn create_renderable(&mut self, spec: &RenderableSpec)
    -> Result<RenderableHandle, BackendError>;

    fn destroy_renderable(&mut self, handle: RenderableHandle);

    /// Replace the renderable's mesh, `None` clears it.
    fn set_mesh(&mut self, handle: RenderableHandle, mesh: Option<&MeshPayload>);

    fn set_visible(&mut self, handle: RenderableHandle, visible: bool);

    fn set_collision(&mut self, handle: RenderableHandle, enabled: bool);

    fn set_material(&mut self, handle: RenderableHandle, material: &MaterialId);

    fn set_name(&mut self, handle: RenderableHandle, name: &str);
}
