//! Mesh lifecycle notifications and the spatial awareness system seam.
//!
//! The observer raises events through [`SpatialAwarenessSystem`]; it never
//! reaches for a global. [`ChannelEventSink`] is the in-process implementation
//! that forwards every event to an unbounded channel for downstream consumers.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::mesh::ObserverId;
use crate::pool::SlotView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshEventKind {
    Added,
    Updated,
    Removed,
}

impl MeshEventKind {
    pub fn all() -> HashSet<MeshEventKind> {
        [Self::Added, Self::Updated, Self::Removed]
            .into_iter()
            .collect()
    }
}

/// One mesh lifecycle notification.
#[derive(Debug, Clone, Serialize)]
pub struct ObserverEvent {
    pub kind: MeshEventKind,
    pub observer: ObserverId,
    pub mesh: SlotView,
}

/// Parent system that owns observers and fans their events out.
///
/// Events are raised while the mesh's directory entry is locked. Implementations
/// must not call back into the observer that raised them.
pub trait SpatialAwarenessSystem: Send + Sync {
    /// Issue a system-unique id for a newly registered observer.
    fn generate_new_observer_id(&self) -> ObserverId;

    fn raise_mesh_added(&self, observer: ObserverId, mesh: &SlotView);

    fn raise_mesh_updated(&self, observer: ObserverId, mesh: &SlotView);

    fn raise_mesh_removed(&self, observer: ObserverId, mesh: &SlotView);
}

/// Forwards events to an unbounded channel.
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<ObserverEvent>,
    events_filter: HashSet<MeshEventKind>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ObserverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                events_filter: MeshEventKind::all(),
            },
            rx,
        )
    }

    /// Only forward the given kinds.
    pub fn with_filter(mut self, kinds: impl IntoIterator<Item = MeshEventKind>) -> Self {
        self.events_filter = kinds.into_iter().collect();
        self
    }

    fn publish(&self, kind: MeshEventKind, observer: ObserverId, mesh: &SlotView) {
        if !self.events_filter.contains(&kind) {
            return;
        }
        tracing::trace!(?kind, mesh_id = %mesh.id, "Publishing mesh event");
        let event = ObserverEvent {
            kind,
            observer,
            mesh: mesh.clone(),
        };
        if self.tx.send(event).is_err() {
            tracing::warn!(?kind, mesh_id = %mesh.id, "Mesh event dropped: receiver closed");
        }
    }
}

impl SpatialAwarenessSystem for ChannelEventSink {
    fn generate_new_observer_id(&self) -> ObserverId {
        ObserverId::new()
    }

    fn raise_mesh_added(&self, observer: ObserverId, mesh: &SlotView) {
        self.publish(MeshEventKind::Added, observer, mesh);
    }

    fn raise_mesh_updated(&self, observer: ObserverId, mesh: &SlotView) {
        self.publish(MeshEventKind::Updated, observer, mesh);
    }

    fn raise_mesh_removed(&self, observer: ObserverId, mesh: &SlotView) {
        self.publish(MeshEventKind::Removed, observer, mesh);
    }
}
