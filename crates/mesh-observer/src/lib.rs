//! mesh-observer: pooled lifecycle management for spatial mesh observations.

mod directory;
mod mesh;
mod status;

pub mod backend;
pub mod events;
pub mod observer;
pub mod pool;
pub mod profile;
pub mod service;
pub mod telemetry;

pub use backend::{BackendError, HeadlessBackend, MaterialId, RenderBackend, RenderableHandle, RenderableSpec};
pub use directory::{ActiveDirectory, DirectorySnapshot};
pub use events::{ChannelEventSink, MeshEventKind, ObserverEvent, SpatialAwarenessSystem};
pub use mesh::{MeshId, MeshPayload, ObserverId};
pub use observer::{MeshObserver, MeshObserverBuilder, Observation, ObserverError, TickReport};
pub use pool::{MeshSlot, SlotPool, SlotView};
pub use profile::{
    ConstructionMode, DisplayMode, LevelOfDetail, ObserverProfile, ProfileError, VolumeType,
};
pub use service::ObserverService;
pub use status::{ObserverHealth, ObserverStatus};
pub use telemetry::init_tracing;
