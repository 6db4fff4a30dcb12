//! MeshObserver - lifecycle manager tying the slot pool and the active directory together.
//!
//! Flow:
//! 1. Build: validate the profile, register with the spatial awareness system, warm up the pool
//! 2. Ingestion (any task): `on_observed` / `on_removed` move slots between pool and directory
//! 3. Owning thread: `tick` replenishes the pool and applies queued renderable commands
//! 4. Teardown: cancel pending acquisitions, destroy every renderable, clear both collections
//!
//! Every ingestion step that moves a slot holds the read side of a teardown gate;
//! teardown takes the write side, so no slot can re-enter the pool or the
//! directory after they have been drained.
//!
//! Ingestion never touches the render backend. Renderable changes it implies are
//! queued and applied in FIFO order on the next tick, so a handle that is hidden
//! and then reused always ends up in its newest owner's state.

use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock, RwLockReadGuard};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{RenderBackend, RenderableHandle, RenderableSpec};
use crate::directory::{ActiveDirectory, DirectorySnapshot};
use crate::events::SpatialAwarenessSystem;
use crate::mesh::{MeshId, MeshPayload, ObserverId};
use crate::pool::{MeshSlot, SlotPool};
use crate::profile::{DisplayMode, ObserverProfile, ProfileError};
use crate::status::{ObserverHealth, ObserverStatus};

/// Outcome of a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// New directory entry, `Added` raised.
    Added,
    /// Existing entry mutated in place, `Updated` raised.
    Updated,
    /// Acquisition cancelled by teardown or by removal of the pending mesh.
    Abandoned,
    /// Observer suspended or disabled.
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("observer profile is required")]
    MissingProfile,
    #[error("spatial awareness system is required")]
    MissingEventSink,
    #[error(transparent)]
    InvalidProfile(#[from] ProfileError),
}

/// Renderable change deferred to the owning thread.
#[derive(Debug)]
enum RenderCommand {
    Install {
        handle: RenderableHandle,
        id: MeshId,
        payload: Arc<MeshPayload>,
    },
    Refresh {
        handle: RenderableHandle,
        payload: Arc<MeshPayload>,
    },
    Hide {
        handle: RenderableHandle,
    },
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub replenished: usize,
    pub commands_applied: usize,
}

struct PendingAcquire {
    token: CancellationToken,
    /// Distinguishes this wait from a later one for the same id after a removal.
    generation: u64,
    waiters: usize,
}

/// One caller's share of a pending acquisition.
struct PendingTicket {
    token: CancellationToken,
    generation: u64,
}

type TeardownGate<'a> = RwLockReadGuard<'a, ()>;

pub struct MeshObserverBuilder {
    profile: Option<ObserverProfile>,
    system: Option<Arc<dyn SpatialAwarenessSystem>>,
}

impl MeshObserverBuilder {
    pub fn new() -> Self {
        Self {
            profile: None,
            system: None,
        }
    }

    pub fn with_profile(mut self, profile: ObserverProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_system(mut self, system: Arc<dyn SpatialAwarenessSystem>) -> Self {
        self.system = Some(system);
        self
    }

    /// Validate configuration and warm up the pool on the owning thread.
    pub fn build<B: RenderBackend>(self, backend: &mut B) -> Result<MeshObserver, ObserverError> {
        let profile = self.profile.ok_or(ObserverError::MissingProfile)?;
        let system = self.system.ok_or(ObserverError::MissingEventSink)?;
        profile.validate()?;

        let (render_tx, render_rx) = mpsc::unbounded_channel();
        let observer = MeshObserver {
            id: system.generate_new_observer_id(),
            display_mode: AtomicU8::new(display_mode_to_u8(profile.display_option)),
            profile,
            system,
            pool: SlotPool::new(),
            directory: ActiveDirectory::new(),
            pending: DashMap::new(),
            pending_generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            teardown_gate: StdRwLock::new(()),
            status: AtomicU8::new(ObserverStatus::Initializing.as_u8()),
            render_tx,
            render_rx: StdMutex::new(render_rx),
            slots_built: AtomicUsize::new(0),
        };

        let warm: Vec<MeshSlot> = (0..observer.profile.initial_pool_size)
            .map(|_| observer.build_slot(backend))
            .collect();
        observer.pool.extend(warm);

        let status = if observer.profile.auto_start {
            ObserverStatus::Running
        } else {
            ObserverStatus::Suspended
        };
        observer.set_status(status);

        tracing::info!(
            observer = %observer.id,
            name = %observer.profile.name,
            pooled = observer.pool.len(),
            triangles_per_cubic_meter = observer.profile.effective_triangles_per_cubic_meter(),
            ?status,
            "Mesh observer ready"
        );
        Ok(observer)
    }
}

impl Default for MeshObserverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool + directory lifecycle manager for spatial meshes.
///
/// Ingestion methods take `&self` and are safe from any task. Methods that take
/// `&mut B: RenderBackend` must run on the thread that owns the backend.
pub struct MeshObserver {
    id: ObserverId,
    profile: ObserverProfile,
    system: Arc<dyn SpatialAwarenessSystem>,
    pool: SlotPool<MeshSlot>,
    directory: ActiveDirectory,
    pending: DashMap<MeshId, PendingAcquire>,
    pending_generation: AtomicU64,
    shutdown: CancellationToken,
    teardown_gate: StdRwLock<()>,
    status: AtomicU8,
    display_mode: AtomicU8,
    render_tx: mpsc::UnboundedSender<RenderCommand>,
    render_rx: StdMutex<mpsc::UnboundedReceiver<RenderCommand>>,
    slots_built: AtomicUsize,
}

impl MeshObserver {
    pub fn builder() -> MeshObserverBuilder {
        MeshObserverBuilder::new()
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn profile(&self) -> &ObserverProfile {
        &self.profile
    }

    pub fn status(&self) -> ObserverStatus {
        ObserverStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: ObserverStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    pub fn display_mode(&self) -> DisplayMode {
        display_mode_from_u8(self.display_mode.load(Ordering::Acquire))
    }

    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    pub fn active(&self) -> usize {
        self.directory.len()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn snapshot(&self) -> DirectorySnapshot {
        self.directory.snapshot()
    }

    /// Renderables of the slots currently free in the pool.
    pub fn pooled_handles(&self) -> Vec<RenderableHandle> {
        self.pool
            .inspect(|free| free.iter().filter_map(MeshSlot::renderable).collect())
    }

    pub fn health(&self) -> ObserverHealth {
        ObserverHealth {
            observer: self.id,
            status: self.status(),
            display_mode: self.display_mode(),
            pooled: self.pool.len(),
            active: self.directory.len(),
            pending: self.pending.len(),
            total_created: self.pool.total_created(),
        }
    }

    /// Stop accepting observations. Active meshes stay in place.
    pub fn suspend(&self) {
        let swapped = self.status.compare_exchange(
            ObserverStatus::Running.as_u8(),
            ObserverStatus::Suspended.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if swapped.is_ok() {
            tracing::info!(observer = %self.id, "Mesh observer suspended");
        }
    }

    pub fn resume(&self) {
        let swapped = self.status.compare_exchange(
            ObserverStatus::Suspended.as_u8(),
            ObserverStatus::Running.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        match swapped {
            Ok(_) => tracing::info!(observer = %self.id, "Mesh observer resumed"),
            Err(current) if current == ObserverStatus::Disabled.as_u8() => {
                tracing::warn!(observer = %self.id, "Cannot resume a torn down observer");
            }
            Err(_) => {}
        }
    }

    /// Handle a new or changed surface from the scan.
    ///
    /// Suspends while the pool is empty until the next replenishment.
    pub async fn on_observed(&self, id: impl Into<MeshId>, payload: MeshPayload) -> Observation {
        let id = id.into();
        if !self.status().accepts_observations() {
            tracing::debug!(mesh_id = %id, status = ?self.status(), "Observation ignored");
            return Observation::Ignored;
        }
        let payload = Arc::new(payload);

        if let Some(outcome) = self.apply_update(&id, &payload) {
            return outcome;
        }

        let ticket = self.begin_pending(&id);
        let acquired = self.acquire_for(&id, &ticket.token).await;
        self.end_pending(&id, ticket.generation);

        // The gate stays held until the slot is in the directory or back in the pool.
        let Some((mut slot, _gate)) = acquired else {
            tracing::debug!(mesh_id = %id, "Slot acquisition cancelled");
            return Observation::Abandoned;
        };
        if ticket.token.is_cancelled() {
            tracing::debug!(mesh_id = %id, "Mesh removed while waiting for a slot");
            self.pool.release(slot);
            return Observation::Abandoned;
        }

        slot.activate(id.clone(), Arc::clone(&payload));
        let handle = slot.renderable();

        match self.directory.insert(id.clone(), slot) {
            Ok(entry) => {
                if let Some(handle) = handle {
                    self.queue(RenderCommand::Install {
                        handle,
                        id: id.clone(),
                        payload,
                    });
                }
                // Raised under the entry lock so no Updated can overtake it.
                if let Some(view) = entry.view() {
                    self.system.raise_mesh_added(self.id, &view);
                }
                drop(entry);
                tracing::debug!(
                    mesh_id = %id,
                    pooled = self.pool.len(),
                    active = self.directory.len(),
                    "Mesh added"
                );
                Observation::Added
            }
            Err(mut slot) => {
                tracing::debug!(mesh_id = %id, "Concurrent observation inserted first, applying as update");
                slot.recycle();
                self.pool.release(slot);
                self.apply_update(&id, &payload)
                    .unwrap_or(Observation::Abandoned)
            }
        }
    }

    /// Handle removal of a surface. Safe to call twice.
    pub fn on_removed(&self, id: impl Into<MeshId>) {
        let id = id.into();
        let Some(_gate) = self.enter() else {
            tracing::debug!(mesh_id = %id, "Removal ignored after teardown");
            return;
        };
        match self.directory.remove(&id) {
            Some(slot) => {
                self.recycle(slot);
                tracing::debug!(
                    mesh_id = %id,
                    pooled = self.pool.len(),
                    active = self.directory.len(),
                    "Mesh removed"
                );
            }
            None => {
                if let Some((_, pending)) = self.pending.remove(&id) {
                    pending.token.cancel();
                    tracing::debug!(mesh_id = %id, "Cancelled pending acquisition for removed mesh");
                    return;
                }
                tracing::error!(
                    mesh_id = %id,
                    pooled = self.pool.len(),
                    active = self.directory.len(),
                    "Removal for a mesh that is not in the directory"
                );
            }
        }
    }

    /// Remove and recycle every active mesh.
    pub fn clear_observations(&self) {
        let Some(_gate) = self.enter() else {
            return;
        };
        let ids = self.directory.ids();
        let cleared = ids.len();
        for id in ids {
            if let Some(slot) = self.directory.remove(&id) {
                self.recycle(slot);
            }
        }
        tracing::info!(observer = %self.id, cleared, "Cleared observations");
    }

    /// Apply `mode` to every active renderable. Owning thread only.
    pub fn set_display_mode<B: RenderBackend>(&self, mode: DisplayMode, backend: &mut B) {
        self.display_mode
            .store(display_mode_to_u8(mode), Ordering::Release);
        let snapshot = self.directory.snapshot();
        for view in snapshot.views() {
            if let Some(handle) = view.renderable {
                self.apply_display_mode(backend, handle, mode);
            }
        }
        tracing::info!(?mode, meshes = snapshot.len(), "Display mode applied");
    }

    /// Per-frame work on the owning thread: replenish, then flush deferred renderable commands.
    pub fn tick<B: RenderBackend>(&self, backend: &mut B) -> TickReport {
        if self.status().is_terminal() {
            return TickReport::default();
        }
        let replenished = self.pool.replenish_if_low(
            self.profile.low_water_mark,
            self.profile.replenish_batch,
            || self.build_slot(backend),
        );
        let commands_applied = self.flush_render_commands(backend);
        if replenished > 0 || commands_applied > 0 {
            tracing::trace!(replenished, commands_applied, "Tick");
        }
        TickReport {
            replenished,
            commands_applied,
        }
    }

    /// Destroy every renderable and release pending acquisitions. Terminal.
    pub fn teardown<B: RenderBackend>(&self, backend: &mut B) {
        // Waits for in-flight ingestion to finish moving its slot.
        let _gate = match self.teardown_gate.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Teardown gate poisoned - recovering");
                poisoned.into_inner()
            }
        };
        if self.status().is_terminal() {
            return;
        }
        self.set_status(ObserverStatus::Disabled);
        self.shutdown.cancel();
        self.pending.clear();

        let mut destroyed = 0;
        let slots = self
            .directory
            .drain()
            .into_iter()
            .map(|(_, slot)| slot)
            .chain(self.pool.drain());
        for mut slot in slots {
            if let Some(handle) = slot.take_renderable() {
                backend.destroy_renderable(handle);
                destroyed += 1;
            }
        }

        let discarded = self.drain_render_commands().len();
        tracing::info!(observer = %self.id, destroyed, discarded, "Mesh observer torn down");
    }

    fn apply_update(&self, id: &MeshId, payload: &Arc<MeshPayload>) -> Option<Observation> {
        let mut slot = self.directory.get_mut(id)?;
        slot.update(Arc::clone(payload));
        if let Some(handle) = slot.renderable() {
            self.queue(RenderCommand::Refresh {
                handle,
                payload: Arc::clone(payload),
            });
        }
        if let Some(view) = slot.view() {
            self.system.raise_mesh_updated(self.id, &view);
        }
        Some(Observation::Updated)
    }

    /// Raise Removed if the mesh was shown, reset the slot and return it to the pool.
    fn recycle(&self, mut slot: MeshSlot) {
        if slot.is_visible()
            && let Some(view) = slot.view()
        {
            self.system.raise_mesh_removed(self.id, &view);
        }
        slot.recycle();
        // Queued before release so the hide lands before any reuse of the handle.
        if let Some(handle) = slot.renderable() {
            self.queue(RenderCommand::Hide { handle });
        }
        self.pool.release(slot);
    }

    /// Read side of the teardown gate, `None` once teardown has started.
    fn enter(&self) -> Option<TeardownGate<'_>> {
        let gate = match self.teardown_gate.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Teardown gate poisoned - recovering");
                poisoned.into_inner()
            }
        };
        if self.shutdown.is_cancelled() {
            return None;
        }
        Some(gate)
    }

    fn begin_pending(&self, id: &MeshId) -> PendingTicket {
        let mut entry = self
            .pending
            .entry(id.clone())
            .or_insert_with(|| PendingAcquire {
                token: self.shutdown.child_token(),
                generation: self.pending_generation.fetch_add(1, Ordering::AcqRel),
                waiters: 0,
            });
        entry.waiters += 1;
        PendingTicket {
            token: entry.token.clone(),
            generation: entry.generation,
        }
    }

    /// Drop one waiter from the record it joined. A newer record for the same id is left alone.
    fn end_pending(&self, id: &MeshId, generation: u64) {
        self.pending.remove_if_mut(id, |_, pending| {
            if pending.generation != generation {
                return false;
            }
            pending.waiters = pending.waiters.saturating_sub(1);
            pending.waiters == 0
        });
    }

    /// Take a slot from the pool, waiting for release or replenishment while it is empty.
    ///
    /// The slot comes back with the teardown gate held.
    async fn acquire_for(
        &self,
        id: &MeshId,
        token: &CancellationToken,
    ) -> Option<(MeshSlot, TeardownGate<'_>)> {
        loop {
            let notified = self.pool.wait_for_slots();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let gate = self.enter()?;
                if let Some(slot) = self.pool.try_acquire() {
                    return Some((slot, gate));
                }
            }

            tracing::debug!(mesh_id = %id, "Slot pool exhausted, waiting for replenishment");
            tokio::select! {
                biased;
                _ = token.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    fn build_slot<B: RenderBackend>(&self, backend: &mut B) -> MeshSlot {
        let index = self.slots_built.fetch_add(1, Ordering::AcqRel);
        let spec = RenderableSpec {
            name: format!("{} - Slot {}", self.profile.name, index),
            physics_layer: self.profile.physics_layer,
            construction: self.profile.construction.clone(),
            additional_components: self.profile.additional_components.clone(),
        };
        match backend.create_renderable(&spec) {
            Ok(handle) => {
                backend.set_visible(handle, false);
                backend.set_collision(handle, false);
                MeshSlot::new(Some(handle))
            }
            Err(e) => {
                tracing::error!(slot = index, error = %e, "Failed to build renderable, pooling degraded slot");
                MeshSlot::new(None)
            }
        }
    }

    fn queue(&self, command: RenderCommand) {
        // The receiver lives as long as `self`; a send can only fail mid-drop.
        let _ = self.render_tx.send(command);
    }

    fn drain_render_commands(&self) -> Vec<RenderCommand> {
        let mut rx = match self.render_rx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Render command queue mutex poisoned - recovering");
                poisoned.into_inner()
            }
        };
        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    fn flush_render_commands<B: RenderBackend>(&self, backend: &mut B) -> usize {
        let commands = self.drain_render_commands();
        let mode = self.display_mode();
        for command in &commands {
            match command {
                RenderCommand::Install {
                    handle,
                    id,
                    payload,
                } => {
                    backend.set_name(*handle, &format!("SpatialMesh - {id}"));
                    backend.set_mesh(*handle, Some(payload.as_ref()));
                    self.apply_display_mode(backend, *handle, mode);
                }
                RenderCommand::Refresh { handle, payload } => {
                    backend.set_mesh(*handle, Some(payload.as_ref()));
                    self.apply_display_mode(backend, *handle, mode);
                }
                RenderCommand::Hide { handle } => {
                    backend.set_visible(*handle, false);
                    backend.set_collision(*handle, false);
                    backend.set_mesh(*handle, None);
                }
            }
        }
        commands.len()
    }

    fn apply_display_mode<B: RenderBackend>(
        &self,
        backend: &mut B,
        handle: RenderableHandle,
        mode: DisplayMode,
    ) {
        match self.profile.material_for(mode) {
            Some(material) => {
                backend.set_material(handle, material);
                backend.set_visible(handle, true);
                backend.set_collision(handle, true);
            }
            None => {
                backend.set_visible(handle, false);
                backend.set_collision(handle, false);
            }
        }
    }
}

impl Drop for MeshObserver {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if !self.status().is_terminal() && (!self.directory.is_empty() || !self.pool.is_empty()) {
            tracing::warn!(
                observer = %self.id,
                pooled = self.pool.len(),
                active = self.directory.len(),
                "Mesh observer dropped without teardown - renderables leaked"
            );
        }
    }
}

fn display_mode_to_u8(mode: DisplayMode) -> u8 {
    match mode {
        DisplayMode::None => 0,
        DisplayMode::Visible => 1,
        DisplayMode::Occlusion => 2,
    }
}

fn display_mode_from_u8(value: u8) -> DisplayMode {
    match value {
        0 => DisplayMode::None,
        2 => DisplayMode::Occlusion,
        _ => DisplayMode::Visible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::events::{ChannelEventSink, MeshEventKind, ObserverEvent};
    use std::time::Duration;

    fn payload(tris: u32) -> MeshPayload {
        MeshPayload::new(vec![[0.0; 3]; 3], (0..tris * 3).map(|i| i % 3).collect())
    }

    fn setup(
        profile: ObserverProfile,
    ) -> (
        Arc<MeshObserver>,
        HeadlessBackend,
        mpsc::UnboundedReceiver<ObserverEvent>,
    ) {
        let mut backend = HeadlessBackend::new();
        let (sink, rx) = ChannelEventSink::new();
        let observer = MeshObserver::builder()
            .with_profile(profile)
            .with_system(Arc::new(sink))
            .build(&mut backend)
            .unwrap();
        (Arc::new(observer), backend, rx)
    }

    fn kinds(rx: &mut mpsc::UnboundedReceiver<ObserverEvent>) -> Vec<MeshEventKind> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn build_requires_profile_and_system() {
        let mut backend = HeadlessBackend::new();
        let (sink, _rx) = ChannelEventSink::new();

        let err = MeshObserver::builder()
            .with_system(Arc::new(sink))
            .build(&mut backend)
            .err()
            .unwrap();
        assert!(matches!(err, ObserverError::MissingProfile));

        let err = MeshObserver::builder()
            .with_profile(ObserverProfile::default())
            .build(&mut backend)
            .err()
            .unwrap();
        assert!(matches!(err, ObserverError::MissingEventSink));
        assert_eq!(backend.created(), 0);
    }

    #[test]
    fn build_rejects_invalid_profile() {
        let mut backend = HeadlessBackend::new();
        let (sink, _rx) = ChannelEventSink::new();
        let err = MeshObserver::builder()
            .with_profile(ObserverProfile {
                replenish_batch: 0,
                ..Default::default()
            })
            .with_system(Arc::new(sink))
            .build(&mut backend)
            .err()
            .unwrap();
        assert!(matches!(err, ObserverError::InvalidProfile(_)));
    }

    #[test]
    fn build_warms_up_pool() {
        let (observer, backend, _rx) = setup(ObserverProfile::default());
        assert_eq!(observer.pooled(), 10);
        assert_eq!(backend.live(), 10);
        assert_eq!(observer.status(), ObserverStatus::Running);
        assert!(backend.handles().all(|h| !backend.state(h).unwrap().visible));
    }

    #[test]
    fn failed_renderable_still_pooled() {
        let mut backend = HeadlessBackend::new();
        backend.fail_next_creations(2);
        let (sink, _rx) = ChannelEventSink::new();
        let observer = MeshObserver::builder()
            .with_profile(ObserverProfile {
                initial_pool_size: 4,
                ..Default::default()
            })
            .with_system(Arc::new(sink))
            .build(&mut backend)
            .unwrap();
        assert_eq!(observer.pooled(), 4);
        assert_eq!(backend.live(), 2);
    }

    #[tokio::test]
    async fn add_update_remove_events() {
        let (observer, mut backend, mut rx) = setup(ObserverProfile::default());

        assert_eq!(observer.on_observed("m1", payload(1)).await, Observation::Added);
        assert_eq!(observer.on_observed("m1", payload(2)).await, Observation::Updated);
        observer.on_removed("m1");

        assert_eq!(
            kinds(&mut rx),
            vec![
                MeshEventKind::Added,
                MeshEventKind::Updated,
                MeshEventKind::Removed
            ]
        );
        assert_eq!(observer.pooled(), 10);
        assert_eq!(observer.active(), 0);

        let report = observer.tick(&mut backend);
        assert_eq!(report.commands_applied, 3);
        assert!(backend.handles().all(|h| {
            let state = backend.state(h).unwrap();
            !state.visible && !state.has_mesh
        }));
        observer.teardown(&mut backend);
    }

    #[tokio::test]
    async fn never_shown_mesh_removed_silently() {
        let (observer, mut backend, mut rx) = setup(ObserverProfile::default());

        observer.on_observed("m1", payload(1)).await;
        observer.on_removed("m1");

        assert_eq!(kinds(&mut rx), vec![MeshEventKind::Added]);
        assert_eq!(observer.pooled(), 10);
        observer.teardown(&mut backend);
    }

    #[tokio::test]
    async fn double_removal_is_noop() {
        let (observer, mut backend, mut rx) = setup(ObserverProfile::default());
        observer.on_observed("m1", payload(1)).await;
        observer.on_observed("m1", payload(1)).await;

        observer.on_removed("m1");
        observer.on_removed("m1");

        assert_eq!(observer.pooled(), 10);
        assert_eq!(observer.active(), 0);
        assert_eq!(
            kinds(&mut rx)
                .into_iter()
                .filter(|k| *k == MeshEventKind::Removed)
                .count(),
            1
        );
        observer.teardown(&mut backend);
    }

    #[tokio::test]
    async fn install_applies_current_display_mode() {
        let (observer, mut backend, _rx) = setup(ObserverProfile {
            display_option: DisplayMode::Occlusion,
            ..Default::default()
        });
        observer.on_observed("m1", payload(4)).await;
        observer.tick(&mut backend);

        let view = observer.snapshot().get(&MeshId::from("m1")).cloned().unwrap();
        let state = backend.state(view.renderable.unwrap()).unwrap();
        assert!(state.visible && state.collision && state.has_mesh);
        assert_eq!(state.triangle_count, 4);
        assert_eq!(state.name, "SpatialMesh - m1");
        assert_eq!(state.material.as_ref(), Some(&observer.profile().occlusion_material));
        observer.teardown(&mut backend);
    }

    #[tokio::test]
    async fn suspended_observer_ignores_observations() {
        let (observer, mut backend, _rx) = setup(ObserverProfile {
            auto_start: false,
            ..Default::default()
        });
        assert_eq!(observer.status(), ObserverStatus::Suspended);
        assert_eq!(observer.on_observed("m1", payload(1)).await, Observation::Ignored);

        observer.resume();
        assert_eq!(observer.on_observed("m1", payload(1)).await, Observation::Added);

        observer.suspend();
        assert_eq!(observer.status(), ObserverStatus::Suspended);
        assert_eq!(observer.active(), 1);
        observer.teardown(&mut backend);
    }

    #[tokio::test]
    async fn teardown_releases_pending_acquisition() {
        let (observer, mut backend, _rx) = setup(ObserverProfile {
            initial_pool_size: 0,
            ..Default::default()
        });

        let waiter = {
            let observer = Arc::clone(&observer);
            tokio::spawn(async move { observer.on_observed("m1", payload(1)).await })
        };
        tokio::time::timeout(Duration::from_secs(1), async {
            while observer.pending() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        observer.teardown(&mut backend);

        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("pending acquisition was not released")
            .unwrap();
        assert_eq!(outcome, Observation::Abandoned);
        assert_eq!(observer.status(), ObserverStatus::Disabled);
        assert_eq!(observer.on_observed("m2", payload(1)).await, Observation::Ignored);
    }

    #[tokio::test]
    async fn removal_cancels_pending_acquisition() {
        let (observer, mut backend, mut rx) = setup(ObserverProfile {
            initial_pool_size: 0,
            ..Default::default()
        });

        let waiter = {
            let observer = Arc::clone(&observer);
            tokio::spawn(async move { observer.on_observed("m1", payload(1)).await })
        };
        tokio::time::timeout(Duration::from_secs(1), async {
            while observer.pending() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        observer.on_removed("m1");

        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, Observation::Abandoned);
        assert_eq!(observer.pending(), 0);
        assert!(kinds(&mut rx).is_empty());
        observer.teardown(&mut backend);
    }

    #[tokio::test]
    async fn clear_observations_recycles_everything() {
        let (observer, mut backend, mut rx) = setup(ObserverProfile::default());
        for id in ["a", "b", "c"] {
            observer.on_observed(id, payload(1)).await;
        }
        observer.on_observed("a", payload(1)).await;

        observer.clear_observations();

        assert_eq!(observer.active(), 0);
        assert_eq!(observer.pooled(), 10);
        let removed = kinds(&mut rx)
            .into_iter()
            .filter(|k| *k == MeshEventKind::Removed)
            .count();
        assert_eq!(removed, 1);
        observer.teardown(&mut backend);
    }

    #[tokio::test]
    async fn teardown_destroys_all_renderables() {
        let (observer, mut backend, _rx) = setup(ObserverProfile::default());
        observer.on_observed("a", payload(1)).await;
        observer.on_observed("b", payload(1)).await;

        observer.teardown(&mut backend);

        assert_eq!(backend.live(), 0);
        assert_eq!(backend.destroyed(), 10);
        assert_eq!(observer.pooled(), 0);
        assert_eq!(observer.active(), 0);
        assert_eq!(observer.tick(&mut backend), TickReport::default());

        observer.teardown(&mut backend);
        assert_eq!(backend.destroyed(), 10);
    }

    #[test]
    fn teardown_waits_for_in_flight_slot_move() {
        let (observer, mut backend, _rx) = setup(ObserverProfile::default());
        let gate = observer.enter().unwrap();
        let slot = observer.pool.try_acquire().unwrap();

        std::thread::scope(|s| {
            let teardown = s.spawn(|| observer.teardown(&mut backend));
            std::thread::sleep(Duration::from_millis(50));
            assert!(!teardown.is_finished());

            observer.pool.release(slot);
            drop(gate);
            teardown.join().unwrap();
        });

        assert_eq!(backend.live(), 0);
        assert_eq!(observer.pooled(), 0);
        assert!(observer.enter().is_none());
    }

    #[tokio::test]
    async fn removal_after_teardown_returns_nothing_to_pool() {
        let (observer, mut backend, _rx) = setup(ObserverProfile::default());
        observer.on_observed("m1", payload(1)).await;
        observer.teardown(&mut backend);

        observer.on_removed("m1");
        observer.clear_observations();

        assert_eq!(observer.pooled(), 0);
        assert_eq!(observer.active(), 0);
        assert_eq!(backend.live(), 0);
    }

    #[test]
    fn health_reports_counts() {
        let (observer, mut backend, _rx) = setup(ObserverProfile::default());
        let health = observer.health();
        assert_eq!(health.observer, observer.id());
        assert_eq!(health.pooled, 10);
        assert_eq!(health.active, 0);
        assert_eq!(health.total_created, 10);
        assert!(!health.is_starved());
        observer.teardown(&mut backend);
    }
}
