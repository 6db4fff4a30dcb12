//! ObserverService: drives a [`MeshObserver`] from the thread that owns the render backend.
//!
//! This service owns:
//! - The update cadence (one `tick` per `update_interval_secs`)
//! - Display mode requests from other tasks
//! - Shutdown coordination, ending in teardown
//!
//! Ingestion stays on the shared observer; only backend work funnels through `run`.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::backend::RenderBackend;
use crate::observer::MeshObserver;
use crate::profile::DisplayMode;

pub struct ObserverService {
    observer: Arc<MeshObserver>,
    display_tx: watch::Sender<DisplayMode>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ObserverService {
    pub fn new(observer: Arc<MeshObserver>) -> Self {
        let (display_tx, _) = watch::channel(observer.display_mode());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            observer,
            display_tx,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn observer(&self) -> &Arc<MeshObserver> {
        &self.observer
    }

    /// Ask the owning loop to switch display mode on its next turn.
    pub fn request_display_mode(&self, mode: DisplayMode) {
        self.display_tx.send_replace(mode);
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Tick until shutdown, then tear the observer down and hand the backend back.
    pub async fn run<B: RenderBackend>(&self, mut backend: B) -> B {
        let mut interval = tokio::time::interval(self.observer.profile().update_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut display_rx = self.display_tx.subscribe();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tracing::info!(
            observer = %self.observer.id(),
            interval_secs = self.observer.profile().update_interval_secs,
            "Observer service started"
        );

        while !*shutdown_rx.borrow_and_update() {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {}
                Ok(()) = display_rx.changed() => {
                    let mode = *display_rx.borrow_and_update();
                    if mode != self.observer.display_mode() {
                        self.observer.set_display_mode(mode, &mut backend);
                    }
                }
                _ = interval.tick() => {
                    self.observer.tick(&mut backend);
                }
            }
        }

        tracing::info!(observer = %self.observer.id(), "Observer service shutting down");
        self.observer.teardown(&mut backend);
        backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::events::ChannelEventSink;
    use crate::mesh::MeshPayload;
    use crate::observer::Observation;
    use crate::profile::ObserverProfile;
    use crate::status::ObserverStatus;
    use std::time::Duration;

    fn service(profile: ObserverProfile) -> (Arc<ObserverService>, HeadlessBackend) {
        let mut backend = HeadlessBackend::new();
        let (sink, _rx) = ChannelEventSink::new();
        let observer = MeshObserver::builder()
            .with_profile(profile)
            .with_system(Arc::new(sink))
            .build(&mut backend)
            .unwrap();
        (Arc::new(ObserverService::new(Arc::new(observer))), backend)
    }

    fn fast_profile() -> ObserverProfile {
        ObserverProfile {
            update_interval_secs: 0.01,
            initial_pool_size: 2,
            low_water_mark: 1,
            replenish_batch: 4,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn shutdown_signal_works() {
        let (svc, _backend) = service(fast_profile());
        let mut rx = svc.shutdown_rx();
        assert!(!*rx.borrow());

        svc.trigger_shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn run_tears_down_and_returns_backend() {
        let (svc, backend) = service(fast_profile());
        let handle = {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move { svc.run(backend).await })
        };

        svc.trigger_shutdown();
        let backend = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(backend.live(), 0);
        assert_eq!(svc.observer().status(), ObserverStatus::Disabled);
    }

    #[tokio::test]
    async fn ticks_unblock_starved_observations() {
        let (svc, backend) = service(fast_profile());
        let handle = {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move { svc.run(backend).await })
        };

        let observer = Arc::clone(svc.observer());
        let outcome = tokio::time::timeout(Duration::from_secs(5), async {
            let mut outcomes = Vec::new();
            for i in 0..5u32 {
                let tri = MeshPayload::new(vec![[0.0; 3]; 3], vec![0, 1, 2]);
                outcomes.push(observer.on_observed(i, tri).await);
            }
            outcomes
        })
        .await
        .unwrap();
        assert!(outcome.iter().all(|o| *o == Observation::Added));
        assert_eq!(observer.active(), 5);

        svc.request_display_mode(DisplayMode::None);
        tokio::time::timeout(Duration::from_secs(5), async {
            while observer.display_mode() != DisplayMode::None {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        svc.trigger_shutdown();
        let backend = handle.await.unwrap();
        assert_eq!(backend.live(), 0);
        assert_eq!(backend.destroyed(), backend.created());
    }
}
