//! Sync scheduler - turns time, user requests and connectivity into sync triggers
//!
//! The [`SyncScheduler`] does not sync by itself. It decides *when* a pass
//! should run and hands a [`SyncTrigger`] to the caller, which runs the pass
//! against whatever session is active at that moment.
//!
//! ## Flow
//!
//! ```text
//! poll timer ───────────┐
//! SchedulerHandle ──────┼──→ SyncScheduler ──→ on_trigger(SyncTrigger)
//! network probe (edge) ─┘          │
//!                          CancellationToken
//! ```
//!
//! Periodic passes are skipped while offline. A manual request bypasses
//! that check; the pass itself reports the failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use finos_core::ports::INetworkMonitor;

/// Default interval between connectivity probes
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// Why a sync pass should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// The periodic consistency check is due
    Periodic,
    /// The user asked for a sync now
    Manual,
    /// Connectivity came back after being lost
    NetworkRegained,
}

impl SyncTrigger {
    /// Manual passes cover every table, not only the stale ones
    pub fn is_forced(&self) -> bool {
        matches!(self, SyncTrigger::Manual)
    }
}

/// Cloneable handle for requesting an immediate sync
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Requests an immediate sync; repeated requests before the scheduler
    /// wakes up are coalesced
    pub fn request_sync(&self) {
        match self.tx.try_send(()) {
            Ok(()) => info!("User-initiated sync requested"),
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Sync already requested, coalescing");
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!("Sync scheduler is not running, request dropped");
            }
        }
    }
}

/// Schedules sync passes
pub struct SyncScheduler {
    request_rx: mpsc::Receiver<()>,
    network: Arc<dyn INetworkMonitor>,
    poll_interval: Duration,
    probe_interval: Duration,
}

impl SyncScheduler {
    /// Creates a new `SyncScheduler`
    ///
    /// # Arguments
    /// * `network` - Connectivity probe, polled every `probe_interval`
    /// * `poll_interval` - Time between periodic consistency passes
    /// * `probe_interval` - Time between connectivity probes
    pub fn new(
        network: Arc<dyn INetworkMonitor>,
        poll_interval: Duration,
        probe_interval: Duration,
    ) -> (Self, SchedulerHandle) {
        let (tx, request_rx) = mpsc::channel(1);

        info!(
            poll_secs = poll_interval.as_secs(),
            probe_secs = probe_interval.as_secs(),
            "Creating sync scheduler"
        );

        let scheduler = Self {
            request_rx,
            network,
            poll_interval,
            probe_interval,
        };
        (scheduler, SchedulerHandle { tx })
    }

    /// Main loop
    ///
    /// Runs until `cancel` fires, performing three concurrent operations via
    /// `tokio::select!`:
    ///
    /// 1. **Periodic**: every `poll_interval`, if online.
    /// 2. **Manual**: whenever a [`SchedulerHandle`] requests it.
    /// 3. **Network regained**: when a probe sees the network come back.
    ///
    /// `on_trigger` is awaited before the next trigger is considered, so
    /// passes never overlap.
    pub async fn run<F, Fut>(&mut self, cancel: CancellationToken, mut on_trigger: F)
    where
        F: FnMut(SyncTrigger) -> Fut,
        Fut: Future<Output = ()>,
    {
        info!("Sync scheduler starting");

        let mut poll_timer = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut probe_timer = interval(self.probe_interval);
        probe_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_online: Option<bool> = None;
        let mut requests_open = true;

        loop {
            let trigger = tokio::select! {
                _ = cancel.cancelled() => break,

                _ = poll_timer.tick() => {
                    if self.network.is_online().await {
                        Some(SyncTrigger::Periodic)
                    } else {
                        debug!("Offline, skipping periodic sync");
                        None
                    }
                }

                request = self.request_rx.recv(), if requests_open => {
                    match request {
                        Some(()) => Some(SyncTrigger::Manual),
                        None => {
                            debug!("All scheduler handles dropped");
                            requests_open = false;
                            None
                        }
                    }
                }

                _ = probe_timer.tick() => {
                    let online = self.network.is_online().await;
                    let regained = last_online == Some(false) && online;
                    if last_online != Some(online) {
                        info!(online, "Connectivity changed");
                    }
                    last_online = Some(online);
                    regained.then_some(SyncTrigger::NetworkRegained)
                }
            };

            if let Some(trigger) = trigger {
                debug!(trigger = ?trigger, "Sync triggered");
                on_trigger(trigger).await;
            }
        }

        info!("Sync scheduler stopped");
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct MockNetwork {
        online: AtomicBool,
    }

    impl MockNetwork {
        fn new(online: bool) -> Arc<Self> {
            Arc::new(Self {
                online: AtomicBool::new(online),
            })
        }
    }

    #[async_trait::async_trait]
    impl INetworkMonitor for MockNetwork {
        async fn is_online(&self) -> bool {
            self.online.load(Ordering::SeqCst)
        }
    }

    fn spawn_scheduler(
        mut scheduler: SyncScheduler,
        cancel: CancellationToken,
    ) -> (
        tokio::task::JoinHandle<()>,
        mpsc::UnboundedReceiver<SyncTrigger>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            scheduler
                .run(cancel, |trigger| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(trigger);
                    }
                })
                .await;
        });
        (task, rx)
    }

    #[test]
    fn test_only_manual_is_forced() {
        assert!(SyncTrigger::Manual.is_forced());
        assert!(!SyncTrigger::Periodic.is_forced());
        assert!(!SyncTrigger::NetworkRegained.is_forced());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_tick_fires_after_interval() {
        let (scheduler, _handle) = SyncScheduler::new(
            MockNetwork::new(true),
            Duration::from_secs(300),
            Duration::from_secs(10),
        );
        let cancel = CancellationToken::new();
        let (task, mut rx) = spawn_scheduler(scheduler, cancel.clone());

        let started = Instant::now();
        assert_eq!(rx.recv().await, Some(SyncTrigger::Periodic));
        assert!(started.elapsed() >= Duration::from_secs(300));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_request_triggers_immediately() {
        let (scheduler, handle) = SyncScheduler::new(
            MockNetwork::new(true),
            Duration::from_secs(300),
            Duration::from_secs(10),
        );
        handle.request_sync();
        handle.request_sync();

        let cancel = CancellationToken::new();
        let (task, mut rx) = spawn_scheduler(scheduler, cancel.clone());

        assert_eq!(rx.recv().await, Some(SyncTrigger::Manual));

        cancel.cancel();
        task.await.unwrap();
        assert!(rx.try_recv().is_err(), "coalesced requests fire once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_regained_triggers_sync() {
        let network = MockNetwork::new(false);
        let (scheduler, _handle) = SyncScheduler::new(
            network.clone(),
            Duration::from_secs(300),
            Duration::from_secs(10),
        );
        let cancel = CancellationToken::new();
        let (task, mut rx) = spawn_scheduler(scheduler, cancel.clone());

        tokio::time::sleep(Duration::from_secs(15)).await;
        network.online.store(true, Ordering::SeqCst);

        assert_eq!(rx.recv().await, Some(SyncTrigger::NetworkRegained));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sync_skipped_while_offline() {
        let (scheduler, _handle) = SyncScheduler::new(
            MockNetwork::new(false),
            Duration::from_secs(300),
            Duration::from_secs(10),
        );
        let cancel = CancellationToken::new();
        let (task, mut rx) = spawn_scheduler(scheduler, cancel.clone());

        let waited = tokio::time::timeout(Duration::from_secs(700), rx.recv()).await;
        assert!(waited.is_err(), "no trigger while offline");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_stops_scheduler() {
        let (scheduler, _handle) = SyncScheduler::new(
            MockNetwork::new(true),
            Duration::from_secs(300),
            Duration::from_secs(10),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (task, _rx) = spawn_scheduler(scheduler, cancel);
        task.await.unwrap();
    }
}
