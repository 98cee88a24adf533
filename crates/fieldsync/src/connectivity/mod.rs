//! Reachability state machine over `{Checking, Online, Offline}`
//!
//! A probe that succeeds while not online moves to `Online` and emits
//! `Reconnected`; a probe that fails (or times out) while online or checking
//! moves to `Offline` and emits `Disconnected`. Probes that land in the state
//! the monitor is already in emit nothing.

use fieldsync_api::{ConnectivityEvent, ConnectivityState, EnvironmentSignal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::sync::RemoteAuthority;

pub struct ConnectivityMonitor {
    remote: Arc<dyn RemoteAuthority>,
    probe_interval: Duration,
    probe_timeout: Duration,
    state_tx: watch::Sender<ConnectivityState>,
    event_tx: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    pub fn new(
        remote: Arc<dyn RemoteAuthority>,
        probe_interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectivityState::Checking);
        let (event_tx, _) = broadcast::channel(64);
        Self {
            remote,
            probe_interval,
            probe_timeout,
            state_tx,
            event_tx,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state_tx.borrow()
    }

    pub fn badge_label(&self) -> &'static str {
        self.state().badge_label()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectivityState> {
        self.state_tx.subscribe()
    }

    /// Current state followed by every change, for the connectivity badge
    pub fn state_stream(&self) -> WatchStream<ConnectivityState> {
        WatchStream::new(self.state_tx.subscribe())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.event_tx.subscribe()
    }

    /// Probe schedule: first tick fires immediately, then every interval.
    /// Ticks missed while a probe or sync was running are not bunched up.
    pub fn ticker(&self) -> Interval {
        let mut interval = tokio::time::interval(self.probe_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    /// Feed one probe result through the state machine
    pub fn apply_probe_result(&self, reachable: bool) -> Option<ConnectivityEvent> {
        let current = self.state();
        let (next, event) = match (current, reachable) {
            (ConnectivityState::Online, true) | (ConnectivityState::Offline, false) => {
                return None;
            }
            (_, true) => (ConnectivityState::Online, ConnectivityEvent::Reconnected),
            (_, false) => (ConnectivityState::Offline, ConnectivityEvent::Disconnected),
        };

        self.state_tx.send_replace(next);
        // No subscribers is fine
        let _ = self.event_tx.send(event);
        info!("[ConnectivityMonitor] {} -> {} ({:?})", current, next, event);
        Some(event)
    }

    /// Run one bounded probe against the remote.
    ///
    /// When the timeout fires first the in-flight request is dropped, so a
    /// late answer can never be applied.
    #[tracing::instrument(name = "connectivity.probe", skip(self))]
    pub async fn probe_once(&self) -> Option<ConnectivityEvent> {
        let reachable = match tokio::time::timeout(self.probe_timeout, self.remote.probe()).await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!("[ConnectivityMonitor] Probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!(
                    "[ConnectivityMonitor] Probe timed out after {:?}, abandoning it",
                    self.probe_timeout
                );
                false
            }
        };
        self.apply_probe_result(reachable)
    }

    /// React to a host network notification.
    ///
    /// `NetworkDown` forces `Offline` right away. `NetworkUp` changes nothing
    /// here; only a successful probe may bring the monitor online.
    pub fn handle_signal(&self, signal: EnvironmentSignal) -> Option<ConnectivityEvent> {
        match signal {
            EnvironmentSignal::NetworkDown => {
                debug!("[ConnectivityMonitor] Environment reports network down");
                self.apply_probe_result(false)
            }
            EnvironmentSignal::NetworkUp => None,
        }
    }
}
