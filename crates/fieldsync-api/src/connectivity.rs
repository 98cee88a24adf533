//! Reachability signal shared between the monitor, the sync loop and the UI badge.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tri-state reachability of the remote authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectivityState {
    /// No probe has resolved yet
    #[default]
    Checking,
    Online,
    Offline,
}

impl ConnectivityState {
    /// Text shown on the connectivity badge
    pub fn badge_label(&self) -> &'static str {
        match self {
            ConnectivityState::Checking => "Checking…",
            ConnectivityState::Online => "Online (Synced)",
            ConnectivityState::Offline => "Offline Mode",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectivityState::Checking => "checking",
            ConnectivityState::Online => "online",
            ConnectivityState::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Emitted once per state transition, never once per probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityEvent {
    Reconnected,
    Disconnected,
}

/// Hints from the host environment (OS network notifications and the like).
///
/// `NetworkDown` may force the monitor offline; `NetworkUp` only asks for an
/// early probe and never flips the state to online on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentSignal {
    NetworkDown,
    NetworkUp,
}
