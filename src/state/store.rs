//! StateStore - the single owner of device and tunnel state.

use std::sync::Arc;

use tokio::sync::watch;

use crate::lifecycle::types::{DeviceState, TunnelStatus};
use crate::olog_trace;

/// Everything the lifecycle writes and the transport selector reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub device_state: DeviceState,
    pub tunnel_status: TunnelStatus,
    /// Whether a VPN configuration is installed and loaded.
    pub configuration_loaded: bool,
}

/// Guarded store of `AppState`.
///
/// Writers go through `update`, which applies the change under the channel's
/// lock and notifies subscribers. Readers take a cloned snapshot and make
/// their decision on that copy.
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<AppState>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_state(AppState::default())
    }

    pub fn with_state(state: AppState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> AppState {
        self.tx.borrow().clone()
    }

    pub fn update(&self, apply: impl FnOnce(&mut AppState)) {
        self.tx.send_modify(apply);
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }

    pub fn device_state(&self) -> DeviceState {
        self.tx.borrow().device_state.clone()
    }

    pub fn set_device_state(&self, device_state: DeviceState) {
        olog_trace!("StateStore: device state -> {}", device_state);
        self.update(|state| state.device_state = device_state);
    }

    pub fn tunnel_status(&self) -> TunnelStatus {
        self.tx.borrow().tunnel_status
    }

    pub fn set_tunnel_status(&self, status: TunnelStatus) {
        olog_trace!("StateStore: tunnel status -> {}", status);
        self.update(|state| state.tunnel_status = status);
    }

    pub fn set_configuration_loaded(&self, loaded: bool) {
        self.update(|state| state.configuration_loaded = loaded);
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
