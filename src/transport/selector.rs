//! Per-request routing of API traffic.
//!
//! While a tunnel is coming up, API requests are sent through it. Once it is
//! connected, they only go through it when the device has been revoked and
//! still needs to reach the API. Everything else goes out directly, or
//! through a bridge relay when obfuscation is requested.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Error;
use crate::lifecycle::services::TunnelManager;
use crate::lifecycle::types::{DeviceState, TunnelInfo, TunnelStatus};
use crate::state::{AppState, StateStore};
use crate::transport::relays::{select_bridge, BridgeRelay, RelayCache, ShadowsocksConfig};
use crate::{olog_debug, olog_warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Default route, no obfuscation.
    Direct,
    /// Through a shadowsocks bridge relay.
    Bridge {
        relay: BridgeRelay,
        config: ShadowsocksConfig,
    },
    /// Through the VPN tunnel itself.
    Tunnel { tunnel: String, obfuscated: bool },
}

impl Transport {
    pub fn is_tunnel(&self) -> bool {
        matches!(self, Transport::Tunnel { .. })
    }
}

/// Whether API traffic must go through a tunnel in `status`.
pub fn should_bypass(status: TunnelStatus, state: &AppState) -> bool {
    match status {
        TunnelStatus::Connected => {
            state.configuration_loaded && state.device_state == DeviceState::Revoked
        }
        TunnelStatus::Connecting | TunnelStatus::Reasserting => true,
        TunnelStatus::Disconnected | TunnelStatus::Disconnecting => false,
    }
}

/// Decide how one API request is sent.
///
/// `None` means no safe route exists and the request must not be sent.
pub fn select_transport(
    use_bridge: bool,
    tunnels: &[TunnelInfo],
    state: &AppState,
    relays: &dyn RelayCache,
) -> Option<Transport> {
    let active = tunnels.iter().find(|tunnel| tunnel.status.is_active());
    if let Some(tunnel) = active {
        if should_bypass(tunnel.status, state) {
            return Some(Transport::Tunnel {
                tunnel: tunnel.identifier.clone(),
                obfuscated: use_bridge,
            });
        }
    }

    if !use_bridge {
        return Some(Transport::Direct);
    }

    match bridge_transport(relays) {
        Ok(transport) => Some(transport),
        Err(err) => {
            olog_warn!("TransportProvider: {}", err);
            None
        }
    }
}

fn bridge_transport(relays: &dyn RelayCache) -> Result<Transport, Error> {
    let relay_list = relays.cached_relays().map_err(|err| {
        Error::TransportUnavailable(format!("no cached relay list: {}", err))
    })?;

    let (relay, config) = select_bridge(&relay_list, &mut rand::thread_rng())
        .ok_or_else(|| Error::TransportUnavailable("no eligible bridge relay".to_string()))?;

    olog_debug!("TransportProvider: using bridge {}", relay.hostname);
    Ok(Transport::Bridge { relay, config })
}

/// Builds a transport for each outgoing API request.
pub struct TransportProvider {
    tunnels: Arc<dyn TunnelManager>,
    relays: Arc<dyn RelayCache>,
    state: StateStore,
    use_bridges: bool,
}

impl TransportProvider {
    pub fn new(tunnels: Arc<dyn TunnelManager>, relays: Arc<dyn RelayCache>, state: StateStore) -> Self {
        Self {
            tunnels,
            relays,
            state,
            use_bridges: false,
        }
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.use_bridges = config.transport.use_bridges_by_default;
        self
    }

    pub fn set_use_bridges(&mut self, use_bridges: bool) {
        self.use_bridges = use_bridges;
    }

    /// Transport for the next request using the configured bridge preference.
    pub async fn make_transport(&self) -> Option<Transport> {
        self.make_transport_with(self.use_bridges).await
    }

    pub async fn make_transport_with(&self, use_bridge: bool) -> Option<Transport> {
        let tunnels = match self.tunnels.tunnels().await {
            Ok(tunnels) => tunnels,
            Err(err) => {
                olog_warn!("TransportProvider: failed to list tunnels: {}", err);
                Vec::new()
            }
        };
        let snapshot = self.state.snapshot();
        select_transport(use_bridge, &tunnels, &snapshot, self.relays.as_ref())
    }
}

impl std::fmt::Debug for TransportProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportProvider")
            .field("use_bridges", &self.use_bridges)
            .finish()
    }
}
