//! Transport selection integration tests.
//!
//! These tests verify that `TransportProvider` routes API requests based on
//! the live tunnel list and the shared state store.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use vpn_orchestrator::config::{Config, TransportConfig};
use vpn_orchestrator::lifecycle::{DeviceState, SetAccountAction, TunnelInfo, TunnelStatus};
use vpn_orchestrator::state::StateStore;
use vpn_orchestrator::transport::{RelayList, Transport, TransportProvider};

use crate::fixtures::{bridge_relays, FakeTunnelManager, Harness, StaticRelayCache};

fn provider(status: TunnelStatus, state: &StateStore, relays: Option<RelayList>) -> TransportProvider {
    TransportProvider::new(
        FakeTunnelManager::with_tunnels(vec![TunnelInfo::new("mullvad", status)]),
        Arc::new(StaticRelayCache(relays)),
        state.clone(),
    )
}

fn revoked_and_loaded() -> StateStore {
    let state = StateStore::new();
    state.set_device_state(DeviceState::Revoked);
    state.set_configuration_loaded(true);
    state
}

fn tunnel(obfuscated: bool) -> Option<Transport> {
    Some(Transport::Tunnel {
        tunnel: "mullvad".to_string(),
        obfuscated,
    })
}

/// Test: Connecting tunnel
/// Given a tunnel that is connecting
/// When a transport is requested, with or without a bridge
/// Then the request rides the tunnel
#[tokio::test]
async fn test_connecting_uses_tunnel() {
    let state = StateStore::new();
    let provider = provider(TunnelStatus::Connecting, &state, None);

    assert_eq!(provider.make_transport_with(false).await, tunnel(false));
    assert_eq!(provider.make_transport_with(true).await, tunnel(true));
}

/// Test: Connected and revoked
/// Given a connected tunnel, a loaded configuration and a revoked device
/// When a transport is requested
/// Then the request rides the tunnel
#[tokio::test]
async fn test_connected_revoked_uses_tunnel() {
    let state = revoked_and_loaded();
    let provider = provider(TunnelStatus::Connected, &state, None);

    assert_eq!(provider.make_transport().await, tunnel(false));
}

/// Test: Connected and healthy
/// Given a connected tunnel and a device that is not revoked
/// When a transport is requested
/// Then the request goes direct, or through a bridge when asked
#[tokio::test]
async fn test_connected_not_revoked_exits_normally() {
    let state = StateStore::new();
    state.set_configuration_loaded(true);
    let provider = provider(TunnelStatus::Connected, &state, Some(bridge_relays()));

    assert_eq!(provider.make_transport_with(false).await, Some(Transport::Direct));
    assert!(matches!(
        provider.make_transport_with(true).await,
        Some(Transport::Bridge { ref relay, ref config })
            if relay.hostname == "se-sto-br-001" && config.port == 443
    ));
}

/// Test: Disconnected
/// Given a disconnected tunnel and a revoked device
/// When a transport is requested
/// Then the request goes direct
#[tokio::test]
async fn test_disconnected_goes_direct() {
    let state = revoked_and_loaded();
    let provider = provider(TunnelStatus::Disconnected, &state, None);

    assert_eq!(provider.make_transport().await, Some(Transport::Direct));
}

/// Test: No bridge available
/// Given an empty relay list, or none cached at all
/// When a bridge transport is requested
/// Then no transport is returned
#[tokio::test]
async fn test_bridge_fails_closed() {
    let state = StateStore::new();

    let empty = provider(TunnelStatus::Disconnected, &state, Some(RelayList::default()));
    assert_eq!(empty.make_transport_with(true).await, None);

    let missing = provider(TunnelStatus::Disconnected, &state, None);
    assert_eq!(missing.make_transport_with(true).await, None);
}

/// Test: Bridge preference from configuration
/// Given a configuration that prefers bridges
/// When a transport is requested without an explicit preference
/// Then a bridge is used
#[tokio::test]
async fn test_bridge_preference_from_config() {
    let state = StateStore::new();
    let config = Config {
        transport: TransportConfig {
            use_bridges_by_default: true,
        },
        ..Config::default()
    };
    let provider =
        provider(TunnelStatus::Disconnected, &state, Some(bridge_relays())).with_config(&config);

    assert!(matches!(
        provider.make_transport().await,
        Some(Transport::Bridge { .. })
    ));
}

/// Test: Tunnel list unavailable
/// Given a tunnel manager that cannot list tunnels
/// When a transport is requested
/// Then the selector treats it as having no active tunnel
#[tokio::test]
async fn test_tunnel_list_failure_is_tolerated() {
    let state = revoked_and_loaded();
    let tunnels = FakeTunnelManager::with_tunnels(vec![TunnelInfo::new(
        "mullvad",
        TunnelStatus::Connecting,
    )]);
    tunnels.fail_list.store(true, Ordering::SeqCst);
    let provider = TransportProvider::new(tunnels, Arc::new(StaticRelayCache(None)), state);

    assert_eq!(provider.make_transport().await, Some(Transport::Direct));
}

/// Test: Selector follows lifecycle changes
/// Given a connected tunnel and a revoked device
/// When the account is unset
/// Then subsequent requests stop bypassing through the tunnel
#[tokio::test]
async fn test_selector_sees_lifecycle_updates() {
    let harness = Harness::new();
    harness.state.set_device_state(DeviceState::Revoked);
    harness.state.set_configuration_loaded(true);
    let provider = provider(TunnelStatus::Connected, &harness.state, None);

    assert_eq!(provider.make_transport().await, tunnel(false));

    harness
        .lifecycle
        .set_account(SetAccountAction::Unset, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(provider.make_transport().await, Some(Transport::Direct));
}
