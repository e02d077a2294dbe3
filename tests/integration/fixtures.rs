//! Test fixtures for integration tests.
//!
//! Provides in-memory collaborators for:
//! - The account and device API, with failure injection and call counters
//! - Settings persistence
//! - The tunnel manager
//! - The relay cache

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use vpn_orchestrator::lifecycle::{
    Account, AccountLifecycle, AccountsProxy, Device, DeviceState, DevicesProxy, PrivateKey,
    PublicKey, SettingsStore, StoredAccount, StoredDevice, TunnelInfo, TunnelManager,
    TunnelSettings,
};
use vpn_orchestrator::retry::RetryStrategy;
use vpn_orchestrator::state::StateStore;
use vpn_orchestrator::transport::{BridgeRelay, RelayCache, RelayList, ShadowsocksConfig};
use vpn_orchestrator::{Error, Result};

pub const EXISTING_ACCOUNT: &str = "1234123412341234";
pub const NEW_ACCOUNT: &str = "9876987698769876";

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn account(number: &str) -> Account {
    Account {
        id: format!("id-{}", number),
        number: number.to_string(),
        expiry: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// Fake account and device API.
#[derive(Default)]
pub struct FakeApi {
    pub fail_create_account: Mutex<Option<Error>>,
    pub fail_get_account: Mutex<Option<Error>>,
    pub fail_create_device: Mutex<Option<Error>>,
    pub fail_delete_device: Mutex<Option<Error>>,
    /// Number of leading `get_account_data` calls that fail transiently.
    pub transient_get_account_failures: AtomicUsize,

    pub create_account_calls: AtomicUsize,
    pub get_account_calls: AtomicUsize,
    pub create_device_calls: AtomicUsize,
    pub delete_device_calls: AtomicUsize,

    /// When set, `get_account_data` waits until notified.
    pub hold_get_account: AtomicBool,
    pub release: Notify,
    pub entered: Notify,

    pub registered_keys: Mutex<Vec<PublicKey>>,
    pub deleted_devices: Mutex<Vec<(String, String)>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountsProxy for FakeApi {
    async fn create_account(&self) -> Result<Account> {
        self.create_account_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.fail_create_account).clone() {
            return Err(err);
        }
        Ok(account(NEW_ACCOUNT))
    }

    async fn get_account_data(&self, account_number: &str) -> Result<Account> {
        self.get_account_calls.fetch_add(1, Ordering::SeqCst);

        if self.hold_get_account.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        let remaining = self.transient_get_account_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_get_account_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(Error::transient("gateway timeout"));
        }

        if let Some(err) = lock(&self.fail_get_account).clone() {
            return Err(err);
        }
        Ok(account(account_number))
    }
}

#[async_trait]
impl DevicesProxy for FakeApi {
    async fn create_device(&self, account_number: &str, public_key: &PublicKey) -> Result<Device> {
        self.create_device_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.fail_create_device).clone() {
            return Err(err);
        }
        lock(&self.registered_keys).push(*public_key);
        Ok(Device {
            id: format!("device-for-{}", account_number),
            name: "quick otter".to_string(),
            public_key: *public_key,
            created: Utc::now(),
        })
    }

    async fn delete_device(&self, account_number: &str, device_id: &str) -> Result<bool> {
        self.delete_device_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.fail_delete_device).clone() {
            return Err(err);
        }
        lock(&self.deleted_devices).push((account_number.to_string(), device_id.to_string()));
        Ok(true)
    }
}

/// Settings persistence backed by memory.
#[derive(Default)]
pub struct MemorySettings {
    pub last_used_account: Mutex<Option<String>>,
    pub settings: Mutex<Option<TunnelSettings>>,
    pub device_states: Mutex<Vec<DeviceState>>,
    pub fail_device_state: AtomicBool,
}

impl MemorySettings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last_device_state(&self) -> Option<DeviceState> {
        lock(&self.device_states).last().cloned()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_last_used_account(&self, account_number: Option<&str>) -> Result<()> {
        *lock(&self.last_used_account) = account_number.map(str::to_string);
        Ok(())
    }

    async fn set_settings(&self, settings: &TunnelSettings) -> Result<()> {
        *lock(&self.settings) = Some(settings.clone());
        Ok(())
    }

    async fn set_device_state(&self, state: &DeviceState) -> Result<()> {
        if self.fail_device_state.load(Ordering::SeqCst) {
            return Err(Error::Persistence("disk full".to_string()));
        }
        lock(&self.device_states).push(state.clone());
        Ok(())
    }
}

/// What the fake tunnel manager was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelCall {
    Notifications(bool),
    RemoveConfiguration,
}

#[derive(Default)]
pub struct FakeTunnelManager {
    pub tunnels: Mutex<Vec<TunnelInfo>>,
    pub fail_remove: AtomicBool,
    pub fail_list: AtomicBool,
    pub calls: Mutex<Vec<TunnelCall>>,
}

impl FakeTunnelManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_tunnels(tunnels: Vec<TunnelInfo>) -> Arc<Self> {
        let manager = Self::default();
        *lock(&manager.tunnels) = tunnels;
        Arc::new(manager)
    }

    pub fn calls(&self) -> Vec<TunnelCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl TunnelManager for FakeTunnelManager {
    async fn tunnels(&self) -> Result<Vec<TunnelInfo>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::TunnelConfiguration("tunnel provider unavailable".to_string()));
        }
        Ok(lock(&self.tunnels).clone())
    }

    async fn remove_configuration(&self) -> Result<()> {
        lock(&self.calls).push(TunnelCall::RemoveConfiguration);
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Error::TunnelConfiguration("permission denied".to_string()));
        }
        Ok(())
    }

    fn set_status_notifications(&self, enabled: bool) {
        lock(&self.calls).push(TunnelCall::Notifications(enabled));
    }
}

/// Relay cache returning a fixed list, or an error when empty-handed.
pub struct StaticRelayCache(pub Option<RelayList>);

impl RelayCache for StaticRelayCache {
    fn cached_relays(&self) -> Result<RelayList> {
        self.0
            .clone()
            .ok_or_else(|| Error::Persistence("relay cache not found".to_string()))
    }
}

pub fn bridge_relays() -> RelayList {
    RelayList {
        bridges: vec![BridgeRelay {
            hostname: "se-sto-br-001".to_string(),
            ipv4_addr: Ipv4Addr::new(185, 65, 134, 117),
            location: "se-sto".to_string(),
            active: true,
        }],
        shadowsocks: vec![ShadowsocksConfig {
            port: 443,
            cipher: "aes-256-gcm".to_string(),
            password: "mullvad".to_string(),
        }],
    }
}

/// Device state of a device that is already logged in.
pub fn logged_in_state() -> DeviceState {
    let private_key = PrivateKey::from_bytes([9; 32]);
    DeviceState::LoggedIn(
        StoredAccount {
            identifier: "id-old".to_string(),
            number: "5555666677778888".to_string(),
            expiry: Utc.with_ymd_and_hms(2029, 6, 1, 0, 0, 0).unwrap(),
        },
        StoredDevice {
            identifier: "old-device".to_string(),
            name: "sleepy panda".to_string(),
            creation_date: Utc::now(),
            public_key: private_key.public_key(),
            private_key,
            key_created: Utc::now(),
        },
    )
}

/// Retry quickly so transient failures do not slow the suite down.
pub fn fast_retry() -> RetryStrategy {
    RetryStrategy {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2,
    }
}

/// Lifecycle wired to in-memory collaborators.
pub struct Harness {
    pub api: Arc<FakeApi>,
    pub settings: Arc<MemorySettings>,
    pub tunnels: Arc<FakeTunnelManager>,
    pub state: StateStore,
    pub lifecycle: AccountLifecycle,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_state(StateStore::new())
    }

    pub fn logged_in() -> Self {
        let state = StateStore::new();
        state.set_device_state(logged_in_state());
        state.set_configuration_loaded(true);
        Self::with_state(state)
    }

    pub fn with_state(state: StateStore) -> Self {
        let api = FakeApi::new();
        let settings = MemorySettings::new();
        let tunnels = FakeTunnelManager::new();
        let lifecycle = AccountLifecycle::new(
            api.clone(),
            api.clone(),
            settings.clone(),
            tunnels.clone(),
            state.clone(),
        )
        .with_retry_strategy(fast_retry());

        Self {
            api,
            settings,
            tunnels,
            state,
            lifecycle,
        }
    }
}
