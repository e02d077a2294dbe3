//! Collaborators the lifecycle depends on.
//!
//! The surrounding application implements these against the real REST API,
//! its settings storage and the OS tunnel provider. The crate only ever talks
//! to them through these traits.

use async_trait::async_trait;

use crate::lifecycle::keys::PublicKey;
use crate::lifecycle::types::{Account, Device, DeviceState, TunnelInfo, TunnelSettings};
use crate::Result;

#[async_trait]
pub trait AccountsProxy: Send + Sync {
    async fn create_account(&self) -> Result<Account>;

    async fn get_account_data(&self, account_number: &str) -> Result<Account>;
}

#[async_trait]
pub trait DevicesProxy: Send + Sync {
    async fn create_device(&self, account_number: &str, public_key: &PublicKey) -> Result<Device>;

    /// Returns `false` when the device was already gone.
    async fn delete_device(&self, account_number: &str, device_id: &str) -> Result<bool>;
}

/// Local persistence of account and tunnel settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn set_last_used_account(&self, account_number: Option<&str>) -> Result<()>;

    async fn set_settings(&self, settings: &TunnelSettings) -> Result<()>;

    async fn set_device_state(&self, state: &DeviceState) -> Result<()>;
}

#[async_trait]
pub trait TunnelManager: Send + Sync {
    /// Persistent tunnels with their current status.
    async fn tunnels(&self) -> Result<Vec<TunnelInfo>>;

    /// Tear down the installed VPN configuration, if any.
    async fn remove_configuration(&self) -> Result<()>;

    /// While disabled, status changes caused by the lifecycle itself are not
    /// forwarded to observers.
    fn set_status_notifications(&self, enabled: bool);
}
