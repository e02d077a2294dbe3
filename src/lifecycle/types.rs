//! Account, device and tunnel types shared by the lifecycle and transport code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::keys::{PrivateKey, PublicKey};

/// Account as returned by the account service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub number: String,
    pub expiry: DateTime<Utc>,
}

/// Device record as returned by the device service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub public_key: PublicKey,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub identifier: String,
    pub number: String,
    pub expiry: DateTime<Utc>,
}

impl From<Account> for StoredAccount {
    fn from(account: Account) -> Self {
        Self {
            identifier: account.id,
            number: account.number,
            expiry: account.expiry,
        }
    }
}

/// The device identity kept locally, including its private key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDevice {
    pub identifier: String,
    pub name: String,
    pub creation_date: DateTime<Utc>,
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
    pub key_created: DateTime<Utc>,
}

impl StoredDevice {
    pub fn new(device: Device, private_key: PrivateKey, key_created: DateTime<Utc>) -> Self {
        Self {
            identifier: device.id,
            name: device.name,
            creation_date: device.created,
            private_key,
            public_key: device.public_key,
            key_created,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    LoggedIn(StoredAccount, StoredDevice),
    #[default]
    LoggedOut,
    Revoked,
}

impl DeviceState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, DeviceState::LoggedIn(..))
    }

    pub fn account(&self) -> Option<&StoredAccount> {
        match self {
            DeviceState::LoggedIn(account, _) => Some(account),
            _ => None,
        }
    }

    pub fn device(&self) -> Option<&StoredDevice> {
        match self {
            DeviceState::LoggedIn(_, device) => Some(device),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceState::LoggedIn(..) => write!(f, "logged in"),
            DeviceState::LoggedOut => write!(f, "logged out"),
            DeviceState::Revoked => write!(f, "revoked"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reasserting,
    Disconnecting,
}

impl TunnelStatus {
    /// Statuses in which a tunnel counts as active for routing decisions.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TunnelStatus::Connecting | TunnelStatus::Reasserting | TunnelStatus::Connected
        )
    }
}

impl std::fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TunnelStatus::Disconnected => "disconnected",
            TunnelStatus::Connecting => "connecting",
            TunnelStatus::Connected => "connected",
            TunnelStatus::Reasserting => "reasserting",
            TunnelStatus::Disconnecting => "disconnecting",
        };
        write!(f, "{}", s)
    }
}

/// A persistent tunnel known to the tunnel manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelInfo {
    pub identifier: String,
    pub status: TunnelStatus,
}

impl TunnelInfo {
    pub fn new(identifier: impl Into<String>, status: TunnelStatus) -> Self {
        Self {
            identifier: identifier.into(),
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObfuscationMode {
    #[default]
    Automatic,
    Off,
    Udp2Tcp,
    Shadowsocks,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsBlockingOptions {
    pub ads: bool,
    pub trackers: bool,
    pub malware: bool,
}

/// User-facing tunnel settings. A successful login writes `TunnelSettings::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelSettings {
    /// Relay location constraint; `None` means any location.
    pub relay_location: Option<String>,
    pub obfuscation: ObfuscationMode,
    pub dns_blocking: DnsBlockingOptions,
    pub quantum_resistant: bool,
}

/// What the caller wants the current account to become.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetAccountAction {
    /// Create a new account.
    New,
    /// Log in to an existing account by number.
    Existing(String),
    /// Log out.
    Unset,
}

impl std::fmt::Display for SetAccountAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetAccountAction::New => write!(f, "new"),
            SetAccountAction::Existing(_) => write!(f, "existing"),
            SetAccountAction::Unset => write!(f, "unset"),
        }
    }
}
