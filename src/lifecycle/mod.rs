//! Account lifecycle: logging in, creating an account and logging out.

pub mod keys;
pub mod orchestrator;
pub mod services;
pub mod types;

pub use keys::{KeyGenerator, PrivateKey, PublicKey, X25519KeyGenerator};
pub use orchestrator::{AccountLifecycle, LifecycleResult};
pub use services::{AccountsProxy, DevicesProxy, SettingsStore, TunnelManager};
pub use types::{
    Account, Device, DeviceState, DnsBlockingOptions, ObfuscationMode, SetAccountAction,
    StoredAccount, StoredDevice, TunnelInfo, TunnelSettings, TunnelStatus,
};
