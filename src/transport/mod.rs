//! Transport selection for API requests.

pub mod relays;
pub mod selector;

pub use relays::{select_bridge, BridgeRelay, RelayCache, RelayList, ShadowsocksConfig};
pub use selector::{select_transport, should_bypass, Transport, TransportProvider};
