//! Bridge relays used to obfuscate API traffic.

use std::net::Ipv4Addr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowsocksConfig {
    pub port: u16,
    pub cipher: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRelay {
    pub hostname: String,
    pub ipv4_addr: Ipv4Addr,
    pub location: String,
    pub active: bool,
}

/// Bridge part of the relay list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayList {
    pub bridges: Vec<BridgeRelay>,
    pub shadowsocks: Vec<ShadowsocksConfig>,
}

impl RelayList {
    pub fn active_bridges(&self) -> Vec<&BridgeRelay> {
        self.bridges.iter().filter(|relay| relay.active).collect()
    }
}

/// Locally cached relay list.
pub trait RelayCache: Send + Sync {
    fn cached_relays(&self) -> Result<RelayList>;
}

/// Pick one active bridge relay and one shadowsocks configuration at random.
///
/// Returns `None` when the list has no active bridge or no configuration.
pub fn select_bridge<R>(relays: &RelayList, rng: &mut R) -> Option<(BridgeRelay, ShadowsocksConfig)>
where
    R: Rng + ?Sized,
{
    let relay = relays.active_bridges().choose(rng).map(|relay| (*relay).clone())?;
    let config = relays.shadowsocks.choose(rng)?.clone();
    Some((relay, config))
}
