//! Host identity resolution.
//!
//! Every event carries a stable per-machine identifier derived from the first
//! non-loopback hardware address. The identifier doubles as the Kafka
//! partition key and the foreign key for everything that host writes, so
//! failing to resolve it is fatal to startup rather than something to retry.

use crate::event::HostInfo;
use chrono::Utc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostIdentityError {
    #[error("No network interface with a usable hardware address")]
    IdentityUnavailable,

    #[error("Failed to enumerate network interfaces: {0}")]
    Lookup(String),
}

/// Resolve this machine's identity.
///
/// The id is the MAC address lowercased with colons stripped, which makes
/// repeated registration of the same host idempotent.
pub fn resolve_host() -> Result<HostInfo, HostIdentityError> {
    let mac = mac_address::get_mac_address()
        .map_err(|e| HostIdentityError::Lookup(e.to_string()))?
        .filter(|mac| mac.bytes() != [0u8; 6])
        .ok_or(HostIdentityError::IdentityUnavailable)?;

    let mac_address = mac.to_string().to_lowercase();
    let id = mac_address.replace(':', "");

    Ok(HostInfo {
        id,
        mac_address,
        hostname: sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()),
        platform: std::env::consts::OS.to_string(),
        last_seen: Utc::now(),
    })
}
