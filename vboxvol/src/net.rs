//! Host network identity.
//!
//! Collects the hardware addresses of the local interfaces so they can be
//! matched against the MACs VirtualBox reports for each machine's adapters.

use std::collections::BTreeSet;

use vboxvol_shared::errors::{VolumeError, VolumeResult};

/// Normalize a MAC address for comparison.
///
/// Separators (`:`, `-`, `.`) are stripped and hex digits upper-cased, so
/// `"aa:bb:cc:dd:ee:ff"` and `"AABBCCDDEEFF"` compare equal.
pub fn normalize_mac(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ':' | '-' | '.') && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Format raw hardware address bytes as `AA:BB:...`.
fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Normalized hardware addresses of the local host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAddresses {
    macs: BTreeSet<String>,
}

impl HostAddresses {
    /// Build from raw per-interface addresses.
    ///
    /// `None`, empty and all-zero addresses (interfaces without real hardware,
    /// such as loopback) contribute nothing.
    pub fn from_raw<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let macs = addresses
            .into_iter()
            .flatten()
            .map(|raw| normalize_mac(raw.as_ref()))
            .filter(|mac| !mac.is_empty() && mac.chars().any(|c| c != '0'))
            .collect();
        Self { macs }
    }

    /// Read the hardware addresses of every local interface.
    pub fn discover() -> VolumeResult<Self> {
        let interfaces = nix::ifaddrs::getifaddrs()
            .map_err(|e| VolumeError::Network(format!("Failed to list interfaces: {}", e)))?;

        // getifaddrs yields one entry per address family; only link-layer
        // entries carry a hardware address.
        let raw: Vec<Option<String>> = interfaces
            .map(|ifaddr| {
                let mac = ifaddr
                    .address
                    .as_ref()
                    .and_then(|addr| addr.as_link_addr())
                    .and_then(|link| link.addr())
                    .map(|bytes| format_mac(&bytes));
                if let Some(ref mac) = mac {
                    tracing::trace!(interface = %ifaddr.interface_name, mac = %mac, "Found interface");
                }
                mac
            })
            .collect();

        let host = Self::from_raw(raw);
        tracing::debug!(macs = ?host.macs, "Discovered host hardware addresses");
        Ok(host)
    }

    /// Whether `mac` (in any separator/case style) belongs to this host.
    ///
    /// An address that normalizes to the empty string never matches.
    pub fn contains(&self, mac: &str) -> bool {
        let normalized = normalize_mac(mac);
        !normalized.is_empty() && self.macs.contains(&normalized)
    }

    pub fn len(&self) -> usize {
        self.macs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.macs.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:ff"), "AABBCCDDEEFF");
        assert_eq!(normalize_mac("AA-BB-CC-DD-EE-FF"), "AABBCCDDEEFF");
        assert_eq!(normalize_mac("aabb.ccdd.eeff"), "AABBCCDDEEFF");
        assert_eq!(normalize_mac("080027AbCdEf"), "080027ABCDEF");
        assert_eq!(normalize_mac(""), "");
    }

    #[test]
    fn test_format_mac() {
        assert_eq!(
            format_mac(&[0x08, 0x00, 0x27, 0xab, 0xcd, 0xef]),
            "08:00:27:AB:CD:EF"
        );
    }

    #[test]
    fn test_contains_is_case_and_separator_insensitive() {
        let host = HostAddresses::from_raw([Some("AA:BB:CC:DD:EE:FF")]);
        assert!(host.contains("aabbccddeeff"));
        assert!(host.contains("AA-BB-CC-DD-EE-FF"));
        assert!(!host.contains("AABBCCDDEE00"));
    }

    #[test]
    fn test_interfaces_without_address_never_match() {
        let host = HostAddresses::from_raw([None, Some(""), Some("00:00:00:00:00:00")]);
        assert!(host.is_empty());
        assert!(!host.contains(""));
        assert!(!host.contains(":::::"));
    }

    #[test]
    fn test_duplicate_addresses_collapse() {
        let host = HostAddresses::from_raw([
            Some("08:00:27:00:00:01"),
            Some("080027000001"),
            Some("08:00:27:00:00:02"),
        ]);
        assert_eq!(host.len(), 2);
        assert_eq!(
            host.iter().collect::<Vec<_>>(),
            vec!["080027000001", "080027000002"]
        );
    }

    #[test]
    fn test_discover_does_not_fail() {
        // Hosts without link-layer entries (some containers) yield an empty set.
        let host = HostAddresses::discover().expect("discover interfaces");
        assert!(!host.contains(""));
    }
}
