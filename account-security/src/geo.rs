//! Geolocation collaborator.
//!
//! Resolution is best-effort: loopback and private ranges classify as
//! "Local Network", resolver failure degrades to "Unknown". Anomaly rules
//! treat "Unknown" as unresolved and skip location comparisons for it.

use async_trait::async_trait;
use std::net::IpAddr;

pub const LOCATION_UNKNOWN: &str = "Unknown";
pub const LOCATION_LOCAL: &str = "Local Network";

/// Pluggable IP-to-location lookup.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Resolve an IP address to a display label, e.g. "Berlin, DE".
    /// Returns None when the address cannot be resolved.
    async fn resolve(&self, ip_address: &str) -> Option<String>;
}

/// Resolve a session location with sentinel fallbacks. Never fails.
pub async fn resolve_location(resolver: &dyn GeoResolver, ip_address: &str) -> String {
    if is_private_address(ip_address) {
        return LOCATION_LOCAL.to_string();
    }
    match resolver.resolve(ip_address).await {
        Some(label) if !label.is_empty() => label,
        _ => {
            tracing::debug!(ip = %ip_address, "Geolocation lookup failed, using sentinel");
            LOCATION_UNKNOWN.to_string()
        }
    }
}

/// Whether the resolved label carries real location information.
pub fn is_resolved_location(location: &str) -> bool {
    !location.is_empty() && location != LOCATION_UNKNOWN
}

fn is_private_address(ip_address: &str) -> bool {
    match ip_address.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        Ok(IpAddr::V6(v6)) => v6.is_loopback(),
        // Unparseable addresses are not private; let the resolver decide.
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopResolver;

    #[async_trait]
    impl GeoResolver for NoopResolver {
        async fn resolve(&self, _ip_address: &str) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn test_private_ranges_classify_as_local_network() {
        let resolver = NoopResolver;
        assert_eq!(resolve_location(&resolver, "127.0.0.1").await, LOCATION_LOCAL);
        assert_eq!(resolve_location(&resolver, "10.1.2.3").await, LOCATION_LOCAL);
        assert_eq!(resolve_location(&resolver, "192.168.0.5").await, LOCATION_LOCAL);
    }

    #[tokio::test]
    async fn test_resolver_failure_degrades_to_unknown() {
        let resolver = NoopResolver;
        assert_eq!(
            resolve_location(&resolver, "203.0.113.10").await,
            LOCATION_UNKNOWN
        );
    }

    #[test]
    fn test_sentinel_resolution_semantics() {
        assert!(is_resolved_location("Berlin, DE"));
        assert!(is_resolved_location(LOCATION_LOCAL));
        assert!(!is_resolved_location(LOCATION_UNKNOWN));
        assert!(!is_resolved_location(""));
    }
}
