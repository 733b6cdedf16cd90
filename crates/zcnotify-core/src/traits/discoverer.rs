// # Discoverer Trait
//
// Defines the interface for browsing multicast service advertisements.
//
// ## Implementations
//
// - mDNS / DNS-SD: `zcnotify-discovery-mdns` crate
//
// ## Usage
//
// ```rust,ignore
// use zcnotify_core::Discoverer;
// use std::time::Duration;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let discoverer = /* Discoverer implementation */;
//     let query = BrowseQuery::workstations();
//
//     // Collect everything that answers within ten seconds
//     let snapshot = discoverer.browse(&query, Duration::from_secs(10)).await?;
//     for entry in snapshot {
//         println!("{} on {}:{}", entry.instance_key, entry.host_name, entry.port);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::ServiceSnapshot;

/// Service type browsed when none is configured
pub const DEFAULT_SERVICE: &str = "_workstation._tcp";

/// Domain browsed when none is configured
pub const DEFAULT_DOMAIN: &str = "local";

/// Which address families to query and report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
    Both,
}

impl AddressFamily {
    pub fn includes_v4(&self) -> bool {
        matches!(self, AddressFamily::V4 | AddressFamily::Both)
    }

    pub fn includes_v6(&self) -> bool {
        matches!(self, AddressFamily::V6 | AddressFamily::Both)
    }
}

/// Interfaces to browse on
///
/// An empty `include` list means every interface. `exclude` is applied
/// after `include`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceSelection {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl InterfaceSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_all(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Parameters of one browse, resolved and validated before the scheduler starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseQuery {
    /// Service type, e.g. `_workstation._tcp`
    pub service_type: String,
    /// Browse domain, e.g. `local`
    pub domain: String,
    pub family: AddressFamily,
    pub interfaces: InterfaceSelection,
}

impl BrowseQuery {
    /// Query for workstations in `.local` on all interfaces and both families
    pub fn workstations() -> Self {
        Self {
            service_type: DEFAULT_SERVICE.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            family: AddressFamily::Both,
            interfaces: InterfaceSelection::all(),
        }
    }

    /// Fully qualified service type, e.g. `_workstation._tcp.local.`
    pub fn qualified_service_type(&self) -> String {
        let service = self.service_type.trim_end_matches('.');
        let domain = self.domain.trim_matches('.');
        format!("{}.{}.", service, domain)
    }
}

/// Trait for discovery back-ends
///
/// A discoverer answers one question: which service instances answered
/// within the given time budget. It holds no memory of previous scans;
/// change detection is owned by the `ScanScheduler`.
///
/// # Contract
///
/// - Return within roughly `budget` (the scheduler enforces the bound and
///   treats an overrun as a discovery error)
/// - Report each instance key at most once per call
/// - Return `Err` only when browsing itself failed; an empty network is
///   `Ok(vec![])`
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Browse for `query` and return every instance seen within `budget`
    async fn browse(
        &self,
        query: &BrowseQuery,
        budget: Duration,
    ) -> Result<Vec<ServiceSnapshot>, crate::Error>;

    /// Get the discoverer name (for logging/debugging)
    fn discoverer_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_service_type() {
        let query = BrowseQuery::workstations();
        assert_eq!(query.qualified_service_type(), "_workstation._tcp.local.");

        let dotted = BrowseQuery {
            domain: "local.".to_string(),
            ..BrowseQuery::workstations()
        };
        assert_eq!(dotted.qualified_service_type(), "_workstation._tcp.local.");
    }

    #[test]
    fn test_family_membership() {
        assert!(AddressFamily::Both.includes_v4());
        assert!(AddressFamily::Both.includes_v6());
        assert!(!AddressFamily::V4.includes_v6());
        assert!(!AddressFamily::V6.includes_v4());
    }
}
