// # mDNS Discoverer
//
// This crate provides a multicast DNS (DNS-SD) discovery back-end built
// on the `mdns-sd` daemon.
//
// ## How a Browse Works
//
// 1. Start a fresh `mdns-sd` daemon with the interface rules applied
// 2. Browse for `<service>.<domain>.`, folding resolved/removed events
//    into an ordered working set until the time budget runs out
// 3. Shut the daemon down and hand the working set to the scheduler
//
// No record cache survives between browses: a snapshot only holds
// instances that answered during that scan, so an instance that vanishes
// without a goodbye packet is reported removed on the next scan.
//
// ## Interface Selection
//
// Configured interface names are checked against the host at
// construction; an unknown name is a configuration error. Addresses
// outside the selected family are also dropped from each snapshot.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use mdns_sd::{DaemonStatus, IfKind, ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, info, trace, warn};
use zcnotify_core::model::ServiceSnapshot;
use zcnotify_core::traits::{AddressFamily, BrowseQuery, Discoverer, InterfaceSelection};
use zcnotify_core::{Error, Result};

/// How long to wait for a daemon to confirm shutdown
const DAEMON_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Interface names present on the host, in enumeration order
fn host_interfaces() -> Result<Vec<String>> {
    let addrs = if_addrs::get_if_addrs()
        .map_err(|e| Error::config(format!("cannot retrieve system interfaces: {}", e)))?;

    let mut names: Vec<String> = Vec::new();
    for iface in addrs {
        if !names.contains(&iface.name) {
            names.push(iface.name);
        }
    }
    Ok(names)
}

/// Check the selection against the host and compute the final interface list
///
/// Every name in `include` and `exclude` must exist in `available`. An
/// empty `include` starts from all host interfaces.
fn resolve_interfaces(selection: &InterfaceSelection, available: &[String]) -> Result<Vec<String>> {
    if let Some(unknown) = selection
        .include
        .iter()
        .chain(selection.exclude.iter())
        .find(|name| !available.contains(name))
    {
        return Err(Error::config(format!("no such interface {:?}", unknown)));
    }

    let base = if selection.include.is_empty() {
        available
    } else {
        &selection.include
    };

    let mut interfaces: Vec<String> = Vec::new();
    for name in base {
        if !selection.exclude.contains(name) && !interfaces.contains(name) {
            interfaces.push(name.clone());
        }
    }
    Ok(interfaces)
}

/// One step of interface configuration applied to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
enum InterfaceRule {
    DisableAll,
    Enable(String),
    Disable(String),
    DisableV4,
    DisableV6,
}

/// Translate the selection into daemon rules, in application order
///
/// Includes narrow the set first, excludes are removed from what is left,
/// the family filter applies last.
fn interface_rules(interfaces: &InterfaceSelection, family: AddressFamily) -> Vec<InterfaceRule> {
    let mut rules = Vec::new();

    if !interfaces.include.is_empty() {
        rules.push(InterfaceRule::DisableAll);
        rules.extend(interfaces.include.iter().cloned().map(InterfaceRule::Enable));
    }

    rules.extend(interfaces.exclude.iter().cloned().map(InterfaceRule::Disable));

    match family {
        AddressFamily::V4 => rules.push(InterfaceRule::DisableV6),
        AddressFamily::V6 => rules.push(InterfaceRule::DisableV4),
        AddressFamily::Both => {}
    }

    rules
}

fn apply_rule(daemon: &ServiceDaemon, rule: &InterfaceRule) -> Result<()> {
    let applied = match rule {
        InterfaceRule::DisableAll => daemon.disable_interface(IfKind::All),
        InterfaceRule::Enable(name) => daemon.enable_interface(IfKind::Name(name.clone())),
        InterfaceRule::Disable(name) => daemon.disable_interface(IfKind::Name(name.clone())),
        InterfaceRule::DisableV4 => daemon.disable_interface(IfKind::IPv4),
        InterfaceRule::DisableV6 => daemon.disable_interface(IfKind::IPv6),
    };

    applied.map_err(|e| Error::discovery(format!("Failed to apply {:?}: {}", rule, e)))
}

/// Build a snapshot from a resolved service
///
/// TXT records become `key=value`, or bare `key` for boolean attributes.
/// Addresses outside `family` are dropped.
pub fn snapshot_from_info(info: &ServiceInfo, family: AddressFamily) -> ServiceSnapshot {
    let mut snapshot = ServiceSnapshot::new(
        info.get_fullname(),
        info.get_hostname(),
        info.get_port(),
        info.get_other_ttl(),
    );

    snapshot.text_records = info
        .get_properties()
        .iter()
        .map(|prop| match prop.val() {
            Some(val) => format!("{}={}", prop.key(), String::from_utf8_lossy(val)),
            None => prop.key().to_string(),
        })
        .collect();

    for addr in info.get_addresses() {
        match addr {
            IpAddr::V4(v4) if family.includes_v4() => {
                snapshot.addresses_v4.insert(*v4);
            }
            IpAddr::V6(v6) if family.includes_v6() => {
                snapshot.addresses_v6.insert(*v6);
            }
            _ => {}
        }
    }

    snapshot
}

/// Ordered working set of one browse, keyed by instance
#[derive(Debug, Default)]
struct BrowseSet {
    entries: Vec<ServiceSnapshot>,
    index: HashMap<String, usize>,
}

impl BrowseSet {
    fn resolved(&mut self, snapshot: ServiceSnapshot) {
        match self.index.get(&snapshot.instance_key) {
            Some(&i) => self.entries[i] = snapshot,
            None => {
                self.index
                    .insert(snapshot.instance_key.clone(), self.entries.len());
                self.entries.push(snapshot);
            }
        }
    }

    fn removed(&mut self, fullname: &str) {
        if self.index.remove(fullname).is_some() {
            self.entries.retain(|s| s.instance_key != fullname);
            self.index = self
                .entries
                .iter()
                .enumerate()
                .map(|(i, s)| (s.instance_key.clone(), i))
                .collect();
        }
    }

    fn into_entries(self) -> Vec<ServiceSnapshot> {
        self.entries
    }
}

/// Start a daemon with the interface rules applied
fn open_daemon(rules: &[InterfaceRule]) -> Result<ServiceDaemon> {
    let daemon = ServiceDaemon::new()
        .map_err(|e| Error::discovery(format!("Failed to start mDNS daemon: {}", e)))?;

    for rule in rules {
        trace!("Applying interface rule {:?}", rule);
        if let Err(e) = apply_rule(&daemon, rule) {
            if let Err(shutdown_err) = daemon.shutdown() {
                warn!("mDNS daemon shutdown failed: {}", shutdown_err);
            }
            return Err(e);
        }
    }

    Ok(daemon)
}

/// Shut a daemon down and wait briefly for it to confirm
async fn close_daemon(daemon: ServiceDaemon) -> Option<DaemonStatus> {
    let status = match daemon.shutdown() {
        Ok(status) => status,
        Err(e) => {
            warn!("mDNS daemon shutdown failed: {}", e);
            return None;
        }
    };

    match tokio::time::timeout(DAEMON_SHUTDOWN_TIMEOUT, status.recv_async()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(_)) => None,
        Err(_) => {
            warn!("mDNS daemon did not confirm shutdown within {:?}", DAEMON_SHUTDOWN_TIMEOUT);
            None
        }
    }
}

/// Browse on `daemon` until the budget runs out
async fn collect(
    daemon: &ServiceDaemon,
    query: &BrowseQuery,
    budget: Duration,
) -> Result<Vec<ServiceSnapshot>> {
    let service_type = query.qualified_service_type();
    let receiver = daemon
        .browse(&service_type)
        .map_err(|e| Error::discovery(format!("Failed to browse {}: {}", service_type, e)))?;

    let deadline = tokio::time::Instant::now() + budget;
    let mut found = BrowseSet::default();

    loop {
        let event = match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                return Err(Error::discovery(format!(
                    "mDNS daemon closed the browse channel: {}",
                    e
                )));
            }
            // Budget spent
            Err(_) => break,
        };

        match event {
            ServiceEvent::ServiceResolved(info) => {
                trace!("Resolved {}", info.get_fullname());
                found.resolved(snapshot_from_info(&info, query.family));
            }
            ServiceEvent::ServiceRemoved(_, fullname) => {
                trace!("Removed {}", fullname);
                found.removed(&fullname);
            }
            _ => {}
        }
    }

    let snapshots = found.into_entries();
    debug!("Browse of {} found {} instance(s)", service_type, snapshots.len());
    Ok(snapshots)
}

/// Discoverer backed by `mdns-sd`
///
/// Holds only the interface rules; every browse runs on its own daemon.
#[derive(Debug, Clone)]
pub struct MdnsDiscoverer {
    rules: Vec<InterfaceRule>,
}

impl MdnsDiscoverer {
    /// Check the query's interface selection against the host
    ///
    /// # Returns
    ///
    /// - `Ok(MdnsDiscoverer)`: Every named interface exists
    /// - `Err(Error::Config)`: An interface in `use` or `exclude` is unknown
    pub fn new(query: &BrowseQuery) -> Result<Self> {
        let available = host_interfaces()?;
        Self::with_host_interfaces(query, &available)
    }

    fn with_host_interfaces(query: &BrowseQuery, available: &[String]) -> Result<Self> {
        let interfaces = resolve_interfaces(&query.interfaces, available)?;
        info!("Final interface list: {:?}", interfaces);

        Ok(Self {
            rules: interface_rules(&query.interfaces, query.family),
        })
    }
}

#[async_trait::async_trait]
impl Discoverer for MdnsDiscoverer {
    async fn browse(&self, query: &BrowseQuery, budget: Duration) -> Result<Vec<ServiceSnapshot>> {
        let daemon = open_daemon(&self.rules)?;
        let outcome = collect(&daemon, query, budget).await;
        close_daemon(daemon).await;
        outcome
    }

    fn discoverer_name(&self) -> &'static str {
        "mdns"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn workstation(name: &str, addrs: &str, props: &[(&str, &str)]) -> ServiceInfo {
        let properties: HashMap<String, String> = props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        ServiceInfo::new(
            "_workstation._tcp.local.",
            name,
            "nas.local.",
            addrs,
            9,
            properties,
        )
        .unwrap()
    }

    #[test]
    fn test_all_interfaces_has_no_rules() {
        let rules = interface_rules(&InterfaceSelection::all(), AddressFamily::Both);
        assert!(rules.is_empty());
    }

    #[test]
    fn test_include_then_exclude_then_family() {
        let selection = InterfaceSelection {
            include: vec!["eth0".into(), "wlan0".into()],
            exclude: vec!["wlan0".into()],
        };

        assert_eq!(
            interface_rules(&selection, AddressFamily::V4),
            vec![
                InterfaceRule::DisableAll,
                InterfaceRule::Enable("eth0".into()),
                InterfaceRule::Enable("wlan0".into()),
                InterfaceRule::Disable("wlan0".into()),
                InterfaceRule::DisableV6,
            ]
        );
    }

    fn host(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn selection(include: &[&str], exclude: &[&str]) -> InterfaceSelection {
        InterfaceSelection {
            include: host(include),
            exclude: host(exclude),
        }
    }

    #[test]
    fn test_resolve_all_interfaces_minus_excluded() {
        let available = host(&["lo", "eth0", "wlan0"]);
        let resolved = resolve_interfaces(&selection(&[], &["wlan0"]), &available).unwrap();
        assert_eq!(resolved, host(&["lo", "eth0"]));
    }

    #[test]
    fn test_resolve_included_interfaces() {
        let available = host(&["lo", "eth0", "wlan0"]);
        let resolved =
            resolve_interfaces(&selection(&["wlan0", "eth0"], &["eth0"]), &available).unwrap();
        assert_eq!(resolved, host(&["wlan0"]));
    }

    #[test]
    fn test_unknown_interface_is_config_error() {
        let available = host(&["lo", "eth0"]);

        let err = resolve_interfaces(&selection(&["no-such-if0"], &[]), &available).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("no such interface \"no-such-if0\""));

        let err = resolve_interfaces(&selection(&[], &["no-such-if0"]), &available).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_discoverer_rejects_unknown_interface() {
        let mut query = BrowseQuery::workstations();
        query.interfaces = selection(&["no-such-if0"], &[]);

        let err = MdnsDiscoverer::with_host_interfaces(&query, &host(&["lo", "eth0"])).unwrap_err();
        assert!(err.is_config());

        query.interfaces = selection(&["eth0"], &[]);
        let discoverer = MdnsDiscoverer::with_host_interfaces(&query, &host(&["lo", "eth0"])).unwrap();
        assert_eq!(
            discoverer.rules,
            vec![InterfaceRule::DisableAll, InterfaceRule::Enable("eth0".into())]
        );
    }

    #[tokio::test]
    async fn test_each_browse_daemon_is_shut_down() {
        let first = open_daemon(&[]).unwrap();
        let second = open_daemon(&[]).unwrap();

        assert_eq!(close_daemon(first).await, Some(DaemonStatus::Shutdown));

        // Closing one daemon leaves the other usable
        assert!(second.browse("_workstation._tcp.local.").is_ok());
        assert_eq!(close_daemon(second).await, Some(DaemonStatus::Shutdown));
    }

    #[test]
    fn test_snapshot_from_info() {
        let info = workstation("nas", "192.168.1.20,fe80::1", &[("path", "/")]);
        let snapshot = snapshot_from_info(&info, AddressFamily::Both);

        assert_eq!(snapshot.instance_key, "nas._workstation._tcp.local.");
        assert_eq!(snapshot.host_name, "nas.local.");
        assert_eq!(snapshot.port, 9);
        assert_eq!(snapshot.text_records, vec!["path=/".to_string()]);
        assert!(snapshot.addresses_v4.contains(&Ipv4Addr::new(192, 168, 1, 20)));
        assert!(snapshot.addresses_v6.contains(&"fe80::1".parse::<Ipv6Addr>().unwrap()));
    }

    #[test]
    fn test_family_filters_addresses() {
        let info = workstation("nas", "192.168.1.20,fe80::1", &[]);

        let v4 = snapshot_from_info(&info, AddressFamily::V4);
        assert_eq!(v4.addresses_v4.len(), 1);
        assert!(v4.addresses_v6.is_empty());

        let v6 = snapshot_from_info(&info, AddressFamily::V6);
        assert!(v6.addresses_v4.is_empty());
        assert_eq!(v6.addresses_v6.len(), 1);
    }

    #[test]
    fn test_browse_set_keeps_discovery_order() {
        let mut set = BrowseSet::default();
        set.resolved(ServiceSnapshot::new("a", "h", 1, 1));
        set.resolved(ServiceSnapshot::new("b", "h", 1, 1));
        set.resolved(ServiceSnapshot::new("c", "h", 1, 1));

        // Re-resolution updates in place
        set.resolved(ServiceSnapshot::new("a", "h", 2, 1));
        set.removed("b");
        set.removed("unknown");

        let entries = set.into_entries();
        let keys: Vec<&str> = entries.iter().map(|s| s.instance_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(entries[0].port, 2);
    }
}
