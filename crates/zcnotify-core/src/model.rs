//! Snapshot and change-event types
//!
//! [`ServiceSnapshot`] is one discovered service instance as seen during a
//! single scan. [`ChangeEvent`] is what the differ emits and what notifiers
//! consume; its serde form is the transport record notifiers serialize:
//!
//! ```json
//! {
//!     "changeType": "ADD",
//!     "timestamp": "2025-01-09T12:00:00Z",
//!     "entry": {
//!         "instanceKey": "printer._workstation._tcp.local.",
//!         "hostName": "printer.local.",
//!         "port": 9,
//!         "ttl": 120,
//!         "textRecords": [],
//!         "addressesV4": ["192.168.1.20"],
//!         "addressesV6": []
//!     }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// One discovered service instance at a scan moment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    /// Unique instance identifier within one scan (the diff key)
    pub instance_key: String,
    pub host_name: String,
    pub port: u16,
    /// Advertisement time-to-live in seconds
    pub ttl: u32,
    /// Opaque TXT records; compared as a multiset
    #[serde(default)]
    pub text_records: Vec<String>,
    #[serde(default)]
    pub addresses_v4: BTreeSet<Ipv4Addr>,
    #[serde(default)]
    pub addresses_v6: BTreeSet<Ipv6Addr>,
}

impl ServiceSnapshot {
    /// Create a snapshot with no text records or addresses
    pub fn new(
        instance_key: impl Into<String>,
        host_name: impl Into<String>,
        port: u16,
        ttl: u32,
    ) -> Self {
        Self {
            instance_key: instance_key.into(),
            host_name: host_name.into(),
            port,
            ttl,
            text_records: Vec::new(),
            addresses_v4: BTreeSet::new(),
            addresses_v6: BTreeSet::new(),
        }
    }

    pub fn with_text_record(mut self, record: impl Into<String>) -> Self {
        self.text_records.push(record.into());
        self
    }

    pub fn with_ipv4(mut self, addr: Ipv4Addr) -> Self {
        self.addresses_v4.insert(addr);
        self
    }

    pub fn with_ipv6(mut self, addr: Ipv6Addr) -> Self {
        self.addresses_v6.insert(addr);
        self
    }

    /// Key equality: same instance
    pub fn same_key(&self, other: &Self) -> bool {
        self.instance_key == other.instance_key
    }

    /// Instance label without the service type and domain
    ///
    /// `nas._workstation._tcp.local.` yields `nas`. A key with no
    /// `_tcp`/`_udp` label is returned whole.
    pub fn instance_name(&self) -> &str {
        let key = self.instance_key.as_str();
        let proto = ["._tcp.", "._udp."]
            .iter()
            .filter_map(|label| key.find(label))
            .min();

        match proto.and_then(|at| key[..at].rfind("._")) {
            Some(end) => &key[..end],
            None => key,
        }
    }

    /// Payload equality
    ///
    /// Host, port and TTL must match exactly. Text records are compared as
    /// multisets (order-insensitive, count-sensitive); addresses are sets.
    pub fn same_payload(&self, other: &Self) -> bool {
        if self.host_name != other.host_name || self.port != other.port || self.ttl != other.ttl {
            return false;
        }

        if self.text_records.len() != other.text_records.len() {
            return false;
        }

        let mut ours: Vec<&str> = self.text_records.iter().map(String::as_str).collect();
        let mut theirs: Vec<&str> = other.text_records.iter().map(String::as_str).collect();
        ours.sort_unstable();
        theirs.sort_unstable();

        ours == theirs
            && self.addresses_v4 == other.addresses_v4
            && self.addresses_v6 == other.addresses_v6
    }
}

/// Kind of change detected between two scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Add,
    Remove,
    Modify,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "ADD",
            ChangeKind::Remove => "REMOVE",
            ChangeKind::Modify => "MODIFY",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single detected change, handed by value from scheduler to dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "changeType")]
    pub kind: ChangeKind,
    /// Detection time (UTC)
    pub timestamp: DateTime<Utc>,
    /// Current value for Add/Modify, last known value for Remove
    pub entry: ServiceSnapshot,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, timestamp: DateTime<Utc>, entry: ServiceSnapshot) -> Self {
        Self {
            kind,
            timestamp,
            entry,
        }
    }

    pub fn add(timestamp: DateTime<Utc>, entry: ServiceSnapshot) -> Self {
        Self::new(ChangeKind::Add, timestamp, entry)
    }

    pub fn remove(timestamp: DateTime<Utc>, entry: ServiceSnapshot) -> Self {
        Self::new(ChangeKind::Remove, timestamp, entry)
    }

    pub fn modify(timestamp: DateTime<Utc>, entry: ServiceSnapshot) -> Self {
        Self::new(ChangeKind::Modify, timestamp, entry)
    }

    /// Serialize to the JSON transport record, indented for human readers
    pub fn to_pretty_json(&self) -> crate::Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        String::from_utf8(buf).map_err(|e| crate::Error::Other(e.to_string()))
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Service {} {:?} @ {}: (h: {}, 4: {:?}, 6: {:?}, ttl: {})",
            self.kind,
            self.entry.instance_name(),
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.entry.host_name,
            self.entry.addresses_v4,
            self.entry.addresses_v6,
            self.entry.ttl,
        )
    }
}
