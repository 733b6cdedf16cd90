//! Snapshot differ
//!
//! Computes the ADD/MODIFY/REMOVE events between the retained collection
//! of the previous scan and the collection produced by the current scan.
//!
//! ## Ordering
//!
//! 1. `current` is walked in discovery order; each entry yields `Add`,
//!    `Modify`, or nothing.
//! 2. The retained collection is then walked in reverse; every key missing
//!    from `current` yields `Remove`.
//!
//! All Add/Modify events of a cycle therefore precede all Remove events.

use crate::model::{ChangeEvent, ServiceSnapshot};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// The previous-scan collection owned by the scheduler
///
/// Order is significant: new instances are appended, modified instances
/// are replaced in place, and removals are reported in reverse order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetainedSnapshots {
    entries: Vec<ServiceSnapshot>,
}

impl RetainedSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the retained collection (used by tests and embedding code)
    pub fn from_entries(entries: Vec<ServiceSnapshot>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ServiceSnapshot] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diff `current` against the retained collection and reconcile
    ///
    /// Returns the ordered change events and leaves `self` holding exactly
    /// the instances of `current`, with their current payloads.
    pub fn reconcile(
        &mut self,
        current: &[ServiceSnapshot],
        detected_at: DateTime<Utc>,
    ) -> Vec<ChangeEvent> {
        let mut events = Vec::new();

        for snapshot in current {
            match self.entries.iter().position(|p| p.same_key(snapshot)) {
                None => {
                    self.entries.push(snapshot.clone());
                    events.push(ChangeEvent::add(detected_at, snapshot.clone()));
                }
                Some(index) => {
                    if !self.entries[index].same_payload(snapshot) {
                        self.entries[index] = snapshot.clone();
                        events.push(ChangeEvent::modify(detected_at, snapshot.clone()));
                    }
                }
            }
        }

        let live: HashSet<&str> = current.iter().map(|s| s.instance_key.as_str()).collect();
        for index in (0..self.entries.len()).rev() {
            if !live.contains(self.entries[index].instance_key.as_str()) {
                let gone = self.entries.remove(index);
                events.push(ChangeEvent::remove(detected_at, gone));
            }
        }

        events
    }
}

/// Pure diff of two snapshot collections
///
/// Equivalent to seeding a [`RetainedSnapshots`] with `previous` and
/// reconciling it against `current`; `previous` is left untouched.
pub fn diff(
    previous: &[ServiceSnapshot],
    current: &[ServiceSnapshot],
    detected_at: DateTime<Utc>,
) -> Vec<ChangeEvent> {
    RetainedSnapshots::from_entries(previous.to_vec()).reconcile(current, detected_at)
}
