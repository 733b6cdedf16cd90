//! Test doubles and common utilities for contract tests
//!
//! These doubles script what the network "sees" and record what the
//! notifiers receive, without touching multicast or SMTP.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zcnotify_core::error::{Error, Result};
use zcnotify_core::model::{ChangeEvent, ChangeKind, ServiceSnapshot};
use zcnotify_core::scheduler::{RetryPolicy, ScanSettings};
use zcnotify_core::traits::{BrowseQuery, Discoverer, Notifier, NotifierKind};

/// One scripted browse outcome
#[derive(Debug, Clone)]
pub enum Scan {
    Found(Vec<ServiceSnapshot>),
    Fail(&'static str),
}

/// A Discoverer that replays a script of browse results
///
/// Once the script is exhausted the last successful result is repeated,
/// so the network looks unchanged from then on.
#[derive(Clone)]
pub struct ScriptedDiscoverer {
    script: Arc<Mutex<VecDeque<Scan>>>,
    last: Arc<Mutex<Vec<ServiceSnapshot>>>,
    /// Call counter for browse()
    browse_call_count: Arc<AtomicUsize>,
    /// Simulated time spent on each browse
    latency: Duration,
}

impl ScriptedDiscoverer {
    pub fn new(script: Vec<Scan>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            last: Arc::new(Mutex::new(Vec::new())),
            browse_call_count: Arc::new(AtomicUsize::new(0)),
            latency: Duration::ZERO,
        }
    }

    /// A network with nothing on it
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Make every browse take `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Get the number of times browse() was called
    pub fn browse_call_count(&self) -> usize {
        self.browse_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Discoverer for ScriptedDiscoverer {
    async fn browse(&self, _query: &BrowseQuery, _budget: Duration) -> Result<Vec<ServiceSnapshot>> {
        self.browse_call_count.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scan::Found(found)) => {
                *self.last.lock().unwrap() = found.clone();
                Ok(found)
            }
            Some(Scan::Fail(reason)) => Err(Error::discovery(reason)),
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }

    fn discoverer_name(&self) -> &'static str {
        "scripted"
    }
}

/// A Notifier that records every event it is handed
#[derive(Clone)]
pub struct RecordingNotifier {
    received: Arc<Mutex<Vec<ChangeEvent>>>,
    /// Call counter for notify()
    notify_call_count: Arc<AtomicUsize>,
    /// Simulated delivery time
    delay: Duration,
    /// Fail every delivery after recording it
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
            notify_call_count: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    /// A notifier that takes `delay` to deliver
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    /// A notifier whose deliveries always fail
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Get the number of times notify() was called
    pub fn notify_call_count(&self) -> usize {
        self.notify_call_count.load(Ordering::SeqCst)
    }

    /// Events delivered so far, as (kind, instance key) sorted for comparison
    pub fn received_sorted(&self) -> Vec<(ChangeKind, String)> {
        let mut seen = summarize(&self.received.lock().unwrap());
        seen.sort();
        seen
    }

    pub fn received(&self) -> Vec<ChangeEvent> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        self.notify_call_count.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.received.lock().unwrap().push(event.clone());

        if self.fail {
            return Err(Error::notify("recording", "scripted failure"));
        }
        Ok(())
    }

    fn kind(&self) -> NotifierKind {
        NotifierKind::Log
    }
}

/// Shorthand for a snapshot with no text records or addresses
pub fn snap(key: &str, host: &str, port: u16, ttl: u32) -> ServiceSnapshot {
    ServiceSnapshot::new(key, host, port, ttl)
}

/// Reduce events to (kind, instance key) pairs
pub fn summarize(events: &[ChangeEvent]) -> Vec<(ChangeKind, String)> {
    events
        .iter()
        .map(|e| (e.kind, e.entry.instance_key.clone()))
        .collect()
}

/// Apply a diff result to `previous`, keyed by instance key
pub fn apply(previous: &[ServiceSnapshot], events: &[ChangeEvent]) -> Vec<ServiceSnapshot> {
    let mut applied = previous.to_vec();

    for event in events {
        let key = &event.entry.instance_key;
        match event.kind {
            ChangeKind::Add => applied.push(event.entry.clone()),
            ChangeKind::Remove => applied.retain(|s| &s.instance_key != key),
            ChangeKind::Modify => {
                for s in applied.iter_mut().filter(|s| &s.instance_key == key) {
                    *s = event.entry.clone();
                }
            }
        }
    }

    applied
}

/// Collections equal by key and payload, ignoring order
pub fn same_collection(a: &[ServiceSnapshot], b: &[ServiceSnapshot]) -> bool {
    a.len() == b.len()
        && a.iter().all(|x| {
            b.iter()
                .any(|y| x.same_key(y) && x.same_payload(y))
        })
}

/// Scheduler settings with a short period and fatal discovery errors
pub fn fast_settings(period: Duration) -> ScanSettings {
    ScanSettings {
        query: BrowseQuery::workstations(),
        period,
        retry: RetryPolicy::fatal(),
    }
}
