//! Scan scheduler
//!
//! The ScanScheduler is responsible for:
//! - Triggering a browse every scan period
//! - Retrying (or giving up on) failed browses
//! - Diffing each snapshot against the retained previous snapshot
//! - Publishing the resulting change events, one at a time, to the dispatcher
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   tick    ┌─────────────┐
//! │ ScanScheduler│──────────▶│ Discoverer  │
//! └──────────────┘◀──────────└─────────────┘
//!        │          snapshot
//!        ▼
//! ┌──────────────┐  ChangeEvent (capacity 1)  ┌────────────────┐
//! │ RetainedSnap │───────────────────────────▶│ChangeDispatcher│
//! └──────────────┘                            └────────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Wait for the tick or for shutdown (shutdown wins ties)
//! 2. Browse with a budget of one scan period
//! 3. Diff against the retained snapshot
//! 4. Publish each event; wait until the dispatcher has taken the last one
//! 5. Emit monitoring event

use crate::differ::RetainedSnapshots;
use crate::error::{Error, Result};
use crate::model::{ChangeEvent, ServiceSnapshot};
use crate::traits::{BrowseQuery, Discoverer};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the scheduler → dispatcher handoff channel
///
/// One slot: the scheduler cannot run ahead of the dispatcher by more than
/// a single event.
pub const HANDOFF_CAPACITY: usize = 1;

/// Events emitted by the ScanScheduler for external monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Scheduler started
    Started { service_type: String },

    /// A scan cycle finished and its events were handed off
    ScanCompleted {
        cycle: u64,
        discovered: usize,
        changes: usize,
    },

    /// A browse attempt failed
    DiscoveryFailed {
        cycle: u64,
        attempt: u32,
        error: String,
    },

    /// Scheduler stopped
    Stopped { reason: String },
}

/// What to do when a browse fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries within one cycle; 0 makes the first failure fatal
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Fail the scheduler on the first discovery error
    pub fn fatal() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based), doubling and capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fatal()
    }
}

/// Static scheduler settings
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub query: BrowseQuery,
    /// Time between scans and time budget of each scan
    pub period: Duration,
    pub retry: RetryPolicy,
}

impl ScanSettings {
    pub fn from_config(config: &crate::config::ZcnotifyConfig) -> Self {
        Self {
            query: config.browse_query(),
            period: config.scan_period(),
            retry: config.engine.retry_policy(),
        }
    }
}

/// Periodic scan loop
///
/// The scheduler is the sole owner of the retained snapshot. It runs on a
/// single task and is consumed by [`ScanScheduler::run`]; when `run`
/// returns, the handoff sender is dropped and the dispatcher drains out.
///
/// ## Lifecycle
///
/// 1. Create with [`ScanScheduler::new()`], keep the returned receiver for
///    the dispatcher
/// 2. Optionally attach a monitor with [`ScanScheduler::with_monitor()`]
/// 3. Start with [`ScanScheduler::run()`]
/// 4. Cancel the token to stop after the in-flight scan
pub struct ScanScheduler {
    /// Discovery back-end
    discoverer: Box<dyn Discoverer>,

    /// Browse parameters, period, retry policy
    settings: ScanSettings,

    /// Snapshot of the previous cycle
    previous: RetainedSnapshots,

    /// Handoff to the dispatcher
    events_tx: mpsc::Sender<ChangeEvent>,

    /// Optional monitoring channel
    monitor_tx: Option<mpsc::Sender<ScanEvent>>,
}

impl ScanScheduler {
    /// Create a new scheduler
    ///
    /// # Returns
    ///
    /// A tuple of (scheduler, change_receiver) where change_receiver is the
    /// capacity-1 handoff consumed by the `ChangeDispatcher`
    pub fn new(
        discoverer: Box<dyn Discoverer>,
        settings: ScanSettings,
    ) -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        if settings.period.is_zero() {
            return Err(Error::config("Scan period must be > 0"));
        }

        let (events_tx, events_rx) = mpsc::channel(HANDOFF_CAPACITY);

        let scheduler = Self {
            discoverer,
            settings,
            previous: RetainedSnapshots::new(),
            events_tx,
            monitor_tx: None,
        };

        Ok((scheduler, events_rx))
    }

    /// Attach a monitoring channel
    pub fn with_monitor(mut self, monitor_tx: mpsc::Sender<ScanEvent>) -> Self {
        self.monitor_tx = Some(monitor_tx);
        self
    }

    /// Attach a fresh monitoring channel of the given capacity
    pub fn monitored(self, capacity: usize) -> (Self, mpsc::Receiver<ScanEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (self.with_monitor(tx), rx)
    }

    /// Run the scan loop until `shutdown` is cancelled or discovery fails fatally
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Discovery failed after exhausting retries, or the
    ///   dispatcher went away
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Scanning for {} every {:?} via {}",
            self.settings.query.qualified_service_type(),
            self.settings.period,
            self.discoverer.discoverer_name()
        );
        self.emit_event(ScanEvent::Started {
            service_type: self.settings.query.qualified_service_type(),
        });

        let result = self.run_loop(&shutdown).await;

        let reason = match &result {
            Ok(()) => "Shutdown signal".to_string(),
            Err(e) => e.to_string(),
        };
        self.emit_event(ScanEvent::Stopped { reason });

        result
    }

    async fn run_loop(&mut self, shutdown: &CancellationToken) -> Result<()> {
        // First tick fires immediately
        let mut ticker = tokio::time::interval(self.settings.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cycle: u64 = 0;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, scanner stopping");
                    return Ok(());
                }

                _ = ticker.tick() => {}
            }

            cycle += 1;

            let current = match self.browse_with_retry(cycle, shutdown).await? {
                Some(current) => current,
                None => {
                    info!("Shutdown signal received during discovery retry");
                    return Ok(());
                }
            };

            let events = self.previous.reconcile(&current, chrono::Utc::now());
            let changes = events.len();
            debug!(
                "Scan {}: {} instance(s), {} change(s)",
                cycle,
                current.len(),
                changes
            );

            self.publish(events).await?;

            self.emit_event(ScanEvent::ScanCompleted {
                cycle,
                discovered: current.len(),
                changes,
            });
        }
    }

    /// Browse once, retrying per policy
    ///
    /// Returns `Ok(None)` when shutdown arrives during a back-off sleep.
    async fn browse_with_retry(
        &self,
        cycle: u64,
        shutdown: &CancellationToken,
    ) -> Result<Option<Vec<ServiceSnapshot>>> {
        let retry = self.settings.retry;
        let mut attempt: u32 = 0;

        loop {
            match self.browse_once().await {
                Ok(current) => return Ok(Some(current)),
                Err(e) => {
                    self.emit_event(ScanEvent::DiscoveryFailed {
                        cycle,
                        attempt,
                        error: e.to_string(),
                    });

                    if attempt >= retry.max_retries {
                        error!("Discovery failed after {} attempt(s): {}", attempt + 1, e);
                        return Err(e);
                    }

                    let delay = retry.delay_for(attempt);
                    warn!(
                        "Discovery attempt {} failed: {} (retrying in {:?})",
                        attempt, e, delay
                    );
                    attempt += 1;

                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// A single budgeted browse
    async fn browse_once(&self) -> Result<Vec<ServiceSnapshot>> {
        let budget = self.settings.period;
        // Grace for the discoverer to wind down its own budgeted browse
        let deadline = budget + budget / 10;

        match tokio::time::timeout(
            deadline,
            self.discoverer.browse(&self.settings.query, budget),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::discovery(format!(
                "{} exceeded its {:?} budget",
                self.discoverer.discoverer_name(),
                budget
            ))),
        }
    }

    /// Hand events to the dispatcher in order
    ///
    /// Returns once the dispatcher has taken the last event of the batch,
    /// so the next cycle cannot start while this one is still queued.
    async fn publish(&self, events: Vec<ChangeEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        for event in events {
            info!("{}", event);
            self.events_tx
                .send(event)
                .await
                .map_err(|_| Error::dispatch("Dispatcher stopped receiving change events"))?;
        }

        // Capacity returns only once the dispatcher has received the last event
        let permit = self
            .events_tx
            .reserve()
            .await
            .map_err(|_| Error::dispatch("Dispatcher stopped receiving change events"))?;
        drop(permit);

        Ok(())
    }

    /// Emit a monitoring event
    fn emit_event(&self, event: ScanEvent) {
        if let Some(tx) = &self.monitor_tx {
            // Never block the scan loop on a slow monitor
            if tx.try_send(event).is_err() {
                warn!("Monitor channel full or closed, dropping scan event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };

        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_default_policy_is_fatal() {
        assert_eq!(RetryPolicy::default().max_retries, 0);
    }

    #[test]
    fn test_scan_event_clone_eq() {
        let event = ScanEvent::ScanCompleted {
            cycle: 1,
            discovered: 2,
            changes: 1,
        };
        assert_eq!(event.clone(), event);
    }
}
