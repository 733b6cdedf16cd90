//! Change dispatcher
//!
//! Receives change events from the scheduler, one at a time, and fans each
//! event out to every configured notifier on its own task.
//!
//! ## Guarantees
//!
//! - Events are taken strictly in FIFO order
//! - All notifier tasks for an event are spawned before the next event is taken
//! - Notifier tasks are never awaited before taking the next event
//! - A notifier failure is logged and touches nothing else
//!
//! Notifier tasks are tracked; whether shutdown waits for them is the
//! [`ShutdownPolicy`].

use crate::model::ChangeEvent;
use crate::traits::Notifier;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// What happens to in-flight notifications when the event stream ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Fire-and-forget: return immediately, outstanding tasks keep running
    /// until the runtime shuts down
    #[default]
    Detach,

    /// Wait up to `timeout_secs` for outstanding notifications
    Drain { timeout_secs: u64 },
}

/// Summary returned when the dispatcher stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events taken from the scheduler
    pub events: usize,
    /// Notifier tasks spawned
    pub notifications: usize,
    /// Notifier tasks that returned an error (as of shutdown)
    pub failures: usize,
    /// Notifier tasks still running when the dispatcher returned
    pub outstanding: usize,
}

/// Fan-out of change events to notifiers
pub struct ChangeDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    tracker: TaskTracker,
    policy: ShutdownPolicy,
    failures: Arc<AtomicUsize>,
}

impl ChangeDispatcher {
    /// Create a dispatcher for the given notifiers
    pub fn new(notifiers: Vec<Box<dyn Notifier>>, policy: ShutdownPolicy) -> Self {
        Self {
            notifiers: notifiers.into_iter().map(Arc::from).collect(),
            tracker: TaskTracker::new(),
            policy,
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of configured notifiers
    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    /// Consume events until the scheduler drops its sender
    pub async fn run(self, mut events_rx: mpsc::Receiver<ChangeEvent>) -> DispatchReport {
        let mut report = DispatchReport::default();

        while let Some(event) = events_rx.recv().await {
            report.events += 1;
            report.notifications += self.dispatch(event);
        }

        debug!("Change stream closed after {} event(s)", report.events);
        self.tracker.close();

        if let ShutdownPolicy::Drain { timeout_secs } = self.policy {
            let timeout = Duration::from_secs(timeout_secs);
            if tokio::time::timeout(timeout, self.tracker.wait())
                .await
                .is_err()
            {
                warn!(
                    "{} notification(s) still running after {:?}, detaching",
                    self.tracker.len(),
                    timeout
                );
            }
        }

        report.outstanding = self.tracker.len();
        report.failures = self.failures.load(Ordering::SeqCst);
        info!(
            "Dispatcher stopped: {} event(s), {} notification(s), {} failure(s)",
            report.events, report.notifications, report.failures
        );

        report
    }

    /// Spawn one task per notifier for this event; returns the number spawned
    fn dispatch(&self, event: ChangeEvent) -> usize {
        let event = Arc::new(event);

        for notifier in &self.notifiers {
            let notifier = Arc::clone(notifier);
            let event = Arc::clone(&event);
            let failures = Arc::clone(&self.failures);

            self.tracker.spawn(async move {
                match notifier.notify(&event).await {
                    Ok(()) => debug!(
                        "{} notifier delivered {} {}",
                        notifier.kind(),
                        event.kind,
                        event.entry.instance_key
                    ),
                    Err(e) => {
                        failures.fetch_add(1, Ordering::SeqCst);
                        warn!(
                            "{} notifier failed for {} {}: {}",
                            notifier.kind(),
                            event.kind,
                            event.entry.instance_key,
                            e
                        );
                    }
                }
            });
        }

        self.notifiers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_serde() {
        let detach: ShutdownPolicy = serde_json::from_str(r#"{"mode":"detach"}"#).unwrap();
        assert_eq!(detach, ShutdownPolicy::Detach);

        let drain: ShutdownPolicy =
            serde_json::from_str(r#"{"mode":"drain","timeout_secs":3}"#).unwrap();
        assert_eq!(drain, ShutdownPolicy::Drain { timeout_secs: 3 });
    }

    #[tokio::test]
    async fn test_empty_stream_reports_nothing() {
        let dispatcher = ChangeDispatcher::new(Vec::new(), ShutdownPolicy::Detach);
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        let report = dispatcher.run(rx).await;
        assert_eq!(report, DispatchReport::default());
    }
}
