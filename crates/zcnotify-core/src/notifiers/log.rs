// # Log Notifier
//
// Writes each change event to the tracing log.
//
// ## When to Use
//
// - Trying out a configuration before wiring up SMTP
// - Environments where the log pipeline already does alerting
// - Testing

use async_trait::async_trait;
use tracing::info;

use crate::config::ZcnotifyConfig;
use crate::model::ChangeEvent;
use crate::traits::{Notifier, NotifierFactory, NotifierKind};
use crate::Error;

/// Notifier that logs the JSON transport record of every event
///
/// # Example
///
/// ```rust,no_run
/// use zcnotify_core::notifiers::LogNotifier;
/// use zcnotify_core::traits::Notifier;
/// use zcnotify_core::model::{ChangeEvent, ServiceSnapshot};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let notifier = LogNotifier::new();
///     let entry = ServiceSnapshot::new("nas._workstation._tcp.local.", "nas.local.", 9, 120);
///     notifier.notify(&ChangeEvent::add(chrono::Utc::now(), entry)).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &ChangeEvent) -> Result<(), Error> {
        let record = serde_json::to_string(event)?;
        info!(change = %event.kind, instance = %event.entry.instance_name(), "{}", record);
        Ok(())
    }

    fn kind(&self) -> NotifierKind {
        NotifierKind::Log
    }
}

/// Factory for the log notifier
pub struct LogNotifierFactory;

impl NotifierFactory for LogNotifierFactory {
    fn create(&self, _config: &ZcnotifyConfig) -> Result<Box<dyn Notifier>, Error> {
        Ok(Box::new(LogNotifier::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceSnapshot;

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        let notifier = LogNotifier::new();
        let event = ChangeEvent::remove(chrono::Utc::now(), ServiceSnapshot::new("a", "h", 1, 1));

        assert!(notifier.notify(&event).await.is_ok());
        assert_eq!(notifier.kind(), NotifierKind::Log);
    }
}
