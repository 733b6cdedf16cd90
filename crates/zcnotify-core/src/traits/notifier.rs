// # Notifier Trait
//
// Defines the interface for notification sinks.
//
// ## Implementations
//
// - Email (SMTP): `zcnotify-notifier-email` crate
// - Log (tracing): built into `zcnotify-core`
//
// ## Usage
//
// ```rust,ignore
// use zcnotify_core::Notifier;
//
// async fn forward(notifier: &dyn Notifier, event: &ChangeEvent) {
//     if let Err(e) = notifier.notify(event).await {
//         tracing::warn!("{} notifier failed: {}", notifier.kind(), e);
//     }
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt;
use std::str::FromStr;

use crate::model::ChangeEvent;

/// Every notification sink the system knows about
///
/// Configuration names these in `notify_types`, case-insensitively. An
/// unknown name fails deserialization, so dispatch never sees an
/// unrecognized kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    Email,
    Log,
}

impl NotifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifierKind::Email => "email",
            NotifierKind::Log => "log",
        }
    }
}

impl FromStr for NotifierKind {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_lowercase().as_str() {
            "email" => Ok(NotifierKind::Email),
            "log" => Ok(NotifierKind::Log),
            _ => Err(format!(
                "unknown notification type '{}'. Supported: email, log",
                name
            )),
        }
    }
}

impl<'de> Deserialize<'de> for NotifierKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

impl fmt::Display for NotifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for notification sinks
///
/// # Contract
///
/// - Called concurrently: one invocation per (event, notifier) pair, with
///   invocations for successive events free to overlap
/// - Must resolve: network I/O needs its own timeout, a hung sink leaks a
///   task but never stalls dispatch
/// - Single-shot: no retries, a failure is returned and logged by the
///   dispatcher
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one change event
    async fn notify(&self, event: &ChangeEvent) -> Result<(), crate::Error>;

    /// The configured kind this notifier implements
    fn kind(&self) -> NotifierKind;
}

/// Helper trait for constructing notifiers from configuration
pub trait NotifierFactory: Send + Sync {
    /// Create a Notifier instance from the full configuration
    ///
    /// Factories pick out their own section (e.g. `[email.*]`) and return
    /// a configuration error when it is missing or invalid.
    fn create(
        &self,
        config: &crate::config::ZcnotifyConfig,
    ) -> Result<Box<dyn Notifier>, crate::Error>;
}
