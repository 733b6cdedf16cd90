//! Plugin-based notifier registry
//!
//! The registry maps each [`NotifierKind`] to a factory supplied by a
//! plugin crate, so the daemon never hard-codes which sinks exist.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zcnotify_core::registry::NotifierRegistry;
//!
//! let mut registry = NotifierRegistry::with_builtin();
//! zcnotify_notifier_email::register(&mut registry);
//!
//! // One notifier per enabled kind; unregistered kinds are a config error
//! let notifiers = registry.create_notifiers(&config)?;
//! ```
//!
//! ## Registration
//!
//! Implementations register themselves during initialization:
//!
//! ```rust,ignore
//! // In zcnotify-notifier-email
//! pub fn register(registry: &mut NotifierRegistry) {
//!     registry.register_notifier(NotifierKind::Email, Box::new(EmailFactory));
//! }
//! ```

use crate::config::ZcnotifyConfig;
use crate::error::{Error, Result};
use crate::notifiers::LogNotifierFactory;
use crate::traits::{Notifier, NotifierFactory, NotifierKind};
use std::collections::{BTreeSet, HashMap};

/// Registry of notifier factories keyed by kind
#[derive(Default)]
pub struct NotifierRegistry {
    notifiers: HashMap<NotifierKind, Box<dyn NotifierFactory>>,
}

impl NotifierRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the notifiers that ship in this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_notifier(NotifierKind::Log, Box::new(LogNotifierFactory));
        registry
    }

    /// Register a notifier factory, replacing any previous one for `kind`
    pub fn register_notifier(&mut self, kind: NotifierKind, factory: Box<dyn NotifierFactory>) {
        self.notifiers.insert(kind, factory);
    }

    /// Create one notifier per distinct kind enabled in `config`
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Box<dyn Notifier>>)`: Notifiers in configuration order
    /// - `Err(Error)`: No kinds enabled, a kind has no registered factory,
    ///   or a factory rejected its settings
    pub fn create_notifiers(&self, config: &ZcnotifyConfig) -> Result<Vec<Box<dyn Notifier>>> {
        if config.notify_types.is_empty() {
            return Err(Error::config("No notification types configured"));
        }

        let mut seen = BTreeSet::new();
        let mut created = Vec::new();

        for kind in &config.notify_types {
            if !seen.insert(*kind) {
                continue;
            }

            let factory = self.notifiers.get(kind).ok_or_else(|| {
                Error::config(format!("Notification type '{}' is not available", kind))
            })?;

            created.push(factory.create(config)?);
        }

        Ok(created)
    }

    /// List all registered notifier kinds
    pub fn list_notifiers(&self) -> Vec<NotifierKind> {
        let mut kinds: Vec<NotifierKind> = self.notifiers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Check if a notifier kind is registered
    pub fn has_notifier(&self, kind: NotifierKind) -> bool {
        self.notifiers.contains_key(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockEmailFactory;

    impl NotifierFactory for MockEmailFactory {
        fn create(&self, _config: &ZcnotifyConfig) -> Result<Box<dyn Notifier>> {
            Err(Error::config("Mock email notifier not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let mut registry = NotifierRegistry::new();

        // Initially empty
        assert!(!registry.has_notifier(NotifierKind::Email));

        // Register
        registry.register_notifier(NotifierKind::Email, Box::new(MockEmailFactory));

        // Now present
        assert!(registry.has_notifier(NotifierKind::Email));
        assert_eq!(registry.list_notifiers(), vec![NotifierKind::Email]);
    }

    #[test]
    fn test_builtin_log_notifier() {
        let registry = NotifierRegistry::with_builtin();
        let config = ZcnotifyConfig::new(vec![NotifierKind::Log, NotifierKind::Log]);

        let notifiers = registry.create_notifiers(&config).unwrap();
        assert_eq!(notifiers.len(), 1);
        assert_eq!(notifiers[0].kind(), NotifierKind::Log);
    }

    #[test]
    fn test_unregistered_kind_is_config_error() {
        let registry = NotifierRegistry::with_builtin();
        let config = ZcnotifyConfig::new(vec![NotifierKind::Email]);

        let err = registry.create_notifiers(&config).err().unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_no_kinds_is_config_error() {
        let registry = NotifierRegistry::with_builtin();
        let config = ZcnotifyConfig::new(Vec::new());

        assert!(registry.create_notifiers(&config).is_err());
    }
}
