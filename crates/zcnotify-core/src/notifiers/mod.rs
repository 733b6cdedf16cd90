// # Built-in Notifiers
//
// Notifier implementations that need nothing beyond the core crate.
// Network sinks live in their own crates (see `zcnotify-notifier-email`).

pub mod log;

pub use log::{LogNotifier, LogNotifierFactory};
