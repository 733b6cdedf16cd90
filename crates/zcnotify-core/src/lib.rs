// # zcnotify-core
//
// Core library for the zeroconf change notifier.
//
// ## Architecture Overview
//
// This library watches a zeroconf service type and reports what changed:
// - **Discoverer**: Trait for one budgeted browse of the local network
// - **RetainedSnapshots / diff**: Set difference between two scans
// - **ScanScheduler**: Periodic loop that browses, diffs and publishes
// - **ChangeDispatcher**: Fans each change out to every notifier
// - **Notifier**: Trait for delivering a change to a sink
// - **NotifierRegistry**: Plugin-based registry for notifiers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from back-ends
// 2. **Bounded Handoff**: The scheduler never runs more than one event ahead
// 3. **Plugin-Based**: Notifiers are registered by kind, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod differ;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod notifiers;
pub mod registry;
pub mod scheduler;
pub mod traits;

// Re-export core types for convenience
pub use config::{EmailConfig, EngineConfig, InterfaceConfig, ZcnotifyConfig, ZeroconfConfig};
pub use differ::{RetainedSnapshots, diff};
pub use dispatcher::{ChangeDispatcher, DispatchReport, ShutdownPolicy};
pub use error::{Error, Result};
pub use model::{ChangeEvent, ChangeKind, ServiceSnapshot};
pub use notifiers::LogNotifier;
pub use registry::NotifierRegistry;
pub use scheduler::{RetryPolicy, ScanEvent, ScanScheduler, ScanSettings};
pub use traits::{BrowseQuery, Discoverer, Notifier, NotifierFactory, NotifierKind};
