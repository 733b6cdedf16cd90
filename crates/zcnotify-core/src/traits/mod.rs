//! Core traits for the zcnotify system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`Discoverer`]: Browse for service advertisements
//! - [`Notifier`]: Deliver change events to an outward sink

pub mod discoverer;
pub mod notifier;

pub use discoverer::{
    AddressFamily, BrowseQuery, DEFAULT_DOMAIN, DEFAULT_SERVICE, Discoverer, InterfaceSelection,
};
pub use notifier::{Notifier, NotifierFactory, NotifierKind};
