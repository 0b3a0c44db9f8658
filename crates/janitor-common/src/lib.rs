//! janitor-common - Shared types and utilities
//!
//! This crate provides the vocabulary shared by the engine, the operator
//! binary and test helpers, without any storage or runtime dependencies.
//!
//! ## Modules
//!
//! - [`action`]: Lifecycle transition vocabulary
//! - [`clock`]: Time source abstraction
//! - [`defaults`]: Default configuration values
//! - [`metrics`]: Metric names and tag keys
//! - [`namespace`]: Work configuration namespace formatting and parsing
//! - [`resource_kind`]: Closed set of resource type tags
//! - [`tags`]: Cloud resource tag constants

pub mod action;
pub mod clock;
pub mod defaults;
pub mod metrics;
pub mod namespace;
pub mod resource_kind;
pub mod tags;

// Re-export commonly used types
pub use action::Action;
pub use clock::{Clock, FixedClock, SystemClock};
pub use namespace::{Namespace, NamespaceError};
pub use resource_kind::{ResourceKind, UnknownResourceKind};

/// Get the current timestamp in milliseconds since UNIX epoch.
///
/// Returns 0 if system time is before the epoch (should never happen in practice).
#[inline]
pub fn timestamp_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
