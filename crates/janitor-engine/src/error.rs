//! Typed errors for the engine
//!
//! Each error family maps onto one failure policy: configuration errors are
//! fatal at startup, everything else is logged, counted and retried on the
//! next scheduled cycle.

use chrono::NaiveTime;
use janitor_common::{NamespaceError, ResourceKind};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration problems, raised only while loading or validating
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("schedule start time {start} is after end time {end}")]
    InvalidScheduleWindow { start: NaiveTime, end: NaiveTime },

    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTimeOfDay(String),

    #[error("invalid time zone '{0}', expected UTC or an offset like +02:00")]
    InvalidZone(String),

    #[error("unknown rule '{rule}' configured for {resource_type}")]
    UnknownRule {
        rule: String,
        resource_type: ResourceKind,
    },

    #[error("rule '{rule}' does not apply to {resource_type}")]
    InapplicableRule {
        rule: String,
        resource_type: ResourceKind,
    },

    #[error("{resource_type} is enabled but has no rules configured")]
    MissingRules { resource_type: ResourceKind },

    #[error("retention days for {resource_type} must be greater than zero")]
    ZeroRetention { resource_type: ResourceKind },

    #[error("invalid pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("duplicate work configuration {0}")]
    DuplicateNamespace(String),

    #[error(transparent)]
    Namespace(#[from] NamespaceError),
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }
}

/// A rule failed on a single resource
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {rule} failed on {resource_id}: {message}")]
    Failed {
        rule: String,
        resource_id: String,
        message: String,
    },

    #[error("rule {rule} panicked on {resource_id}")]
    Panicked { rule: String, resource_id: String },
}

impl RuleError {
    pub fn rule(&self) -> &str {
        match self {
            RuleError::Failed { rule, .. } | RuleError::Panicked { rule, .. } => rule,
        }
    }
}

/// Shared store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("failed to (de)serialize stored record")]
    Serialization(#[from] serde_json::Error),
}

/// Lock service failures
///
/// A lock held by another worker is not an error; acquisition reports it as
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock service unavailable while handling lock {name}")]
    Unavailable {
        name: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Failures that abort one work configuration's cycle
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("provider call failed for {namespace}")]
    Provider {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("pre-processing candidates failed for {namespace}")]
    PreProcess {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no handler accepts {namespace}")]
    Unhandled { namespace: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Notification delivery failures
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("failed to notify {recipient}")]
    Transport {
        recipient: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Failures of a queue drain or refill
#[derive(Debug, Error)]
pub enum WorkError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),
}
