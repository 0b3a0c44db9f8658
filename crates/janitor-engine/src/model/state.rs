//! Durable per-resource audit history

use super::MarkedResource;
use janitor_common::Action;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status name written when an operator clears an opt-out
pub const OPT_OUT_CLEARED: &str = "OPTOUT_CLEARED";

/// One entry of a resource's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub name: String,
    /// Epoch millis
    pub timestamp: i64,
}

impl Status {
    pub fn new(action: Action, timestamp: i64) -> Self {
        Self {
            name: action.as_str().to_string(),
            timestamp,
        }
    }

    pub fn named(name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            timestamp,
        }
    }

    pub fn action(&self) -> Option<Action> {
        Action::parse(&self.name)
    }
}

/// Audit record keyed by `(resource_id, namespace)`
///
/// `statuses` is append-only. `deleted` and `opted_out` only ever go from
/// false to true, except for the operator driven opt-out clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    pub marked_resource: MarkedResource,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub opted_out: bool,
    #[serde(default)]
    pub statuses: Vec<Status>,
    #[serde(default)]
    pub current_status: Option<Status>,
}

/// Where a tracked resource currently sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Marked,
    Notified,
    Unmarked,
    Deleted,
    OptedOut,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Marked => "MARKED",
            Lifecycle::Notified => "NOTIFIED",
            Lifecycle::Unmarked => "UNMARKED",
            Lifecycle::Deleted => "DELETED",
            Lifecycle::OptedOut => "OPTED_OUT",
        })
    }
}

impl ResourceState {
    pub fn new(marked_resource: MarkedResource) -> Self {
        Self {
            marked_resource,
            deleted: false,
            opted_out: false,
            statuses: Vec::new(),
            current_status: None,
        }
    }

    pub fn resource_id(&self) -> &str {
        self.marked_resource.resource_id()
    }

    pub fn namespace(&self) -> &str {
        &self.marked_resource.namespace
    }

    /// Append a status and make it current
    pub fn record(&mut self, status: Status) {
        self.current_status = Some(status.clone());
        self.statuses.push(status);
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.deleted {
            return Lifecycle::Deleted;
        }
        if self.opted_out {
            return Lifecycle::OptedOut;
        }
        match self.current_status.as_ref().and_then(Status::action) {
            Some(Action::Unmark) => Lifecycle::Unmarked,
            _ if self.current_status.as_ref().is_some_and(|s| s.name == OPT_OUT_CLEARED) => {
                Lifecycle::Unmarked
            }
            _ if self.marked_resource.is_notified() => Lifecycle::Notified,
            _ => Lifecycle::Marked,
        }
    }
}
