//! Lifecycle transition vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;

/// A lifecycle transition applied to a resource.
///
/// `Mark`, `Notify` and `Delete` are also the dispatchable actions placed on
/// the work queue; the others are only ever produced as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Mark,
    Unmark,
    Delete,
    Notify,
    #[serde(rename = "OPTOUT", alias = "OPT_OUT")]
    OptOut,
    Exclude,
}

impl Action {
    /// Actions that are scheduled as units of work
    pub const DISPATCHABLE: [Action; 3] = [Action::Mark, Action::Notify, Action::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Mark => "MARK",
            Action::Unmark => "UNMARK",
            Action::Delete => "DELETE",
            Action::Notify => "NOTIFY",
            Action::OptOut => "OPTOUT",
            Action::Exclude => "EXCLUDE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MARK" => Some(Action::Mark),
            "UNMARK" => Some(Action::Unmark),
            "DELETE" => Some(Action::Delete),
            "NOTIFY" => Some(Action::Notify),
            "OPTOUT" | "OPT_OUT" => Some(Action::OptOut),
            "EXCLUDE" => Some(Action::Exclude),
            _ => None,
        }
    }

    /// Whether this action can be placed on the work queue
    pub fn is_dispatchable(self) -> bool {
        Self::DISPATCHABLE.contains(&self)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
