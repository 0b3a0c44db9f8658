//! Cloud resource types the janitor knows how to clean up
//!
//! A closed set of type tags. Rules, exclusion policies and handlers
//! declare which kinds they apply to instead of inspecting concrete types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Types of cloud resources managed by the janitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    /// Block storage volume
    Volume,
    /// Machine image
    Image,
    /// Launch configuration referenced by server groups
    LaunchConfiguration,
    /// Autoscaling server group
    ServerGroup,
    /// Volume snapshot
    Snapshot,
}

/// Returned when a resource type string is not one of the known kinds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown resource type: {0}")]
pub struct UnknownResourceKind(pub String);

impl ResourceKind {
    /// All known kinds, in declaration order
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Volume,
        ResourceKind::Image,
        ResourceKind::LaunchConfiguration,
        ResourceKind::ServerGroup,
        ResourceKind::Snapshot,
    ];

    /// Canonical identifier used in namespaces, storage and metrics tags
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Volume => "volume",
            ResourceKind::Image => "image",
            ResourceKind::LaunchConfiguration => "launchConfiguration",
            ResourceKind::ServerGroup => "serverGroup",
            ResourceKind::Snapshot => "snapshot",
        }
    }

    /// Lower-case, space separated form for human-facing text
    pub fn display_name(self) -> &'static str {
        match self {
            ResourceKind::Volume => "volume",
            ResourceKind::Image => "image",
            ResourceKind::LaunchConfiguration => "launch configuration",
            ResourceKind::ServerGroup => "server group",
            ResourceKind::Snapshot => "snapshot",
        }
    }

    /// Parse from the canonical identifier (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = UnknownResourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownResourceKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_canonical_names() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            ResourceKind::parse("LAUNCHCONFIGURATION"),
            Some(ResourceKind::LaunchConfiguration)
        );
        assert_eq!(ResourceKind::parse("bucket"), None);
    }

    #[test]
    fn test_from_str_error() {
        let err = "bucket".parse::<ResourceKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown resource type: bucket");
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_string(&ResourceKind::ServerGroup).unwrap();
        assert_eq!(json, "\"serverGroup\"");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            ResourceKind::LaunchConfiguration.display_name(),
            "launch configuration"
        );
    }
}
