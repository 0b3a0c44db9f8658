//! Namespaces identify one unit of cleanup work
//!
//! Format: `{cloud_provider}:{account}:{location}:{resource_type}`,
//! e.g. `aws:prod:us-east-1:volume`.

use crate::resource_kind::ResourceKind;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Parsed form of a work configuration namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub cloud_provider: String,
    pub account: String,
    pub location: String,
    pub resource_type: ResourceKind,
}

/// Namespace parse failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("namespace '{0}' must have exactly 4 ':'-separated parts")]
    WrongShape(String),

    #[error("namespace '{namespace}' has an empty {part}")]
    EmptyPart {
        namespace: String,
        part: &'static str,
    },

    #[error("namespace '{namespace}' has unknown resource type '{resource_type}'")]
    UnknownResourceType {
        namespace: String,
        resource_type: String,
    },
}

impl Namespace {
    pub fn new(
        cloud_provider: impl Into<String>,
        account: impl Into<String>,
        location: impl Into<String>,
        resource_type: ResourceKind,
    ) -> Self {
        Self {
            cloud_provider: cloud_provider.into(),
            account: account.into(),
            location: location.into(),
            resource_type,
        }
    }

    pub fn parse(s: &str) -> Result<Self, NamespaceError> {
        let parts: Vec<&str> = s.split(':').collect();
        let [cloud_provider, account, location, resource_type] = parts.as_slice() else {
            return Err(NamespaceError::WrongShape(s.to_string()));
        };

        for (part, name) in [
            (cloud_provider, "cloud provider"),
            (account, "account"),
            (location, "location"),
        ] {
            if part.is_empty() {
                return Err(NamespaceError::EmptyPart {
                    namespace: s.to_string(),
                    part: name,
                });
            }
        }

        let resource_type =
            ResourceKind::parse(resource_type).ok_or_else(|| NamespaceError::UnknownResourceType {
                namespace: s.to_string(),
                resource_type: resource_type.to_string(),
            })?;

        Ok(Self::new(*cloud_provider, *account, *location, resource_type))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.cloud_provider, self.account, self.location, self.resource_type
        )
    }
}

impl FromStr for Namespace {
    type Err = NamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
