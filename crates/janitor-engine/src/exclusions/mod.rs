//! Exclusion policies
//!
//! An exclusion unconditionally removes a resource from consideration before
//! any rule runs. Policies are selected by the [`ExclusionType`] of each
//! configured [`Exclusion`]; the first policy to return a reason wins.

mod account;
mod allowlist;
mod application;
mod literal;
mod tag;

pub use account::AccountExclusionPolicy;
pub use allowlist::AllowListExclusionPolicy;
pub use application::ApplicationExclusionPolicy;
pub use literal::LiteralExclusionPolicy;
pub use tag::TagExclusionPolicy;

use crate::error::ConfigError;
use crate::model::{Account, Resource};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Prefix marking a configured value as a regular expression
pub const PATTERN_PREFIX: &str = "pattern:";

/// Kind of exclusion, which selects the policy that evaluates it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExclusionType {
    Literal,
    Allowlist,
    Application,
    Account,
    Tag,
}

/// Key and accepted values of an exclusion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    #[serde(default)]
    pub value: Vec<String>,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: Vec<&str>) -> Self {
        Self {
            key: key.into(),
            value: value.into_iter().map(String::from).collect(),
        }
    }
}

/// One configured exclusion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    #[serde(rename = "type")]
    pub kind: ExclusionType,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Exclusion {
    pub fn new(kind: ExclusionType, attributes: Vec<Attribute>) -> Self {
        Self { kind, attributes }
    }

    /// Compile every `pattern:` value so bad regexes fail at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        for value in self.attributes.iter().flat_map(|a| a.value.iter()) {
            if let Some(pattern) = value.strip_prefix(PATTERN_PREFIX) {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

/// Something an exclusion policy can be applied to
pub trait Excludable {
    fn identifier(&self) -> &str;
    fn attribute(&self, key: &str) -> Option<String>;

    fn application(&self) -> Option<&str> {
        None
    }

    fn tag(&self, _key: &str) -> Option<&str> {
        None
    }

    fn tags(&self) -> Vec<(&str, &str)> {
        Vec::new()
    }
}

impl Excludable for Resource {
    fn identifier(&self) -> &str {
        &self.resource_id
    }

    fn attribute(&self, key: &str) -> Option<String> {
        Resource::attribute(self, key)
    }

    fn application(&self) -> Option<&str> {
        Resource::application(self)
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    fn tags(&self) -> Vec<(&str, &str)> {
        self.tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

impl Excludable for Account {
    fn identifier(&self) -> &str {
        &self.name
    }

    fn attribute(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.name.clone()),
            "accountId" | "id" => self.account_id.clone(),
            "environment" => self.environment.clone(),
            _ => None,
        }
    }
}

/// A filter that may exclude an [`Excludable`]
pub trait ExclusionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reason the excludable is excluded, or `None`
    fn apply(&self, excludable: &dyn Excludable, exclusions: &[Exclusion]) -> Option<String>;
}

/// Outcome of running every policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionResult {
    pub policy: &'static str,
    pub reason: String,
}

/// Run policies in order, stopping at the first reason
pub fn should_be_excluded(
    policies: &[Arc<dyn ExclusionPolicy>],
    excludable: &dyn Excludable,
    exclusions: &[Exclusion],
) -> Option<ExclusionResult> {
    policies.iter().find_map(|policy| {
        policy
            .apply(excludable, exclusions)
            .map(|reason| ExclusionResult {
                policy: policy.name(),
                reason,
            })
    })
}

/// Every built-in policy in evaluation order
pub fn default_policies() -> Vec<Arc<dyn ExclusionPolicy>> {
    vec![
        Arc::new(TagExclusionPolicy),
        Arc::new(AccountExclusionPolicy),
        Arc::new(ApplicationExclusionPolicy),
        Arc::new(LiteralExclusionPolicy),
        Arc::new(AllowListExclusionPolicy),
    ]
}

/// Exclusions of one type
pub(crate) fn of_type(
    exclusions: &[Exclusion],
    kind: ExclusionType,
) -> impl Iterator<Item = &Exclusion> {
    exclusions.iter().filter(move |e| e.kind == kind)
}

/// Find the configured value matching `candidate`
///
/// Values are compared case-insensitively; `pattern:` values are regexes.
pub fn find_match<'a>(candidate: &str, values: &'a [String]) -> Option<&'a str> {
    values
        .iter()
        .find(|value| matches_value(candidate, value))
        .map(String::as_str)
}

pub fn matches_value(candidate: &str, value: &str) -> bool {
    match value.strip_prefix(PATTERN_PREFIX) {
        Some(pattern) => match Regex::new(pattern) {
            Ok(regex) => regex.is_match(candidate),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Ignoring invalid exclusion pattern");
                false
            }
        },
        None => candidate.eq_ignore_ascii_case(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use janitor_common::ResourceKind;

    #[test]
    fn test_matches_value() {
        assert!(matches_value("Billing", "billing"));
        assert!(matches_value("billing-prod", "pattern:^billing"));
        assert!(!matches_value("prod-billing", "pattern:^billing"));
        assert!(!matches_value("anything", "pattern:(unclosed"));
    }

    #[test]
    fn test_first_policy_wins() {
        let resource = Resource::new("vol-1", ResourceKind::Volume)
            .with_application("billing")
            .with_tag("expiration_time", "never");
        let exclusions = vec![Exclusion::new(
            ExclusionType::Application,
            vec![Attribute::new("name", vec!["billing"])],
        )];

        let result = should_be_excluded(&default_policies(), &resource, &exclusions).unwrap();
        assert_eq!(result.policy, "TagExclusionPolicy");
    }

    #[test]
    fn test_nothing_excluded_without_matches() {
        let resource = Resource::new("vol-1", ResourceKind::Volume);
        assert!(should_be_excluded(&default_policies(), &resource, &[]).is_none());
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let exclusion = Exclusion::new(
            ExclusionType::Literal,
            vec![Attribute::new("name", vec!["pattern:(oops"])],
        );
        assert!(matches!(
            exclusion.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_exclusion_deserializes_type_field() {
        let json = r#"{"type": "literal", "attributes": [{"key": "name", "value": ["a", "pattern:^b"]}]}"#;
        let exclusion: Exclusion = serde_json::from_str(json).unwrap();
        assert_eq!(exclusion.kind, ExclusionType::Literal);
        assert_eq!(exclusion.attributes[0].value.len(), 2);
    }
}
