//! Units of work

use crate::exclusions::Exclusion;
use crate::metrics::tags;
use crate::schedule::Schedule;
use janitor_common::defaults::{
    default_items_per_message, default_max_items_per_cycle, default_owner, default_true,
};
use janitor_common::{Action, Namespace, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Cloud account a work configuration runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
}

impl Account {
    pub fn new(name: impl Into<String>, account_id: Option<&str>) -> Self {
        Self {
            name: name.into(),
            account_id: account_id.map(String::from),
            environment: None,
        }
    }

    /// Provider-facing identifier, falling back to the name
    pub fn id(&self) -> &str {
        self.account_id.as_deref().unwrap_or(&self.name)
    }
}

/// A configured rule and its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Vec<String>>,
}

impl RuleDefinition {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, values: Vec<&str>) -> Self {
        self.parameters
            .insert(key.into(), values.into_iter().map(String::from).collect());
        self
    }
}

/// How matched rules combine into eligibility
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCombination {
    /// Any applicable rule matching makes the resource eligible
    #[default]
    Any,
    /// Every applicable rule must match
    All,
}

/// Owner notification settings of one resource type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Channels handed to the notifier, e.g. `email`
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default = "default_items_per_message")]
    pub items_per_message: usize,
    #[serde(default = "default_owner")]
    pub default_owner: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            types: vec!["email".to_string()],
            items_per_message: default_items_per_message(),
            default_owner: default_owner(),
        }
    }
}

/// Immutable descriptor of one (resource type, account, location) unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkConfiguration {
    /// `cloud_provider:account:location:resource_type`, the unique key
    pub namespace: String,
    pub account: Account,
    pub location: String,
    pub resource_type: ResourceKind,
    pub cloud_provider: String,
    pub retention_days: u32,
    pub out_of_use_threshold_days: u32,
    #[serde(default = "default_max_items_per_cycle")]
    pub max_items_per_cycle: usize,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub rule_combination: RuleCombination,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
    #[serde(default)]
    pub notification: NotificationSettings,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub dry_run: bool,
}

impl WorkConfiguration {
    /// Minimal configuration with defaults, mostly for wiring and tests
    pub fn new(
        cloud_provider: &str,
        account: Account,
        location: &str,
        resource_type: ResourceKind,
    ) -> Self {
        let namespace = Namespace::new(cloud_provider, &account.name, location, resource_type);
        Self {
            namespace: namespace.to_string(),
            account,
            location: location.to_string(),
            resource_type,
            cloud_provider: cloud_provider.to_string(),
            retention_days: janitor_common::defaults::DEFAULT_RETENTION_DAYS,
            out_of_use_threshold_days: janitor_common::defaults::DEFAULT_OUT_OF_USE_THRESHOLD_DAYS,
            max_items_per_cycle: default_max_items_per_cycle(),
            rules: Vec::new(),
            rule_combination: RuleCombination::Any,
            exclusions: Vec::new(),
            notification: NotificationSettings::default(),
            schedule: Schedule::default(),
            dry_run: false,
        }
    }

    pub fn retention_millis(&self) -> i64 {
        i64::from(self.retention_days) * MILLIS_PER_DAY
    }

    /// Tags attached to every per-configuration metric
    pub fn metric_tags(&self) -> [(&'static str, &str); 2] {
        [
            (tags::CONFIGURATION, self.namespace.as_str()),
            (tags::RESOURCE_TYPE, self.resource_type.as_str()),
        ]
    }
}

/// One scheduled `(configuration, action)` dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub work_configuration: WorkConfiguration,
    pub action: Action,
}

impl WorkItem {
    pub fn new(work_configuration: WorkConfiguration, action: Action) -> Self {
        Self {
            work_configuration,
            action,
        }
    }

    /// `{namespace}/{action}`
    pub fn id(&self) -> String {
        format!("{}/{}", self.work_configuration.namespace, self.action)
    }

    /// One item per configuration and dispatchable action
    pub fn all_for(configurations: &[WorkConfiguration]) -> Vec<WorkItem> {
        configurations
            .iter()
            .flat_map(|config| {
                Action::DISPATCHABLE
                    .into_iter()
                    .map(move |action| WorkItem::new(config.clone(), action))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkConfiguration {
        WorkConfiguration::new(
            "aws",
            Account::new("test", Some("123")),
            "us-east-1",
            ResourceKind::Volume,
        )
    }

    #[test]
    fn test_namespace_format() {
        assert_eq!(config().namespace, "aws:test:us-east-1:volume");
        assert_eq!(config().account.id(), "123");
        assert_eq!(Account::new("named", None).id(), "named");
    }

    #[test]
    fn test_all_for_covers_dispatchable_actions() {
        let items = WorkItem::all_for(&[config()]);
        let ids: Vec<String> = items.iter().map(WorkItem::id).collect();
        assert_eq!(
            ids,
            vec![
                "aws:test:us-east-1:volume/MARK",
                "aws:test:us-east-1:volume/NOTIFY",
                "aws:test:us-east-1:volume/DELETE",
            ]
        );
    }

    #[test]
    fn test_work_item_roundtrip() {
        let item = WorkItem::new(config(), Action::Delete);
        let json = serde_json::to_string(&item).unwrap();
        let back: WorkItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_rule_combination_default_any() {
        let json = r#"{"name": "OrphanedVolumeRule"}"#;
        let rule: RuleDefinition = serde_json::from_str(json).unwrap();
        assert!(rule.parameters.is_empty());
        assert_eq!(RuleCombination::default(), RuleCombination::Any);
    }
}
