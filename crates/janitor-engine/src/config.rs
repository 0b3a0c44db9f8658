//! Configuration loading from JSON
//!
//! The file describes providers, their accounts and locations, and the
//! resource types to clean in each. [`JanitorConfig::work_configurations`]
//! expands that into one immutable [`WorkConfiguration`] per
//! (provider, account, location, resource type). Everything is validated up
//! front; a config that loads and validates never fails at tick time.

use crate::agent::AgentSettings;
use crate::error::ConfigError;
use crate::exclusions::{AccountExclusionPolicy, Exclusion, ExclusionPolicy};
use crate::model::{Account, NotificationSettings, RuleCombination, RuleDefinition, WorkConfiguration};
use crate::rules::RuleRegistry;
use crate::schedule::Schedule;
use janitor_common::ResourceKind;
use janitor_common::defaults::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Root of the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JanitorConfig {
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub work: WorkSettings,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Exclusions applied to every provider
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Queue processing and locking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSettings {
    #[serde(default = "default_work_interval_secs")]
    pub processor_interval_secs: u64,
    #[serde(default = "default_queue_monitor_interval_secs")]
    pub queue_monitor_interval_secs: u64,
    #[serde(default = "default_max_lock_duration_secs")]
    pub max_lock_duration_secs: u64,
}

impl Default for WorkSettings {
    fn default() -> Self {
        Self {
            processor_interval_secs: DEFAULT_WORK_INTERVAL_SECS,
            queue_monitor_interval_secs: DEFAULT_QUEUE_MONITOR_INTERVAL_SECS,
            max_lock_duration_secs: DEFAULT_MAX_LOCK_DURATION_SECS,
        }
    }
}

impl WorkSettings {
    pub fn max_lock_duration(&self) -> Duration {
        Duration::from_secs(self.max_lock_duration_secs)
    }
}

/// Start delay and fixed delay of one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTiming {
    #[serde(default = "default_agent_delay_secs")]
    pub delay_secs: u64,
    #[serde(default = "default_agent_frequency_secs")]
    pub frequency_secs: u64,
}

impl Default for AgentTiming {
    fn default() -> Self {
        Self {
            delay_secs: DEFAULT_AGENT_DELAY_SECS,
            frequency_secs: DEFAULT_AGENT_FREQUENCY_SECS,
        }
    }
}

/// Timing of the mark, notify and delete agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    #[serde(default)]
    pub mark: AgentTiming,
    #[serde(default)]
    pub notify: AgentTiming,
    #[serde(default)]
    pub delete: AgentTiming,
    #[serde(default = "default_max_concurrent_dispatch")]
    pub max_concurrent_dispatch: usize,
    #[serde(default = "default_cache_poll_interval_secs")]
    pub cache_poll_interval_secs: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            mark: AgentTiming::default(),
            notify: AgentTiming::default(),
            delete: AgentTiming::default(),
            max_concurrent_dispatch: DEFAULT_MAX_CONCURRENT_DISPATCH,
            cache_poll_interval_secs: DEFAULT_CACHE_POLL_INTERVAL_SECS,
        }
    }
}

impl AgentsConfig {
    pub fn settings(&self, timing: &AgentTiming) -> AgentSettings {
        AgentSettings {
            initial_delay: Duration::from_secs(timing.delay_secs),
            frequency: Duration::from_secs(timing.frequency_secs),
            cache_poll_interval: Duration::from_secs(self.cache_poll_interval_secs),
        }
    }

    /// Settings for a plain periodic job
    pub fn periodic(&self, interval_secs: u64) -> AgentSettings {
        AgentSettings {
            initial_delay: Duration::ZERO,
            frequency: Duration::from_secs(interval_secs),
            cache_poll_interval: Duration::from_secs(self.cache_poll_interval_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsConfig {
    #[serde(default = "default_notification_interval_secs")]
    pub interval_secs: u64,
    /// Recipient when no owner can be resolved
    #[serde(default = "default_owner")]
    pub default_owner: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_NOTIFICATION_INTERVAL_SECS,
            default_owner: default_owner(),
        }
    }
}

/// One cloud provider and where it runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default = "default_cloud_provider")]
    pub name: String,
    pub accounts: Vec<Account>,
    pub locations: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
    #[serde(default)]
    pub resource_types: Vec<ResourceTypeConfig>,
}

/// Cleanup policy of one resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTypeConfig {
    pub resource_type: ResourceKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_out_of_use_threshold_days")]
    pub out_of_use_threshold_days: u32,
    #[serde(default = "default_max_items_per_cycle")]
    pub max_items_per_cycle: usize,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub rule_combination: RuleCombination,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
    /// Falls back to defaults with the global default owner
    #[serde(default)]
    pub notification: Option<NotificationSettings>,
    #[serde(default)]
    pub dry_run: bool,
}

impl ResourceTypeConfig {
    pub fn new(resource_type: ResourceKind, rules: Vec<RuleDefinition>) -> Self {
        Self {
            resource_type,
            enabled: true,
            retention_days: DEFAULT_RETENTION_DAYS,
            out_of_use_threshold_days: DEFAULT_OUT_OF_USE_THRESHOLD_DAYS,
            max_items_per_cycle: DEFAULT_MAX_ITEMS_PER_CYCLE,
            rules,
            rule_combination: RuleCombination::default(),
            exclusions: Vec::new(),
            notification: None,
            dry_run: false,
        }
    }

    fn validate(&self, rules: &RuleRegistry) -> Result<(), ConfigError> {
        let resource_type = self.resource_type;
        if self.rules.is_empty() {
            return Err(ConfigError::MissingRules { resource_type });
        }
        if self.retention_days == 0 {
            return Err(ConfigError::ZeroRetention { resource_type });
        }

        for definition in &self.rules {
            let rule = rules
                .get(&definition.name)
                .ok_or_else(|| ConfigError::UnknownRule {
                    rule: definition.name.clone(),
                    resource_type,
                })?;
            if !rule.applicable_for_type(resource_type) {
                return Err(ConfigError::InapplicableRule {
                    rule: definition.name.clone(),
                    resource_type,
                });
            }
        }

        self.exclusions.iter().try_for_each(Exclusion::validate)
    }
}

impl JanitorConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::parse(path, e))
    }

    /// Fail fast on anything that would otherwise surface at tick time
    pub fn validate(&self, rules: &RuleRegistry) -> Result<(), ConfigError> {
        self.schedule.validate()?;
        self.exclusions.iter().try_for_each(Exclusion::validate)?;

        for provider in &self.providers {
            provider.exclusions.iter().try_for_each(Exclusion::validate)?;
            for resource_type in provider.resource_types.iter().filter(|t| t.enabled) {
                resource_type.validate(rules)?;
            }
        }

        let mut seen = HashSet::new();
        for config in self.work_configurations() {
            if !seen.insert(config.namespace.clone()) {
                return Err(ConfigError::DuplicateNamespace(config.namespace));
            }
        }
        Ok(())
    }

    /// Expand enabled resource types across accounts and locations
    ///
    /// Accounts matched by an account exclusion produce no work at all.
    pub fn work_configurations(&self) -> Vec<WorkConfiguration> {
        let mut configurations = Vec::new();

        for provider in &self.providers {
            let provider_exclusions: Vec<Exclusion> = self
                .exclusions
                .iter()
                .chain(&provider.exclusions)
                .cloned()
                .collect();

            for account in &provider.accounts {
                if let Some(reason) = AccountExclusionPolicy.apply(account, &provider_exclusions) {
                    debug!(provider = %provider.name, account = %account.name, reason, "Skipping excluded account");
                    continue;
                }

                for location in &provider.locations {
                    for resource_type in provider.resource_types.iter().filter(|t| t.enabled) {
                        configurations.push(self.work_configuration(
                            provider,
                            &provider_exclusions,
                            account,
                            location,
                            resource_type,
                        ));
                    }
                }
            }
        }

        configurations
    }

    fn work_configuration(
        &self,
        provider: &ProviderConfig,
        provider_exclusions: &[Exclusion],
        account: &Account,
        location: &str,
        resource_type: &ResourceTypeConfig,
    ) -> WorkConfiguration {
        let mut config = WorkConfiguration::new(
            &provider.name,
            account.clone(),
            location,
            resource_type.resource_type,
        );
        config.retention_days = resource_type.retention_days;
        config.out_of_use_threshold_days = resource_type.out_of_use_threshold_days;
        config.max_items_per_cycle = resource_type.max_items_per_cycle;
        config.rules = resource_type.rules.clone();
        config.rule_combination = resource_type.rule_combination;
        config.exclusions = provider_exclusions
            .iter()
            .chain(&resource_type.exclusions)
            .cloned()
            .collect();
        config.notification = resource_type.notification.clone().unwrap_or_else(|| {
            NotificationSettings {
                default_owner: self.notifications.default_owner.clone(),
                ..NotificationSettings::default()
            }
        });
        config.schedule = self.schedule.clone();
        config.dry_run = resource_type.dry_run;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusions::{Attribute, ExclusionType};
    use chrono::NaiveTime;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "schedule": {
            "allowedDaysOfWeek": ["Mon", "Tue", "Wed", "Thu", "Fri"],
            "startTime": "09:00",
            "endTime": "17:00",
            "zone": "UTC"
        },
        "notifications": { "defaultOwner": "cloud-team@example.com" },
        "exclusions": [
            { "type": "account", "attributes": [{ "key": "name", "value": ["sandbox"] }] }
        ],
        "providers": [{
            "name": "aws",
            "accounts": [{ "name": "prod", "accountId": "111122223333" }, { "name": "test" }, { "name": "sandbox" }],
            "locations": ["us-east-1", "eu-west-1"],
            "resourceTypes": [
                {
                    "resourceType": "volume",
                    "retentionDays": 7,
                    "outOfUseThresholdDays": 5,
                    "rules": [{ "name": "OrphanedVolumeRule" }],
                    "exclusions": [{ "type": "tag", "attributes": [{ "key": "keep", "value": ["true"] }] }]
                },
                {
                    "resourceType": "image",
                    "enabled": false
                }
            ]
        }]
    }"#;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn test_load_and_expand() {
        let file = write_config(SAMPLE);
        let config = JanitorConfig::load(file.path()).unwrap();
        config.validate(&RuleRegistry::with_defaults()).unwrap();

        let configurations = config.work_configurations();
        // sandbox is excluded and image is disabled
        assert_eq!(configurations.len(), 4);

        let first = &configurations[0];
        assert_eq!(first.namespace, "aws:prod:us-east-1:volume");
        assert_eq!(first.retention_days, 7);
        assert_eq!(first.out_of_use_threshold_days, 5);
        assert_eq!(first.notification.default_owner, "cloud-team@example.com");
        assert_eq!(first.exclusions.len(), 2);
        assert_eq!(
            first.schedule.end_time,
            NaiveTime::from_hms_opt(17, 0, 0).unwrap()
        );
        assert!(configurations.iter().all(|c| c.account.name != "sandbox"));
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: JanitorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.work, WorkSettings::default());
        assert_eq!(config.agents.max_concurrent_dispatch, DEFAULT_MAX_CONCURRENT_DISPATCH);
        assert!(config.work_configurations().is_empty());
        config.validate(&RuleRegistry::with_defaults()).unwrap();
    }

    #[test]
    fn test_inverted_schedule_window_is_rejected() {
        let mut config = JanitorConfig::default();
        config.schedule.start_time = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        config.schedule.end_time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert!(matches!(
            config.validate(&RuleRegistry::with_defaults()),
            Err(ConfigError::InvalidScheduleWindow { .. })
        ));
    }

    fn with_type(resource_type: ResourceTypeConfig) -> JanitorConfig {
        JanitorConfig {
            providers: vec![ProviderConfig {
                name: "aws".to_string(),
                accounts: vec![Account::new("prod", None)],
                locations: vec!["us-east-1".to_string()],
                exclusions: Vec::new(),
                resource_types: vec![resource_type],
            }],
            ..JanitorConfig::default()
        }
    }

    #[test]
    fn test_rule_problems_are_rejected() {
        let registry = RuleRegistry::with_defaults();

        let missing = with_type(ResourceTypeConfig::new(ResourceKind::Volume, vec![]));
        assert!(matches!(
            missing.validate(&registry),
            Err(ConfigError::MissingRules { .. })
        ));

        let unknown = with_type(ResourceTypeConfig::new(
            ResourceKind::Volume,
            vec![RuleDefinition::named("NoSuchRule")],
        ));
        assert!(matches!(
            unknown.validate(&registry),
            Err(ConfigError::UnknownRule { .. })
        ));

        let inapplicable = with_type(ResourceTypeConfig::new(
            ResourceKind::Image,
            vec![RuleDefinition::named("OrphanedVolumeRule")],
        ));
        assert!(matches!(
            inapplicable.validate(&registry),
            Err(ConfigError::InapplicableRule { .. })
        ));

        let mut disabled = ResourceTypeConfig::new(ResourceKind::Volume, vec![]);
        disabled.enabled = false;
        with_type(disabled).validate(&registry).unwrap();
    }

    #[test]
    fn test_zero_retention_and_bad_pattern_are_rejected() {
        let registry = RuleRegistry::with_defaults();
        let rules = vec![RuleDefinition::named("OrphanedVolumeRule")];

        let mut zero = ResourceTypeConfig::new(ResourceKind::Volume, rules.clone());
        zero.retention_days = 0;
        assert!(matches!(
            with_type(zero).validate(&registry),
            Err(ConfigError::ZeroRetention { .. })
        ));

        let mut bad_pattern = ResourceTypeConfig::new(ResourceKind::Volume, rules);
        bad_pattern.exclusions = vec![Exclusion::new(
            ExclusionType::Literal,
            vec![Attribute::new("name", vec!["pattern:(unclosed"])],
        )];
        assert!(matches!(
            with_type(bad_pattern).validate(&registry),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_duplicate_namespace_is_rejected() {
        let rules = vec![RuleDefinition::named("OrphanedVolumeRule")];
        let mut config = with_type(ResourceTypeConfig::new(ResourceKind::Volume, rules.clone()));
        config.providers[0]
            .resource_types
            .push(ResourceTypeConfig::new(ResourceKind::Volume, rules));
        assert!(matches!(
            config.validate(&RuleRegistry::with_defaults()),
            Err(ConfigError::DuplicateNamespace(_))
        ));
    }

    #[test]
    fn test_missing_file_and_bad_json() {
        assert!(matches!(
            JanitorConfig::load(Path::new("/nonexistent/janitor.json")),
            Err(ConfigError::Io { .. })
        ));
        let file = write_config("{ not json");
        assert!(matches!(
            JanitorConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
