//! Cleanup rules
//!
//! A rule flags a resource as a cleanup candidate by returning a
//! [`Summary`]. Rules read facts that pre-processors recorded in the
//! resource's detail map and never write to it.

mod attributes;
mod launch_configuration;
mod server_group;
mod volume;

pub use attributes::AttributesRule;
pub use launch_configuration::{NoImageRule, NoServerGroupRule};
pub use server_group::ZeroLoadBalancerRule;
pub use volume::OrphanedVolumeRule;

use crate::error::RuleError;
use crate::model::{Resource, RuleDefinition, Summary};
use janitor_common::ResourceKind;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Detail keys written by pre-processors and read by rules
pub mod details {
    pub const ATTACHED_TO_INSTANCES: &str = "attachedToInstances";
    pub const USED_BY_SNAPSHOT: &str = "usedBySnapshot";
    pub const SEEN_IN_USE_RECENTLY: &str = "seenInUseRecently";
    pub const IS_USED_BY_SERVER_GROUPS: &str = "isUsedByServerGroups";
    pub const HAS_IMAGE: &str = "hasImage";
}

/// A cleanup predicate over one resource type family
#[cfg_attr(test, mockall::automock)]
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    fn applicable_for_type(&self, kind: ResourceKind) -> bool;

    /// `Ok(Some(summary))` when the resource violates the rule
    fn apply(
        &self,
        resource: &Resource,
        definition: &RuleDefinition,
    ) -> Result<Option<Summary>, RuleError>;
}

/// Rules available to configurations, looked up by name
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: BTreeMap<String, Arc<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in rule
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OrphanedVolumeRule));
        registry.register(Arc::new(NoServerGroupRule));
        registry.register(Arc::new(NoImageRule));
        registry.register(Arc::new(ZeroLoadBalancerRule));
        registry.register(Arc::new(AttributesRule));
        registry
    }

    pub fn register(&mut self, rule: Arc<dyn Rule>) {
        self.rules.insert(rule.name().to_string(), rule);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Rule>> {
        self.rules.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.rules.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_registered() {
        let registry = RuleRegistry::with_defaults();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "AttributesRule",
                "NoImageRule",
                "NoServerGroupRule",
                "OrphanedVolumeRule",
                "ZeroLoadBalancerRule",
            ]
        );
        assert!(registry.get("OrphanedVolumeRule").is_some());
        assert!(registry.get("MadeUpRule").is_none());
    }

    #[test]
    fn test_applicability() {
        let registry = RuleRegistry::with_defaults();
        let volume_rule = registry.get("OrphanedVolumeRule").unwrap();
        assert!(volume_rule.applicable_for_type(ResourceKind::Volume));
        assert!(!volume_rule.applicable_for_type(ResourceKind::Image));

        let attributes = registry.get("AttributesRule").unwrap();
        assert!(
            ResourceKind::ALL
                .iter()
                .all(|kind| attributes.applicable_for_type(*kind))
        );
    }
}
