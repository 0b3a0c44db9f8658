//! Rule and exclusion evaluation
//!
//! Exclusions run first and short-circuit. Otherwise every configured rule
//! applicable to the resource type runs, and matches are combined according
//! to the configuration's [`RuleCombination`].

use crate::error::RuleError;
use crate::exclusions::{Excludable, ExclusionPolicy, should_be_excluded};
use crate::model::{Resource, RuleCombination, Summary, WorkConfiguration};
use crate::rules::RuleRegistry;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, trace};

/// Result of evaluating one resource
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EligibilityResult {
    pub excluded: bool,
    pub reason: Option<String>,
    pub eligible: bool,
    pub matched_summaries: Vec<Summary>,
}

impl EligibilityResult {
    fn excluded(reason: String) -> Self {
        Self {
            excluded: true,
            reason: Some(reason),
            ..Self::default()
        }
    }
}

/// Decides whether a resource is a cleanup candidate
#[derive(Clone)]
pub struct Evaluator {
    policies: Vec<Arc<dyn ExclusionPolicy>>,
    rules: RuleRegistry,
}

impl Evaluator {
    pub fn new(policies: Vec<Arc<dyn ExclusionPolicy>>, rules: RuleRegistry) -> Self {
        Self { policies, rules }
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Run exclusions against any excludable, e.g. an account
    pub fn exclusion_reason(
        &self,
        excludable: &dyn Excludable,
        config: &WorkConfiguration,
    ) -> Option<String> {
        should_be_excluded(&self.policies, excludable, &config.exclusions).map(|r| r.reason)
    }

    /// Evaluate one resource
    ///
    /// A failing or panicking rule fails the whole evaluation for this
    /// resource; callers treat that as not eligible for this pass.
    pub fn evaluate(
        &self,
        resource: &Resource,
        config: &WorkConfiguration,
    ) -> Result<EligibilityResult, RuleError> {
        if let Some(result) = should_be_excluded(&self.policies, resource, &config.exclusions) {
            debug!(
                resource_id = %resource.resource_id,
                policy = result.policy,
                reason = %result.reason,
                "Resource excluded"
            );
            return Ok(EligibilityResult::excluded(result.reason));
        }

        let mut applicable = 0usize;
        let mut matched_summaries = Vec::new();

        for definition in &config.rules {
            let Some(rule) = self.rules.get(&definition.name) else {
                debug!(rule = %definition.name, "Skipping unknown rule");
                continue;
            };
            if !rule.applicable_for_type(resource.resource_type) {
                continue;
            }
            applicable += 1;

            let outcome = catch_unwind(AssertUnwindSafe(|| rule.apply(resource, definition)))
                .map_err(|_| RuleError::Panicked {
                    rule: rule.name().to_string(),
                    resource_id: resource.resource_id.clone(),
                })?;

            if let Some(summary) = outcome? {
                trace!(resource_id = %resource.resource_id, rule = rule.name(), "Rule matched");
                matched_summaries.push(summary);
            }
        }

        let eligible = match config.rule_combination {
            RuleCombination::Any => !matched_summaries.is_empty(),
            RuleCombination::All => applicable > 0 && matched_summaries.len() == applicable,
        };

        Ok(EligibilityResult {
            excluded: false,
            reason: None,
            eligible,
            matched_summaries: if eligible {
                matched_summaries
            } else {
                Vec::new()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusions::{Attribute, Exclusion, ExclusionType, default_policies};
    use crate::model::{Account, RuleDefinition};
    use crate::rules::{MockRule, details};
    use janitor_common::ResourceKind;

    fn config(rules: Vec<&str>, combination: RuleCombination) -> WorkConfiguration {
        let mut config = WorkConfiguration::new(
            "aws",
            Account::new("test", None),
            "us-east-1",
            ResourceKind::Volume,
        );
        config.rules = rules.into_iter().map(RuleDefinition::named).collect();
        config.rule_combination = combination;
        config
    }

    fn evaluator() -> Evaluator {
        Evaluator::new(default_policies(), RuleRegistry::with_defaults())
    }

    fn volume() -> Resource {
        Resource::new("vol-1", ResourceKind::Volume).with_name("data")
    }

    #[test]
    fn test_orphaned_volume_is_eligible() {
        let result = evaluator()
            .evaluate(&volume(), &config(vec!["OrphanedVolumeRule"], RuleCombination::Any))
            .unwrap();
        assert!(result.eligible);
        assert!(!result.excluded);
        assert_eq!(result.matched_summaries.len(), 1);
    }

    #[test]
    fn test_exclusion_short_circuits() {
        let mut config = config(vec!["OrphanedVolumeRule"], RuleCombination::Any);
        config.exclusions = vec![Exclusion::new(
            ExclusionType::Literal,
            vec![Attribute::new("name", vec!["data"])],
        )];

        let result = evaluator().evaluate(&volume(), &config).unwrap();
        assert!(result.excluded);
        assert!(!result.eligible);
        assert!(result.reason.is_some());
    }

    #[test]
    fn test_all_combination_requires_every_rule() {
        let mut registry = RuleRegistry::with_defaults();
        let mut never = MockRule::new();
        never.expect_name().return_const("NeverRule");
        never.expect_applicable_for_type().return_const(true);
        never.expect_apply().returning(|_, _| Ok(None));
        registry.register(Arc::new(never));

        let evaluator = Evaluator::new(default_policies(), registry);
        let any = evaluator
            .evaluate(
                &volume(),
                &config(vec!["OrphanedVolumeRule", "NeverRule"], RuleCombination::Any),
            )
            .unwrap();
        assert!(any.eligible);

        let all = evaluator
            .evaluate(
                &volume(),
                &config(vec!["OrphanedVolumeRule", "NeverRule"], RuleCombination::All),
            )
            .unwrap();
        assert!(!all.eligible);
        assert!(all.matched_summaries.is_empty());
    }

    #[test]
    fn test_inapplicable_rules_are_ignored() {
        let result = evaluator()
            .evaluate(&volume(), &config(vec!["NoImageRule"], RuleCombination::All))
            .unwrap();
        assert!(!result.eligible);
    }

    #[test]
    fn test_attached_volume_is_not_eligible() {
        let mut resource = volume();
        resource.details.set_flag(details::ATTACHED_TO_INSTANCES, true);
        let result = evaluator()
            .evaluate(&resource, &config(vec!["OrphanedVolumeRule"], RuleCombination::Any))
            .unwrap();
        assert!(!result.eligible);
    }

    #[test]
    fn test_panicking_rule_is_isolated() {
        struct ExplodingRule;

        impl crate::rules::Rule for ExplodingRule {
            fn name(&self) -> &'static str {
                "ExplodingRule"
            }

            fn applicable_for_type(&self, _kind: ResourceKind) -> bool {
                true
            }

            fn apply(
                &self,
                _resource: &Resource,
                _definition: &RuleDefinition,
            ) -> Result<Option<Summary>, RuleError> {
                panic!("rule bug")
            }
        }

        let mut registry = RuleRegistry::new();
        registry.register(Arc::new(ExplodingRule));

        let evaluator = Evaluator::new(default_policies(), registry);
        let result = evaluator.evaluate(&volume(), &config(vec!["ExplodingRule"], RuleCombination::Any));
        assert!(matches!(result, Err(RuleError::Panicked { .. })));

        // The evaluator is still usable afterwards
        let other = Resource::new("vol-2", ResourceKind::Volume);
        let result = evaluator.evaluate(&other, &config(vec![], RuleCombination::Any)).unwrap();
        assert!(!result.eligible);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let evaluator = evaluator();
        let config = config(vec!["OrphanedVolumeRule"], RuleCombination::Any);
        let first = evaluator.evaluate(&volume(), &config).unwrap();
        let second = evaluator.evaluate(&volume(), &config).unwrap();
        assert_eq!(first, second);
    }
}
