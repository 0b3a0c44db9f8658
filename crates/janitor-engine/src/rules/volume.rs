use super::Rule;
use super::details::{ATTACHED_TO_INSTANCES, SEEN_IN_USE_RECENTLY, USED_BY_SNAPSHOT};
use crate::error::RuleError;
use crate::model::{Resource, RuleDefinition, Summary};
use janitor_common::ResourceKind;

/// Volumes that nothing uses
///
/// A volume is orphaned unless pre-processing found it attached, backing a
/// snapshot, or seen in use within the out-of-use threshold.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrphanedVolumeRule;

impl Rule for OrphanedVolumeRule {
    fn name(&self) -> &'static str {
        "OrphanedVolumeRule"
    }

    fn applicable_for_type(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::Volume
    }

    fn apply(
        &self,
        resource: &Resource,
        _definition: &RuleDefinition,
    ) -> Result<Option<Summary>, RuleError> {
        let in_use = [ATTACHED_TO_INSTANCES, USED_BY_SNAPSHOT, SEEN_IN_USE_RECENTLY]
            .iter()
            .any(|key| resource.details.flag(key));
        if in_use {
            return Ok(None);
        }

        Ok(Some(Summary::new(
            "Volume is not attached to an instance and is not used by a snapshot.",
            self.name(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> Resource {
        Resource::new("vol-1", ResourceKind::Volume)
    }

    #[test]
    fn test_orphaned_volume_matches() {
        let summary = OrphanedVolumeRule
            .apply(&volume(), &RuleDefinition::named("OrphanedVolumeRule"))
            .unwrap();
        assert_eq!(summary.unwrap().rule_name, "OrphanedVolumeRule");
    }

    #[test]
    fn test_any_usage_fact_prevents_match() {
        for key in [ATTACHED_TO_INSTANCES, USED_BY_SNAPSHOT, SEEN_IN_USE_RECENTLY] {
            let mut resource = volume();
            resource.details.set_flag(key, true);
            let result = OrphanedVolumeRule
                .apply(&resource, &RuleDefinition::named("OrphanedVolumeRule"))
                .unwrap();
            assert!(result.is_none(), "{key} should prevent a match");
        }
    }

    #[test]
    fn test_false_facts_do_not_prevent_match() {
        let mut resource = volume();
        resource.details.set_flag(ATTACHED_TO_INSTANCES, false);
        let result = OrphanedVolumeRule
            .apply(&resource, &RuleDefinition::named("OrphanedVolumeRule"))
            .unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let resource = volume();
        let definition = RuleDefinition::named("OrphanedVolumeRule");
        let first = OrphanedVolumeRule.apply(&resource, &definition).unwrap();
        let second = OrphanedVolumeRule.apply(&resource, &definition).unwrap();
        assert_eq!(first, second);
    }
}
