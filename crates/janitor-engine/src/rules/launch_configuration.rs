use super::Rule;
use super::details::{HAS_IMAGE, IS_USED_BY_SERVER_GROUPS};
use crate::error::RuleError;
use crate::model::{Resource, ResourceSpec, RuleDefinition, Summary};
use janitor_common::ResourceKind;

/// Launch configurations no server group references
#[derive(Debug, Default, Clone, Copy)]
pub struct NoServerGroupRule;

impl Rule for NoServerGroupRule {
    fn name(&self) -> &'static str {
        "NoServerGroupRule"
    }

    fn applicable_for_type(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::LaunchConfiguration
    }

    fn apply(
        &self,
        resource: &Resource,
        _definition: &RuleDefinition,
    ) -> Result<Option<Summary>, RuleError> {
        if resource.details.flag(IS_USED_BY_SERVER_GROUPS) {
            return Ok(None);
        }

        Ok(Some(Summary::new(
            format!(
                "Launch Configuration {} has no server groups",
                resource.resource_id
            ),
            self.name(),
        )))
    }
}

/// Launch configurations whose image no longer exists
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImageRule;

impl Rule for NoImageRule {
    fn name(&self) -> &'static str {
        "NoImageRule"
    }

    fn applicable_for_type(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::LaunchConfiguration
    }

    fn apply(
        &self,
        resource: &Resource,
        _definition: &RuleDefinition,
    ) -> Result<Option<Summary>, RuleError> {
        if resource.details.flag(HAS_IMAGE) {
            return Ok(None);
        }

        let image = match &resource.spec {
            ResourceSpec::LaunchConfiguration {
                image_id: Some(image_id),
            } => image_id.as_str(),
            _ => "<none>",
        };

        Ok(Some(Summary::new(
            format!(
                "Launch Configuration {}'s image {} does not exist.",
                resource.resource_id, image
            ),
            self.name(),
        )))
    }
}
