use super::Rule;
use crate::error::RuleError;
use crate::model::{Resource, ResourceSpec, RuleDefinition, Summary};
use janitor_common::ResourceKind;

/// Server groups without any load balancer
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroLoadBalancerRule;

impl Rule for ZeroLoadBalancerRule {
    fn name(&self) -> &'static str {
        "ZeroLoadBalancerRule"
    }

    fn applicable_for_type(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::ServerGroup
    }

    fn apply(
        &self,
        resource: &Resource,
        _definition: &RuleDefinition,
    ) -> Result<Option<Summary>, RuleError> {
        match &resource.spec {
            ResourceSpec::ServerGroup {
                load_balancer_names,
                ..
            } if load_balancer_names.is_empty() => Ok(Some(Summary::new(
                format!("Server Group {} has no load balancers.", resource.resource_id),
                self.name(),
            ))),
            ResourceSpec::ServerGroup { .. } => Ok(None),
            _ => Err(RuleError::Failed {
                rule: self.name().to_string(),
                resource_id: resource.resource_id.clone(),
                message: "resource carries no server group details".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_group(load_balancers: Vec<&str>) -> Resource {
        Resource::new("testapp-v001", ResourceKind::ServerGroup).with_spec(ResourceSpec::ServerGroup {
            load_balancer_names: load_balancers.into_iter().map(String::from).collect(),
            launch_configuration_name: Some("testapp-v001-1".to_string()),
        })
    }

    #[test]
    fn test_matches_without_load_balancers() {
        let definition = RuleDefinition::named("ZeroLoadBalancerRule");
        assert!(
            ZeroLoadBalancerRule
                .apply(&server_group(vec![]), &definition)
                .unwrap()
                .is_some()
        );
        assert!(
            ZeroLoadBalancerRule
                .apply(&server_group(vec!["lb"]), &definition)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_fails_without_server_group_details() {
        let resource = Resource::new("testapp-v001", ResourceKind::ServerGroup);
        let result = ZeroLoadBalancerRule.apply(&resource, &RuleDefinition::named("ZeroLoadBalancerRule"));
        assert!(matches!(result, Err(RuleError::Failed { .. })));
    }
}
