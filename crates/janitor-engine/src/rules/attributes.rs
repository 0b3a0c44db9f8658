use super::Rule;
use crate::error::RuleError;
use crate::exclusions::{
    Attribute, Exclusion, ExclusionPolicy, ExclusionType, LiteralExclusionPolicy,
};
use crate::model::{Resource, RuleDefinition, Summary};
use janitor_common::ResourceKind;

/// Resources whose attributes match configured values
///
/// Parameters map attribute keys to accepted values, with `pattern:` values
/// treated as regexes:
///
/// ```json
/// {"name": "AttributesRule", "parameters": {"name": ["foo", "pattern:^foo"]}}
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributesRule;

impl Rule for AttributesRule {
    fn name(&self) -> &'static str {
        "AttributesRule"
    }

    fn applicable_for_type(&self, _kind: ResourceKind) -> bool {
        true
    }

    fn apply(
        &self,
        resource: &Resource,
        definition: &RuleDefinition,
    ) -> Result<Option<Summary>, RuleError> {
        if definition.parameters.is_empty() {
            return Ok(None);
        }

        let attributes = definition
            .parameters
            .iter()
            .map(|(key, values)| Attribute {
                key: key.clone(),
                value: values.clone(),
            })
            .collect();
        let exclusions = [Exclusion::new(ExclusionType::Literal, attributes)];

        Ok(LiteralExclusionPolicy
            .apply(resource, &exclusions)
            .map(|_| {
                Summary::new(
                    format!("({}): matched by rule attributes.", resource.resource_id),
                    self.name(),
                )
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_name_literal_and_pattern() {
        let definition = RuleDefinition::named("AttributesRule").with_parameter("name", vec!["foo", "pattern:^bar"]);

        let foo = Resource::new("id-1", ResourceKind::Image).with_name("foo");
        let barn = Resource::new("id-2", ResourceKind::Image).with_name("barn");
        let baz = Resource::new("id-3", ResourceKind::Image).with_name("baz");

        assert!(AttributesRule.apply(&foo, &definition).unwrap().is_some());
        assert!(AttributesRule.apply(&barn, &definition).unwrap().is_some());
        assert!(AttributesRule.apply(&baz, &definition).unwrap().is_none());
    }

    #[test]
    fn test_no_parameters_never_matches() {
        let resource = Resource::new("id-1", ResourceKind::Image).with_name("foo");
        assert!(
            AttributesRule
                .apply(&resource, &RuleDefinition::named("AttributesRule"))
                .unwrap()
                .is_none()
        );
    }
}
