use super::{Excludable, Exclusion, ExclusionPolicy, ExclusionType, find_match, of_type};

/// Excludes when an attribute equals (or matches the pattern of) a configured value
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralExclusionPolicy;

impl ExclusionPolicy for LiteralExclusionPolicy {
    fn name(&self) -> &'static str {
        "LiteralExclusionPolicy"
    }

    fn apply(&self, excludable: &dyn Excludable, exclusions: &[Exclusion]) -> Option<String> {
        of_type(exclusions, ExclusionType::Literal)
            .flat_map(|exclusion| exclusion.attributes.iter())
            .find_map(|attribute| {
                let actual = excludable.attribute(&attribute.key)?;
                find_match(&actual, &attribute.value).map(|matched| {
                    format!(
                        "{} {}={} matches excluded value {}",
                        excludable.identifier(),
                        attribute.key,
                        actual,
                        matched
                    )
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusions::Attribute;
    use crate::model::Resource;
    use janitor_common::ResourceKind;

    fn exclusions(key: &str, values: Vec<&str>) -> Vec<Exclusion> {
        vec![Exclusion::new(
            ExclusionType::Literal,
            vec![Attribute::new(key, values)],
        )]
    }

    #[test]
    fn test_excludes_on_exact_name() {
        let resource = Resource::new("lc-1", ResourceKind::LaunchConfiguration).with_name("keep-me");
        let reason = LiteralExclusionPolicy.apply(&resource, &exclusions("name", vec!["keep-me"]));
        assert!(reason.unwrap().contains("keep-me"));
    }

    #[test]
    fn test_excludes_on_pattern() {
        let resource = Resource::new("lc-1", ResourceKind::LaunchConfiguration).with_name("infra-base");
        assert!(
            LiteralExclusionPolicy
                .apply(&resource, &exclusions("name", vec!["pattern:^infra-"]))
                .is_some()
        );
    }

    #[test]
    fn test_missing_attribute_does_not_exclude() {
        let resource = Resource::new("lc-1", ResourceKind::LaunchConfiguration);
        assert!(
            LiteralExclusionPolicy
                .apply(&resource, &exclusions("imageId", vec!["ami-1"]))
                .is_none()
        );
    }

    #[test]
    fn test_ignores_other_exclusion_types() {
        let resource = Resource::new("lc-1", ResourceKind::LaunchConfiguration).with_name("x");
        let other = vec![Exclusion::new(
            ExclusionType::Allowlist,
            vec![Attribute::new("name", vec!["x"])],
        )];
        assert!(LiteralExclusionPolicy.apply(&resource, &other).is_none());
    }
}
