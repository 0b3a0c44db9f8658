use super::{Excludable, Exclusion, ExclusionPolicy, ExclusionType, find_match, of_type};

/// Excludes resources owned by configured applications
///
/// Matches the resource's application grouping against every value of the
/// `application` exclusions, regardless of attribute key.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplicationExclusionPolicy;

impl ExclusionPolicy for ApplicationExclusionPolicy {
    fn name(&self) -> &'static str {
        "ApplicationExclusionPolicy"
    }

    fn apply(&self, excludable: &dyn Excludable, exclusions: &[Exclusion]) -> Option<String> {
        let application = excludable.application()?;
        of_type(exclusions, ExclusionType::Application)
            .flat_map(|exclusion| exclusion.attributes.iter())
            .find_map(|attribute| find_match(application, &attribute.value))
            .map(|matched| {
                format!(
                    "{} belongs to excluded application {} ({})",
                    excludable.identifier(),
                    application,
                    matched
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusions::Attribute;
    use crate::model::Resource;
    use janitor_common::ResourceKind;

    fn exclude_apps(values: Vec<&str>) -> Vec<Exclusion> {
        vec![Exclusion::new(
            ExclusionType::Application,
            vec![Attribute::new("name", values)],
        )]
    }

    #[test]
    fn test_excludes_matching_application() {
        let resource = Resource::new("img-1", ResourceKind::Image).with_application("titus");
        assert!(
            ApplicationExclusionPolicy
                .apply(&resource, &exclude_apps(vec!["pattern:^tit"]))
                .is_some()
        );
    }

    #[test]
    fn test_resource_without_application_is_kept() {
        let resource = Resource::new("img-1", ResourceKind::Image);
        assert!(
            ApplicationExclusionPolicy
                .apply(&resource, &exclude_apps(vec!["titus"]))
                .is_none()
        );
    }
}
