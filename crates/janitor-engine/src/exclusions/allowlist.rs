use super::{Excludable, Exclusion, ExclusionPolicy, ExclusionType, find_match, of_type};

/// Excludes everything that is not on an allow list
///
/// With an allow list configured, a resource is only kept when every listed
/// attribute is present and matches one of the allowed values.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowListExclusionPolicy;

impl ExclusionPolicy for AllowListExclusionPolicy {
    fn name(&self) -> &'static str {
        "AllowListExclusionPolicy"
    }

    fn apply(&self, excludable: &dyn Excludable, exclusions: &[Exclusion]) -> Option<String> {
        of_type(exclusions, ExclusionType::Allowlist)
            .flat_map(|exclusion| exclusion.attributes.iter())
            .find_map(|attribute| match excludable.attribute(&attribute.key) {
                Some(actual) if find_match(&actual, &attribute.value).is_some() => None,
                Some(actual) => Some(format!(
                    "{} {}={} is not in the allow list",
                    excludable.identifier(),
                    attribute.key,
                    actual
                )),
                None => Some(format!(
                    "{} has no {} to check against the allow list",
                    excludable.identifier(),
                    attribute.key
                )),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusions::Attribute;
    use crate::model::Resource;
    use janitor_common::ResourceKind;

    fn allow_apps(values: Vec<&str>) -> Vec<Exclusion> {
        vec![Exclusion::new(
            ExclusionType::Allowlist,
            vec![Attribute::new("application", values)],
        )]
    }

    #[test]
    fn test_allowed_resource_is_kept() {
        let resource = Resource::new("sg-1", ResourceKind::ServerGroup).with_application("canary");
        assert!(
            AllowListExclusionPolicy
                .apply(&resource, &allow_apps(vec!["canary", "pattern:^test"]))
                .is_none()
        );
    }

    #[test]
    fn test_unlisted_resource_is_excluded() {
        let resource = Resource::new("sg-1", ResourceKind::ServerGroup).with_application("billing");
        let reason = AllowListExclusionPolicy.apply(&resource, &allow_apps(vec!["canary"]));
        assert!(reason.unwrap().contains("not in the allow list"));
    }

    #[test]
    fn test_missing_attribute_is_excluded() {
        let resource = Resource::new("sg-1", ResourceKind::ServerGroup);
        assert!(
            AllowListExclusionPolicy
                .apply(&resource, &allow_apps(vec!["canary"]))
                .is_some()
        );
    }

    #[test]
    fn test_no_allow_list_keeps_everything() {
        let resource = Resource::new("sg-1", ResourceKind::ServerGroup);
        assert!(AllowListExclusionPolicy.apply(&resource, &[]).is_none());
    }
}
