use super::{Excludable, Exclusion, ExclusionPolicy, ExclusionType, find_match, of_type};
use janitor_common::tags::{EXPIRATION_NEVER, TAG_EXPIRATION_TIME, is_exempt};

/// Excludes resources carrying exempting tags
///
/// `expiration_time=never` always excludes, configured or not. This is what
/// makes an opt-out stick in the cloud provider itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagExclusionPolicy;

impl ExclusionPolicy for TagExclusionPolicy {
    fn name(&self) -> &'static str {
        "TagExclusionPolicy"
    }

    fn apply(&self, excludable: &dyn Excludable, exclusions: &[Exclusion]) -> Option<String> {
        if excludable.tags().into_iter().any(|(k, v)| is_exempt(k, v)) {
            return Some(format!(
                "{} is tagged {}={}",
                excludable.identifier(),
                TAG_EXPIRATION_TIME,
                EXPIRATION_NEVER
            ));
        }

        of_type(exclusions, ExclusionType::Tag)
            .flat_map(|exclusion| exclusion.attributes.iter())
            .find_map(|attribute| {
                let actual = excludable.tag(&attribute.key)?;
                find_match(actual, &attribute.value).map(|_| {
                    format!(
                        "{} is tagged {}={}",
                        excludable.identifier(),
                        attribute.key,
                        actual
                    )
                })
            })
    }
}
