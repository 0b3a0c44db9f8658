use super::{Excludable, Exclusion, ExclusionPolicy, ExclusionType, find_match, of_type};

/// Excludes whole accounts
///
/// Applied to [`crate::model::Account`] values when work configurations are
/// expanded, so excluded accounts never produce work.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccountExclusionPolicy;

impl ExclusionPolicy for AccountExclusionPolicy {
    fn name(&self) -> &'static str {
        "AccountExclusionPolicy"
    }

    fn apply(&self, excludable: &dyn Excludable, exclusions: &[Exclusion]) -> Option<String> {
        of_type(exclusions, ExclusionType::Account)
            .flat_map(|exclusion| exclusion.attributes.iter())
            .find_map(|attribute| {
                let actual = excludable.attribute(&attribute.key)?;
                find_match(&actual, &attribute.value)
                    .map(|_| format!("account {}={} is excluded", attribute.key, actual))
            })
    }
}
