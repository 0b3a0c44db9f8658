//! Candidate pre-processing
//!
//! Pre-processors run once per batch before evaluation and record derived
//! facts in each candidate's detail map. A failure aborts the batch.

use crate::collaborators::ReferenceCache;
use crate::model::{Resource, ResourceSpec, WorkConfiguration};
use crate::rules::details::{
    ATTACHED_TO_INSTANCES, HAS_IMAGE, IS_USED_BY_SERVER_GROUPS, SEEN_IN_USE_RECENTLY,
    USED_BY_SNAPSHOT,
};
use crate::store::ResourceUseTrackingRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use janitor_common::Clock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[async_trait]
pub trait CandidatePreProcessor: Send + Sync {
    async fn pre_process(&self, candidates: &mut [Resource], config: &WorkConfiguration)
    -> Result<()>;
}

/// For resource types without derived facts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPreProcessor;

#[async_trait]
impl CandidatePreProcessor for NoopPreProcessor {
    async fn pre_process(
        &self,
        _candidates: &mut [Resource],
        _config: &WorkConfiguration,
    ) -> Result<()> {
        Ok(())
    }
}

/// Attachment, snapshot and recent-use facts for volumes
///
/// Every observed use is recorded so a volume detached moments ago is not
/// flagged until it has sat unused for the out-of-use threshold.
pub struct VolumePreProcessor {
    usage: Arc<dyn ResourceUseTrackingRepository>,
    clock: Arc<dyn Clock>,
}

impl VolumePreProcessor {
    pub fn new(usage: Arc<dyn ResourceUseTrackingRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { usage, clock }
    }
}

#[async_trait]
impl CandidatePreProcessor for VolumePreProcessor {
    async fn pre_process(
        &self,
        candidates: &mut [Resource],
        config: &WorkConfiguration,
    ) -> Result<()> {
        let now = self.clock.now_millis();

        for volume in candidates.iter_mut() {
            let ResourceSpec::Volume {
                state,
                snapshot_id,
                attachments,
            } = &volume.spec
            else {
                continue;
            };

            let mut uses: Vec<String> = Vec::new();
            if let Some(snapshot_id) = snapshot_id {
                uses.push(snapshot_id.clone());
                volume.details.set_flag(USED_BY_SNAPSHOT, true);
            }

            let attached: Vec<String> = attachments
                .iter()
                .filter(|a| a.is_attached())
                .map(|a| a.instance_id.clone())
                .collect();
            if !attached.is_empty() || state == "in-use" {
                volume.details.set_flag(ATTACHED_TO_INSTANCES, true);
            }
            uses.extend(attached);

            for used_by in uses {
                self.usage
                    .record_use(&volume.resource_id, &used_by, now)
                    .await
                    .with_context(|| format!("recording use of {}", volume.resource_id))?;
            }
        }

        if config.out_of_use_threshold_days == 0 {
            return Ok(());
        }

        let threshold = now - i64::from(config.out_of_use_threshold_days) * MILLIS_PER_DAY;
        let used = self.usage.get_used().await.context("loading used volumes")?;
        let stale: HashSet<String> = self
            .usage
            .get_unused(threshold)
            .await
            .context("loading unused volumes")?
            .into_iter()
            .map(|info| info.resource_id)
            .collect();

        for volume in candidates.iter_mut() {
            let id = &volume.resource_id;
            if volume.details.flag(ATTACHED_TO_INSTANCES) || volume.details.flag(USED_BY_SNAPSHOT)
            {
                continue;
            }
            if used.contains(id) && !stale.contains(id) {
                debug!(resource_id = %id, "Volume seen in use recently");
                volume.details.set_flag(SEEN_IN_USE_RECENTLY, true);
            }
        }

        Ok(())
    }
}

/// Server group and image references of launch configurations
pub struct LaunchConfigurationPreProcessor {
    cache: Arc<dyn ReferenceCache>,
}

impl LaunchConfigurationPreProcessor {
    pub fn new(cache: Arc<dyn ReferenceCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl CandidatePreProcessor for LaunchConfigurationPreProcessor {
    async fn pre_process(
        &self,
        candidates: &mut [Resource],
        _config: &WorkConfiguration,
    ) -> Result<()> {
        let references = self.cache.load().await.context("loading reference cache")?;

        for resource in candidates.iter_mut() {
            let referenced = references
                .launch_configurations_in_use
                .contains(&resource.resource_id)
                || resource
                    .name
                    .as_ref()
                    .is_some_and(|name| references.launch_configurations_in_use.contains(name));
            resource.details.set_flag(IS_USED_BY_SERVER_GROUPS, referenced);

            let has_image = match &resource.spec {
                ResourceSpec::LaunchConfiguration {
                    image_id: Some(image_id),
                } => references.image_ids.contains(image_id),
                _ => false,
            };
            resource.details.set_flag(HAS_IMAGE, has_image);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockReferenceCache, ReferenceSnapshot, StaticReferenceCache};
    use crate::model::{Account, Attachment};
    use crate::store::{Repositories, test_store};
    use chrono::Duration;
    use janitor_common::ResourceKind;

    fn config(threshold_days: u32) -> WorkConfiguration {
        let mut config = WorkConfiguration::new(
            "aws",
            Account::new("test", None),
            "us-east-1",
            ResourceKind::Volume,
        );
        config.out_of_use_threshold_days = threshold_days;
        config
    }

    fn volume(id: &str, snapshot_id: Option<&str>, attachments: Vec<Attachment>) -> Resource {
        Resource::new(id, ResourceKind::Volume).with_spec(ResourceSpec::Volume {
            state: "available".to_string(),
            snapshot_id: snapshot_id.map(String::from),
            attachments,
        })
    }

    fn attached(instance_id: &str) -> Attachment {
        Attachment {
            instance_id: instance_id.to_string(),
            state: "attached".to_string(),
            device: None,
        }
    }

    #[tokio::test]
    async fn test_volume_facts() {
        let repos = Repositories::sqlite(test_store().await);
        let clock = janitor_test_utils::fixed_clock();
        let pre = VolumePreProcessor::new(repos.usage.clone(), clock);

        let mut volumes = vec![
            volume("vol-free", None, vec![]),
            volume("vol-snap", Some("snap-1"), vec![]),
            volume("vol-att", None, vec![attached("i-1")]),
        ];
        pre.pre_process(&mut volumes, &config(5)).await.unwrap();

        assert!(volumes[0].details.is_empty());
        assert!(volumes[1].details.flag(USED_BY_SNAPSHOT));
        assert!(volumes[2].details.flag(ATTACHED_TO_INSTANCES));

        let used = repos.usage.get_used().await.unwrap();
        assert!(used.contains("vol-snap"));
        assert!(used.contains("vol-att"));
        assert!(!used.contains("vol-free"));
    }

    #[tokio::test]
    async fn test_recently_detached_volume_is_seen_in_use() {
        let repos = Repositories::sqlite(test_store().await);
        let clock = janitor_test_utils::fixed_clock();
        let pre = VolumePreProcessor::new(repos.usage.clone(), clock.clone());

        let mut first = vec![volume("vol-1", None, vec![attached("i-1")])];
        pre.pre_process(&mut first, &config(5)).await.unwrap();

        // Detached two days later
        clock.advance(Duration::days(2));
        let mut second = vec![volume("vol-1", None, vec![])];
        pre.pre_process(&mut second, &config(5)).await.unwrap();
        assert!(second[0].details.flag(SEEN_IN_USE_RECENTLY));

        // Past the threshold it is no longer protected
        clock.advance(Duration::days(4));
        let mut third = vec![volume("vol-1", None, vec![])];
        pre.pre_process(&mut third, &config(5)).await.unwrap();
        assert!(!third[0].details.flag(SEEN_IN_USE_RECENTLY));
    }

    #[tokio::test]
    async fn test_zero_threshold_bypasses_recent_use() {
        let repos = Repositories::sqlite(test_store().await);
        let clock = janitor_test_utils::fixed_clock();
        let pre = VolumePreProcessor::new(repos.usage.clone(), clock.clone());

        let mut first = vec![volume("vol-1", None, vec![attached("i-1")])];
        pre.pre_process(&mut first, &config(0)).await.unwrap();

        let mut second = vec![volume("vol-1", None, vec![])];
        pre.pre_process(&mut second, &config(0)).await.unwrap();
        assert!(!second[0].details.contains(SEEN_IN_USE_RECENTLY));
    }

    #[tokio::test]
    async fn test_launch_configuration_references() {
        let mut snapshot = ReferenceSnapshot::default();
        snapshot.launch_configurations_in_use.insert("lc-used".to_string());
        snapshot.image_ids.insert("ami-live".to_string());
        let pre = LaunchConfigurationPreProcessor::new(Arc::new(StaticReferenceCache::new(snapshot)));

        let lc = |id: &str, image: &str| {
            Resource::new(id, ResourceKind::LaunchConfiguration).with_spec(
                ResourceSpec::LaunchConfiguration {
                    image_id: Some(image.to_string()),
                },
            )
        };
        let mut candidates = vec![lc("lc-used", "ami-live"), lc("lc-idle", "ami-gone")];
        let mut config = config(0);
        config.resource_type = ResourceKind::LaunchConfiguration;
        pre.pre_process(&mut candidates, &config).await.unwrap();

        assert!(candidates[0].details.flag(IS_USED_BY_SERVER_GROUPS));
        assert!(candidates[0].details.flag(HAS_IMAGE));
        assert!(!candidates[1].details.flag(IS_USED_BY_SERVER_GROUPS));
        assert!(!candidates[1].details.flag(HAS_IMAGE));
    }

    #[tokio::test]
    async fn test_cache_failure_aborts_batch() {
        let mut cache = MockReferenceCache::new();
        cache
            .expect_load()
            .returning(|| Err(anyhow::anyhow!("cache unavailable")));
        let pre = LaunchConfigurationPreProcessor::new(Arc::new(cache));

        let mut candidates = vec![Resource::new("lc-1", ResourceKind::LaunchConfiguration)];
        assert!(pre.pre_process(&mut candidates, &config(0)).await.is_err());
    }
}
