//! JSON file inventory
//!
//! A local stand-in for a cloud provider: resources are listed per
//! `{cloud_provider}:{account}:{location}` scope in one JSON file, which is
//! re-read on every call so out-of-band edits are picked up. Deletes rewrite
//! the file. The same file carries the reference data launch configuration
//! checks need.

use crate::collaborators::{CacheStatus, ReferenceCache, ReferenceSnapshot, ResourceProvider};
use crate::model::{MarkedResource, Resource, WorkConfiguration};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// On-disk layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    #[serde(default)]
    pub resources: BTreeMap<String, Vec<Resource>>,
    #[serde(default)]
    pub launch_configurations_in_use: Vec<String>,
    #[serde(default)]
    pub image_ids: Vec<String>,
}

/// Inventory key of a work configuration
pub fn scope_of(config: &WorkConfiguration) -> String {
    format!(
        "{}:{}:{}",
        config.cloud_provider, config.account.name, config.location
    )
}

pub struct FileInventory {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for FileInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileInventory")
            .field("path", &self.path)
            .finish()
    }
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Inventory> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read inventory: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse inventory: {}", self.path.display()))
    }

    async fn write(&self, inventory: &Inventory) -> Result<()> {
        let content = serde_json::to_string_pretty(inventory)?;
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write inventory: {}", self.path.display()))
    }

    async fn resources_in(&self, config: &WorkConfiguration) -> Result<Vec<Resource>> {
        let mut inventory = self.read().await?;
        let resources = inventory
            .resources
            .remove(&scope_of(config))
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.resource_type == config.resource_type)
            .collect();
        Ok(resources)
    }
}

#[async_trait]
impl ResourceProvider for FileInventory {
    async fn get_candidates(&self, config: &WorkConfiguration) -> Result<Vec<Resource>> {
        let resources = self.resources_in(config).await?;
        debug!(namespace = %config.namespace, count = resources.len(), "Listed inventory");
        Ok(resources)
    }

    async fn get_one(
        &self,
        resource_id: &str,
        config: &WorkConfiguration,
    ) -> Result<Option<Resource>> {
        Ok(self
            .resources_in(config)
            .await?
            .into_iter()
            .find(|r| r.resource_id == resource_id))
    }

    async fn delete(
        &self,
        marked: &MarkedResource,
        config: &WorkConfiguration,
    ) -> Result<Option<String>> {
        let _guard = self.write_lock.lock().await;
        let mut inventory = self.read().await?;

        let removed = match inventory.resources.get_mut(&scope_of(config)) {
            Some(resources) => {
                let before = resources.len();
                resources.retain(|r| {
                    !(r.resource_id == marked.resource_id()
                        && r.resource_type == marked.resource_type())
                });
                before != resources.len()
            }
            None => false,
        };

        if removed {
            self.write(&inventory).await?;
            info!(resource_id = %marked.resource_id(), namespace = %config.namespace, "Removed from inventory");
        }
        Ok(None)
    }
}

#[async_trait]
impl ReferenceCache for FileInventory {
    async fn status(&self) -> CacheStatus {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            CacheStatus::Loaded
        } else {
            CacheStatus::Loading
        }
    }

    async fn load(&self) -> Result<ReferenceSnapshot> {
        let inventory = self.read().await?;
        Ok(ReferenceSnapshot {
            launch_configurations_in_use: inventory.launch_configurations_in_use.into_iter().collect(),
            image_ids: inventory.image_ids.into_iter().collect(),
        })
    }
}
