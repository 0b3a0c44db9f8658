//! Contracts of the systems the engine drives but does not implement
//!
//! Cloud APIs, reference data, notification transport and the tagging side
//! effect all live behind these traits. Their errors are opaque to the
//! engine, which only logs, counts and moves on.

use crate::model::{MarkedResource, NotificationSettings, Resource, WorkConfiguration};
use anyhow::Result;
use async_trait::async_trait;
use janitor_common::ResourceKind;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Fetches and deletes resources of one cloud provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Every resource of the configuration's type in its account and location
    async fn get_candidates(&self, config: &WorkConfiguration) -> Result<Vec<Resource>>;

    /// A single resource, `None` when it no longer exists
    async fn get_one(&self, resource_id: &str, config: &WorkConfiguration)
    -> Result<Option<Resource>>;

    /// Delete a resource, returning a provider task id when deletion is asynchronous
    async fn delete(
        &self,
        marked: &MarkedResource,
        config: &WorkConfiguration,
    ) -> Result<Option<String>>;
}

/// What an owner is being told about
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContext {
    pub resource_type: ResourceKind,
    pub namespace: String,
    pub resources: Vec<MarkedResource>,
}

/// Outcome of one notification attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResult {
    pub success: bool,
    pub recipient: String,
    pub notification_type: String,
}

/// Delivers owner notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: &str,
        context: &NotificationContext,
        settings: &NotificationSettings,
    ) -> Result<NotificationResult>;
}

/// Writes notifications to the log instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient: &str,
        context: &NotificationContext,
        settings: &NotificationSettings,
    ) -> Result<NotificationResult> {
        let resources: Vec<String> = context
            .resources
            .iter()
            .map(|m| {
                let deletion = m
                    .deletion_date_time()
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                format!("{} ({deletion})", m.resource.type_and_name())
            })
            .collect();
        tracing::info!(
            recipient,
            namespace = %context.namespace,
            resource_type = %context.resource_type,
            resources = ?resources,
            "Cleanup notice"
        );

        Ok(NotificationResult {
            success: true,
            recipient: recipient.to_string(),
            notification_type: settings
                .types
                .first()
                .cloned()
                .unwrap_or_else(|| "log".to_string()),
        })
    }
}

/// Applies and removes janitor tags on the cloud resource itself
///
/// Best effort. A returned id names an asynchronous provider task.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceTagger: Send + Sync {
    async fn tag(
        &self,
        marked: &MarkedResource,
        config: &WorkConfiguration,
        tags: &BTreeMap<String, String>,
        description: &str,
    ) -> Result<Option<String>>;

    async fn untag(
        &self,
        marked: &MarkedResource,
        config: &WorkConfiguration,
        description: &str,
    ) -> Result<Option<String>>;
}

/// Tagger for deployments that do not tag resources
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTagger;

#[async_trait]
impl ResourceTagger for NoopTagger {
    async fn tag(
        &self,
        _marked: &MarkedResource,
        _config: &WorkConfiguration,
        _tags: &BTreeMap<String, String>,
        _description: &str,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    async fn untag(
        &self,
        _marked: &MarkedResource,
        _config: &WorkConfiguration,
        _description: &str,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Finds who should hear about a resource
pub trait OwnerResolver: Send + Sync {
    fn resolve(&self, resource: &Resource) -> Option<String>;
}

/// Owner from the first non-empty tag among `keys`
#[derive(Debug, Clone)]
pub struct TagOwnerResolver {
    keys: Vec<String>,
}

impl TagOwnerResolver {
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for TagOwnerResolver {
    fn default() -> Self {
        Self::new(["owner", "creator", "email"])
    }
}

impl OwnerResolver for TagOwnerResolver {
    fn resolve(&self, resource: &Resource) -> Option<String> {
        self.keys
            .iter()
            .filter_map(|key| resource.tags.get(key))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .map(String::from)
    }
}

/// Tries resolvers in order
#[derive(Clone, Default)]
pub struct OwnerResolverChain {
    resolvers: Vec<Arc<dyn OwnerResolver>>,
}

impl OwnerResolverChain {
    pub fn new(resolvers: Vec<Arc<dyn OwnerResolver>>) -> Self {
        Self { resolvers }
    }

    /// First resolved owner, or `default_owner`
    pub fn resolve(&self, resource: &Resource, default_owner: &str) -> String {
        self.resolvers
            .iter()
            .find_map(|resolver| resolver.resolve(resource))
            .unwrap_or_else(|| default_owner.to_string())
    }
}

/// Whether a reference cache has finished its initial load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Loading,
    Loaded,
}

/// Cross-resource references that pre-processing checks against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSnapshot {
    /// Launch configuration names referenced by server groups
    pub launch_configurations_in_use: HashSet<String>,
    /// Images that currently exist
    pub image_ids: HashSet<String>,
}

/// Read-only reference data, loaded outside the engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferenceCache: Send + Sync {
    async fn status(&self) -> CacheStatus;

    async fn load(&self) -> Result<ReferenceSnapshot>;
}

/// A cache that is always loaded with a fixed snapshot
#[derive(Debug, Clone, Default)]
pub struct StaticReferenceCache {
    snapshot: ReferenceSnapshot,
}

impl StaticReferenceCache {
    pub fn new(snapshot: ReferenceSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl ReferenceCache for StaticReferenceCache {
    async fn status(&self) -> CacheStatus {
        CacheStatus::Loaded
    }

    async fn load(&self) -> Result<ReferenceSnapshot> {
        Ok(self.snapshot.clone())
    }
}
