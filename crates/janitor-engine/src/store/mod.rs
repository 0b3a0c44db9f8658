//! Shared store contracts and their SQLite implementation
//!
//! Every collection is keyed so that independent worker processes can share
//! one store. Mutations are upserts; queue pops are atomic delete-and-return.

pub mod db;
mod queue;
mod state;
mod tasks;
mod tracking;
mod usage;

pub use db::{DbPool, default_db_path, open_db, setup_schema};

use crate::error::StoreError;
use crate::model::{
    LastSeenInfo, MarkedResource, NotificationTask, ResourceState, TaskRecord, TaskStatus,
    WorkItem,
};
use async_trait::async_trait;
use janitor_common::{Clock, ResourceKind};
use std::collections::HashSet;
use std::sync::Arc;

/// Currently marked resources, keyed by `(resource_id, namespace)`
#[async_trait]
pub trait ResourceTrackingRepository: Send + Sync {
    async fn upsert(&self, marked: &MarkedResource) -> Result<(), StoreError>;

    async fn find(
        &self,
        resource_id: &str,
        namespace: &str,
    ) -> Result<Option<MarkedResource>, StoreError>;

    async fn marked_resources(&self) -> Result<Vec<MarkedResource>, StoreError>;

    async fn marked_resources_in(&self, namespace: &str)
    -> Result<Vec<MarkedResource>, StoreError>;

    async fn marked_resources_of_type(
        &self,
        resource_type: ResourceKind,
    ) -> Result<Vec<MarkedResource>, StoreError>;

    /// Marked resources whose deletion date has passed at `now_millis`
    async fn marked_resources_due(
        &self,
        namespace: &str,
        now_millis: i64,
    ) -> Result<Vec<MarkedResource>, StoreError>;

    async fn remove(&self, resource_id: &str, namespace: &str) -> Result<(), StoreError>;
}

/// Durable audit history, keyed by `(resource_id, namespace)`
#[async_trait]
pub trait ResourceStateRepository: Send + Sync {
    async fn upsert(&self, state: &ResourceState) -> Result<(), StoreError>;

    async fn get(
        &self,
        resource_id: &str,
        namespace: &str,
    ) -> Result<Option<ResourceState>, StoreError>;

    async fn get_all(&self) -> Result<Vec<ResourceState>, StoreError>;

    async fn get_by_status(&self, status: &str) -> Result<Vec<ResourceState>, StoreError>;
}

/// When resources were last seen referenced by others
#[async_trait]
pub trait ResourceUseTrackingRepository: Send + Sync {
    async fn record_use(
        &self,
        resource_id: &str,
        used_by_resource_id: &str,
        at_millis: i64,
    ) -> Result<(), StoreError>;

    /// Ids of every resource ever recorded as used
    async fn get_used(&self) -> Result<HashSet<String>, StoreError>;

    /// Records last seen before `threshold_millis`
    async fn get_unused(&self, threshold_millis: i64) -> Result<Vec<LastSeenInfo>, StoreError>;
}

/// Provider-side tasks awaiting completion
#[async_trait]
pub trait TaskTrackingRepository: Send + Sync {
    async fn add(&self, task: &TaskRecord) -> Result<(), StoreError>;

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    async fn in_progress(&self) -> Result<Vec<TaskRecord>, StoreError>;

    async fn all(&self) -> Result<Vec<TaskRecord>, StoreError>;

    async fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<bool, StoreError>;
}

/// Shared queue of work items
///
/// `pop` is safe under concurrent callers from independent processes.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn seed(&self, items: &[WorkItem]) -> Result<(), StoreError>;

    async fn push(&self, item: &WorkItem) -> Result<(), StoreError>;

    async fn pop(&self) -> Result<Option<WorkItem>, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError>;

    async fn size(&self) -> Result<usize, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    async fn items(&self) -> Result<Vec<WorkItem>, StoreError>;
}

/// Shared queue of pending owner notifications
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn add(&self, task: &NotificationTask) -> Result<(), StoreError>;

    async fn pop_all(&self) -> Result<Vec<NotificationTask>, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError>;

    async fn size(&self) -> Result<usize, StoreError>;
}

/// SQLite-backed implementation of every store contract
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Every repository the engine needs, as shared trait objects
#[derive(Clone)]
pub struct Repositories {
    pub tracking: Arc<dyn ResourceTrackingRepository>,
    pub state: Arc<dyn ResourceStateRepository>,
    pub usage: Arc<dyn ResourceUseTrackingRepository>,
    pub tasks: Arc<dyn TaskTrackingRepository>,
    pub work_queue: Arc<dyn WorkQueue>,
    pub notification_queue: Arc<dyn NotificationQueue>,
}

impl Repositories {
    pub fn sqlite(store: SqliteStore) -> Self {
        let store = Arc::new(store);
        Self {
            tracking: store.clone(),
            state: store.clone(),
            usage: store.clone(),
            tasks: store.clone(),
            work_queue: store.clone(),
            notification_queue: store,
        }
    }
}

#[cfg(test)]
pub(crate) async fn test_store() -> SqliteStore {
    let pool = db::open_test_db().await.unwrap();
    SqliteStore::new(pool, janitor_test_utils::fixed_clock())
}
