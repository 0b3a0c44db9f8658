//! Shared work and notification queues
//!
//! Pops delete and return in one statement, so two workers popping at the
//! same time never receive the same item.

use super::{NotificationQueue, SqliteStore, WorkQueue};
use crate::error::StoreError;
use crate::model::{NotificationTask, WorkItem};
use async_trait::async_trait;

#[async_trait]
impl WorkQueue for SqliteStore {
    async fn seed(&self, items: &[WorkItem]) -> Result<(), StoreError> {
        let now = self.clock.now_millis();
        let mut tx = self.pool.begin().await?;

        for item in items {
            let body = serde_json::to_string(item)?;
            sqlx::query("INSERT INTO work_queue (item_id, body, enqueued_at) VALUES (?, ?, ?)")
                .bind(item.id())
                .bind(&body)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn push(&self, item: &WorkItem) -> Result<(), StoreError> {
        WorkQueue::seed(self, std::slice::from_ref(item)).await
    }

    async fn pop(&self) -> Result<Option<WorkItem>, StoreError> {
        let body: Option<String> = sqlx::query_scalar(
            "DELETE FROM work_queue
             WHERE id = (SELECT id FROM work_queue ORDER BY id LIMIT 1)
             RETURNING body",
        )
        .fetch_optional(&self.pool)
        .await?;

        body.map(|b| serde_json::from_str(&b))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(WorkQueue::size(self).await? == 0)
    }

    async fn size(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM work_queue")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn items(&self) -> Result<Vec<WorkItem>, StoreError> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT body FROM work_queue ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl NotificationQueue for SqliteStore {
    async fn add(&self, task: &NotificationTask) -> Result<(), StoreError> {
        let body = serde_json::to_string(task)?;
        sqlx::query(
            "INSERT INTO notification_queue (resource_type, namespace, body, enqueued_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(task.resource_type.as_str())
        .bind(&task.namespace)
        .bind(&body)
        .bind(self.clock.now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pop_all(&self) -> Result<Vec<NotificationTask>, StoreError> {
        let mut rows: Vec<(i64, String)> =
            sqlx::query_as("DELETE FROM notification_queue RETURNING id, body")
                .fetch_all(&self.pool)
                .await?;

        // RETURNING order is unspecified
        rows.sort_by_key(|(id, _)| *id);
        rows.iter()
            .map(|(_, body)| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(NotificationQueue::size(self).await? == 0)
    }

    async fn size(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notification_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
