//! Provider task tracking

use super::{SqliteStore, TaskTrackingRepository};
use crate::error::StoreError;
use crate::model::{TaskRecord, TaskStatus};
use async_trait::async_trait;

fn decode_all(rows: Vec<String>) -> Result<Vec<TaskRecord>, StoreError> {
    rows.iter()
        .map(|body| serde_json::from_str(body).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl TaskTrackingRepository for SqliteStore {
    async fn add(&self, task: &TaskRecord) -> Result<(), StoreError> {
        let body = serde_json::to_string(task)?;

        sqlx::query(
            "INSERT INTO tasks (task_id, status, submitted_at, body) VALUES (?, ?, ?, ?)
             ON CONFLICT(task_id) DO UPDATE SET
                status = excluded.status,
                submitted_at = excluded.submitted_at,
                body = excluded.body",
        )
        .bind(&task.task_id)
        .bind(task.status.as_str())
        .bind(task.submitted_at)
        .bind(&body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let body: Option<String> = sqlx::query_scalar("SELECT body FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        body.map(|b| serde_json::from_str(&b))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn in_progress(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM tasks WHERE status = ? ORDER BY submitted_at, task_id",
        )
        .bind(TaskStatus::InProgress.as_str())
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT body FROM tasks ORDER BY submitted_at, task_id")
                .fetch_all(&self.pool)
                .await?;
        decode_all(rows)
    }

    async fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<bool, StoreError> {
        let Some(mut task) = TaskTrackingRepository::get(self, task_id).await? else {
            return Ok(false);
        };
        task.status = status;
        TaskTrackingRepository::add(self, &task).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_store;
    use janitor_common::Action;

    fn task(id: &str, submitted_at: i64) -> TaskRecord {
        TaskRecord {
            task_id: id.to_string(),
            action: Action::Delete,
            namespace: "aws:test:us-east-1:volume".to_string(),
            resource_ids: vec!["vol-1".to_string()],
            description: "Deleting volume vol-1".to_string(),
            submitted_at,
            status: TaskStatus::InProgress,
        }
    }

    #[tokio::test]
    async fn test_add_and_complete() {
        let store = test_store().await;
        let repo: &dyn TaskTrackingRepository = &store;

        repo.add(&task("t-1", 1)).await.unwrap();
        repo.add(&task("t-2", 2)).await.unwrap();
        assert_eq!(repo.in_progress().await.unwrap().len(), 2);

        assert!(repo.set_status("t-1", TaskStatus::Succeeded).await.unwrap());
        let pending = repo.in_progress().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].task_id, "t-2");

        let done = repo.get("t-1").await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Succeeded);
        assert_eq!(repo.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_status_unknown_task() {
        let store = test_store().await;
        let repo: &dyn TaskTrackingRepository = &store;
        assert!(!repo.set_status("t-404", TaskStatus::Failed).await.unwrap());
    }
}
