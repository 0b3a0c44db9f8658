//! In-memory SQLite stores
//!
//! The pools carry no schema. The engine owns its tables and sets them up
//! on top of these.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

pub type TestDbPool = SqlitePool;

/// A private store for one test
///
/// Capped at one connection: each new connection to `:memory:` would see
/// its own empty database.
pub async fn open_test_db() -> Result<TestDbPool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?)
}

/// A store shared by every pool opened under `name`
///
/// Lets one test stand up several workers, each with its own pool, against
/// the same fleet-wide store.
pub async fn open_named_test_db(name: &str) -> Result<TestDbPool> {
    let options =
        SqliteConnectOptions::from_str(&format!("sqlite:file:{name}?mode=memory&cache=shared"))?;
    Ok(SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_private_stores_are_isolated() {
        let first = open_test_db().await.unwrap();
        let second = open_test_db().await.unwrap();

        sqlx::query("CREATE TABLE leases (name TEXT PRIMARY KEY)")
            .execute(&first)
            .await
            .unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'leases'",
        )
        .fetch_one(&second)
        .await
        .unwrap();
        assert_eq!(tables, 0);
    }

    #[tokio::test]
    async fn test_named_store_is_seen_by_every_worker() {
        let writer = open_named_test_db("seen_by_every_worker").await.unwrap();
        let reader = open_named_test_db("seen_by_every_worker").await.unwrap();

        sqlx::query("CREATE TABLE leases (name TEXT PRIMARY KEY)")
            .execute(&writer)
            .await
            .unwrap();
        sqlx::query("INSERT INTO leases (name) VALUES ('janitor.work')")
            .execute(&writer)
            .await
            .unwrap();

        let held: String = sqlx::query_scalar("SELECT name FROM leases")
            .fetch_one(&reader)
            .await
            .unwrap();
        assert_eq!(held, "janitor.work");
    }
}
