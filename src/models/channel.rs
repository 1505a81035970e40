//! Channel model

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

/// Measurement channel a client has submitted data on
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Channel {
    pub client_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    /// Register a channel if unseen. Concurrent callers race on the unique
    /// constraint, so at most one row is created.
    pub async fn ensure(pool: &PgPool, client_id: &str, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO channels (client_id, name)
            VALUES ($1, $2)
            ON CONFLICT (client_id, name) DO NOTHING
            "#
        )
        .bind(client_id)
        .bind(name)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_client(pool: &PgPool, client_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Channel>(
            "SELECT client_id, name, created_at FROM channels WHERE client_id = $1 ORDER BY name ASC"
        )
        .bind(client_id)
        .fetch_all(pool)
        .await
    }
}
