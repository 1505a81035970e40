//! Database module - PostgreSQL connection and schema bootstrap

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Create the tables the ingest path writes to, if missing
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Channels seen per client
CREATE TABLE IF NOT EXISTS channels (
    client_id VARCHAR(128) NOT NULL,
    name VARCHAR(128) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (client_id, name)
);

-- Ingested samples
CREATE TABLE IF NOT EXISTS samples (
    id UUID PRIMARY KEY,
    client_id VARCHAR(128) NOT NULL,
    channel_id VARCHAR(128) NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL,
    feature_profile VARCHAR(16) NOT NULL,
    features JSONB NOT NULL,
    classification INT NOT NULL,
    raw_signal JSONB NOT NULL,
    filtered_signal JSONB NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_samples_client ON samples(client_id, recorded_at);
CREATE INDEX IF NOT EXISTS idx_samples_channel ON samples(channel_id, recorded_at);
"#;
