//! PostgreSQL store

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::PgPool;

use super::{ChannelRegistry, SampleStore, StoreError};
use crate::models::{Channel, Sample};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SampleStore for PgStore {
    async fn persist(&self, sample: Sample) -> Result<(), StoreError> {
        sample.insert(&self.pool).await?;
        tracing::debug!(
            "Inserted sample {} for client {}, class {}",
            sample.id,
            sample.client_id,
            sample.classification
        );
        Ok(())
    }
}

#[async_trait]
impl ChannelRegistry for PgStore {
    async fn list_channels_for(&self, client_id: &str) -> Result<BTreeSet<String>, StoreError> {
        let channels = Channel::list_for_client(&self.pool, client_id).await?;
        Ok(channels.into_iter().map(|c| c.name).collect())
    }

    async fn ensure_channel(&self, client_id: &str, channel_id: &str) -> Result<bool, StoreError> {
        let created = Channel::ensure(&self.pool, client_id, channel_id).await?;
        if created {
            tracing::info!("Registered new channel '{}' for client {}", channel_id, client_id);
        }
        Ok(created)
    }
}
