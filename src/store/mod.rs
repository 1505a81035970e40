//! Storage boundary
//!
//! The session only sees the two traits below. `postgres` is the production
//! backend, `memory` serves tests and database-less runs, and `retry` adds a
//! bounded retry in front of any sample store.

pub mod memory;
pub mod postgres;
pub mod retry;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Sample;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use retry::RetryingStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Write path for assembled samples
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Persist one sample. The store owns the sample from here on.
    async fn persist(&self, sample: Sample) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: SampleStore + ?Sized> SampleStore for Arc<T> {
    async fn persist(&self, sample: Sample) -> Result<(), StoreError> {
        (**self).persist(sample).await
    }
}

/// Known channels per client
#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    async fn list_channels_for(&self, client_id: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Register `channel_id` for `client_id` if unseen.
    /// Returns `true` when the channel was created by this call.
    async fn ensure_channel(&self, client_id: &str, channel_id: &str) -> Result<bool, StoreError>;
}
