//! In-memory store

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{ChannelRegistry, SampleStore, StoreError};
use crate::models::Sample;

/// Keeps every sample and channel in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    samples: Mutex<Vec<Sample>>,
    channels: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored samples in insertion order
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().clone()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }
}

#[async_trait]
impl SampleStore for MemoryStore {
    async fn persist(&self, sample: Sample) -> Result<(), StoreError> {
        self.samples.lock().push(sample);
        Ok(())
    }
}

#[async_trait]
impl ChannelRegistry for MemoryStore {
    async fn list_channels_for(&self, client_id: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .channels
            .read()
            .get(client_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn ensure_channel(&self, client_id: &str, channel_id: &str) -> Result<bool, StoreError> {
        // single write lock: concurrent sessions cannot both create the channel
        let mut channels = self.channels.write();
        Ok(channels
            .entry(client_id.to_string())
            .or_default()
            .insert(channel_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_channels_scoped_per_client() {
        let store = MemoryStore::new();
        assert!(store.ensure_channel("client_1", "channel_1").await.unwrap());
        assert!(!store.ensure_channel("client_1", "channel_1").await.unwrap());
        assert!(store.ensure_channel("client_1", "channel_2").await.unwrap());
        assert!(store.ensure_channel("client_2", "channel_9").await.unwrap());

        let channels = store.list_channels_for("client_1").await.unwrap();
        assert_eq!(
            channels.into_iter().collect::<Vec<_>>(),
            vec!["channel_1".to_string(), "channel_2".to_string()]
        );
        assert!(store.list_channels_for("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_channel_creation_creates_once() {
        let store = Arc::new(MemoryStore::new());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.ensure_channel("c", "shared").await.unwrap() })
            })
            .collect();

        let mut created = 0;
        for t in tasks {
            if t.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.list_channels_for("c").await.unwrap().len(), 1);
    }
}
