//! Bounded retry for the sample write path

use std::time::Duration;

use async_trait::async_trait;

use super::{SampleStore, StoreError};
use crate::models::Sample;

/// Retries a failed `persist` up to `attempts` times in total, doubling the
/// delay after each failure. Every attempt submits its own copy of the sample.
pub struct RetryingStore<S> {
    inner: S,
    attempts: u32,
    backoff: Duration,
}

impl<S: SampleStore> RetryingStore<S> {
    pub fn new(inner: S, attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: SampleStore> SampleStore for RetryingStore<S> {
    async fn persist(&self, sample: Sample) -> Result<(), StoreError> {
        let mut delay = self.backoff;
        let mut attempt = 1;

        loop {
            match self.inner.persist(sample.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(
                        "Store attempt {}/{} failed for sample {}: {}",
                        attempt,
                        self.attempts,
                        sample.id,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Dropping sample {} for client {} after {} attempt(s): {}",
                        sample.id,
                        sample.client_id,
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;
    use crate::signal::{FeatureProfile, FeatureVector};
    use chrono::Utc;
    use parking_lot::Mutex;
    use uuid::Uuid;

    /// Fails the first `failures` calls, then records samples
    struct FlakyStore {
        failures: Mutex<u32>,
        calls: Mutex<u32>,
        stored: Mutex<Vec<Sample>>,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(0),
                stored: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SampleStore for FlakyStore {
        async fn persist(&self, sample: Sample) -> Result<(), StoreError> {
            *self.calls.lock() += 1;
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::Unavailable("connection refused".to_string()));
            }
            self.stored.lock().push(sample);
            Ok(())
        }
    }

    fn sample() -> Sample {
        Sample {
            id: Uuid::new_v4(),
            client_id: "client_1".to_string(),
            channel_id: "channel_1".to_string(),
            timestamp: Utc::now(),
            raw_signal: vec![1.0, 2.0],
            filtered_signal: vec![1.0, 2.0],
            features: FeatureVector::zeros(FeatureProfile::Compact),
            classification: Classification::Label(1),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let store = RetryingStore::new(FlakyStore::new(2), 3, Duration::ZERO);
        let s = sample();

        store.persist(s.clone()).await.unwrap();

        assert_eq!(*store.inner().calls.lock(), 3);
        let stored = store.inner().stored.lock();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, s.id);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let store = RetryingStore::new(FlakyStore::new(5), 3, Duration::ZERO);

        let err = store.persist(sample()).await.unwrap_err();

        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(*store.inner().calls.lock(), 3);
        assert!(store.inner().stored.lock().is_empty());
    }

    #[tokio::test]
    async fn test_zero_attempts_means_one() {
        let store = RetryingStore::new(FlakyStore::new(0), 0, Duration::ZERO);
        store.persist(sample()).await.unwrap();
        assert_eq!(*store.inner().calls.lock(), 1);
    }
}
