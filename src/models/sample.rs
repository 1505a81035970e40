//! Sample model

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::classifier::Classification;
use crate::signal::{DecodedSignal, FeatureVector};

/// One ingested measurement with everything derived from it.
///
/// Built by the session once the pipeline has run and moved into the store;
/// never modified afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub id: Uuid,
    pub client_id: String,
    pub channel_id: String,
    pub timestamp: DateTime<Utc>,
    pub raw_signal: DecodedSignal,
    pub filtered_signal: DecodedSignal,
    pub features: FeatureVector,
    pub classification: Classification,
}

impl Sample {
    pub async fn insert(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        let features = serde_json::to_value(&self.features)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let classification = i32::try_from(self.classification.code())
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        sqlx::query(
            r#"
            INSERT INTO samples (id, client_id, channel_id, recorded_at, feature_profile, features, classification, raw_signal, filtered_signal)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#
        )
        .bind(self.id)
        .bind(&self.client_id)
        .bind(&self.channel_id)
        .bind(self.timestamp)
        .bind(self.features.profile().as_str())
        .bind(&features)
        .bind(classification)
        .bind(sqlx::types::Json(&self.raw_signal))
        .bind(sqlx::types::Json(&self.filtered_signal))
        .execute(pool)
        .await?;

        Ok(())
    }
}
