//! Nearest-neighbor reference model

use std::fmt;
use std::sync::{Arc, OnceLock};

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Serialize, Serializer};
use thiserror::Error;

use super::training::{ModelError, TrainingTable};
use crate::signal::{FeatureProfile, FeatureVector, LayoutMismatchError};

/// Wire value of a failed classification
pub const CLASSIFICATION_FAILED: i64 = -1;

/// Label assigned to one feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Label(u32),
    /// No reference row could be compared, e.g. NaN features
    Failed,
}

impl Classification {
    /// Integer code as stored and sent on the wire
    pub fn code(self) -> i64 {
        match self {
            Classification::Label(l) => l as i64,
            Classification::Failed => CLASSIFICATION_FAILED,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Label(l) => write!(f, "{}", l),
            Classification::Failed => f.write_str("failed"),
        }
    }
}

impl Serialize for Classification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier used before a reference model was installed")]
    ModelNotReady,

    #[error(transparent)]
    Layout(#[from] LayoutMismatchError),
}

/// Immutable reference set: one row per training sample.
///
/// Columns are in profile order regardless of the column order of the
/// table the model was built from.
#[derive(Debug, Clone)]
pub struct ReferenceModel {
    profile: FeatureProfile,
    features: Array2<f64>,
    labels: Array1<u32>,
}

impl ReferenceModel {
    /// Build the model for `profile` from a training table.
    ///
    /// Table columns are matched to profile features by name. Extra,
    /// missing or duplicated feature columns are a configuration error.
    pub fn build(table: &TrainingTable, profile: FeatureProfile) -> Result<Self, ModelError> {
        let mismatch = |detail: String| ModelError::ProfileMismatch {
            profile: profile.to_string(),
            detail,
        };

        if table.feature_columns.len() != profile.len() {
            return Err(mismatch(format!(
                "expected {} feature columns, table has {}",
                profile.len(),
                table.feature_columns.len()
            )));
        }
        if table.is_empty() {
            return Err(ModelError::NoData(table.label_column.clone()));
        }

        // column_for[i] = table column holding profile feature i
        let mut column_for = Vec::with_capacity(profile.len());
        for name in profile.layout() {
            let positions: Vec<usize> = table
                .feature_columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.as_str() == *name)
                .map(|(i, _)| i)
                .collect();
            match positions.as_slice() {
                [single] => column_for.push(*single),
                [] => return Err(mismatch(format!("missing feature column '{}'", name))),
                _ => return Err(mismatch(format!("feature column '{}' appears more than once", name))),
            }
        }

        let flat: Vec<f64> = table
            .rows
            .iter()
            .flat_map(|row| column_for.iter().map(move |&c| row[c]))
            .collect();

        let features = Array2::from_shape_vec((table.len(), profile.len()), flat)?;
        let labels = Array1::from_vec(table.labels.clone());

        tracing::info!(
            "Reference model built: {} rows, {} profile, label column '{}'",
            labels.len(),
            profile,
            table.label_column
        );

        Ok(Self {
            profile,
            features,
            labels,
        })
    }

    pub fn profile(&self) -> FeatureProfile {
        self.profile
    }

    /// Number of reference rows
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label of the nearest reference row by Euclidean distance.
    ///
    /// Ties go to the row that appears first in the table. Rows at a NaN
    /// distance are never nearest; if all are, the result is
    /// [`Classification::Failed`].
    pub fn classify(&self, features: &FeatureVector) -> Result<Classification, ClassifyError> {
        features.ensure_profile(self.profile)?;
        let query = ArrayView1::from(features.as_slice());

        let mut best: Option<(usize, f64)> = None;
        for (i, row) in self.features.outer_iter().enumerate() {
            let dist = (&row - &query).mapv(|d| d * d).sum();
            if dist.is_nan() {
                continue;
            }
            match best {
                Some((_, best_dist)) if dist >= best_dist => {}
                _ => best = Some((i, dist)),
            }
        }

        Ok(match best {
            Some((i, _)) => Classification::Label(self.labels[i]),
            None => Classification::Failed,
        })
    }
}

/// Shared handle sessions classify through.
///
/// The model is installed once at start-up; until then every call fails with
/// [`ClassifyError::ModelNotReady`].
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    model: Arc<OnceLock<ReferenceModel>>,
}

impl Classifier {
    /// Handle without a model
    pub fn unloaded() -> Self {
        Self::default()
    }

    /// Handle with `model` already installed
    pub fn with_model(model: ReferenceModel) -> Self {
        let classifier = Self::default();
        // fresh cell, cannot be set yet
        let _ = classifier.model.set(model);
        classifier
    }

    pub fn install(&self, model: ReferenceModel) -> Result<(), ModelError> {
        self.model.set(model).map_err(|_| ModelError::AlreadyInstalled)
    }

    pub fn model(&self) -> Option<&ReferenceModel> {
        self.model.get()
    }

    pub fn is_ready(&self) -> bool {
        self.model.get().is_some()
    }

    pub fn classify(&self, features: &FeatureVector) -> Result<Classification, ClassifyError> {
        self.model
            .get()
            .ok_or(ClassifyError::ModelNotReady)?
            .classify(features)
    }
}
