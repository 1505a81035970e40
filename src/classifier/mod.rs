//! Classifier Module - 1-nearest-neighbor over a fixed reference table

pub mod model;
pub mod training;

pub use model::{Classification, Classifier, ClassifyError, ReferenceModel, CLASSIFICATION_FAILED};
pub use training::{load_table, read_table, ModelError, TrainingTable};

use std::path::Path;

use crate::signal::FeatureProfile;

/// Load the training table at `path` and build the reference model for
/// `profile`. Any failure here is fatal for the server.
pub fn build_from_file(path: impl AsRef<Path>, profile: FeatureProfile) -> Result<ReferenceModel, ModelError> {
    let table = load_table(path)?;
    ReferenceModel::build(&table, profile)
}
