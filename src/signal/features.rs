//! Feature extraction
//!
//! Turns a decoded signal into a [`FeatureVector`] for one of the two
//! supported profiles. The profile layout is the contract with the training
//! table: the identifiers below are the column headers the reference model
//! is built from, so changing a name or the order invalidates every trained
//! table.

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

// ============================================================================
// PROFILE LAYOUTS
// ============================================================================

/// Compact profile: mean absolute value, form factor, variance
pub const COMPACT_LAYOUT: &[&str] = &["GRW", "FF", "Var"];

/// Extended profile, in extraction order
pub const EXTENDED_LAYOUT: &[&str] = &[
    "I-L1_SigStat-MW",  // 0: mean
    "I-L1_StatSig-qMW", // 1: median (50th percentile)
    "I-L1_Stat-StdAW",  // 2: population standard deviation
    "I-L1_Stat-Var",    // 3: population variance
    "I-L1_Stat-Wb",     // 4: range (max - min)
    "I-L1_Stat-N6M",    // 5: count strictly above mean
    "I-L1_Sig-QWM",     // 6: 75th percentile
    "I-L1_Sig-GRW",     // 7: mean absolute value
    "I-L1_Sig-FF",      // 8: form factor
];

/// Ordered set of named features an extractor produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureProfile {
    Compact,
    Extended,
}

impl FeatureProfile {
    /// Feature identifiers in vector order
    pub fn layout(self) -> &'static [&'static str] {
        match self {
            FeatureProfile::Compact => COMPACT_LAYOUT,
            FeatureProfile::Extended => EXTENDED_LAYOUT,
        }
    }

    pub fn len(self) -> usize {
        self.layout().len()
    }

    /// Position of a feature identifier in this profile
    pub fn index_of(self, name: &str) -> Option<usize> {
        self.layout().iter().position(|&n| n == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureProfile::Compact => "compact",
            FeatureProfile::Extended => "extended",
        }
    }
}

impl fmt::Display for FeatureProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown feature profile '{0}', expected 'compact' or 'extended'")]
pub struct UnknownProfileError(pub String);

impl FromStr for FeatureProfile {
    type Err = UnknownProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "3" => Ok(FeatureProfile::Compact),
            "extended" | "9" => Ok(FeatureProfile::Extended),
            _ => Err(UnknownProfileError(s.to_string())),
        }
    }
}

// ============================================================================
// FEATURE VECTOR
// ============================================================================

/// Feature values tagged with the profile that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    profile: FeatureProfile,
    values: Vec<f64>,
}

impl FeatureVector {
    /// All-zero vector, used when extraction degrades
    pub fn zeros(profile: FeatureProfile) -> Self {
        Self {
            profile,
            values: vec![0.0; profile.len()],
        }
    }

    /// Build from values in profile order
    pub fn from_values(profile: FeatureProfile, values: Vec<f64>) -> Result<Self, LayoutMismatchError> {
        if values.len() != profile.len() {
            return Err(LayoutMismatchError {
                profile,
                detail: format!("expected {} values, got {}", profile.len(), values.len()),
            });
        }
        Ok(Self { profile, values })
    }

    pub fn profile(&self) -> FeatureProfile {
        self.profile
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Look a value up by feature identifier
    pub fn get(&self, name: &str) -> Option<f64> {
        self.profile.index_of(name).map(|i| self.values[i])
    }

    /// `(identifier, value)` pairs in profile order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.profile.layout().iter().copied().zip(self.values.iter().copied())
    }

    /// Check that this vector has the shape `expected` requires
    pub fn ensure_profile(&self, expected: FeatureProfile) -> Result<(), LayoutMismatchError> {
        if self.profile != expected {
            return Err(LayoutMismatchError {
                profile: expected,
                detail: format!("vector was extracted with the {} profile", self.profile),
            });
        }
        Ok(())
    }
}

/// Serialized as a `{identifier: value}` object in profile order
impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Error)]
#[error("feature layout mismatch for {profile} profile: {detail}")]
pub struct LayoutMismatchError {
    pub profile: FeatureProfile,
    pub detail: String,
}

// ============================================================================
// EXTRACTION
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("signal is empty, no features can be derived")]
pub struct EmptySignalError;

/// Outcome of an extraction: either real features or the degraded default
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Complete(FeatureVector),
    Degraded {
        vector: FeatureVector,
        reason: EmptySignalError,
    },
}

impl Extraction {
    /// The vector to continue the pipeline with
    pub fn vector(&self) -> &FeatureVector {
        match self {
            Extraction::Complete(v) => v,
            Extraction::Degraded { vector, .. } => vector,
        }
    }

    pub fn into_parts(self) -> (FeatureVector, Option<EmptySignalError>) {
        match self {
            Extraction::Complete(v) => (v, None),
            Extraction::Degraded { vector, reason } => (vector, Some(reason)),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Extraction::Degraded { .. })
    }
}

/// Derive the feature vector of `signal` for `profile`.
///
/// An empty signal yields [`Extraction::Degraded`] with an all-zero vector.
pub fn extract(signal: &[f64], profile: FeatureProfile) -> Extraction {
    if signal.is_empty() {
        tracing::warn!("Feature extraction on empty signal, using zero vector");
        return Extraction::Degraded {
            vector: FeatureVector::zeros(profile),
            reason: EmptySignalError,
        };
    }

    let stats = SignalStats::compute(signal);

    let values = match profile {
        FeatureProfile::Compact => vec![stats.mean_abs, stats.form_factor, stats.variance],
        FeatureProfile::Extended => {
            let mut sorted = signal.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));

            let above_mean = signal.iter().filter(|&&x| x > stats.mean).count();

            vec![
                stats.mean,
                quantile_sorted(&sorted, 0.5),
                stats.variance.sqrt(),
                stats.variance,
                stats.max - stats.min,
                above_mean as f64,
                quantile_sorted(&sorted, 0.75),
                stats.mean_abs,
                stats.form_factor,
            ]
        }
    };

    Extraction::Complete(FeatureVector { profile, values })
}

/// Moments shared by both profiles
struct SignalStats {
    mean: f64,
    mean_abs: f64,
    variance: f64,
    form_factor: f64,
    min: f64,
    max: f64,
}

impl SignalStats {
    fn compute(signal: &[f64]) -> Self {
        let n = signal.len() as f64;

        let mean = signal.iter().sum::<f64>() / n;
        let mean_abs = signal.iter().map(|x| x.abs()).sum::<f64>() / n;
        let mean_sq = signal.iter().map(|x| x * x).sum::<f64>() / n;
        let variance = signal.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let rms = mean_sq.sqrt();
        let form_factor = if mean_abs == 0.0 { 0.0 } else { rms / mean_abs };

        let min = signal.iter().copied().fold(f64::INFINITY, f64::min);
        let max = signal.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            mean,
            mean_abs,
            variance,
            form_factor,
            min,
            max,
        }
    }
}

/// Quantile `q` of an ascending slice by linear interpolation between the
/// order statistics at `floor(h)` and `floor(h) + 1`, `h = (n - 1) * q`.
/// `sorted` must be non-empty.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_layout_lengths() {
        assert_eq!(FeatureProfile::Compact.len(), 3);
        assert_eq!(FeatureProfile::Extended.len(), 9);
        assert_eq!(FeatureProfile::Extended.index_of("I-L1_Sig-FF"), Some(8));
        assert_eq!(FeatureProfile::Compact.index_of("I-L1_Sig-FF"), None);
    }

    #[test]
    fn test_compact_features() {
        let v = match extract(&[1.0, -1.0, 3.0, -3.0], FeatureProfile::Compact) {
            Extraction::Complete(v) => v,
            other => panic!("unexpected {:?}", other),
        };

        // GRW = 2, RMS = sqrt(5), Var = 5
        assert!(approx(v.get("GRW").unwrap(), 2.0));
        assert!(approx(v.get("FF").unwrap(), 5.0f64.sqrt() / 2.0));
        assert!(approx(v.get("Var").unwrap(), 5.0));
    }

    #[test]
    fn test_extended_features() {
        let extraction = extract(&[1.0, 2.0, 3.0, 4.0], FeatureProfile::Extended);
        assert!(!extraction.is_degraded());
        let v = extraction.vector();

        assert!(approx(v.get("I-L1_SigStat-MW").unwrap(), 2.5));
        assert!(approx(v.get("I-L1_StatSig-qMW").unwrap(), 2.5));
        assert!(approx(v.get("I-L1_Stat-Var").unwrap(), 1.25));
        assert!(approx(v.get("I-L1_Stat-StdAW").unwrap(), 1.25f64.sqrt()));
        assert!(approx(v.get("I-L1_Stat-Wb").unwrap(), 3.0));
        assert!(approx(v.get("I-L1_Stat-N6M").unwrap(), 2.0));
        assert!(approx(v.get("I-L1_Sig-QWM").unwrap(), 3.25));
        assert!(approx(v.get("I-L1_Sig-GRW").unwrap(), 2.5));
        assert!(approx(v.get("I-L1_Sig-FF").unwrap(), 7.5f64.sqrt() / 2.5));
    }

    #[test]
    fn test_count_above_mean_excludes_ties() {
        // mean = 2, only the 4 is strictly greater
        let v = extract(&[2.0, 2.0, 0.0, 4.0, 2.0], FeatureProfile::Extended);
        assert_eq!(v.vector().get("I-L1_Stat-N6M"), Some(1.0));
    }

    #[test]
    fn test_zero_signal_form_factor_guard() {
        let v = extract(&[0.0; 16], FeatureProfile::Compact);
        assert_eq!(v.vector().get("FF"), Some(0.0));
        assert_eq!(v.vector().get("GRW"), Some(0.0));

        let v = extract(&[0.0; 16], FeatureProfile::Extended);
        assert_eq!(v.vector().get("I-L1_Sig-FF"), Some(0.0));
    }

    #[test]
    fn test_empty_signal_degrades_to_zeros() {
        for profile in [FeatureProfile::Compact, FeatureProfile::Extended] {
            let extraction = extract(&[], profile);
            assert!(extraction.is_degraded());

            let (vector, reason) = extraction.into_parts();
            assert_eq!(reason, Some(EmptySignalError));
            assert_eq!(vector, FeatureVector::zeros(profile));
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let signal: Vec<f64> = (0..257).map(|i| ((i * 37) % 101) as f64 - 50.0).collect();
        for profile in [FeatureProfile::Compact, FeatureProfile::Extended] {
            assert_eq!(extract(&signal, profile), extract(&signal, profile));
        }
    }

    #[test]
    fn test_quantile_interpolation() {
        let sorted = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert!(approx(quantile_sorted(&sorted, 0.0), 10.0));
        assert!(approx(quantile_sorted(&sorted, 0.5), 30.0));
        assert!(approx(quantile_sorted(&sorted, 0.75), 40.0));
        assert!(approx(quantile_sorted(&sorted, 0.9), 46.0));
        assert!(approx(quantile_sorted(&sorted, 1.0), 50.0));
        assert!(approx(quantile_sorted(&[7.0], 0.75), 7.0));
    }

    #[test]
    fn test_profile_mismatch_detected() {
        let v = FeatureVector::zeros(FeatureProfile::Compact);
        assert!(v.ensure_profile(FeatureProfile::Compact).is_ok());
        assert!(v.ensure_profile(FeatureProfile::Extended).is_err());

        assert!(FeatureVector::from_values(FeatureProfile::Compact, vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_serializes_as_named_map() {
        let v = FeatureVector::from_values(FeatureProfile::Compact, vec![1.0, 2.0, 3.0]).unwrap();
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json, serde_json::json!({"GRW": 1.0, "FF": 2.0, "Var": 3.0}));
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!("compact".parse::<FeatureProfile>().unwrap(), FeatureProfile::Compact);
        assert_eq!("Extended".parse::<FeatureProfile>().unwrap(), FeatureProfile::Extended);
        assert_eq!(
            "huge".parse::<FeatureProfile>(),
            Err(UnknownProfileError("huge".to_string()))
        );
    }
}
