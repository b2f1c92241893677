// Types module - the fixed-layout feature vector
//
// The field order below is a format contract shared by the classifier and
// every persisted sample. Reordering or resizing it invalidates all stored
// samples and trained models.

use serde::{Deserialize, Serialize};

/// Number of mel-frequency cepstral coefficients
pub const N_MFCC: usize = 13;

/// Total scalar fields in a feature vector
pub const FEATURE_DIM: usize = N_MFCC + 5;

const CENTROID: usize = N_MFCC;
const BANDWIDTH: usize = N_MFCC + 1;
const ROLLOFF: usize = N_MFCC + 2;
const ZCR: usize = N_MFCC + 3;
const RMS: usize = N_MFCC + 4;

/// Acoustic fingerprint of one key-press event
///
/// Layout: `[mfcc_0 … mfcc_12, spectral_centroid, spectral_bandwidth,
/// spectral_rolloff, zero_crossing_rate, rms]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f32; FEATURE_DIM]);

impl FeatureVector {
    /// Field names in layout order
    pub const FIELD_NAMES: [&'static str; FEATURE_DIM] = [
        "mfcc_0",
        "mfcc_1",
        "mfcc_2",
        "mfcc_3",
        "mfcc_4",
        "mfcc_5",
        "mfcc_6",
        "mfcc_7",
        "mfcc_8",
        "mfcc_9",
        "mfcc_10",
        "mfcc_11",
        "mfcc_12",
        "spectral_centroid",
        "spectral_bandwidth",
        "spectral_rolloff",
        "zero_crossing_rate",
        "rms",
    ];

    /// Assemble a vector from its named parts
    pub fn from_parts(
        mfcc: [f32; N_MFCC],
        spectral_centroid: f32,
        spectral_bandwidth: f32,
        spectral_rolloff: f32,
        zero_crossing_rate: f32,
        rms: f32,
    ) -> Self {
        let mut values = [0.0f32; FEATURE_DIM];
        values[..N_MFCC].copy_from_slice(&mfcc);
        values[CENTROID] = spectral_centroid;
        values[BANDWIDTH] = spectral_bandwidth;
        values[ROLLOFF] = spectral_rolloff;
        values[ZCR] = zero_crossing_rate;
        values[RMS] = rms;
        Self(values)
    }

    pub fn from_array(values: [f32; FEATURE_DIM]) -> Self {
        Self(values)
    }

    /// Build from a slice, `None` unless it has exactly `FEATURE_DIM` values
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        let array: [f32; FEATURE_DIM] = values.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_array(&self) -> &[f32; FEATURE_DIM] {
        &self.0
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    pub fn mfcc(&self) -> &[f32] {
        &self.0[..N_MFCC]
    }

    /// Mean spectral centroid in Hz
    pub fn spectral_centroid(&self) -> f32 {
        self.0[CENTROID]
    }

    /// Mean spectral bandwidth in Hz
    pub fn spectral_bandwidth(&self) -> f32 {
        self.0[BANDWIDTH]
    }

    /// Mean 85 % roll-off frequency in Hz
    pub fn spectral_rolloff(&self) -> f32 {
        self.0[ROLLOFF]
    }

    /// Mean zero-crossing rate (crossings per sample)
    pub fn zero_crossing_rate(&self) -> f32 {
        self.0[ZCR]
    }

    /// RMS of the whole event buffer
    pub fn rms(&self) -> f32 {
        self.0[RMS]
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_field_names() {
        let mut mfcc = [0.0; N_MFCC];
        for (i, value) in mfcc.iter_mut().enumerate() {
            *value = i as f32;
        }
        let features = FeatureVector::from_parts(mfcc, 100.0, 200.0, 300.0, 0.25, 0.5);

        assert_eq!(FEATURE_DIM, 18);
        assert_eq!(features.as_slice().len(), FeatureVector::FIELD_NAMES.len());
        assert_eq!(features.mfcc()[12], 12.0);
        assert_eq!(features.get(13), Some(100.0));
        assert_eq!(features.spectral_bandwidth(), 200.0);
        assert_eq!(features.spectral_rolloff(), 300.0);
        assert_eq!(features.zero_crossing_rate(), 0.25);
        assert_eq!(features.rms(), 0.5);
        assert_eq!(FeatureVector::FIELD_NAMES[17], "rms");
    }

    #[test]
    fn test_from_slice_rejects_wrong_width() {
        assert!(FeatureVector::from_slice(&[0.0; 17]).is_none());
        assert!(FeatureVector::from_slice(&[0.0; 18]).is_some());
    }

    #[test]
    fn test_serializes_as_flat_array() {
        let features = FeatureVector::from_array([1.0; FEATURE_DIM]);
        let json = serde_json::to_string(&features).unwrap();
        assert!(json.starts_with('['));
        let parsed: FeatureVector = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, features);
    }
}
