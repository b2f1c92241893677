// Spectral module - Frequency-domain feature extraction
//
// This module computes spectral features from magnitude spectra.
// All features are based on the magnitude spectrum (absolute values of FFT bins)
// and are evaluated frame by frame, then averaged by the caller.
//
// References:
// - Peeters, G. (2004). A large set of audio features for sound description
// - Lerch, A. (2012). An Introduction to Audio Content Analysis

/// Spectral rolloff threshold (85% of cumulative magnitude)
pub const ROLLOFF_PERCENT: f32 = 0.85;

/// Spectral feature computation functions
pub struct SpectralFeatures {
    /// Center frequency of each bin in Hz
    frequencies: Vec<f32>,
}

impl SpectralFeatures {
    /// Create a new spectral features processor
    ///
    /// # Arguments
    /// * `frequencies` - Bin center frequencies matching the spectra to analyze
    pub fn new(frequencies: Vec<f32>) -> Self {
        Self { frequencies }
    }

    /// Compute spectral centroid (weighted mean frequency)
    ///
    /// Formula: centroid = Σ(f_i × |X[i]|) / Σ|X[i]|
    ///
    /// The spectral centroid represents the "center of mass" of the spectrum,
    /// and is a measure of the brightness of a sound.
    ///
    /// # Returns
    /// Spectral centroid in Hz, 0 for a silent frame
    pub fn compute_centroid(&self, spectrum: &[f32]) -> f32 {
        let magnitude_sum: f64 = spectrum.iter().map(|&m| m as f64).sum();
        if magnitude_sum <= f64::MIN_POSITIVE {
            return 0.0;
        }

        let weighted_sum: f64 = spectrum
            .iter()
            .zip(&self.frequencies)
            .map(|(&mag, &freq)| freq as f64 * mag as f64)
            .sum();

        (weighted_sum / magnitude_sum) as f32
    }

    /// Compute spectral bandwidth (second-order spread around the centroid)
    ///
    /// Formula: bandwidth = sqrt(Σ p_i × (f_i − centroid)²), p = |X| / Σ|X|
    ///
    /// # Returns
    /// Bandwidth in Hz, 0 for a silent frame
    pub fn compute_bandwidth(&self, spectrum: &[f32], centroid: f32) -> f32 {
        let magnitude_sum: f64 = spectrum.iter().map(|&m| m as f64).sum();
        if magnitude_sum <= f64::MIN_POSITIVE {
            return 0.0;
        }

        let spread: f64 = spectrum
            .iter()
            .zip(&self.frequencies)
            .map(|(&mag, &freq)| {
                let deviation = freq as f64 - centroid as f64;
                (mag as f64 / magnitude_sum) * deviation * deviation
            })
            .sum();

        spread.sqrt() as f32
    }

    /// Compute spectral rolloff (85% cumulative magnitude frequency)
    ///
    /// Finds the lowest bin frequency at which the cumulative magnitude reaches
    /// 85% of the frame total.
    ///
    /// # Returns
    /// Rolloff frequency in Hz
    pub fn compute_rolloff(&self, spectrum: &[f32]) -> f32 {
        let total: f64 = spectrum.iter().map(|&m| m as f64).sum();
        let threshold = ROLLOFF_PERCENT as f64 * total;

        let mut cumulative = 0.0f64;
        for (&mag, &freq) in spectrum.iter().zip(&self.frequencies) {
            cumulative += mag as f64;
            if cumulative >= threshold {
                return freq;
            }
        }

        // Rounding can leave the final cumulative sum a hair short
        self.frequencies.last().copied().unwrap_or(0.0)
    }
}
