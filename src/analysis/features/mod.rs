// FeatureExtractor - acoustic fingerprinting of key-press events
//
// This module turns one segmented key-press event into a fixed 18-value
// feature vector used to tell keys apart, and renders a dB spectrogram of the
// same event for display.
//
// Module organization:
// - types: FeatureVector and its layout
// - fft: centered STFT with a periodic Hann window
// - mel: mel filterbank and DCT basis for the cepstral coefficients
// - spectral: per-frame centroid, bandwidth, rolloff
// - temporal: framed zero-crossing rate
// - spectrogram: display image
// - mod.rs: Coordinator (FeatureExtractor)
//
// Features extracted (all frame-wise values averaged over the event):
// 1. MFCC 0-12: cepstrum of the 128-band log-mel power spectrum
// 2. Spectral Centroid: Weighted mean frequency (brightness measure)
// 3. Spectral Bandwidth: Magnitude-weighted spread around the centroid
// 4. Spectral Rolloff: Frequency below which 85% of magnitude is contained
// 5. Zero-Crossing Rate (ZCR): Rate of sign changes (noise/tonality measure)
// 6. RMS: Energy of the whole event
//
// References:
// - Davis, S. & Mermelstein, P. (1980). Comparison of parametric representations
//   for monosyllabic word recognition
// - Peeters, G. (2004). A large set of audio features for sound description

mod fft;
mod mel;
mod spectral;
pub mod spectrogram;
mod temporal;
mod types;

pub use spectrogram::Spectrogram;
pub use types::{FeatureVector, FEATURE_DIM, N_MFCC};

use crate::audio::compute_rms;
use crate::error::FeatureError;
use fft::{StftProcessor, HOP_LENGTH, N_FFT};
use mel::{apply_filter_bank, dct_basis, mel_filter_bank, power_to_db, N_MELS, TOP_DB};
use spectral::SpectralFeatures;
use temporal::TemporalFeatures;

/// Shortest buffer accepted for analysis
pub const MIN_ANALYSIS_SAMPLES: usize = 32;

/// FeatureExtractor coordinates the feature extraction pipeline
///
/// Construction plans the FFT and precomputes the mel filterbank and DCT
/// basis, so one extractor should be reused across events.
pub struct FeatureExtractor {
    sample_rate: u32,
    stft: StftProcessor,
    mel_bank: Vec<Vec<f32>>,
    dct: Vec<Vec<f32>>,
    spectral_features: SpectralFeatures,
    temporal_features: TemporalFeatures,
}

impl FeatureExtractor {
    /// Create a new FeatureExtractor with the specified sample rate
    ///
    /// # Arguments
    /// * `sample_rate` - Audio sample rate in Hz (e.g., 44100)
    pub fn new(sample_rate: u32) -> Self {
        let stft = StftProcessor::new(N_FFT, HOP_LENGTH);
        let nyquist = sample_rate as f64 / 2.0;

        Self {
            sample_rate,
            mel_bank: mel_filter_bank(N_MELS, N_FFT, sample_rate.max(1), 0.0, nyquist.max(1.0)),
            dct: dct_basis(N_MFCC, N_MELS),
            spectral_features: SpectralFeatures::new(stft.bin_frequencies(sample_rate)),
            temporal_features: TemporalFeatures::new(N_FFT, HOP_LENGTH),
            stft,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Extract the feature vector of one event
    ///
    /// # Arguments
    /// * `audio` - Concatenated event samples (mono)
    ///
    /// # Errors
    /// * `InsufficientSignal` - fewer than `MIN_ANALYSIS_SAMPLES` samples
    /// * `InvalidSampleRate` - extractor built with a zero sample rate
    pub fn extract(&self, audio: &[f32]) -> Result<FeatureVector, FeatureError> {
        if self.sample_rate == 0 {
            return Err(FeatureError::InvalidSampleRate {
                sample_rate: self.sample_rate,
            });
        }
        if audio.len() < MIN_ANALYSIS_SAMPLES {
            return Err(FeatureError::InsufficientSignal {
                len: audio.len(),
                required: MIN_ANALYSIS_SAMPLES,
            });
        }

        let magnitudes = self.stft.magnitude_frames(audio);
        let n_frames = magnitudes.len() as f64;

        let mfcc = self.compute_mfcc(&magnitudes);

        let mut centroid_sum = 0.0f64;
        let mut bandwidth_sum = 0.0f64;
        let mut rolloff_sum = 0.0f64;
        for spectrum in &magnitudes {
            let centroid = self.spectral_features.compute_centroid(spectrum);
            centroid_sum += centroid as f64;
            bandwidth_sum += self.spectral_features.compute_bandwidth(spectrum, centroid) as f64;
            rolloff_sum += self.spectral_features.compute_rolloff(spectrum) as f64;
        }

        let zcr = self.temporal_features.compute_zcr(audio);
        let rms = compute_rms(audio);

        Ok(FeatureVector::from_parts(
            mfcc,
            (centroid_sum / n_frames) as f32,
            (bandwidth_sum / n_frames) as f32,
            (rolloff_sum / n_frames) as f32,
            zcr,
            rms,
        ))
    }

    /// Render the display spectrogram of one event
    ///
    /// # Errors
    /// `InsufficientSignal` only for an empty buffer
    pub fn spectrogram(&self, audio: &[f32]) -> Result<Spectrogram, FeatureError> {
        spectrogram::compute(audio, self.sample_rate)
    }

    fn compute_mfcc(&self, magnitudes: &[Vec<f32>]) -> [f32; N_MFCC] {
        // Log-mel power per frame
        let log_mel: Vec<Vec<f32>> = magnitudes
            .iter()
            .map(|spectrum| {
                let power: Vec<f32> = spectrum.iter().map(|m| m * m).collect();
                apply_filter_bank(&self.mel_bank, &power)
                    .into_iter()
                    .map(power_to_db)
                    .collect()
            })
            .collect();

        let peak = log_mel
            .iter()
            .flat_map(|frame| frame.iter().copied())
            .fold(f32::NEG_INFINITY, f32::max);
        let floor = peak - TOP_DB;

        let mut sums = [0.0f64; N_MFCC];
        for frame in &log_mel {
            for (sum, basis) in sums.iter_mut().zip(&self.dct) {
                *sum += basis
                    .iter()
                    .zip(frame)
                    .map(|(&b, &db)| b as f64 * db.max(floor) as f64)
                    .sum::<f64>();
            }
        }

        let mut mfcc = [0.0f32; N_MFCC];
        for (coef, sum) in mfcc.iter_mut().zip(sums) {
            *coef = (sum / log_mel.len().max(1) as f64) as f32;
        }
        mfcc
    }
}

/// Extract features with a one-off extractor
///
/// Convenience for single events; reuse a `FeatureExtractor` on hot paths.
pub fn extract_features(audio: &[f32], sample_rate: u32) -> Result<FeatureVector, FeatureError> {
    FeatureExtractor::new(sample_rate).extract(audio)
}
