// Spectrogram module - dB magnitude image of an event for display
//
// The window shrinks with the buffer so that short events still produce a
// usable image: largest power of two not above min(2048, max(len, 32)).

use serde::Serialize;

use super::fft::{StftProcessor, N_FFT};
use super::MIN_ANALYSIS_SAMPLES;
use crate::error::FeatureError;

/// Dynamic range kept below the peak, in dB
const DISPLAY_RANGE_DB: f32 = 80.0;

/// Magnitude floor before the log
const AMPLITUDE_FLOOR: f32 = 1e-5;

/// dB spectrogram, one row per STFT frame, each row `n_fft / 2 + 1` bins
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spectrogram {
    pub n_fft: usize,
    pub hop_length: usize,
    pub sample_rate: u32,
    /// `[frame][bin]`, 0 dB at the peak, never below -80 dB
    pub frames: Vec<Vec<f32>>,
}

impl Spectrogram {
    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Time in seconds at the center of frame `index`
    pub fn frame_time(&self, index: usize) -> f32 {
        (index * self.hop_length) as f32 / self.sample_rate as f32
    }

    /// Center frequency of bin `index` in Hz
    pub fn bin_frequency(&self, index: usize) -> f32 {
        index as f32 * self.sample_rate as f32 / self.n_fft as f32
    }
}

/// Window size for a buffer of `len` samples
pub fn window_size(len: usize) -> usize {
    let n = len.max(MIN_ANALYSIS_SAMPLES).min(N_FFT);
    // Largest power of two <= n
    1usize << (usize::BITS - 1 - n.leading_zeros())
}

/// Compute the display spectrogram of `audio`
///
/// # Errors
/// `FeatureError::InsufficientSignal` only when `audio` is empty.
pub fn compute(audio: &[f32], sample_rate: u32) -> Result<Spectrogram, FeatureError> {
    if audio.is_empty() {
        return Err(FeatureError::InsufficientSignal {
            len: 0,
            required: 1,
        });
    }

    let n_fft = window_size(audio.len());
    let hop_length = (n_fft / 4).max(1);
    let stft = StftProcessor::new(n_fft, hop_length);
    let magnitudes = stft.magnitude_frames(audio);

    let peak = magnitudes
        .iter()
        .flat_map(|frame| frame.iter().copied())
        .fold(0.0f32, f32::max);
    let reference_db = 20.0 * peak.max(AMPLITUDE_FLOOR).log10();

    let mut frames: Vec<Vec<f32>> = magnitudes
        .iter()
        .map(|frame| {
            frame
                .iter()
                .map(|&m| 20.0 * m.max(AMPLITUDE_FLOOR).log10() - reference_db)
                .collect()
        })
        .collect();

    let max_db = frames
        .iter()
        .flat_map(|frame| frame.iter().copied())
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = max_db - DISPLAY_RANGE_DB;
    for value in frames.iter_mut().flat_map(|frame| frame.iter_mut()) {
        *value = value.max(floor);
    }

    Ok(Spectrogram {
        n_fft,
        hop_length,
        sample_rate,
        frames,
    })
}
