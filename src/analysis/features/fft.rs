// FFT module - short-time Fourier transform with centered framing
//
// Frames are centered: the signal is zero-padded by n_fft/2 on both sides, so
// a buffer of `len` samples yields `1 + len / hop_length` frames and even very
// short buffers produce at least one spectrum.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// FFT window size for feature extraction
pub const N_FFT: usize = 2048;

/// Hop between successive analysis frames
pub const HOP_LENGTH: usize = 512;

/// Periodic Hann window of length `n`
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * ((2.0 * std::f32::consts::PI * i as f32) / n as f32).cos())
        .collect()
}

/// STFT processor producing magnitude spectra
pub struct StftProcessor {
    fft: Arc<dyn Fft<f32>>,
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
}

impl StftProcessor {
    /// Create a new STFT processor
    ///
    /// # Arguments
    /// * `n_fft` - FFT window size
    /// * `hop_length` - Samples between frame starts (must be > 0)
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);

        Self {
            fft,
            n_fft,
            hop_length: hop_length.max(1),
            window: hann_window(n_fft),
        }
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Bins per spectrum (positive frequencies including DC and Nyquist)
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of centered frames produced for `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }

    /// Center frequency of each bin in Hz
    pub fn bin_frequencies(&self, sample_rate: u32) -> Vec<f32> {
        let bin_width = sample_rate as f32 / self.n_fft as f32;
        (0..self.n_bins()).map(|k| k as f32 * bin_width).collect()
    }

    /// Compute the magnitude spectrogram, one `Vec` per frame
    ///
    /// # Returns
    /// `frame_count(audio.len())` spectra of `n_bins()` magnitudes each
    pub fn magnitude_frames(&self, audio: &[f32]) -> Vec<Vec<f32>> {
        let pad = self.n_fft / 2;
        let mut padded = vec![0.0f32; audio.len() + 2 * pad];
        padded[pad..pad + audio.len()].copy_from_slice(audio);

        let n_frames = self.frame_count(audio.len());
        let mut spectra = Vec::with_capacity(n_frames);
        let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); self.n_fft];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.fft.get_inplace_scratch_len()];

        for t in 0..n_frames {
            let start = t * self.hop_length;
            let segment = &padded[start..start + self.n_fft];
            for ((slot, &sample), &w) in buffer.iter_mut().zip(segment).zip(&self.window) {
                *slot = Complex::new(sample * w, 0.0);
            }

            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            spectra.push(buffer[..self.n_bins()].iter().map(|c| c.norm()).collect());
        }

        spectra
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window_is_periodic() {
        let w = hann_window(8);
        assert_eq!(w.len(), 8);
        assert!(w[0].abs() < 1e-6);
        assert!((w[4] - 1.0).abs() < 1e-6);
        // Periodic window: w[i] == w[n - i]
        assert!((w[1] - w[7]).abs() < 1e-6);
    }

    #[test]
    fn test_frame_count_is_centered() {
        let stft = StftProcessor::new(N_FFT, HOP_LENGTH);
        assert_eq!(stft.frame_count(0), 1);
        assert_eq!(stft.frame_count(32), 1);
        assert_eq!(stft.frame_count(5120), 11);
        assert_eq!(stft.magnitude_frames(&vec![0.1; 5120]).len(), 11);
    }

    #[test]
    fn test_sine_peak_lands_in_expected_bin() {
        let sample_rate = 8192;
        let stft = StftProcessor::new(1024, 256);
        // 512 Hz at 8 Hz per bin -> bin 64
        let signal: Vec<f32> = (0..4096)
            .map(|i| (2.0 * std::f32::consts::PI * 512.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        let frames = stft.magnitude_frames(&signal);
        let middle = &frames[frames.len() / 2];
        let peak = middle
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 64);
        assert_eq!(stft.bin_frequencies(sample_rate)[64], 512.0);
    }
}
