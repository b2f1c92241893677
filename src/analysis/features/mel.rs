// Mel module - Slaney-style mel filterbank and orthonormal DCT-II
//
// The mel scale is linear below 1 kHz and logarithmic above it. Triangles are
// area-normalized so each band integrates to roughly equal energy regardless
// of width.

/// Number of mel bands fed into the cepstral transform
pub const N_MELS: usize = 128;

/// Dynamic range kept below the loudest mel cell, in dB
pub const TOP_DB: f32 = 80.0;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Convert Hz to Slaney mels
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

/// Convert Slaney mels back to Hz
pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Create the mel filterbank matrix
///
/// Returns `[n_mels][n_fft / 2 + 1]` weights covering `fmin..fmax` Hz.
pub fn mel_filter_bank(
    n_mels: usize,
    n_fft: usize,
    sample_rate: u32,
    fmin: f64,
    fmax: f64,
) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    // n_mels + 2 points equally spaced on the mel axis
    let min_mel = hz_to_mel(fmin);
    let max_mel = hz_to_mel(fmax);
    let step = (max_mel - min_mel) / (n_mels + 1) as f64;
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(min_mel + i as f64 * step))
        .collect();

    let mut bank = Vec::with_capacity(n_mels);
    for m in 0..n_mels {
        let left = mel_points[m];
        let center = mel_points[m + 1];
        let right = mel_points[m + 2];
        let enorm = 2.0 / (right - left);

        let filter = fft_freqs
            .iter()
            .map(|&f| {
                let lower = (f - left) / (center - left);
                let upper = (right - f) / (right - center);
                (lower.min(upper).max(0.0) * enorm) as f32
            })
            .collect();
        bank.push(filter);
    }
    bank
}

/// Orthonormal DCT-II basis, `[n_out][n_in]`
pub fn dct_basis(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 {
                (1.0 / n).sqrt()
            } else {
                (2.0 / n).sqrt()
            };
            (0..n_in)
                .map(|i| {
                    let angle = std::f64::consts::PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n);
                    (scale * angle.cos()) as f32
                })
                .collect()
        })
        .collect()
}

/// Apply a filterbank to a power spectrum
pub fn apply_filter_bank(bank: &[Vec<f32>], power: &[f32]) -> Vec<f32> {
    bank.iter()
        .map(|filter| {
            filter
                .iter()
                .zip(power)
                .map(|(&w, &p)| w as f64 * p as f64)
                .sum::<f64>() as f32
        })
        .collect()
}

/// Power to decibels with a floor of 1e-10, referenced to 1.0
pub fn power_to_db(power: f32) -> f32 {
    10.0 * power.max(1e-10).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hz_mel_roundtrip() {
        for &hz in &[0.0, 100.0, 440.0, 1000.0, 4000.0, 11025.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((hz - back).abs() < 1e-6, "roundtrip failed for {} Hz", hz);
        }
    }

    #[test]
    fn test_scale_is_linear_below_1khz() {
        assert!((hz_to_mel(500.0) - 7.5).abs() < 1e-9);
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_mel_filter_bank_shape() {
        let bank = mel_filter_bank(N_MELS, 2048, 44100, 0.0, 22050.0);
        assert_eq!(bank.len(), N_MELS);
        assert_eq!(bank[0].len(), 1025);
        for filter in &bank {
            assert!(filter.iter().all(|&v| v >= 0.0));
        }
        // Every band in the upper range must cover at least one bin
        assert!(bank[N_MELS - 1].iter().any(|&v| v > 0.0));
    }

    #[test]
    fn test_dct_basis_is_orthonormal() {
        let basis = dct_basis(8, 8);
        for a in 0..8 {
            for b in 0..8 {
                let dot: f32 = basis[a].iter().zip(&basis[b]).map(|(x, y)| x * y).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-5, "<{}, {}> = {}", a, b, dot);
            }
        }
    }

    #[test]
    fn test_power_to_db_floor() {
        assert_eq!(power_to_db(0.0), -100.0);
        assert!((power_to_db(1.0)).abs() < 1e-6);
    }
}
