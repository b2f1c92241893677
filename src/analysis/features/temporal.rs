// Temporal module - Time-domain feature extraction
//
// Zero-crossing rate is evaluated on centered, edge-padded frames and averaged,
// so it lines up frame-for-frame with the spectral features.
//
// References:
// - Peeters, G. (2004). A large set of audio features for sound description
// - Lerch, A. (2012). An Introduction to Audio Content Analysis

/// Samples with magnitude at or below this count as zero (non-negative)
const ZERO_THRESHOLD: f32 = 1e-10;

/// Temporal feature computation functions
pub struct TemporalFeatures {
    frame_length: usize,
    hop_length: usize,
}

impl TemporalFeatures {
    /// Create a new temporal features processor
    ///
    /// # Arguments
    /// * `frame_length` - Analysis frame length in samples
    /// * `hop_length` - Samples between frame starts
    pub fn new(frame_length: usize, hop_length: usize) -> Self {
        Self {
            frame_length: frame_length.max(2),
            hop_length: hop_length.max(1),
        }
    }

    /// Compute the mean zero-crossing rate over centered frames
    ///
    /// Each frame's rate is `crossings / frame_length`, where a crossing is a
    /// sign change between neighbouring samples. The signal is padded by
    /// repeating its edge samples so that every frame is full length.
    ///
    /// # Returns
    /// Mean zero-crossing rate (0.0 to 1.0)
    pub fn compute_zcr(&self, audio: &[f32]) -> f32 {
        if audio.is_empty() {
            return 0.0;
        }

        let negative: Vec<bool> = audio
            .iter()
            .map(|&x| x < 0.0 && x.abs() > ZERO_THRESHOLD)
            .collect();

        let pad = self.frame_length / 2;
        let first = negative[0];
        let last = negative[negative.len() - 1];
        let sign_at = |padded_index: usize| -> bool {
            if padded_index < pad {
                first
            } else if padded_index - pad >= negative.len() {
                last
            } else {
                negative[padded_index - pad]
            }
        };

        let n_frames = 1 + audio.len() / self.hop_length;
        let mut total_rate = 0.0f64;
        for t in 0..n_frames {
            let start = t * self.hop_length;
            let crossings = (start + 1..start + self.frame_length)
                .filter(|&i| sign_at(i) != sign_at(i - 1))
                .count();
            total_rate += crossings as f64 / self.frame_length as f64;
        }

        (total_rate / n_frames as f64) as f32
    }
}
