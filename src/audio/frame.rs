// Frame and event buffer types shared by the segmentation and feature stages
//
// AudioFrame is one read from the frame source, tagged with its absolute
// position in the stream. EventBuffer is the concatenation of the loud frames
// that make up one key press.

/// Events made of this many frames or fewer are treated as noise
pub const MIN_EVENT_FRAMES: usize = 2;

/// One fixed-size chunk of mono samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    /// Samples ingested before this frame, dropped frames included
    start_sample: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, start_sample: u64) -> Self {
        Self {
            samples,
            start_sample,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    /// Stream position one past the last sample of this frame
    pub fn end_sample(&self) -> u64 {
        self.start_sample + self.samples.len() as u64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn rms(&self) -> f32 {
        compute_rms(&self.samples)
    }
}

/// Concatenated loud frames of one detected key press
#[derive(Debug, Clone, PartialEq)]
pub struct EventBuffer {
    samples: Vec<f32>,
    frame_count: usize,
    start_sample: u64,
    end_sample: u64,
}

impl EventBuffer {
    pub(crate) fn start(frame: AudioFrame) -> Self {
        let start_sample = frame.start_sample();
        let end_sample = frame.end_sample();
        Self {
            samples: frame.samples,
            frame_count: 1,
            start_sample,
            end_sample,
        }
    }

    pub(crate) fn push(&mut self, frame: AudioFrame) {
        self.end_sample = frame.end_sample();
        self.samples.extend_from_slice(&frame.samples);
        self.frame_count += 1;
    }

    /// Build an event directly from samples (used by offline tools and tests)
    pub fn from_samples(samples: Vec<f32>, frame_count: usize, start_sample: u64) -> Self {
        let end_sample = start_sample + samples.len() as u64;
        Self {
            samples,
            frame_count,
            start_sample,
            end_sample,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Number of above-threshold frames concatenated into this event
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Stream position of the first buffered sample
    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    /// Stream position one past the last buffered sample
    pub fn end_sample(&self) -> u64 {
        self.end_sample
    }

    /// Whether the event passes the minimum-length noise filter
    pub fn is_valid(&self) -> bool {
        self.frame_count > MIN_EVENT_FRAMES
    }

    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        self.samples.len() as f32 / sample_rate.max(1) as f32
    }
}

/// Root-mean-square amplitude, accumulated in f64
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&x| (x as f64) * (x as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Average interleaved channels into a mono signal
///
/// A trailing partial sample group is averaged over the channels present.
pub fn downmix_interleaved(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|group| group.iter().sum::<f32>() / group.len() as f32)
        .collect()
}
