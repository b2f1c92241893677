// Segmenter - energy-threshold key-press detector with silence-timeout release
//
// Onset is instantaneous: the first frame whose RMS exceeds the threshold opens
// an event. Release is debounced: the event only closes once the signal has
// stayed at or below the threshold for longer than the silence timeout, so the
// short gap between a key's down-click and up-click stays inside one event.
//
// Only above-threshold frames are buffered. Quiet frames inside an event are
// dropped, which shapes every downstream feature value and must not change.
//
// Time is measured on the stream clock (sample positions carried by each
// frame), which makes segmentation a pure function of the frame sequence.

use crate::audio::{AudioFrame, EventBuffer};

/// Detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// No event accumulating
    Idle,
    /// Accumulating loud frames into a candidate event
    Active,
}

/// What a single frame did to the detector
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentOutcome {
    /// Empty frame (read gap), ignored
    Skipped,
    /// Quiet frame while idle
    Quiet,
    /// Loud frame opened a new event
    Started { rms: f32 },
    /// Loud frame appended to the open event
    Extended,
    /// Quiet frame inside an event, timeout not yet reached
    Waiting,
    /// Event closed and passed the minimum-length filter
    Emitted(EventBuffer),
    /// Event closed but was too short; treated as noise
    Discarded { frames: usize },
}

#[derive(Debug)]
pub struct Segmenter {
    sample_rate: u32,
    energy_threshold: f32,
    silence_timeout: f32,
    current: Option<EventBuffer>,
    /// Stream position at the end of the last loud frame
    last_sound_sample: u64,
}

impl Segmenter {
    /// Create a detector
    ///
    /// # Arguments
    /// * `sample_rate` - Stream sample rate in Hz, used to convert positions to seconds
    /// * `energy_threshold` - Frame RMS above which a frame is loud
    /// * `silence_timeout` - Seconds of quiet required to close an event
    pub fn new(sample_rate: u32, energy_threshold: f32, silence_timeout: f32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            energy_threshold,
            silence_timeout,
            current: None,
            last_sound_sample: 0,
        }
    }

    pub fn set_threshold(&mut self, energy_threshold: f32) {
        self.energy_threshold = energy_threshold;
    }

    pub fn set_silence_timeout(&mut self, silence_timeout: f32) {
        self.silence_timeout = silence_timeout;
    }

    pub fn threshold(&self) -> f32 {
        self.energy_threshold
    }

    pub fn silence_timeout(&self) -> f32 {
        self.silence_timeout
    }

    pub fn state(&self) -> SegmenterState {
        if self.current.is_some() {
            SegmenterState::Active
        } else {
            SegmenterState::Idle
        }
    }

    /// Frames buffered in the open event, if any
    pub fn pending_frames(&self) -> usize {
        self.current.as_ref().map_or(0, EventBuffer::frame_count)
    }

    /// Drop any open event and return to idle
    pub fn reset(&mut self) {
        self.current = None;
        self.last_sound_sample = 0;
    }

    /// Advance the state machine by one frame
    pub fn process(&mut self, frame: AudioFrame) -> SegmentOutcome {
        if frame.is_empty() {
            return SegmentOutcome::Skipped;
        }

        let rms = frame.rms();
        let now = frame.end_sample();

        if rms > self.energy_threshold {
            self.last_sound_sample = now;
            return match self.current.as_mut() {
                Some(event) => {
                    event.push(frame);
                    SegmentOutcome::Extended
                }
                None => {
                    tracing::debug!("[Segmenter] Possible key sound detected, rms {:.6}", rms);
                    self.current = Some(EventBuffer::start(frame));
                    SegmentOutcome::Started { rms }
                }
            };
        }

        if self.current.is_none() {
            return SegmentOutcome::Quiet;
        }

        let silence_samples = now.saturating_sub(self.last_sound_sample);
        let silence_duration = silence_samples as f64 / self.sample_rate as f64;
        if silence_duration <= self.silence_timeout as f64 {
            return SegmentOutcome::Waiting;
        }

        match self.current.take() {
            Some(event) if event.is_valid() => {
                tracing::debug!(
                    "[Segmenter] Key event closed: {} samples over {} frames",
                    event.len(),
                    event.frame_count()
                );
                SegmentOutcome::Emitted(event)
            }
            Some(event) => SegmentOutcome::Discarded {
                frames: event.frame_count(),
            },
            None => SegmentOutcome::Quiet,
        }
    }
}

/// Segment a recorded mono signal without a queue or thread
///
/// The signal is cut into `frame_size` frames (the last one may be short)
/// and run through a fresh detector. An event still open at the end of the
/// signal is discarded, as it would be on stop.
pub fn segment_samples(
    samples: &[f32],
    frame_size: usize,
    sample_rate: u32,
    energy_threshold: f32,
    silence_timeout: f32,
) -> Vec<EventBuffer> {
    let mut segmenter = Segmenter::new(sample_rate, energy_threshold, silence_timeout);
    let mut position = 0u64;
    let mut events = Vec::new();

    for chunk in samples.chunks(frame_size.max(1)) {
        let frame = AudioFrame::new(chunk.to_vec(), position);
        position += chunk.len() as u64;
        if let SegmentOutcome::Emitted(event) = segmenter.process(frame) {
            events.push(event);
        }
    }
    events
}
