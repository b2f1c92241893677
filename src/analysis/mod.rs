// Analysis module - segmentation thread and the DSP stages it feeds
//
// This module runs the consumer side of the pipeline: frames arrive through
// the bounded frame queue, the Segmenter groups loud frames into key-press
// events, and every emitted event is handed to the observer on this thread.
//
// Architecture:
// - SegmentationWorker: loop that pops frames until the running flag clears
// - SegmentationParams: live-tunable threshold / timeout shared with producers
// - Pipeline: Segmenter → EventBuffer → observer (features / classifier)

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::{EventBuffer, FrameConsumer};
use crate::telemetry;

pub mod classifier;
pub mod features;
pub mod segmenter;

use segmenter::{SegmentOutcome, Segmenter};

/// Receives pipeline output
///
/// `on_frame` runs on the ingesting thread for every frame, verbatim.
/// `on_key_event` runs on the segmentation thread for every emitted event.
pub trait PipelineObserver: Send + Sync {
    fn on_frame(&self, _samples: &[f32]) {}

    fn on_key_event(&self, _event: &EventBuffer) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Threshold and silence timeout, readable from any thread without locking
///
/// f32 values are stored as their bit patterns in atomics.
#[derive(Debug)]
pub struct SegmentationParams {
    energy_threshold: AtomicU32,
    silence_timeout: AtomicU32,
}

impl SegmentationParams {
    pub fn new(energy_threshold: f32, silence_timeout: f32) -> Self {
        Self {
            energy_threshold: AtomicU32::new(energy_threshold.to_bits()),
            silence_timeout: AtomicU32::new(silence_timeout.to_bits()),
        }
    }

    pub fn energy_threshold(&self) -> f32 {
        f32::from_bits(self.energy_threshold.load(Ordering::Relaxed))
    }

    pub fn silence_timeout(&self) -> f32 {
        f32::from_bits(self.silence_timeout.load(Ordering::Relaxed))
    }

    pub fn set_energy_threshold(&self, value: f32) {
        self.energy_threshold
            .store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn set_silence_timeout(&self, value: f32) {
        self.silence_timeout.store(value.to_bits(), Ordering::Relaxed);
    }
}

struct SegmentationWorker {
    consumer: FrameConsumer,
    params: Arc<SegmentationParams>,
    running: Arc<AtomicBool>,
    observer: Arc<dyn PipelineObserver>,
    segmenter: Segmenter,
    sample_rate: u32,
    poll_interval: Duration,
}

impl SegmentationWorker {
    fn new(
        consumer: FrameConsumer,
        params: Arc<SegmentationParams>,
        running: Arc<AtomicBool>,
        observer: Arc<dyn PipelineObserver>,
        sample_rate: u32,
        poll_interval: Duration,
    ) -> Self {
        let segmenter = Segmenter::new(
            sample_rate,
            params.energy_threshold(),
            params.silence_timeout(),
        );

        Self {
            consumer,
            params,
            running,
            observer,
            segmenter,
            sample_rate,
            poll_interval,
        }
    }

    fn run(mut self) {
        tracing::info!(
            "[SegmentationThread] Starting segmentation loop (threshold {:.4}, timeout {:.3}s)",
            self.params.energy_threshold(),
            self.params.silence_timeout()
        );

        while self.running.load(Ordering::SeqCst) {
            let Some(frame) = self.consumer.pop_timeout(self.poll_interval) else {
                continue;
            };

            // Pick up live parameter changes before judging the frame
            self.segmenter
                .set_threshold(self.params.energy_threshold());
            self.segmenter
                .set_silence_timeout(self.params.silence_timeout());

            match self.segmenter.process(frame) {
                SegmentOutcome::Started { rms } => {
                    tracing::debug!("[SegmentationThread] Event started (rms {:.4})", rms);
                }
                SegmentOutcome::Emitted(event) => {
                    tracing::debug!(
                        "[SegmentationThread] Key event: {} frames, {} samples",
                        event.frame_count(),
                        event.len()
                    );
                    telemetry::hub().record_key_event(&event, self.sample_rate);
                    self.observer.on_key_event(&event);
                }
                SegmentOutcome::Discarded { frames } => {
                    tracing::debug!(
                        "[SegmentationThread] Discarded {}-frame run as noise",
                        frames
                    );
                    telemetry::hub().record_event_discarded(frames);
                }
                SegmentOutcome::Skipped
                | SegmentOutcome::Quiet
                | SegmentOutcome::Extended
                | SegmentOutcome::Waiting => {}
            }
        }

        if self.segmenter.pending_frames() > 0 {
            tracing::info!(
                "[SegmentationThread] Stopping with {} buffered frames; open event discarded",
                self.segmenter.pending_frames()
            );
        }
        tracing::info!("[SegmentationThread] Running flag cleared, exiting");
    }
}

/// Spawn the segmentation thread
///
/// The thread runs until `running` is cleared, then exits within one poll
/// interval. An event still open at that point is discarded.
pub fn spawn_segmentation_thread(
    consumer: FrameConsumer,
    params: Arc<SegmentationParams>,
    running: Arc<AtomicBool>,
    observer: Arc<dyn PipelineObserver>,
    sample_rate: u32,
    poll_interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("keytap-segmentation".to_string())
        .spawn(move || {
            let worker = SegmentationWorker::new(
                consumer,
                params,
                running,
                observer,
                sample_rate,
                poll_interval,
            );
            worker.run();
        })
}
