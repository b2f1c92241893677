//! Pipeline: frame ingestion, segmentation thread lifecycle and live tuning.
//!
//! Frames enter through `ingest`, which reports them to the observer verbatim,
//! down-mixes interleaved input, stamps the stream position and enqueues the
//! frame. The segmentation thread pops frames and delivers key events to the
//! same observer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::{spawn_segmentation_thread, PipelineObserver, SegmentationParams};
use crate::audio::{downmix_interleaved, AudioFrame, FrameProducer, FrameQueue, PushOutcome};
use crate::config::AppConfig;
use crate::error::{log_pipeline_error, PipelineError};
use crate::telemetry;

/// Patch describing parameter updates to apply to the running pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParamPatch {
    #[serde(default)]
    pub energy_threshold: Option<f32>,
    #[serde(default)]
    pub silence_timeout: Option<f32>,
}

/// Running segmentation pipeline
pub struct Pipeline {
    producer: FrameProducer,
    params: Arc<SegmentationParams>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    observer: Arc<dyn PipelineObserver>,
    /// Mono samples ingested so far, dropped frames included
    position: AtomicU64,
    channels: u16,
    sample_rate: u32,
}

impl Pipeline {
    /// Validate `config` and start the segmentation thread
    ///
    /// # Errors
    /// * `InvalidConfig` - a configuration value is out of range
    /// * `ThreadSpawn` - the OS refused to create the thread
    pub fn start(
        config: &AppConfig,
        observer: Arc<dyn PipelineObserver>,
    ) -> Result<Self, PipelineError> {
        config.validate().inspect_err(|err| {
            log_pipeline_error(err, "start");
        })?;

        let (producer, consumer) = FrameQueue::bounded(config.segmentation.queue_capacity);
        let params = Arc::new(SegmentationParams::new(
            config.audio.energy_threshold,
            config.audio.silence_timeout,
        ));
        let running = Arc::new(AtomicBool::new(true));

        let worker = spawn_segmentation_thread(
            consumer,
            Arc::clone(&params),
            Arc::clone(&running),
            Arc::clone(&observer),
            config.audio.sample_rate,
            Duration::from_millis(config.segmentation.poll_interval_ms),
        )
        .map_err(PipelineError::from)
        .inspect_err(|err| {
            log_pipeline_error(err, "start");
        })?;

        tracing::info!(
            "[Pipeline] Started: {} Hz, {} channel(s), queue capacity {}",
            config.audio.sample_rate,
            config.audio.channels,
            config.segmentation.queue_capacity
        );

        Ok(Self {
            producer,
            params,
            running,
            worker: Some(worker),
            observer,
            position: AtomicU64::new(0),
            channels: config.audio.channels,
            sample_rate: config.audio.sample_rate,
        })
    }

    /// Feed one raw frame from the frame source
    ///
    /// Interleaved multi-channel input is averaged to mono. An empty frame is
    /// a read gap: it is reported to the observer but not queued.
    ///
    /// # Errors
    /// `AlreadyStopped` after `stop()`
    pub fn ingest(&self, samples: &[f32]) -> Result<PushOutcome, PipelineError> {
        if !self.is_running() {
            return Err(PipelineError::AlreadyStopped);
        }

        self.observer.on_frame(samples);
        telemetry::hub().record_frame_ingested();

        if samples.is_empty() {
            return Ok(PushOutcome::Queued);
        }

        let mono = if self.channels > 1 {
            downmix_interleaved(samples, self.channels)
        } else {
            samples.to_vec()
        };
        let start_sample = self.position.fetch_add(mono.len() as u64, Ordering::SeqCst);

        let outcome = self.producer.push(AudioFrame::new(mono, start_sample));
        if let PushOutcome::QueuedDroppingOldest(count) = outcome {
            tracing::warn!(
                "[Pipeline] Frame queue full, dropped {} oldest frame(s) ({} total)",
                count,
                self.producer.dropped()
            );
            telemetry::hub().record_frames_dropped(count, self.producer.dropped());
        }

        let occupancy = self.producer.len() as f32 / self.producer.capacity() as f32 * 100.0;
        telemetry::hub().record_queue_occupancy("frames", occupancy);

        Ok(outcome)
    }

    /// Change the loudness threshold; applies from the next frame segmented
    ///
    /// NaN, infinite and negative values are logged and ignored.
    pub fn set_threshold(&self, energy_threshold: f32) {
        if !is_valid_param(energy_threshold) {
            tracing::warn!(
                "[Pipeline] Ignoring energy threshold {}, keeping {:.4}",
                energy_threshold,
                self.params.energy_threshold()
            );
            return;
        }
        tracing::info!("[Pipeline] Energy threshold set to {:.4}", energy_threshold);
        self.params.set_energy_threshold(energy_threshold);
    }

    /// Change the silence timeout in seconds; applies from the next frame
    ///
    /// NaN, infinite and negative values are logged and ignored.
    pub fn set_silence_timeout(&self, silence_timeout: f32) {
        if !is_valid_param(silence_timeout) {
            tracing::warn!(
                "[Pipeline] Ignoring silence timeout {}, keeping {:.3}s",
                silence_timeout,
                self.params.silence_timeout()
            );
            return;
        }
        tracing::info!("[Pipeline] Silence timeout set to {:.3}s", silence_timeout);
        self.params.set_silence_timeout(silence_timeout);
    }

    /// Apply every field present in `patch`
    pub fn apply(&self, patch: &ParamPatch) {
        if let Some(threshold) = patch.energy_threshold {
            self.set_threshold(threshold);
        }
        if let Some(timeout) = patch.silence_timeout {
            self.set_silence_timeout(timeout);
        }
    }

    pub fn energy_threshold(&self) -> f32 {
        self.params.energy_threshold()
    }

    pub fn silence_timeout(&self) -> f32 {
        self.params.silence_timeout()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Frames evicted by queue overflow since start
    pub fn dropped_frames(&self) -> u64 {
        self.producer.dropped()
    }

    /// Stop the segmentation thread and discard queued frames
    ///
    /// Returns once the thread has exited, which takes at most one poll
    /// interval plus the time to finish the frame in hand.
    ///
    /// # Errors
    /// `AlreadyStopped` when called twice
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(PipelineError::AlreadyStopped);
        }

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("[Pipeline] Segmentation thread panicked");
            }
        }

        let discarded = self.producer.clear();
        tracing::info!("[Pipeline] Stopped, {} queued frame(s) discarded", discarded);
        Ok(())
    }
}

/// Same bounds `AppConfig::validate` applies at startup
fn is_valid_param(value: f32) -> bool {
    value.is_finite() && value >= 0.0
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
