//! Configuration management for runtime parameter tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling fast iteration without recompilation. Detection thresholds,
//! queue sizing and classifier hyper-parameters can be adjusted via the
//! config file. The sample rate must be identical between training and
//! inference since every spectral feature depends on it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: RuntimeConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Stream format and detection knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Samples per frame delivered by the frame source (per channel)
    pub frame_size: usize,
    /// Interleaved channels per frame; anything above 1 is down-mixed
    pub channels: u16,
    /// Frame RMS above which a frame counts as key sound
    pub energy_threshold: f32,
    /// Quiet time in seconds required to close an event
    pub silence_timeout: f32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frame_size: 1024,
            channels: 1,
            // Empirical defaults, not invariants
            energy_threshold: 0.02,
            silence_timeout: 0.3,
        }
    }
}

/// Frame queue and consumer polling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Maximum frames waiting for the segmentation thread (oldest dropped first)
    pub queue_capacity: usize,
    /// How long the consumer waits for a frame before re-checking the stop flag
    pub poll_interval_ms: u64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            poll_interval_ms: 10,
        }
    }
}

/// Random forest hyper-parameters and persistence location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub n_trees: usize,
    pub seed: u64,
    /// `None` grows trees until leaves are pure
    #[serde(default)]
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Where `train()` persists the model unit, if anywhere
    #[serde(default)]
    pub model_path: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            seed: 42,
            max_depth: None,
            min_samples_split: 2,
            model_path: None,
        }
    }
}

impl RuntimeConfig {
    /// Duration of one frame in seconds
    pub fn frame_duration(&self) -> f32 {
        self.frame_size as f32 / self.sample_rate.max(1) as f32
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/keytap_config.json")
    }

    /// Check value ranges before the pipeline is started
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |field: &str, reason: &str| PipelineError::InvalidConfig {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be greater than 0"));
        }
        if self.audio.frame_size == 0 {
            return Err(invalid("audio.frame_size", "must be greater than 0"));
        }
        if self.audio.channels == 0 {
            return Err(invalid("audio.channels", "must be greater than 0"));
        }
        if !self.audio.energy_threshold.is_finite() || self.audio.energy_threshold < 0.0 {
            return Err(invalid(
                "audio.energy_threshold",
                "must be a finite, non-negative number",
            ));
        }
        if !self.audio.silence_timeout.is_finite() || self.audio.silence_timeout < 0.0 {
            return Err(invalid(
                "audio.silence_timeout",
                "must be a finite, non-negative number of seconds",
            ));
        }
        if self.segmentation.queue_capacity == 0 {
            return Err(invalid("segmentation.queue_capacity", "must be greater than 0"));
        }
        if self.segmentation.poll_interval_ms == 0 {
            return Err(invalid(
                "segmentation.poll_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.classifier.n_trees == 0 {
            return Err(invalid("classifier.n_trees", "must be greater than 0"));
        }
        if self.classifier.min_samples_split < 2 {
            return Err(invalid("classifier.min_samples_split", "must be at least 2"));
        }
        Ok(())
    }
}
