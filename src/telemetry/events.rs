//! Core telemetry event types describing pipeline activity exposed to the CLI
//! and any subscriber of the status stream.

use serde::{Deserialize, Serialize};

/// Rich pipeline events covering segmentation, recognition and status lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Queue overflowed and the oldest frames were evicted
    FramesDropped { count: usize, dropped_total: u64 },
    QueueOccupancy { percent: f32 },
    KeyEvent {
        frames: usize,
        samples: usize,
        start_sample: u64,
        duration_ms: f32,
    },
    /// Loud run closed with too few frames to count as a key press
    EventDiscarded { frames: usize },
    ExtractionFailed { code: i32, context: String },
    Prediction {
        label: Option<String>,
        confidence: f32,
    },
    Status { message: String },
}

/// Monotonic pipeline counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub frames_ingested: u64,
    pub frames_dropped: u64,
    pub events_emitted: u64,
    pub events_discarded: u64,
    pub extraction_failures: u64,
    pub predictions: u64,
}
