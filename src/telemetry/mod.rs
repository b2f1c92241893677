//! Pipeline telemetry collector and helpers.
//!
//! The collector multiplexes segmentation, recognition and status events into
//! a bounded history plus a broadcast stream, and keeps monotonic counters
//! for the CLI and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

use crate::analysis::classifier::Prediction;
use crate::audio::EventBuffer;
use crate::error::{ErrorCode, FeatureError};

pub mod events;

pub use events::{CounterSnapshot, PipelineEvent};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<PipelineEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
    pub counters: CounterSnapshot,
}

/// Lock, recovering the guard from a poisoned mutex
fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Broadcast-based collector retaining a bounded history of events.
pub struct TelemetryCollector {
    tx: broadcast::Sender<PipelineEvent>,
    history: Mutex<VecDeque<PipelineEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: PipelineEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if self.history_capacity > 0 {
            let mut history = lock_recover(&self.history);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    fn history(&self) -> (Vec<PipelineEvent>, u64, u64) {
        let history = lock_recover(&self.history);
        (
            history.iter().cloned().collect(),
            self.total_events.load(Ordering::Relaxed),
            self.dropped_history.load(Ordering::Relaxed),
        )
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

#[derive(Default)]
struct Counters {
    frames_ingested: AtomicU64,
    frames_dropped: AtomicU64,
    events_emitted: AtomicU64,
    events_discarded: AtomicU64,
    extraction_failures: AtomicU64,
    predictions: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            frames_ingested: self.frames_ingested.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
        }
    }
}

/// Top-level hub wrapping collector state plus counters and gauges.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    counters: Counters,
    queue_gauges: Mutex<HashMap<&'static str, f32>>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            counters: Counters::default(),
            queue_gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.collector.subscribe()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let (recent, total_events, dropped_events) = self.collector.history();
        TelemetrySnapshot {
            recent,
            total_events,
            dropped_events,
            counters: self.counters.snapshot(),
        }
    }

    /// Counted only; per-frame events would flood the stream
    pub fn record_frame_ingested(&self) {
        self.counters.frames_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frames_dropped(&self, count: usize, dropped_total: u64) {
        self.counters
            .frames_dropped
            .fetch_add(count as u64, Ordering::Relaxed);
        self.collector.publish(PipelineEvent::FramesDropped {
            count,
            dropped_total,
        });
    }

    pub fn record_key_event(&self, event: &EventBuffer, sample_rate: u32) {
        self.counters.events_emitted.fetch_add(1, Ordering::Relaxed);
        self.collector.publish(PipelineEvent::KeyEvent {
            frames: event.frame_count(),
            samples: event.len(),
            start_sample: event.start_sample(),
            duration_ms: event.duration_secs(sample_rate) * 1000.0,
        });
    }

    pub fn record_event_discarded(&self, frames: usize) {
        self.counters
            .events_discarded
            .fetch_add(1, Ordering::Relaxed);
        self.collector
            .publish(PipelineEvent::EventDiscarded { frames });
    }

    pub fn record_extraction_failure(&self, err: &FeatureError, context: &str) {
        self.counters
            .extraction_failures
            .fetch_add(1, Ordering::Relaxed);
        self.collector.publish(PipelineEvent::ExtractionFailed {
            code: err.code(),
            context: context.to_string(),
        });
    }

    pub fn record_prediction(&self, prediction: &Prediction) {
        self.counters.predictions.fetch_add(1, Ordering::Relaxed);
        self.collector.publish(PipelineEvent::Prediction {
            label: prediction.label.clone(),
            confidence: prediction.confidence,
        });
    }

    pub fn record_status(&self, message: impl Into<String>) {
        self.collector.publish(PipelineEvent::Status {
            message: message.into(),
        });
    }

    /// Publish queue fill level, skipping changes under 2.5 points
    pub fn record_queue_occupancy(&self, queue: &'static str, percent: f32) {
        let normalized = percent.clamp(0.0, 100.0);
        let mut gauges = lock_recover(&self.queue_gauges);

        let should_emit = gauges
            .get(queue)
            .map(|last| (last - normalized).abs() >= 2.5)
            .unwrap_or(true);

        if should_emit {
            gauges.insert(queue, normalized);
            self.collector
                .publish(PipelineEvent::QueueOccupancy { percent: normalized });
        }
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.publish(PipelineEvent::EventDiscarded { frames: 1 });
        collector.publish(PipelineEvent::EventDiscarded { frames: 2 });
        collector.publish(PipelineEvent::Status {
            message: "ready".to_string(),
        });

        let (recent, total, dropped) = collector.history();
        assert_eq!(recent.len(), 3);
        assert_eq!(total, 3);
        assert_eq!(dropped, 0);
        assert!(matches!(
            recent[0],
            PipelineEvent::EventDiscarded { frames: 1 }
        ));
        assert!(matches!(recent[2], PipelineEvent::Status { .. }));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let collector = TelemetryCollector::new(8, 2);
        for frames in 1..=3 {
            collector.publish(PipelineEvent::EventDiscarded { frames });
        }

        let (recent, _, dropped) = collector.history();
        assert_eq!(recent.len(), 2);
        assert_eq!(dropped, 1);
        assert!(matches!(
            recent[0],
            PipelineEvent::EventDiscarded { frames: 2 }
        ));
    }

    #[test]
    fn subscribers_receive_published_events() {
        let hub = TelemetryHub::new(8, 8);
        let mut rx = hub.subscribe();
        hub.record_status("Matching mode");

        match rx.try_recv() {
            Ok(PipelineEvent::Status { message }) => assert_eq!(message, "Matching mode"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn hub_counts_events() {
        let hub = TelemetryHub::new(8, 8);
        let event = EventBuffer::from_samples(vec![0.5; 300], 3, 1000);
        hub.record_frame_ingested();
        hub.record_frame_ingested();
        hub.record_frames_dropped(2, 2);
        hub.record_key_event(&event, 1000);
        hub.record_event_discarded(1);
        hub.record_extraction_failure(
            &FeatureError::InsufficientSignal {
                len: 0,
                required: 32,
            },
            "test",
        );
        hub.record_prediction(&Prediction::untrained());

        let counters = hub.counters();
        assert_eq!(counters.frames_ingested, 2);
        assert_eq!(counters.frames_dropped, 2);
        assert_eq!(counters.events_emitted, 1);
        assert_eq!(counters.events_discarded, 1);
        assert_eq!(counters.extraction_failures, 1);
        assert_eq!(counters.predictions, 1);

        let snapshot = hub.snapshot();
        assert!(snapshot.recent.iter().any(|e| matches!(
            e,
            PipelineEvent::KeyEvent {
                frames: 3,
                samples: 300,
                ..
            }
        )));
    }

    #[test]
    fn queue_gauge_debounces_small_changes() {
        let hub = TelemetryHub::new(8, 8);
        hub.record_queue_occupancy("frames", 10.0);
        hub.record_queue_occupancy("frames", 10.5);
        hub.record_queue_occupancy("frames", 25.0);

        let occupancy_events = hub
            .snapshot()
            .recent
            .iter()
            .filter(|event| matches!(event, PipelineEvent::QueueOccupancy { .. }))
            .count();
        assert_eq!(occupancy_events, 2);
    }
}
