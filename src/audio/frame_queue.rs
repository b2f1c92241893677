// FrameQueue - bounded FIFO between the frame source and the segmentation thread
//
// The frame source must never block, so a full queue evicts its oldest frame
// to make room for the newest one: for a live signal, stale audio is worse
// than lost audio. The producer keeps a receiver clone purely for eviction.
//
// Frame flow:
// 1. Frame source calls FrameProducer::push (never blocks)
// 2. On overflow the oldest queued frame is discarded and counted
// 3. Segmentation thread polls FrameConsumer::pop_timeout

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use super::frame::AudioFrame;

/// Result of pushing one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame queued without eviction
    Queued,
    /// Frame queued after evicting this many older frames
    QueuedDroppingOldest(usize),
}

/// Producer half, owned by the frame-ingestion path
pub struct FrameProducer {
    tx: Sender<AudioFrame>,
    evict_rx: Receiver<AudioFrame>,
    dropped: Arc<AtomicU64>,
    capacity: usize,
}

/// Consumer half, owned by the segmentation thread
pub struct FrameConsumer {
    rx: Receiver<AudioFrame>,
}

/// Constructor namespace for the queue pair
pub struct FrameQueue;

impl FrameQueue {
    /// Create a bounded queue holding at most `capacity` frames
    ///
    /// # Panics
    /// Panics if capacity is 0
    pub fn bounded(capacity: usize) -> (FrameProducer, FrameConsumer) {
        assert!(capacity > 0, "capacity must be greater than 0");
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            FrameProducer {
                tx,
                evict_rx: rx.clone(),
                dropped: Arc::new(AtomicU64::new(0)),
                capacity,
            },
            FrameConsumer { rx },
        )
    }
}

impl FrameProducer {
    /// Enqueue a frame, evicting the oldest queued frames if full
    pub fn push(&self, frame: AudioFrame) -> PushOutcome {
        let mut pending = frame;
        let mut evicted = 0usize;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => {
                    return if evicted == 0 {
                        PushOutcome::Queued
                    } else {
                        PushOutcome::QueuedDroppingOldest(evicted)
                    };
                }
                // `evict_rx` keeps the channel connected, so only Full occurs
                Err(TrySendError::Full(frame)) | Err(TrySendError::Disconnected(frame)) => {
                    pending = frame;
                    // The consumer may have drained the slot in the meantime,
                    // in which case the retry simply succeeds.
                    if self.evict_rx.try_recv().is_ok() {
                        evicted += 1;
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    /// Total frames evicted since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard everything currently queued, returning how many frames went
    pub fn clear(&self) -> usize {
        self.evict_rx.try_iter().count()
    }
}

impl FrameConsumer {
    /// Wait up to `timeout` for the next frame
    ///
    /// Returns `None` on timeout or when every producer is gone.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<AudioFrame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_pop(&self) -> Option<AudioFrame> {
        self.rx.try_recv().ok()
    }
}
