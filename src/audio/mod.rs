// Audio module - frame/event data types and the frame queue feeding segmentation

pub mod frame;
pub mod frame_queue;

// Re-export commonly used types for convenience
pub use frame::{compute_rms, downmix_interleaved, AudioFrame, EventBuffer, MIN_EVENT_FRAMES};
pub use frame_queue::{FrameConsumer, FrameProducer, FrameQueue, PushOutcome};
