//! Engine module housing the reusable pipeline core.
//!
//! `Pipeline` is the producer-facing handle: it owns the frame queue, the
//! segmentation thread and the live parameters. `ParamPatch` carries partial
//! parameter updates from the CLI or a session.

pub mod pipeline;

pub use pipeline::{ParamPatch, Pipeline};
