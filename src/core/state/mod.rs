//! Run state and checkpoint persistence
//!
//! - [`RunState`] - processed keys and counters owned by the coordinator
//! - [`CheckpointStore`] - durable, batch-atomic record of outcomes
//! - [`JsonlCheckpointStore`] - JSON Lines implementation

pub mod checkpoint;
pub mod run_state;

pub use checkpoint::{CheckpointStore, JsonlCheckpointStore};
pub use run_state::{OutcomeCounts, RunState};
