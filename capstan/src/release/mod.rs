//! Release lifecycle on one host

pub mod fsm;
pub mod pipeline;

pub use fsm::{ReleaseEvent, ReleaseFsm, ReleaseState};
pub use pipeline::ReleasePipeline;
